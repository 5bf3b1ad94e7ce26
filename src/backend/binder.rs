use log::{debug, info, warn};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use super::catalog::CatalogSource;
use super::index::{MAX_SUGGESTIONS, NameIndex};
use super::scheduler::{FetchEvent, FetchOutcome, RenderSink, Scheduler, SlotState};
use super::window::BinderLayout;
use crate::config::Config;

#[derive(Debug, Error, PartialEq)]
pub enum SearchError {
    #[error("nothing to search for")]
    EmptyQuery,
    #[error("no slot matches \"{0}\"")]
    NotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Highlight {
    #[default]
    Off,
    Awaiting(u32),
    Shown(u32),
}

/// Viewport over a generated binder: owns the scheduler and keeps it fed with
/// the window around the current slide.
pub struct Binder {
    layout: BinderLayout,
    slide: u32,
    preload_depth: u32,
    scheduler: Scheduler,
    index: NameIndex,
    index_requested: bool,
    highlight: Highlight,
}

impl Binder {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        config: &Config,
    ) -> (Self, mpsc::UnboundedReceiver<FetchEvent>) {
        let (scheduler, events) = Scheduler::new(source, config.max_concurrent);
        let binder = Self {
            layout: BinderLayout::new(0, config.slots_per_page),
            slide: 0,
            preload_depth: config.preload_depth,
            scheduler,
            index: NameIndex::default(),
            index_requested: false,
            highlight: Highlight::Off,
        };
        (binder, events)
    }

    /// Starts a fresh binder of `total_slots` slots. Everything fetched for the
    /// previous binder is dropped; the name index is kept.
    pub fn generate(&mut self, total_slots: u32) {
        info!("generating binder with {} slots", total_slots);
        self.scheduler.reset();
        self.layout = BinderLayout::new(total_slots, self.layout.slots_per_page());
        self.slide = 0;
        self.highlight = Highlight::Off;
        self.request_index();
        self.refresh();
    }

    fn request_index(&mut self) {
        if !self.index.is_empty() || self.index_requested {
            return;
        }
        self.index_requested = true;

        let dispatcher = self.scheduler.dispatcher();
        let source = dispatcher.source();
        dispatcher.spawn_detached(async move { FetchOutcome::Listing(source.fetch_listing().await) });
    }

    fn refresh(&mut self) {
        self.scheduler
            .refresh_window(&self.layout, self.slide, self.preload_depth);
    }

    pub fn navigate_to_slide(&mut self, slide: u32) {
        self.slide = self.layout.clamp_slide(slide);
        self.highlight = Highlight::Off;
        self.refresh();
    }

    /// Moves by `delta` slides; returns `false` at either end of the binder.
    pub fn navigate(&mut self, delta: i32) -> bool {
        let Some(target) = self.slide.checked_add_signed(delta) else {
            return false;
        };
        if target >= self.layout.total_slides() {
            return false;
        }
        self.navigate_to_slide(target);
        true
    }

    pub fn navigate_home(&mut self) -> bool {
        if self.slide == 0 {
            return false;
        }
        self.navigate_to_slide(0);
        true
    }

    fn resolve(&self, query: &str) -> Option<u32> {
        match query.parse::<u32>() {
            Ok(slot) if slot > 0 => Some(slot),
            _ => self.index.lookup(query),
        }
    }

    /// Jumps to the slide holding the slot named by `query` (a slot number or
    /// an item name) and highlights it once it has loaded.
    pub fn search_for_slot(&mut self, query: &str) -> Result<u32, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let slot = self
            .resolve(query)
            .filter(|slot| *slot <= self.layout.total_slots())
            .ok_or_else(|| SearchError::NotFound(query.to_string()))?;

        debug!("search {:?} resolved to slot {}", query, slot);
        self.navigate_to_slide(self.layout.slide_for_slot(slot));
        self.highlight = if self.scheduler.summary(slot).is_some() {
            Highlight::Shown(slot)
        } else {
            Highlight::Awaiting(slot)
        };
        Ok(slot)
    }

    pub fn suggestions(&self, prefix: &str) -> Vec<&str> {
        self.index
            .suggest(prefix, self.layout.total_slots(), MAX_SUGGESTIONS)
    }

    pub fn handle_event(&mut self, event: FetchEvent, sink: &mut dyn RenderSink) {
        match event {
            FetchEvent {
                outcome: FetchOutcome::Listing(result),
                ..
            } => {
                self.index_requested = false;
                match result {
                    Ok(listing) => {
                        if self.index.populate(listing) {
                            info!("name index ready with {} entries", self.index.len());
                        }
                    }
                    Err(e) => warn!("name index unavailable, name search disabled: {}", e),
                }
            }
            other => self.scheduler.handle_event(other, sink),
        }

        if let Highlight::Awaiting(slot) = self.highlight {
            if self.scheduler.summary(slot).is_some() {
                self.highlight = Highlight::Shown(slot);
            }
        }
    }

    pub fn tick(&mut self) {
        self.scheduler.tick();
    }

    pub fn request_detail(&mut self, id: u32, sink: &mut dyn RenderSink) -> bool {
        self.scheduler.request_detail(id, sink)
    }

    pub fn layout(&self) -> &BinderLayout {
        &self.layout
    }

    pub fn current_slide(&self) -> u32 {
        self.slide
    }

    pub fn highlighted(&self) -> Option<u32> {
        match self.highlight {
            Highlight::Shown(slot) => Some(slot),
            _ => None,
        }
    }

    pub fn slot_state(&self, id: u32) -> SlotState {
        self.scheduler.state_of(id)
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn index(&self) -> &NameIndex {
        &self.index
    }
}

use image::DynamicImage;
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::cache::ItemCache;
use super::catalog::{CatalogListing, CatalogSource, FetchError, ItemDetail, Summary};
use super::preload::ImagePreloader;
use super::window::BinderLayout;

pub const DEFAULT_MAX_CONCURRENT: usize = 75;

/// Receives scheduler results on the UI side. Every callback must tolerate ids
/// that are no longer on screen.
pub trait RenderSink {
    fn on_item_ready(&mut self, id: u32, summary: &Summary);

    fn on_detail_ready(&mut self, _id: u32, _detail: Option<&ItemDetail>) {}

    fn on_image_ready(&mut self, _url: &str, _image: DynamicImage) {}
}

#[derive(Debug)]
pub enum FetchOutcome {
    Summary { id: u32, summary: Summary },
    Detail { id: u32, detail: Option<ItemDetail> },
    Image { url: String, image: Option<DynamicImage> },
    Listing(Result<CatalogListing, FetchError>),
}

/// A settled background task, tagged with the binder session it belongs to.
#[derive(Debug)]
pub struct FetchEvent {
    pub epoch: u64,
    pub outcome: FetchOutcome,
}

/// Spawns fetch tasks for the current binder session and routes their results
/// back to the UI loop.
#[derive(Clone)]
pub struct Dispatcher {
    source: Arc<dyn CatalogSource>,
    tx: mpsc::UnboundedSender<FetchEvent>,
    cancel: CancellationToken,
    epoch: u64,
}

impl Dispatcher {
    pub fn source(&self) -> Arc<dyn CatalogSource> {
        Arc::clone(&self.source)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Runs `work` until it settles or the session is reset, whichever is first.
    pub fn spawn<F>(&self, work: F)
    where
        F: Future<Output = FetchOutcome> + Send + 'static,
    {
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();
        let epoch = self.epoch;

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("fetch task from session {} cancelled", epoch);
                }
                outcome = work => {
                    let _ = tx.send(FetchEvent { epoch, outcome });
                }
            }
        });
    }

    /// Like [`Dispatcher::spawn`] but survives session resets.
    pub fn spawn_detached<F>(&self, work: F)
    where
        F: Future<Output = FetchOutcome> + Send + 'static,
    {
        let tx = self.tx.clone();
        let epoch = self.epoch;

        tokio::spawn(async move {
            let outcome = work.await;
            let _ = tx.send(FetchEvent { epoch, outcome });
        });
    }

    fn renew(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.epoch += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct PendingEntry {
    distance: u32,
    id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Absent,
    Pending,
    InFlight,
    Cached,
}

/// Bounded-concurrency prefetcher.
///
/// An id is always in exactly one of: cached, in flight, pending, absent. Ids
/// only leave the in-flight set when their summary task reports back through
/// [`Scheduler::handle_event`], so at most `max_concurrent` summary fetches are
/// ever outstanding.
pub struct Scheduler {
    dispatcher: Dispatcher,
    cache: ItemCache,
    pending: BTreeSet<PendingEntry>,
    in_flight: HashSet<u32>,
    details_in_flight: HashSet<u32>,
    preloader: ImagePreloader,
    max_concurrent: usize,
}

impl Scheduler {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        max_concurrent: usize,
    ) -> (Self, mpsc::UnboundedReceiver<FetchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher {
            source,
            tx,
            cancel: CancellationToken::new(),
            epoch: 0,
        };

        let scheduler = Self {
            dispatcher,
            cache: ItemCache::new(),
            pending: BTreeSet::new(),
            in_flight: HashSet::new(),
            details_in_flight: HashSet::new(),
            preloader: ImagePreloader::default(),
            max_concurrent: max_concurrent.max(1),
        };
        (scheduler, rx)
    }

    /// Drops all session state and cancels every outstanding task.
    pub fn reset(&mut self) {
        info!(
            "resetting scheduler ({} cached, {} in flight, {} images preloaded)",
            self.cache.summary_count(),
            self.in_flight.len(),
            self.preloader.issued_count()
        );
        self.dispatcher.renew();
        self.cache.clear();
        self.pending.clear();
        self.in_flight.clear();
        self.details_in_flight.clear();
        self.preloader.clear();
    }

    /// Replaces the pending set with the part of the resident window that is
    /// neither cached nor in flight, nearest pages first, then ticks.
    pub fn refresh_window(&mut self, layout: &BinderLayout, slide: u32, depth: u32) {
        let anchor = BinderLayout::first_page_of_slide(slide);

        self.pending = layout
            .resident_ids(slide, depth)
            .into_iter()
            .filter(|id| !self.cache.has_summary(*id) && !self.in_flight.contains(id))
            .map(|id| PendingEntry {
                distance: layout.page_of_slot(id).abs_diff(anchor),
                id,
            })
            .collect();

        debug!(
            "window around slide {}: {} pending, {} in flight",
            slide,
            self.pending.len(),
            self.in_flight.len()
        );
        self.tick();
    }

    pub fn tick(&mut self) {
        while self.in_flight.len() < self.max_concurrent {
            let Some(entry) = self.pending.pop_first() else {
                break;
            };
            self.dispatch_summary(entry.id);
        }
    }

    fn dispatch_summary(&mut self, id: u32) {
        self.in_flight.insert(id);
        debug!("fetching #{} ({} in flight)", id, self.in_flight.len());

        let source = self.dispatcher.source();
        self.dispatcher.spawn(async move {
            let summary = source.fetch_summary(id).await;
            FetchOutcome::Summary { id, summary }
        });
    }

    fn spawn_detail(&mut self, id: u32) {
        if self.cache.detail(id).is_some() || !self.details_in_flight.insert(id) {
            return;
        }

        let source = self.dispatcher.source();
        self.dispatcher.spawn(async move {
            let detail = source.fetch_detail(id).await;
            FetchOutcome::Detail { id, detail }
        });
    }

    /// Serves the detail from cache when possible, otherwise starts the detail
    /// stage; the sink hears about it once it settles. Returns whether the sink
    /// was called synchronously.
    pub fn request_detail(&mut self, id: u32, sink: &mut dyn RenderSink) -> bool {
        if let Some(detail) = self.cache.detail(id) {
            sink.on_detail_ready(id, Some(detail));
            return true;
        }
        self.spawn_detail(id);
        false
    }

    pub fn handle_event(&mut self, event: FetchEvent, sink: &mut dyn RenderSink) {
        if event.epoch != self.dispatcher.epoch() {
            debug!("discarding result from binder session {}", event.epoch);
            return;
        }

        match event.outcome {
            FetchOutcome::Summary { id, summary } => self.settle_summary(id, summary, sink),
            FetchOutcome::Detail { id, detail } => {
                self.details_in_flight.remove(&id);
                if let Some(detail) = detail {
                    self.cache.put_detail(id, detail);
                }
                sink.on_detail_ready(id, self.cache.detail(id));
            }
            FetchOutcome::Image {
                url,
                image: Some(image),
            } => sink.on_image_ready(&url, image),
            FetchOutcome::Image { url, image: None } => {
                debug!("no image for {}", url);
            }
            FetchOutcome::Listing(_) => {
                debug!("catalog listing is not scheduler work, ignoring");
            }
        }
    }

    fn settle_summary(&mut self, id: u32, summary: Summary, sink: &mut dyn RenderSink) {
        if !self.in_flight.remove(&id) {
            warn!("summary for #{} settled without being in flight", id);
        }

        let loaded = summary.is_loaded();
        let image_url = summary.image_url().map(str::to_string);

        self.cache.put_summary(id, summary);
        if let Some(summary) = self.cache.summary(id) {
            sink.on_item_ready(id, summary);
        }

        self.preloader
            .preload(image_url.as_deref(), &self.dispatcher);
        if loaded {
            self.spawn_detail(id);
        }

        self.tick();
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn summary(&self, id: u32) -> Option<&Summary> {
        self.cache.summary(id)
    }

    pub fn detail(&self, id: u32) -> Option<&ItemDetail> {
        self.cache.detail(id)
    }

    pub fn state_of(&self, id: u32) -> SlotState {
        if self.cache.has_summary(id) {
            SlotState::Cached
        } else if self.in_flight.contains(&id) {
            SlotState::InFlight
        } else if self.pending.iter().any(|entry| entry.id == id) {
            SlotState::Pending
        } else {
            SlotState::Absent
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn cached_count(&self) -> usize {
        self.cache.summary_count()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backend::catalog::{CatalogEntry, ItemSummary, Stat};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory catalog. Ids in `failing` come back unavailable; ids in
    /// `stalled` never settle.
    #[derive(Default)]
    pub(crate) struct MockCatalog {
        pub summary_calls: AtomicUsize,
        pub detail_calls: AtomicUsize,
        pub image_calls: AtomicUsize,
        pub failing: HashSet<u32>,
        pub stalled: HashSet<u32>,
        pub stall_all: bool,
        pub shared_images: bool,
        pub listing: Vec<CatalogEntry>,
    }

    impl MockCatalog {
        fn image_for(&self, id: u32) -> String {
            if self.shared_images {
                format!("https://img/{}.png", id % 2)
            } else {
                format!("https://img/{}.png", id)
            }
        }
    }

    #[async_trait]
    impl CatalogSource for MockCatalog {
        async fn fetch_summary(&self, id: u32) -> Summary {
            self.summary_calls.fetch_add(1, Ordering::SeqCst);
            if self.stall_all || self.stalled.contains(&id) {
                std::future::pending::<()>().await;
            }
            tokio::task::yield_now().await;

            if self.failing.contains(&id) {
                return Summary::Unavailable { id };
            }
            Summary::Loaded(ItemSummary {
                id,
                name: format!("item-{}", id),
                types: vec!["normal".into()],
                image_url: Some(self.image_for(id)),
            })
        }

        async fn fetch_detail(&self, id: u32) -> Option<ItemDetail> {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(&id) {
                return None;
            }
            Some(ItemDetail {
                id,
                name: format!("item-{}", id),
                image_url: Some(self.image_for(id)),
                types: vec!["normal".into()],
                stats: vec![Stat {
                    name: "hp".into(),
                    value: 40,
                }],
                generation_name: "Red/Blue/Yellow".into(),
                generation_label: "I".into(),
            })
        }

        async fn fetch_listing(&self) -> Result<CatalogListing, FetchError> {
            Ok(CatalogListing {
                count: self.listing.len() as u32,
                entries: self.listing.clone(),
            })
        }

        async fn fetch_image(&self, _url: &str) -> Option<DynamicImage> {
            self.image_calls.fetch_add(1, Ordering::SeqCst);
            None
        }
    }

    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub ready: Vec<(u32, Summary)>,
        pub details: Vec<(u32, Option<ItemDetail>)>,
    }

    impl RenderSink for RecordingSink {
        fn on_item_ready(&mut self, id: u32, summary: &Summary) {
            self.ready.push((id, summary.clone()));
        }

        fn on_detail_ready(&mut self, id: u32, detail: Option<&ItemDetail>) {
            self.details.push((id, detail.cloned()));
        }
    }

    fn scheduler_with(
        catalog: MockCatalog,
        cap: usize,
    ) -> (Scheduler, mpsc::UnboundedReceiver<FetchEvent>, Arc<MockCatalog>) {
        let catalog = Arc::new(catalog);
        let (scheduler, rx) = Scheduler::new(catalog.clone(), cap);
        (scheduler, rx, catalog)
    }

    fn assert_disjoint(scheduler: &Scheduler) {
        for entry in &scheduler.pending {
            assert!(!scheduler.in_flight.contains(&entry.id));
            assert!(!scheduler.cache.has_summary(entry.id));
        }
        for id in &scheduler.in_flight {
            assert!(!scheduler.cache.has_summary(*id));
        }
        assert!(scheduler.in_flight.len() <= scheduler.max_concurrent);
    }

    async fn drain(
        scheduler: &mut Scheduler,
        rx: &mut mpsc::UnboundedReceiver<FetchEvent>,
        sink: &mut RecordingSink,
    ) {
        while !scheduler.is_idle() {
            let event = rx.recv().await.expect("channel closed");
            scheduler.handle_event(event, sink);
            assert_disjoint(scheduler);
        }
    }

    #[tokio::test]
    async fn test_concurrency_cap_holds_and_every_id_is_cached() {
        let (mut scheduler, mut rx, catalog) = scheduler_with(MockCatalog::default(), 10);
        let layout = BinderLayout::new(1000, 16);
        let wanted = layout.resident_ids(0, 3);
        assert_eq!(wanted.len(), 112);

        scheduler.refresh_window(&layout, 0, 3);
        assert_eq!(scheduler.in_flight_count(), 10);
        assert_eq!(scheduler.pending_count(), 102);
        assert_disjoint(&scheduler);

        let mut sink = RecordingSink::default();
        drain(&mut scheduler, &mut rx, &mut sink).await;

        for id in &wanted {
            assert_eq!(scheduler.state_of(*id), SlotState::Cached);
        }
        assert_eq!(sink.ready.len(), wanted.len());
        assert_eq!(catalog.summary_calls.load(Ordering::SeqCst), wanted.len());
    }

    #[tokio::test]
    async fn test_cached_ids_are_not_fetched_again() {
        let (mut scheduler, mut rx, catalog) = scheduler_with(MockCatalog::default(), 4);
        let layout = BinderLayout::new(40, 16);
        let mut sink = RecordingSink::default();

        scheduler.refresh_window(&layout, 0, 1);
        drain(&mut scheduler, &mut rx, &mut sink).await;
        let calls = catalog.summary_calls.load(Ordering::SeqCst);
        let first = scheduler.summary(3).cloned();

        scheduler.refresh_window(&layout, 0, 1);
        assert!(scheduler.is_idle());
        assert_eq!(catalog.summary_calls.load(Ordering::SeqCst), calls);
        assert_eq!(scheduler.summary(3).cloned(), first);
    }

    #[tokio::test]
    async fn test_failed_summary_is_cached_as_unavailable() {
        let catalog = MockCatalog {
            failing: HashSet::from([2]),
            ..Default::default()
        };
        let (mut scheduler, mut rx, _catalog) = scheduler_with(catalog, 2);
        let layout = BinderLayout::new(3, 16);
        let mut sink = RecordingSink::default();

        scheduler.refresh_window(&layout, 0, 0);
        drain(&mut scheduler, &mut rx, &mut sink).await;

        assert_eq!(scheduler.summary(2), Some(&Summary::Unavailable { id: 2 }));
        assert!(sink.ready.iter().any(|(id, s)| *id == 2 && !s.is_loaded()));
        assert!(!scheduler.details_in_flight.contains(&2));
        assert!(scheduler.details_in_flight.contains(&1) || scheduler.detail(1).is_some());

        // Sentinels keep the id out of the queue for the rest of the session.
        scheduler.refresh_window(&layout, 0, 0);
        assert_eq!(scheduler.state_of(2), SlotState::Cached);
        assert!(scheduler.is_idle());
    }

    #[tokio::test]
    async fn test_nearest_pages_are_dispatched_first() {
        let catalog = MockCatalog {
            stall_all: true,
            ..Default::default()
        };
        let (mut scheduler, _rx, _catalog) = scheduler_with(catalog, 1);
        let layout = BinderLayout::new(1000, 16);

        scheduler.refresh_window(&layout, 3, 1);
        // slide 3 starts at page 6, whose first slot is 81
        assert_eq!(scheduler.state_of(81), SlotState::InFlight);
        assert_eq!(scheduler.pending.first().map(|e| e.id), Some(82));
    }

    #[tokio::test]
    async fn test_navigation_replaces_pending_but_keeps_in_flight() {
        let catalog = MockCatalog {
            stall_all: true,
            ..Default::default()
        };
        let (mut scheduler, _rx, _catalog) = scheduler_with(catalog, 1);
        let layout = BinderLayout::new(1000, 16);

        scheduler.refresh_window(&layout, 0, 3);
        assert_eq!(scheduler.state_of(1), SlotState::InFlight);
        assert_eq!(scheduler.state_of(2), SlotState::Pending);

        scheduler.refresh_window(&layout, 20, 1);
        let window: HashSet<u32> = layout.resident_ids(20, 1).into_iter().collect();
        assert!(scheduler.pending.iter().all(|e| window.contains(&e.id)));
        assert_eq!(scheduler.pending_count(), window.len());
        assert_eq!(scheduler.state_of(2), SlotState::Absent);
        assert_eq!(scheduler.state_of(1), SlotState::InFlight);
        assert_eq!(scheduler.in_flight_count(), 1);
    }

    #[tokio::test]
    async fn test_stalled_fetches_hold_their_slot() {
        let catalog = MockCatalog {
            stalled: HashSet::from([1, 2]),
            ..Default::default()
        };
        let (mut scheduler, mut rx, _catalog) = scheduler_with(catalog, 3);
        let layout = BinderLayout::new(10, 16);
        let mut sink = RecordingSink::default();

        scheduler.refresh_window(&layout, 0, 0);
        while scheduler.pending_count() > 0 || scheduler.in_flight_count() > 2 {
            let event = rx.recv().await.expect("channel closed");
            scheduler.handle_event(event, &mut sink);
            assert_disjoint(&scheduler);
        }

        assert_eq!(scheduler.cached_count(), 8);
        assert_eq!(scheduler.state_of(1), SlotState::InFlight);
        assert_eq!(scheduler.state_of(2), SlotState::InFlight);
    }

    #[tokio::test]
    async fn test_reset_discards_stale_results() {
        let catalog = MockCatalog {
            stall_all: true,
            ..Default::default()
        };
        let (mut scheduler, _rx, _catalog) = scheduler_with(catalog, 5);
        let layout = BinderLayout::new(40, 16);
        scheduler.refresh_window(&layout, 0, 1);
        let old_epoch = scheduler.dispatcher().epoch();

        scheduler.reset();
        assert!(scheduler.is_idle());
        assert_eq!(scheduler.cached_count(), 0);

        let mut sink = RecordingSink::default();
        scheduler.handle_event(
            FetchEvent {
                epoch: old_epoch,
                outcome: FetchOutcome::Summary {
                    id: 1,
                    summary: Summary::Unavailable { id: 1 },
                },
            },
            &mut sink,
        );
        assert!(sink.ready.is_empty());
        assert_eq!(scheduler.state_of(1), SlotState::Absent);
    }

    #[tokio::test]
    async fn test_request_detail_uses_cache_after_first_load() {
        let (mut scheduler, mut rx, catalog) = scheduler_with(MockCatalog::default(), 1);
        let mut sink = RecordingSink::default();

        assert!(!scheduler.request_detail(7, &mut sink));
        assert!(!scheduler.request_detail(7, &mut sink));
        let event = rx.recv().await.expect("channel closed");
        scheduler.handle_event(event, &mut sink);

        assert_eq!(catalog.detail_calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.details.len(), 1);
        assert!(sink.details[0].1.is_some());

        assert!(scheduler.request_detail(7, &mut sink));
        assert_eq!(sink.details.len(), 2);
        assert_eq!(catalog.detail_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_detail_is_reported_as_absent() {
        let catalog = MockCatalog {
            failing: HashSet::from([9]),
            ..Default::default()
        };
        let (mut scheduler, mut rx, _catalog) = scheduler_with(catalog, 1);
        let mut sink = RecordingSink::default();

        scheduler.request_detail(9, &mut sink);
        let event = rx.recv().await.expect("channel closed");
        scheduler.handle_event(event, &mut sink);

        assert_eq!(sink.details, vec![(9, None)]);
        assert!(scheduler.detail(9).is_none());
    }

    #[tokio::test]
    async fn test_images_are_preloaded_once_per_url() {
        let catalog = MockCatalog {
            shared_images: true,
            ..Default::default()
        };
        let (mut scheduler, mut rx, _catalog) = scheduler_with(catalog, 8);
        let layout = BinderLayout::new(6, 16);
        let mut sink = RecordingSink::default();

        scheduler.refresh_window(&layout, 0, 0);
        drain(&mut scheduler, &mut rx, &mut sink).await;

        assert_eq!(scheduler.preloader.issued_count(), 2);
        assert!(!scheduler.preloader.preload(Some(""), &scheduler.dispatcher));
        assert!(!scheduler.preloader.preload(None, &scheduler.dispatcher));
        assert!(
            !scheduler
                .preloader
                .preload(Some("https://img/0.png"), &scheduler.dispatcher)
        );
    }

    #[test]
    fn test_zero_cap_is_raised_to_one() {
        let (scheduler, _rx) = Scheduler::new(Arc::new(MockCatalog::default()), 0);
        assert_eq!(scheduler.max_concurrent(), 1);
    }
}

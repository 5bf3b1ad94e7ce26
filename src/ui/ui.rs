use image::DynamicImage;
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, ListState, Paragraph, Wrap},
};
use ratatui_image::{Resize, StatefulImage, picker::Picker, protocol::StatefulProtocol};
use std::collections::HashMap;

use crate::backend::binder::Binder;
use crate::backend::catalog::{ItemDetail, Summary};
use crate::backend::collection::Collection;
use crate::backend::scheduler::{RenderSink, SlotState};
use crate::backend::window::{BinderLayout, PageSide};

const GRID_COLUMNS: u32 = 4;
const STAT_BAR_WIDTH: u32 = 20;
const STAT_BAR_MAX: u32 = 160;

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub enum Mode {
    #[default]
    Browse,
    Search,
    Regenerate,
    Share,
    Detail(u32),
}

/// What the grid knows about a slot once its summary has settled.
#[derive(Clone, Debug)]
pub struct SlotView {
    pub name: String,
    pub types: Vec<String>,
    pub unavailable: bool,
}

impl From<&Summary> for SlotView {
    fn from(summary: &Summary) -> Self {
        match summary {
            Summary::Loaded(item) => SlotView {
                name: item.name.clone(),
                types: item.types.clone(),
                unavailable: item.image_url.is_none(),
            },
            Summary::Unavailable { .. } => SlotView {
                name: "N/A".to_string(),
                types: Vec::new(),
                unavailable: true,
            },
        }
    }
}

pub enum DetailView {
    Loading,
    Ready(ItemDetail),
    Unavailable,
}

pub struct App {
    pub mode: Mode,
    pub collection: Collection,
    pub slots: HashMap<u32, SlotView>,
    pub cursor: Option<u32>,
    pub search_query: String,
    pub suggestions: Vec<String>,
    pub suggestion_index: Option<usize>,
    pub search_error: Option<String>,
    pub slot_input: String,
    pub share_token: Option<String>,
    pub status: Option<String>,
    pub detail: Option<DetailView>,
    pub picker: Option<Picker>,
    pub images: HashMap<String, DynamicImage>,
    pub detail_image: Option<StatefulProtocol>,
}

impl App {
    pub fn new(collection: Collection) -> Self {
        let picker = Picker::from_query_stdio().ok();

        Self {
            mode: Mode::Browse,
            collection,
            slots: HashMap::new(),
            cursor: None,
            search_query: String::new(),
            suggestions: Vec::new(),
            suggestion_index: None,
            search_error: None,
            slot_input: String::new(),
            share_token: None,
            status: None,
            detail: None,
            picker,
            images: HashMap::new(),
            detail_image: None,
        }
    }

    /// Forgets everything rendered for the previous binder.
    pub fn reset_binder(&mut self) {
        self.mode = Mode::Browse;
        self.slots.clear();
        self.images.clear();
        self.cursor = None;
        self.detail = None;
        self.detail_image = None;
        self.search_error = None;
    }

    /// Keeps the cursor on a slot of the current slide.
    pub fn sync_cursor(&mut self, binder: &Binder) {
        let visible = binder.layout().slide_slots(binder.current_slide());
        let on_slide = self.cursor.is_some_and(|id| visible.contains(&id));
        if !on_slide {
            self.cursor = visible.first().copied();
        }
    }

    pub fn move_cursor(&mut self, binder: &Binder, delta: i32) {
        let visible = binder.layout().slide_slots(binder.current_slide());
        if visible.is_empty() {
            self.cursor = None;
            return;
        }

        let current = self
            .cursor
            .and_then(|id| visible.iter().position(|v| *v == id))
            .unwrap_or(0);
        let next = (current as i64 + delta as i64).rem_euclid(visible.len() as i64) as usize;
        self.cursor = Some(visible[next]);
    }

    pub fn update_suggestions(&mut self, binder: &Binder) {
        self.suggestions = binder
            .suggestions(&self.search_query)
            .into_iter()
            .map(String::from)
            .collect();
        self.suggestion_index = None;
    }

    pub fn cycle_suggestion(&mut self, delta: i32) {
        if self.suggestions.is_empty() {
            return;
        }
        let len = self.suggestions.len() as i64;
        let next = match self.suggestion_index {
            Some(i) => (i as i64 + delta as i64).rem_euclid(len),
            None if delta >= 0 => 0,
            None => len - 1,
        };
        self.suggestion_index = Some(next as usize);
    }

    pub fn selected_suggestion(&self) -> Option<&str> {
        self.suggestion_index
            .and_then(|i| self.suggestions.get(i))
            .map(String::as_str)
    }

    pub fn is_loaded(&self, id: u32) -> bool {
        self.slots.get(&id).is_some_and(|slot| !slot.unavailable)
    }

    pub fn open_detail(&mut self, id: u32) {
        self.mode = Mode::Detail(id);
        self.detail = Some(DetailView::Loading);
        self.detail_image = None;
    }

    pub fn close_detail(&mut self) {
        self.mode = Mode::Browse;
        self.detail = None;
        self.detail_image = None;
    }

    pub fn toggle_caught(&mut self, id: u32) {
        let caught = self.collection.toggle(id);
        self.status = Some(if caught {
            format!("#{} caught", id)
        } else {
            format!("#{} released", id)
        });
    }

    fn prepare_detail_image(&mut self) {
        if self.detail_image.is_some() {
            return;
        }
        let Some(DetailView::Ready(detail)) = &self.detail else {
            return;
        };
        let Some(image) = detail.image_url.as_ref().and_then(|url| self.images.get(url)) else {
            return;
        };
        if let Some(ref picker) = self.picker {
            self.detail_image = Some(picker.new_resize_protocol(image.clone()));
        }
    }
}

impl RenderSink for App {
    fn on_item_ready(&mut self, id: u32, summary: &Summary) {
        self.slots.insert(id, SlotView::from(summary));
    }

    fn on_detail_ready(&mut self, id: u32, detail: Option<&ItemDetail>) {
        if self.mode != Mode::Detail(id) {
            return;
        }
        self.detail = Some(match detail {
            Some(detail) => DetailView::Ready(detail.clone()),
            None => DetailView::Unavailable,
        });
        self.prepare_detail_image();
    }

    fn on_image_ready(&mut self, url: &str, image: DynamicImage) {
        self.images.insert(url.to_string(), image);
        if matches!(self.mode, Mode::Detail(_)) {
            self.prepare_detail_image();
        }
    }
}

pub fn ui(f: &mut Frame, app: &mut App, binder: &Binder) {
    let area = f.area();

    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Min(10),   // slide
            Constraint::Length(3), // footer / input
        ])
        .split(area);

    draw_header(f, root[0], app, binder);
    draw_slide(f, root[1], app, binder);
    draw_footer(f, root[2], app);

    if app.mode == Mode::Search && !app.suggestions.is_empty() {
        draw_suggestions(f, root[2], app);
    }
    if let Mode::Detail(id) = app.mode {
        draw_detail_card(f, area, app, id);
    }
}

fn draw_header(f: &mut Frame, area: Rect, app: &App, binder: &Binder) {
    let layout = binder.layout();
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let counter = if layout.total_slots() > 0 {
        format!(
            "View {} / {} ({} pages)",
            binder.current_slide() + 1,
            layout.total_slides(),
            layout.total_pages()
        )
    } else {
        String::new()
    };
    let scheduler = binder.scheduler();
    let activity = if scheduler.is_idle() {
        format!("  {} loaded", scheduler.cached_count())
    } else {
        format!(
            "  fetching {}/{}, {} queued",
            scheduler.in_flight_count(),
            scheduler.max_concurrent(),
            scheduler.pending_count()
        )
    };
    let title = Paragraph::new(Line::from(vec![
        Span::styled(
            "Virtual Binder  ",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(counter, Style::default().fg(Color::White)),
        Span::styled(activity, Style::default().fg(Color::DarkGray)),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(title, columns[0]);

    let caught = app.collection.count_within(layout.total_slots());
    let ratio = if layout.total_slots() > 0 {
        (caught as f64 / layout.total_slots() as f64).min(1.0)
    } else {
        0.0
    };
    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Collection Progress")
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
        .ratio(ratio)
        .label(format!("{} / {} Caught", caught, layout.total_slots()));
    f.render_widget(gauge, columns[1]);
}

fn draw_slide(f: &mut Frame, area: Rect, app: &App, binder: &Binder) {
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let slide = binder.current_slide();
    if slide == 0 {
        draw_cover_page(f, halves[0], binder);
        draw_page(f, halves[1], 1, app, binder);
    } else {
        // page 0 never exists and draws as the blank placeholder
        let pages = BinderLayout::slide_pages(slide);
        draw_page(f, halves[0], pages.first().copied().unwrap_or(0), app, binder);
        draw_page(f, halves[1], pages.get(1).copied().unwrap_or(0), app, binder);
    }
}

fn draw_cover_page(f: &mut Frame, area: Rect, binder: &Binder) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            "Virtual Binder",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ))
        .alignment(Alignment::Center),
        Line::from("A tool for visualizing your Pokémon collection.")
            .alignment(Alignment::Center),
        Line::from(""),
        Line::from(Span::styled(
            "How to Use",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(vec![key("n"), Span::raw("  generate a binder with a new slot count")]),
        Line::from(vec![key("←/→"), Span::raw("  turn pages")]),
        Line::from(vec![key("↑/↓"), Span::raw("  pick a card")]),
        Line::from(vec![key("Space"), Span::raw("  mark a card as caught or uncaught")]),
        Line::from(vec![key("Enter"), Span::raw("  show detailed information")]),
        Line::from(vec![key("/"), Span::raw("  find a card by name or number")]),
        Line::from(vec![key("s"), Span::raw("  share your collection")]),
        Line::from(""),
        Line::from("Progress is saved automatically."),
        Line::from(""),
        Line::from(Span::styled(
            if binder.index().is_empty() {
                "Loading the name index...".to_string()
            } else {
                format!("{} Pokémon known to the catalog", binder.index().total_available())
            },
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(Span::styled(
            "Pokémon data provided by PokéAPI (https://pokeapi.co/)",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let cover = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        );
    f.render_widget(cover, area);
}

fn draw_page(f: &mut Frame, area: Rect, page: u32, app: &App, binder: &Binder) {
    let layout = binder.layout();
    if !layout.page_exists(page) {
        let placeholder = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Black));
        f.render_widget(placeholder, area);
        return;
    }

    let (sheet, side) = BinderLayout::sheet_of_page(page);
    let side = match side {
        PageSide::Front => "Front",
        PageSide::Back => "Back",
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("Sheet {} – Page {} ({})", sheet, page, side))
        .border_style(Style::default().fg(Color::White));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let rows = layout.slots_per_page().div_ceil(GRID_COLUMNS);
    let row_areas = Layout::default()
        .direction(Direction::Vertical)
        .constraints((0..rows).map(|_| Constraint::Ratio(1, rows)))
        .split(inner);

    let mut slots = layout.page_slots(page);
    for row_area in row_areas.iter() {
        let cells = Layout::default()
            .direction(Direction::Horizontal)
            .constraints((0..GRID_COLUMNS).map(|_| Constraint::Ratio(1, GRID_COLUMNS)))
            .split(*row_area);
        for cell in cells.iter() {
            let Some(id) = slots.next() else {
                return;
            };
            draw_slot(f, *cell, id, app, binder);
        }
    }
}

fn draw_slot(f: &mut Frame, area: Rect, id: u32, app: &App, binder: &Binder) {
    let caught = app.collection.is_caught(id);
    let view = app.slots.get(&id);

    let border_style = if app.cursor == Some(id) {
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD)
    } else if binder.highlighted() == Some(id) {
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD)
    } else if caught {
        Style::default().fg(Color::Green)
    } else {
        Style::default().fg(Color::DarkGray)
    };

    let title = if caught {
        format!("● {}", id)
    } else {
        id.to_string()
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(border_style);
    let inner = block.inner(area);
    f.render_widget(block, area);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    let width = inner.width as usize;
    let lines = match view {
        None => {
            let marker = match binder.slot_state(id) {
                SlotState::InFlight => "loading...",
                _ => "...",
            };
            vec![Line::from(Span::styled(
                marker,
                Style::default().fg(Color::DarkGray),
            ))]
        }
        Some(slot) if slot.unavailable => vec![Line::from(Span::styled(
            "N/A",
            Style::default().fg(Color::Red),
        ))],
        Some(slot) => {
            let types: Vec<Span> = slot
                .types
                .iter()
                .flat_map(|t| {
                    [
                        Span::styled(
                            truncate_text(t, width / 2),
                            Style::default().fg(type_color(t)),
                        ),
                        Span::raw(" "),
                    ]
                })
                .collect();
            vec![
                Line::from(Span::styled(
                    truncate_text(&slot.name, width),
                    Style::default()
                        .fg(Color::White)
                        .add_modifier(Modifier::BOLD),
                )),
                Line::from(types),
            ]
        }
    };

    f.render_widget(Paragraph::new(lines), inner);
}

fn draw_footer(f: &mut Frame, area: Rect, app: &App) {
    let key_style = Style::default().fg(Color::Yellow);
    let line = match app.mode {
        Mode::Search => {
            let mut spans = vec![
                Span::styled("Search: ", key_style),
                Span::raw(app.search_query.clone()),
                Span::styled("▏", Style::default().fg(Color::Cyan)),
            ];
            if let Some(error) = &app.search_error {
                spans.push(Span::styled(
                    format!("  {}", error),
                    Style::default().fg(Color::Red),
                ));
            }
            Line::from(spans)
        }
        Mode::Regenerate => Line::from(vec![
            Span::styled("Number of slots: ", key_style),
            Span::raw(app.slot_input.clone()),
            Span::styled("▏", Style::default().fg(Color::Cyan)),
            Span::raw("  Enter: generate  Esc: cancel"),
        ]),
        Mode::Share => Line::from(vec![
            Span::styled("Share: ", key_style),
            Span::raw(format!(
                "binder-tui --collection {}",
                app.share_token.as_deref().unwrap_or_default()
            )),
        ]),
        Mode::Detail(_) => Line::from(vec![
            Span::styled("Space", key_style),
            Span::raw(": catch/release  "),
            Span::styled("Esc", key_style),
            Span::raw(": close"),
        ]),
        Mode::Browse => {
            let mut spans = vec![
                Span::styled("←/→", key_style),
                Span::raw(": page  "),
                Span::styled("↑/↓", key_style),
                Span::raw(": card  "),
                Span::styled("/", key_style),
                Span::raw(": search  "),
                Span::styled("h", key_style),
                Span::raw(": home  "),
                Span::styled("q", key_style),
                Span::raw(": quit"),
            ];
            if let Some(status) = &app.status {
                spans.push(Span::styled(
                    format!("  {}", status),
                    Style::default().fg(Color::DarkGray),
                ));
            }
            Line::from(spans)
        }
    };

    let p = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(p, area);
}

fn draw_suggestions(f: &mut Frame, footer: Rect, app: &App) {
    let height = app.suggestions.len() as u16 + 2;
    let area = Rect::new(
        footer.x + 1,
        footer.y.saturating_sub(height),
        30.min(footer.width.saturating_sub(2)),
        height,
    );

    let items: Vec<ListItem> = app
        .suggestions
        .iter()
        .map(|name| ListItem::new(name.as_str()))
        .collect();
    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .highlight_style(
            Style::default()
                .fg(Color::Black)
                .bg(Color::Yellow),
        );

    let mut state = ListState::default();
    state.select(app.suggestion_index);
    f.render_widget(Clear, area);
    f.render_stateful_widget(list, area, &mut state);
}

fn draw_detail_card(f: &mut Frame, area: Rect, app: &mut App, id: u32) {
    let card = centered_rect(area, 70, 22);
    f.render_widget(Clear, card);

    let caught = app.collection.is_caught(id);
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("#{}", id))
        .border_style(Style::default().fg(if caught { Color::Green } else { Color::Cyan }));
    let inner = block.inner(card);
    f.render_widget(block, card);

    let detail = match &app.detail {
        Some(DetailView::Ready(detail)) => detail.clone(),
        Some(DetailView::Unavailable) => {
            let p = Paragraph::new("Details could not be loaded.")
                .alignment(Alignment::Center)
                .style(Style::default().fg(Color::Red));
            f.render_widget(p, inner);
            return;
        }
        _ => {
            let p = Paragraph::new("Loading...")
                .alignment(Alignment::Center)
                .style(Style::default().fg(Color::DarkGray));
            f.render_widget(p, inner);
            return;
        }
    };

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(26), Constraint::Min(20)])
        .split(inner);

    if let Some(state) = app.detail_image.as_mut() {
        let image_widget = StatefulImage::new().resize(Resize::Scale(None));
        f.render_stateful_widget(image_widget, columns[0], state);
    } else {
        let placeholder = Paragraph::new("no image")
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::DarkGray));
        f.render_widget(placeholder, columns[0]);
    }

    let mut lines = vec![
        Line::from(vec![
            Span::styled(
                detail.name.clone(),
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                if caught { "  ● caught" } else { "  ○ not caught" },
                Style::default().fg(if caught { Color::Green } else { Color::DarkGray }),
            ),
        ]),
        Line::from(
            detail
                .types
                .iter()
                .flat_map(|t| {
                    [
                        Span::styled(
                            format!(" {} ", t),
                            Style::default().fg(Color::Black).bg(type_color(t)),
                        ),
                        Span::raw(" "),
                    ]
                })
                .collect::<Vec<_>>(),
        ),
        Line::from(""),
    ];

    for stat in &detail.stats {
        let filled = (stat.value.min(STAT_BAR_MAX) * STAT_BAR_WIDTH / STAT_BAR_MAX) as usize;
        lines.push(Line::from(vec![
            Span::raw(format!("{:<16}", stat.name.replace("special-", "sp. "))),
            Span::styled("█".repeat(filled), Style::default().fg(Color::Cyan)),
            Span::styled(
                "░".repeat(STAT_BAR_WIDTH as usize - filled),
                Style::default().fg(Color::DarkGray),
            ),
            Span::raw(format!(" {:>3}", stat.value)),
        ]));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        format!(
            "Generation {} ({})",
            detail.generation_label, detail.generation_name
        ),
        Style::default().fg(Color::DarkGray),
    )));

    f.render_widget(Paragraph::new(lines), columns[1]);
}

fn centered_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

fn type_color(kind: &str) -> Color {
    match kind {
        "normal" => Color::Rgb(0xA8, 0xA8, 0x78),
        "fire" => Color::Rgb(0xF0, 0x80, 0x30),
        "water" => Color::Rgb(0x68, 0x90, 0xF0),
        "grass" => Color::Rgb(0x78, 0xC8, 0x50),
        "electric" => Color::Rgb(0xF8, 0xD0, 0x30),
        "ice" => Color::Rgb(0x98, 0xD8, 0xD8),
        "fighting" => Color::Rgb(0xC0, 0x30, 0x28),
        "poison" => Color::Rgb(0xA0, 0x40, 0xA0),
        "ground" => Color::Rgb(0xE0, 0xC0, 0x68),
        "flying" => Color::Rgb(0xA8, 0x90, 0xF0),
        "psychic" => Color::Rgb(0xF8, 0x58, 0x88),
        "bug" => Color::Rgb(0xA8, 0xB8, 0x20),
        "rock" => Color::Rgb(0xB8, 0xA0, 0x38),
        "ghost" => Color::Rgb(0x70, 0x58, 0x98),
        "dragon" => Color::Rgb(0x70, 0x38, 0xF8),
        "dark" => Color::Rgb(0x70, 0x58, 0x48),
        "steel" => Color::Rgb(0xB8, 0xB8, 0xD0),
        "fairy" => Color::Rgb(0xEE, 0x99, 0xAC),
        _ => Color::Gray,
    }
}

fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        format!(
            "{}...",
            text.chars()
                .take(max_len.saturating_sub(3))
                .collect::<String>()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::catalog::ItemSummary;

    #[test]
    fn test_slot_view_from_summary() {
        let loaded = SlotView::from(&Summary::Loaded(ItemSummary {
            id: 25,
            name: "pikachu".into(),
            types: vec!["electric".into()],
            image_url: Some("https://img/25.png".into()),
        }));
        assert!(!loaded.unavailable);
        assert_eq!(loaded.name, "pikachu");

        let missing = SlotView::from(&Summary::Unavailable { id: 3 });
        assert!(missing.unavailable);
        assert_eq!(missing.name, "N/A");
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("bulbasaur", 20), "bulbasaur");
        assert_eq!(truncate_text("crabominable", 8), "crabo...");
    }

    #[test]
    fn test_centered_rect_fits_small_areas() {
        let area = Rect::new(0, 0, 40, 10);
        assert_eq!(centered_rect(area, 70, 22), area);
        assert_eq!(centered_rect(Rect::new(0, 0, 100, 40), 70, 22), Rect::new(15, 9, 70, 22));
    }
}

mod backend;
mod config;
mod ui;

use backend::binder::{Binder, SearchError};
use backend::catalog::CatalogSource;
use backend::collection::Collection;
use backend::pokeapi::PokeApi;
use backend::scheduler::FetchEvent;
use backend::share;
use config::Config;
use ui::ui::{App, Mode, ui};

use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures::StreamExt;
use log::{info, warn};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::{error::Error, fs, io, sync::Arc, time::Duration};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let options = config::parse_args(std::env::args().skip(1))?;
    init_logging();

    let mut config = Config::load();
    if let Some(total_slots) = options.total_slots {
        config.total_slots = total_slots;
    }
    info!("starting with {:?}", config);

    let mut collection = Collection::load();
    if let Some(token) = options.collection_token {
        match share::decode(&token) {
            Ok(ids) => {
                info!("imported {} caught ids from share token", ids.len());
                collection.replace(ids);
            }
            Err(e) => warn!("ignoring share token: {}", e),
        }
    }

    let source: Arc<dyn CatalogSource> = Arc::new(PokeApi::new(&config.api_base_url)?);
    let (mut binder, mut events) = Binder::new(source, &config);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(collection);
    binder.generate(config.total_slots);
    app.sync_cursor(&binder);

    let res = run_app(
        &mut terminal,
        &mut app,
        &mut binder,
        &mut events,
        config.tick_interval(),
    )
    .await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("{err}");
    }
    Ok(())
}

/// The terminal owns stderr, so logs go to a file in the cache directory.
fn init_logging() {
    let log_dir = dirs::cache_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("binder-tui");
    fs::create_dir_all(&log_dir).ok();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Ok(file) = fs::File::create(log_dir.join("binder-tui.log")) {
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    binder: &mut Binder,
    events: &mut mpsc::UnboundedReceiver<FetchEvent>,
    tick_interval: Duration,
) -> io::Result<()> {
    let mut event_stream = EventStream::new();

    loop {
        terminal.draw(|f| ui(f, app, binder))?;

        tokio::select! {
            // Periodic tick in addition to the event-driven ones
            _ = tokio::time::sleep(tick_interval) => {
                binder.tick();
            }

            Some(Ok(event)) = event_stream.next() => {
                if let Event::Key(key) = event {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if handle_key(app, binder, key) {
                        return Ok(());
                    }
                }
            }

            Some(event) = events.recv() => {
                binder.handle_event(event, app);
            }
        }
    }
}

/// Returns `true` when the user asked to quit.
fn handle_key(app: &mut App, binder: &mut Binder, key: KeyEvent) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return true;
    }

    match app.mode {
        Mode::Browse => return handle_browse_input(app, binder, key.code),
        Mode::Search => handle_search_input(app, binder, key.code),
        Mode::Regenerate => handle_regenerate_input(app, binder, key.code),
        Mode::Share => {
            if matches!(key.code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char('s')) {
                app.mode = Mode::Browse;
            }
        }
        Mode::Detail(id) => handle_detail_input(app, id, key.code),
    }
    false
}

fn handle_browse_input(app: &mut App, binder: &mut Binder, key: KeyCode) -> bool {
    app.status = None;

    match key {
        KeyCode::Char('q') => return true,
        KeyCode::Left => {
            if binder.navigate(-1) {
                app.sync_cursor(binder);
            }
        }
        KeyCode::Right => {
            if binder.navigate(1) {
                app.sync_cursor(binder);
            }
        }
        KeyCode::Home | KeyCode::Char('h') => {
            if binder.navigate_home() {
                app.sync_cursor(binder);
            }
        }
        KeyCode::Up | KeyCode::BackTab => app.move_cursor(binder, -1),
        KeyCode::Down | KeyCode::Tab => app.move_cursor(binder, 1),
        KeyCode::Char(' ') => {
            if let Some(id) = app.cursor.filter(|id| app.is_loaded(*id)) {
                app.toggle_caught(id);
            }
        }
        KeyCode::Enter => {
            if let Some(id) = app.cursor.filter(|id| app.is_loaded(*id)) {
                app.open_detail(id);
                binder.request_detail(id, app);
            }
        }
        KeyCode::Char('/') => {
            app.mode = Mode::Search;
            app.search_error = None;
            app.update_suggestions(binder);
        }
        KeyCode::Char('n') => {
            app.mode = Mode::Regenerate;
            app.slot_input = binder.layout().total_slots().to_string();
        }
        KeyCode::Char('s') => {
            app.share_token = Some(share::encode(&app.collection.caught));
            app.mode = Mode::Share;
        }
        _ => {}
    }
    false
}

fn handle_search_input(app: &mut App, binder: &mut Binder, key: KeyCode) {
    match key {
        KeyCode::Char(c) => {
            app.search_query.push(c);
            app.search_error = None;
            app.update_suggestions(binder);
        }
        KeyCode::Backspace => {
            app.search_query.pop();
            app.search_error = None;
            app.update_suggestions(binder);
        }
        KeyCode::Down => app.cycle_suggestion(1),
        KeyCode::Up => app.cycle_suggestion(-1),
        KeyCode::Tab => {
            if let Some(name) = app.selected_suggestion().map(str::to_string) {
                app.search_query = name;
                app.update_suggestions(binder);
            }
        }
        KeyCode::Enter => {
            if let Some(name) = app.selected_suggestion().map(str::to_string) {
                app.search_query = name;
            }
            app.suggestions.clear();
            app.suggestion_index = None;

            match binder.search_for_slot(&app.search_query) {
                Ok(slot) => {
                    app.cursor = Some(slot);
                    app.search_error = None;
                    app.mode = Mode::Browse;
                }
                Err(SearchError::EmptyQuery) => app.mode = Mode::Browse,
                Err(e) => app.search_error = Some(e.to_string()),
            }
        }
        KeyCode::Esc => {
            app.suggestions.clear();
            app.search_error = None;
            app.mode = Mode::Browse;
        }
        _ => {}
    }
}

fn handle_regenerate_input(app: &mut App, binder: &mut Binder, key: KeyCode) {
    match key {
        KeyCode::Char(c) if c.is_ascii_digit() => app.slot_input.push(c),
        KeyCode::Backspace => {
            app.slot_input.pop();
        }
        KeyCode::Enter => match app.slot_input.parse::<u32>() {
            Ok(total_slots) => {
                app.reset_binder();
                binder.generate(total_slots);
                app.sync_cursor(binder);
            }
            Err(_) => {
                app.mode = Mode::Browse;
                app.status = Some(format!("not a slot count: {:?}", app.slot_input));
            }
        },
        KeyCode::Esc => app.mode = Mode::Browse,
        _ => {}
    }
}

fn handle_detail_input(app: &mut App, id: u32, key: KeyCode) {
    match key {
        KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') => app.close_detail(),
        KeyCode::Char(' ') => app.toggle_caught(id),
        _ => {}
    }
}

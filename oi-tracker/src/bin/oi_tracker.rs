/// OI Tracker
///
/// Tracks up to four futures symbols and shows price, open interest and the
/// OI / circulating supply ratio with a leverage signal, refreshed on a countdown.
///
/// Configuration comes from `OI_*` environment variables; logs go to a file since
/// the terminal is taken by the UI.
use std::{
    io,
    sync::Arc,
    time::{Duration, Instant},
};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use oi_tracker::{
    init_logging, render_tracker, Engine, EngineHandle, Focus, HttpMarketApi, SearchAction,
    SearchBox, SessionEvent, SessionSnapshot, TrackedStore, TrackerConfig, TrackerError,
    ViewState,
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::info;

/// Redraw cadence; also bounds key handling latency
const FRAME_INTERVAL: Duration = Duration::from_millis(100);

type Tui = Terminal<CrosstermBackend<io::Stdout>>;

#[tokio::main]
async fn main() -> Result<(), TrackerError> {
    let config = TrackerConfig::from_env();
    init_logging(config.log_file.as_deref());
    info!("Starting oi-tracker against {}", config.api_url);

    let api = HttpMarketApi::new(&config.api_url, config.request_timeout)?;
    let store = TrackedStore::file(&config.state_dir, &config.state_key);

    // Setup panic hook to restore terminal on crash
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic_info);
    }));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, api, store, &config).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    info!("oi-tracker stopped");
    result
}

/// Bootstrap the engine behind a loading screen, then hand over to the key loop
async fn run_app(
    terminal: &mut Tui,
    api: HttpMarketApi,
    store: TrackedStore,
    config: &TrackerConfig,
) -> Result<(), TrackerError> {
    let bootstrap_config = config.clone();
    let bootstrap = tokio::spawn(async move {
        Engine::bootstrap(Arc::new(api), store, &bootstrap_config).await
    });

    let Some((mut engine, handle)) = wait_for_engine(terminal, bootstrap, config).await? else {
        info!("Quit before start-up finished");
        return Ok(());
    };
    let mut events = engine.subscribe();
    let engine_task = tokio::spawn(engine.run());

    let result = run_ui(terminal, &handle, &mut events, config.search_limit);

    handle.shutdown();
    engine_task.await?;
    result
}

/// Draw the loading screen until bootstrap finishes. None if the user quit first.
async fn wait_for_engine(
    terminal: &mut Tui,
    bootstrap: JoinHandle<(Engine, EngineHandle)>,
    config: &TrackerConfig,
) -> Result<Option<(Engine, EngineHandle)>, TrackerError> {
    let snapshot = SessionSnapshot::starting(config.max_cards, config.refresh_secs);
    let search = SearchBox::new(config.search_limit);
    let view = ViewState::new();

    loop {
        if bootstrap.is_finished() {
            return Ok(Some(bootstrap.await?));
        }

        terminal.draw(|f| render_tracker(f, &snapshot, &search, &view, Instant::now()))?;

        while event::poll(Duration::ZERO)? {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }
            let ctrl_c =
                key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL);
            if ctrl_c || matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                bootstrap.abort();
                return Ok(None);
            }
        }

        tokio::time::sleep(FRAME_INTERVAL).await;
    }
}

fn run_ui(
    terminal: &mut Tui,
    handle: &EngineHandle,
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    search_limit: usize,
) -> Result<(), TrackerError> {
    let mut search = SearchBox::new(search_limit);
    let mut view = ViewState::new();

    loop {
        let now = Instant::now();
        let mut pending = Vec::new();
        while let Ok(event) = events.try_recv() {
            pending.push(event);
        }
        let snapshot = handle.snapshot();
        for event in &pending {
            view.observe(event, &snapshot, now);
        }
        view.prune(now);

        terminal.draw(|f| render_tracker(f, &snapshot, &search, &view, now))?;

        if !event::poll(FRAME_INTERVAL)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            break;
        }

        let quit = match view.focus {
            Focus::Search => handle_search_key(key, &mut search, &mut view, handle),
            Focus::Cards => handle_card_key(key, &mut search, &mut view, handle),
        };
        if quit {
            break;
        }
    }

    Ok(())
}

/// Returns true to quit
fn handle_search_key(
    key: KeyEvent,
    search: &mut SearchBox,
    view: &mut ViewState,
    handle: &EngineHandle,
) -> bool {
    match key.code {
        KeyCode::Esc if search.is_open() => search.close(),
        KeyCode::Esc => return true,
        KeyCode::Tab => {
            search.close();
            view.toggle_focus();
        }
        KeyCode::Down => search.move_down(),
        KeyCode::Up => search.move_up(),
        KeyCode::Enter => {
            if let SearchAction::Add(entry) = search.enter(&handle.snapshot()) {
                handle.add(entry);
            }
        }
        KeyCode::Backspace => search.backspace(handle.catalog()),
        KeyCode::Char(c) if !c.is_control() => search.push_char(c, handle.catalog()),
        _ => {}
    }
    false
}

/// Returns true to quit
fn handle_card_key(
    key: KeyEvent,
    search: &mut SearchBox,
    view: &mut ViewState,
    handle: &EngineHandle,
) -> bool {
    let snapshot = handle.snapshot();
    let selected = snapshot
        .cards
        .get(view.selected_card)
        .map(|card| card.entry.symbol.clone());

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return true,
        KeyCode::Tab => {
            search.close();
            view.toggle_focus();
        }
        KeyCode::Left => view.select_prev(),
        KeyCode::Right => view.select_next(snapshot.cards.len()),
        KeyCode::Char('r') => {
            if let Some(symbol) = selected {
                handle.refresh(symbol);
            }
        }
        KeyCode::Char('d') | KeyCode::Delete => {
            if let Some(symbol) = selected {
                handle.remove(symbol);
            }
        }
        _ => {}
    }
    false
}

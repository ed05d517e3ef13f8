mod app;
mod input;
mod ui;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc;
use tracing::info;

use tideline::cli::Args;
use tideline::config::Config;
use tideline::fetch::PageResponse;
use tideline::fetch::http::HttpHistory;
use tideline::live::{LiveEvent, LiveTailChannel, Subscriptions};
use tideline::logging::setup_logger;
use tideline::stream::{LogStream, StreamKey};
use tideline::theme::Theme;

use app::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("failed to load config")?;
    args.apply(&mut config);

    let _log_guard = setup_logger(args.verbose, &config.log_path())?;
    info!(source = %args.source_id, server = %config.server, "starting tide");

    let history = HttpHistory::new(&config.server, config.request_timeout())
        .context("invalid history service url")?;
    let (page_tx, mut page_rx) = mpsc::unbounded_channel();

    let mut key = StreamKey::new(args.source_id.clone()).with_instances(args.instances.clone());
    if let Some(search) = &args.search {
        key = key.with_search(search.clone());
    }
    let mut stream = LogStream::new(Arc::new(history), page_tx, key, config.stream_settings());
    stream.start();

    let (live, mut live_rx) = LiveTailChannel::open(
        config.live_config(&args.source_id),
        Subscriptions::from_included(args.instances.clone()),
    );

    let mut state = AppState::new(stream, live, Theme::by_name(&config.theme));

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Setup panic hook to restore terminal on panic
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), DisableMouseCapture, LeaveAlternateScreen);
        original_hook(panic);
    }));

    let result = run_event_loop(&mut terminal, &mut state, &mut page_rx, &mut live_rx).await;

    state.shutdown();

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), DisableMouseCapture, LeaveAlternateScreen)?;

    info!("tide exited");
    result
}

async fn run_event_loop<'a>(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    state: &mut AppState<'a>,
    page_rx: &mut mpsc::UnboundedReceiver<PageResponse>,
    live_rx: &mut mpsc::Receiver<LiveEvent>,
) -> Result<()> {
    loop {
        // Page towards whichever edge the view reached
        state.tick();

        terminal.draw(|frame| {
            ui::draw(frame, state);
        })?;

        let page_size = state.page_size();

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(16)) => {
                if event::poll(Duration::ZERO)? {
                    match event::read()? {
                        Event::Key(key) => {
                            // Only handle key press events (not release)
                            if key.kind == KeyEventKind::Press {
                                input::handle_key(state, key, page_size);
                            }
                        }
                        Event::Mouse(mouse) => {
                            input::handle_mouse(state, mouse);
                        }
                        _ => {}
                    }
                }
            }

            Some(response) = page_rx.recv() => {
                state.on_page(response);
            }

            Some(event) = live_rx.recv() => {
                state.on_live_event(event);
            }
        }

        if state.should_quit {
            break;
        }
    }

    Ok(())
}

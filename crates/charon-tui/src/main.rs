mod app;
mod handler;
mod page;
mod tui;
mod ui;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use charon_core::{Config, ExchangeEvent, JsonFileStore, RagClient, SearchEvent, TranscriptStore, UiSignal};
use tokio::sync::broadcast::error::RecvError;

use app::App;
use page::Page;
use tui::AppEvent;

const LOG_FILE: &str = "charon.log";

/// One turn of the event loop
enum Step {
    Terminal(AppEvent),
    Chat(ExchangeEvent),
    Search(SearchEvent),
    Signal(Result<UiSignal, RecvError>),
}

/// Log to a file; stderr belongs to the terminal UI.
fn init_file_logging(data_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(data_dir)?;
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(data_dir.join(LOG_FILE))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(log_file))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let data_dir = Config::data_dir()?;
    init_file_logging(&data_dir)?;

    let config = Config::load_or_init().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "using default config");
        Config::new()
    });
    let settings = config.settings();
    tracing::info!(api_url = %settings.api_url, streaming = settings.streaming, "starting charon");

    let backend = Arc::new(RagClient::from_settings(&settings)?);
    let store = TranscriptStore::new(JsonFileStore::new(&data_dir));
    let page = Page::load_or_default(Config::config_dir().ok().as_deref());

    let mut app = App::new(&settings, backend, store, page);
    let mut signals = app.bus.subscribe();

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();

    let result = async {
        loop {
            terminal.draw(|frame| ui::render(&mut app, frame))?;

            let step = tokio::select! {
                Some(event) = events.next() => Step::Terminal(event),
                Some(event) = app.chat.next_event() => Step::Chat(event),
                Some(event) = app.search.next_event() => Step::Search(event),
                signal = signals.recv() => Step::Signal(signal),
                else => break,
            };

            match step {
                Step::Terminal(event) => handler::handle_event(&mut app, event),
                Step::Chat(event) => app.chat.apply(event),
                Step::Search(event) => app.search.apply(event),
                Step::Signal(Ok(signal)) => handler::handle_signal(&mut app, signal),
                Step::Signal(Err(RecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "ui signals dropped");
                }
                Step::Signal(Err(RecvError::Closed)) => break,
            }

            if app.should_quit {
                break;
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    tui::restore()?;
    result
}

use std::process::{Child, ExitStatus};
use std::thread;
use std::time::Instant;

use charon_core::bus::anchor_from_href;
use charon_core::citation::reveal_anchor;
use charon_core::{AnchorSurface, UiSignal};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::{debug, warn};

use crate::app::{App, InputMode};
use crate::tui::AppEvent;

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize => {}
        AppEvent::Tick => app.tick(Instant::now()),
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    // Global keys that work in any mode
    if ctrl && key.code == KeyCode::Char('c') {
        app.should_quit = true;
        return;
    }
    if ctrl && key.code == KeyCode::Char('k') {
        app.bus.publish(UiSignal::TogglePalette);
        return;
    }

    if app.show_palette {
        handle_palette(app, key);
    } else if app.show_chat {
        handle_chat(app, key, ctrl);
    } else {
        handle_page(app, key);
    }
}

fn handle_page(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('c') => app.bus.publish(UiSignal::ToggleChat),
        KeyCode::Char('/') => app.bus.publish(UiSignal::OpenPalette),
        KeyCode::Char('j') | KeyCode::Down => app.page.scroll_down(),
        KeyCode::Char('k') | KeyCode::Up => app.page.scroll_up(),
        KeyCode::Esc => app.status = None,
        _ => {}
    }
}

fn handle_palette(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.bus.publish(UiSignal::ClosePalette),
        KeyCode::Down | KeyCode::Tab => app.search.next(),
        KeyCode::Up | KeyCode::BackTab => app.search.prev(),
        KeyCode::Enter => {
            if app.search.activate(&app.bus).is_none() {
                debug!("nothing selected in palette");
            }
        }
        KeyCode::Backspace => app.search.pop_char(),
        KeyCode::Char(c) => app.search.push_char(c),
        _ => {}
    }
}

fn handle_chat(app: &mut App, key: KeyEvent, ctrl: bool) {
    if ctrl {
        match key.code {
            KeyCode::Char('l') => app.clear_chat(),
            KeyCode::Char('x') => {
                if app.chat.cancel() {
                    app.status = Some("Response cancelled".to_string());
                }
            }
            _ => {}
        }
        return;
    }

    match app.input_mode {
        InputMode::Editing => match key.code {
            KeyCode::Esc => app.input_mode = InputMode::Normal,
            KeyCode::Enter => app.submit_chat(),
            KeyCode::Backspace => {
                app.chat_input.pop();
            }
            KeyCode::Char(c) => app.chat_input.push(c),
            _ => {}
        },
        InputMode::Normal => match key.code {
            KeyCode::Esc | KeyCode::Char('c') => app.bus.publish(UiSignal::CloseChat),
            KeyCode::Char('q') => app.should_quit = true,
            KeyCode::Char('i') => app.input_mode = InputMode::Editing,
            KeyCode::Char('j') | KeyCode::Down => app.references_nav_down(),
            KeyCode::Char('k') | KeyCode::Up => app.references_nav_up(),
            KeyCode::Enter => {
                app.follow_selected_reference();
            }
            KeyCode::Char('+') => app.rate_last_answer(5),
            KeyCode::Char('-') => app.rate_last_answer(1),
            KeyCode::PageUp => app.chat_scroll = app.chat_scroll.saturating_sub(5),
            KeyCode::PageDown => app.chat_scroll = app.chat_scroll.saturating_add(5),
            _ => {}
        },
    }
}

/// Apply a signal published on the bus.
pub fn handle_signal(app: &mut App, signal: UiSignal) {
    debug!(?signal, "ui signal");
    match signal {
        UiSignal::OpenChat => app.open_chat(),
        UiSignal::CloseChat => app.close_chat(),
        UiSignal::ToggleChat => app.toggle_chat(),
        UiSignal::OpenPalette => app.open_palette(),
        UiSignal::ClosePalette => app.close_palette(),
        UiSignal::TogglePalette => app.toggle_palette(),
        UiSignal::Navigate(href) => {
            let anchor = anchor_from_href(&href);
            if app.page.has_anchor(anchor) {
                app.page.scroll_to(anchor);
            } else {
                debug!(href = %href, "navigation target not on page");
            }
        }
        UiSignal::RevealAnchor { anchor, highlight_for } => {
            reveal_anchor(&mut app.page, &anchor, highlight_for, Instant::now());
        }
        UiSignal::OpenExternal(url) => {
            app.status = Some(if open_external(&url) {
                format!("Opened {url}")
            } else {
                url
            });
        }
        UiSignal::CopyToClipboard(text) => {
            app.status = Some(if copy_to_clipboard(&text) {
                format!("Copied {text}")
            } else {
                text
            });
        }
    }
}

fn open_external(url: &str) -> bool {
    let opener = if cfg!(target_os = "macos") { "open" } else { "xdg-open" };
    match std::process::Command::new(opener)
        .arg(url)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
    {
        Ok(child) => {
            reap(child);
            true
        }
        Err(e) => {
            warn!(error = %e, opener, "could not open url");
            false
        }
    }
}

fn copy_to_clipboard(text: &str) -> bool {
    use std::io::Write;
    use std::process::{Command, Stdio};

    let mut command = if cfg!(target_os = "macos") {
        Command::new("pbcopy")
    } else {
        let mut xclip = Command::new("xclip");
        xclip.args(["-selection", "clipboard"]);
        xclip
    };

    match command.stdin(Stdio::piped()).spawn() {
        Ok(mut child) => {
            if let Some(mut stdin) = child.stdin.take() {
                if let Err(e) = stdin.write_all(text.as_bytes()) {
                    warn!(error = %e, "clipboard write failed");
                }
            }
            reap(child);
            true
        }
        Err(e) => {
            warn!(error = %e, "clipboard unavailable");
            false
        }
    }
}

/// Wait for a helper process off the UI task so it does not linger as a
/// zombie.
fn reap(mut child: Child) -> thread::JoinHandle<Option<ExitStatus>> {
    thread::spawn(move || match child.wait() {
        Ok(status) => Some(status),
        Err(e) => {
            debug!(error = %e, "helper process wait failed");
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use charon_core::api::{ChatReply, ChatRequest, ChatStream, Feedback};
    use charon_core::{ApiError, MemoryStore, RagBackend, SearchResult, Settings, TranscriptStore};

    use crate::page::Page;

    struct OfflineBackend;

    #[async_trait]
    impl RagBackend for OfflineBackend {
        async fn chat(&self, _request: &ChatRequest) -> Result<ChatReply, ApiError> {
            Err(ApiError::Status {
                endpoint: "/chat".to_string(),
                status: 503,
            })
        }

        async fn chat_stream(&self, _request: &ChatRequest) -> Result<ChatStream, ApiError> {
            Err(ApiError::Status {
                endpoint: "/chat/stream".to_string(),
                status: 503,
            })
        }

        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<SearchResult>, ApiError> {
            Ok(Vec::new())
        }

        async fn feedback(&self, _feedback: &Feedback) -> Result<(), ApiError> {
            Ok(())
        }

        async fn end_session(&self, _session_id: &str) -> Result<(), ApiError> {
            Ok(())
        }
    }

    fn app() -> App {
        App::new(
            &Settings::default(),
            Arc::new(OfflineBackend),
            TranscriptStore::new(MemoryStore::new()),
            Page::new(Page::default_sections()),
        )
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    /// Deliver everything published on the bus so far.
    fn pump(app: &mut App, rx: &mut tokio::sync::broadcast::Receiver<UiSignal>) {
        while let Ok(signal) = rx.try_recv() {
            handle_signal(app, signal);
        }
    }

    #[tokio::test]
    async fn test_c_opens_chat_in_editing_mode() {
        let mut app = app();
        let mut rx = app.bus.subscribe();

        handle_key(&mut app, key(KeyCode::Char('c')));
        pump(&mut app, &mut rx);
        assert!(app.show_chat);
        assert_eq!(app.input_mode, InputMode::Editing);

        // typing 'c' while editing goes to the input
        handle_key(&mut app, key(KeyCode::Char('c')));
        assert_eq!(app.chat_input, "c");

        handle_key(&mut app, key(KeyCode::Esc));
        handle_key(&mut app, key(KeyCode::Esc));
        pump(&mut app, &mut rx);
        assert!(!app.show_chat);
    }

    #[tokio::test]
    async fn test_ctrl_k_toggles_palette_and_esc_resets_it() {
        let mut app = app();
        let mut rx = app.bus.subscribe();

        handle_key(&mut app, ctrl('k'));
        pump(&mut app, &mut rx);
        assert!(app.show_palette);

        handle_key(&mut app, key(KeyCode::Char('g')));
        assert_eq!(app.search.query(), "g");

        handle_key(&mut app, key(KeyCode::Esc));
        pump(&mut app, &mut rx);
        assert!(!app.show_palette);
        assert_eq!(app.search.query(), "");
    }

    #[tokio::test]
    async fn test_palette_enter_navigates_page() {
        let mut app = app();
        let mut rx = app.bus.subscribe();
        app.open_palette();

        // "Go to Tech Stack"
        handle_key(&mut app, key(KeyCode::Down));
        handle_key(&mut app, key(KeyCode::Down));
        handle_key(&mut app, key(KeyCode::Enter));
        pump(&mut app, &mut rx);

        assert!(!app.show_palette);
        assert_eq!(app.page.sections()[app.page.scroll()].anchor, "stack");
    }

    #[tokio::test]
    async fn test_reveal_signal_scrolls_and_highlights() {
        let mut app = app();
        app.open_chat();

        handle_signal(&mut app, UiSignal::CloseChat);
        handle_signal(
            &mut app,
            UiSignal::RevealAnchor {
                anchor: "project_charon".to_string(),
                highlight_for: std::time::Duration::from_secs(2),
            },
        );

        assert!(!app.show_chat);
        assert_eq!(app.page.sections()[app.page.scroll()].anchor, "project_charon");
        assert!(app.page.is_highlighted("project_charon", Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_exchange_shows_fallback() {
        let mut app = app();
        app.open_chat();
        for c in "hello".chars() {
            handle_key(&mut app, key(KeyCode::Char(c)));
        }
        handle_key(&mut app, key(KeyCode::Enter));
        assert!(app.chat_input.is_empty());
        assert!(app.chat.is_loading());

        app.chat.settle().await;
        let last = app.chat.messages().last().unwrap();
        assert!(last.failed);
        assert_eq!(last.content, charon_core::chat::FALLBACK_TEXT);
    }

    #[cfg(unix)]
    #[test]
    fn test_helper_processes_are_waited_on() {
        let child = std::process::Command::new("sh").args(["-c", "exit 3"]).spawn().unwrap();
        let status = reap(child).join().unwrap().unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[tokio::test]
    async fn test_q_quits_from_page() {
        let mut app = app();
        handle_key(&mut app, key(KeyCode::Char('q')));
        assert!(app.should_quit);
    }
}

//! Cross-component signals
//!
//! Anything that wants to open the chat, close the palette or move the page
//! publishes a `UiSignal` here instead of reaching into another component.

use std::time::Duration;

use tokio::sync::broadcast;
use tracing::trace;

const BUS_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiSignal {
    OpenChat,
    CloseChat,
    ToggleChat,
    OpenPalette,
    ClosePalette,
    TogglePalette,
    /// Jump to a page section by anchor id or `/#anchor` href.
    Navigate(String),
    /// Scroll an anchor into view and highlight it for `highlight_for`.
    RevealAnchor { anchor: String, highlight_for: Duration },
    OpenExternal(String),
    CopyToClipboard(String),
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<UiSignal>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Publishing with nobody listening is not an error.
    pub fn publish(&self, signal: UiSignal) {
        trace!(?signal, "publish");
        let _ = self.tx.send(signal);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiSignal> {
        self.tx.subscribe()
    }
}

/// Map an `/#section` style href onto the anchor id it points at.
pub fn anchor_from_href(href: &str) -> &str {
    match href.rfind('#') {
        Some(pos) => &href[pos + 1..],
        None => href.trim_start_matches('/'),
    }
}

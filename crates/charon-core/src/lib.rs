pub mod api;
pub mod bus;
pub mod chat;
pub mod citation;
pub mod commands;
pub mod config;
pub mod navigator;
pub mod persistence;
pub mod reveal;
pub mod search;
pub mod state;
pub mod stream;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use api::{ApiError, RagBackend, RagClient};
pub use bus::{EventBus, UiSignal};
pub use chat::{ChatSession, ExchangeEvent, Transport};
pub use citation::{AnchorSurface, CitationResolver, Highlight};
pub use commands::{Command, CommandAction, CommandCategory};
pub use config::{Config, Settings};
pub use navigator::{KeyboardNavigator, Selection};
pub use persistence::{JsonFileStore, KeyValueStore, MemoryStore, TranscriptStore};
pub use search::{SearchController, SearchEvent};
pub use state::{ChatRole, Citation, Message, SearchResult};

use std::sync::Arc;
use std::time::Instant;

use charon_core::citation::referenced_anchors;
use charon_core::commands::static_commands;
use charon_core::{ChatRole, ChatSession, EventBus, RagBackend, SearchController, Settings, TranscriptStore};
use ratatui::widgets::ListState;

use crate::page::Page;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub show_chat: bool,
    pub show_palette: bool,

    pub page: Page,
    pub chat: ChatSession,
    pub search: SearchController,
    pub bus: EventBus,

    // Chat overlay
    pub chat_input: String,
    pub chat_scroll: u16,
    pub references_state: ListState,

    // Palette overlay
    pub palette_state: ListState,

    /// One-line feedback shown in the footer (copied, opened, rated...)
    pub status: Option<String>,

    // Animation state
    pub animation_frame: u8,
}

impl App {
    pub fn new(settings: &Settings, backend: Arc<dyn RagBackend>, store: TranscriptStore, page: Page) -> Self {
        let chat = ChatSession::new(Arc::clone(&backend), store, settings);
        let search = SearchController::new(backend, static_commands(&settings.api_url), settings);

        Self {
            should_quit: false,
            input_mode: InputMode::Normal,
            show_chat: false,
            show_palette: false,

            page,
            chat,
            search,
            bus: EventBus::new(),

            chat_input: String::new(),
            chat_scroll: 0,
            references_state: ListState::default(),

            palette_state: ListState::default(),

            status: None,

            animation_frame: 0,
        }
    }

    pub fn open_chat(&mut self) {
        self.show_chat = true;
        self.input_mode = InputMode::Editing;
    }

    /// Hides the overlay only; an answer in flight keeps arriving.
    pub fn close_chat(&mut self) {
        self.show_chat = false;
        self.input_mode = InputMode::Normal;
    }

    pub fn toggle_chat(&mut self) {
        if self.show_chat {
            self.close_chat();
        } else {
            self.open_chat();
        }
    }

    pub fn open_palette(&mut self) {
        self.show_palette = true;
    }

    pub fn close_palette(&mut self) {
        self.show_palette = false;
        self.search.reset();
    }

    pub fn toggle_palette(&mut self) {
        if self.show_palette {
            self.close_palette();
        } else {
            self.open_palette();
        }
    }

    pub fn submit_chat(&mut self) {
        if self.chat.submit(&self.chat_input) {
            self.chat_input.clear();
            self.references_state.select(None);
            self.chat_scroll = u16::MAX;
        }
    }

    /// Markers in the most recent answer that has any, as (anchor, label)
    pub fn references(&self) -> Vec<(String, String)> {
        self.chat
            .messages()
            .iter()
            .rev()
            .filter(|m| m.role == ChatRole::Assistant)
            .map(|m| referenced_anchors(&m.content))
            .find(|refs| !refs.is_empty())
            .unwrap_or_default()
    }

    pub fn references_nav_down(&mut self) {
        let len = self.references().len();
        if len == 0 {
            return;
        }
        let next = self.references_state.selected().map(|i| (i + 1) % len).unwrap_or(0);
        self.references_state.select(Some(next));
    }

    pub fn references_nav_up(&mut self) {
        let len = self.references().len();
        if len == 0 {
            return;
        }
        let prev = self
            .references_state
            .selected()
            .map(|i| (i + len - 1) % len)
            .unwrap_or(len - 1);
        self.references_state.select(Some(prev));
    }

    /// Resolve the selected reference against the page.
    pub fn follow_selected_reference(&mut self) -> bool {
        let Some(index) = self.references_state.selected() else {
            return false;
        };
        let Some((anchor, label)) = self.references().into_iter().nth(index) else {
            return false;
        };
        let resolved = self.chat.resolve_citation(&anchor, &self.page, &self.bus);
        if !resolved {
            self.status = Some(format!("\"{label}\" is not on this page"));
        }
        resolved
    }

    pub fn rate_last_answer(&mut self, rating: u8) {
        let Some(id) = self.chat.last_answer_id().map(str::to_string) else {
            return;
        };
        if self.chat.rate(&id, rating, None) {
            self.status = Some(if rating >= 4 { "Thanks for the feedback" } else { "Noted, thanks" }.to_string());
        }
    }

    pub fn clear_chat(&mut self) {
        self.chat.clear();
        self.references_state.select(None);
        self.chat_scroll = 0;
        self.status = Some("Chat cleared".to_string());
    }

    pub fn tick(&mut self, now: Instant) {
        self.animation_frame = (self.animation_frame + 1) % 3;
        self.page.expire_highlight(now);
    }
}

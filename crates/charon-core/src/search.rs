//! Command palette state: static commands merged with debounced remote search
//!
//! Like the chat session, the controller is owned by one task. Debounce
//! timers and search requests run as spawned tasks and report back through
//! an mpsc channel. Timers can be aborted; requests are never aborted, their
//! late results are dropped by generation instead.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::{ApiError, RagBackend};
use crate::bus::{EventBus, UiSignal};
use crate::commands::{command_from_result, filter_commands, group_by_category, Command, CommandAction, CommandCategory};
use crate::config::Settings;
use crate::navigator::KeyboardNavigator;
use crate::state::SearchResult;

#[derive(Debug)]
pub enum SearchEvent {
    /// The debounce timer numbered `ticket` ran out.
    DebounceElapsed { ticket: u64 },
    Completed {
        generation: u64,
        query: String,
        outcome: Result<Vec<SearchResult>, ApiError>,
    },
}

pub struct SearchController {
    query: String,
    results: Vec<SearchResult>,
    result_commands: Vec<Command>,
    searching: bool,
    generation: u64,
    ticket: u64,
    debounce_task: Option<JoinHandle<()>>,
    commands: Vec<Command>,
    navigator: KeyboardNavigator,
    backend: Arc<dyn RagBackend>,
    debounce: Duration,
    min_chars: usize,
    limit: usize,
    tx: mpsc::UnboundedSender<SearchEvent>,
    rx: mpsc::UnboundedReceiver<SearchEvent>,
}

impl SearchController {
    pub fn new(backend: Arc<dyn RagBackend>, commands: Vec<Command>, settings: &Settings) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let navigator = KeyboardNavigator::new(commands.len());
        Self {
            query: String::new(),
            results: Vec::new(),
            result_commands: Vec::new(),
            searching: false,
            generation: 0,
            ticket: 0,
            debounce_task: None,
            commands,
            navigator,
            backend,
            debounce: settings.search_debounce,
            min_chars: settings.search_min_chars,
            limit: settings.search_limit,
            tx,
            rx,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn results(&self) -> &[SearchResult] {
        &self.results
    }

    pub fn is_searching(&self) -> bool {
        self.searching
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn navigator(&self) -> &KeyboardNavigator {
        &self.navigator
    }

    fn meets_threshold(&self) -> bool {
        self.query.trim().chars().count() >= self.min_chars
    }

    /// Replace the query and restart the debounce timer.
    ///
    /// Any search still in flight is stale from here on. Queries under the
    /// minimum length clear results right away and never reach the backend.
    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        if let Some(task) = self.debounce_task.take() {
            task.abort();
        }
        self.ticket += 1;
        self.generation += 1;
        self.searching = false;

        if self.meets_threshold() {
            let ticket = self.ticket;
            let delay = self.debounce;
            let tx = self.tx.clone();
            self.debounce_task = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(SearchEvent::DebounceElapsed { ticket });
            }));
        } else {
            self.set_results(Vec::new());
        }
        self.reset_selection();
    }

    pub fn push_char(&mut self, ch: char) {
        let mut query = std::mem::take(&mut self.query);
        query.push(ch);
        self.set_query(query);
    }

    pub fn pop_char(&mut self) {
        let mut query = std::mem::take(&mut self.query);
        query.pop();
        self.set_query(query);
    }

    pub async fn next_event(&mut self) -> Option<SearchEvent> {
        self.rx.recv().await
    }

    pub fn apply(&mut self, event: SearchEvent) {
        match event {
            SearchEvent::DebounceElapsed { ticket } if ticket == self.ticket => {
                self.debounce_task = None;
                if self.meets_threshold() {
                    self.fire();
                }
            }
            SearchEvent::DebounceElapsed { ticket } => {
                debug!(ticket, current = self.ticket, "ignoring superseded debounce");
            }
            SearchEvent::Completed { generation, query, .. }
                if generation != self.generation || query != self.query.trim() =>
            {
                debug!(generation, current = self.generation, query = %query, "dropping stale search results");
            }
            SearchEvent::Completed { query, outcome, .. } => {
                self.searching = false;
                match outcome {
                    Ok(results) => {
                        debug!(query = %query, count = results.len(), "search results");
                        self.set_results(results);
                    }
                    Err(e) => {
                        warn!(error = %e, query = %query, "search failed");
                        self.set_results(Vec::new());
                    }
                }
                self.reset_selection();
            }
        }
    }

    fn fire(&mut self) {
        self.generation += 1;
        self.searching = true;
        let generation = self.generation;
        let query = self.query.trim().to_string();
        let limit = self.limit;
        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();

        debug!(generation, query = %query, "search request");
        tokio::spawn(async move {
            let outcome = backend.search(&query, limit).await;
            let _ = tx.send(SearchEvent::Completed {
                generation,
                query,
                outcome,
            });
        });
    }

    fn set_results(&mut self, results: Vec<SearchResult>) {
        self.result_commands = results.iter().map(command_from_result).collect();
        self.results = results;
    }

    /// Commands currently shown, in display order
    pub fn visible(&self) -> Vec<&Command> {
        self.grouped().into_iter().flat_map(|(_, members)| members).collect()
    }

    /// Visible commands grouped by category for display
    pub fn grouped(&self) -> Vec<(CommandCategory, Vec<&Command>)> {
        let statics = filter_commands(&self.commands, &self.query);
        let merged: Vec<&Command> = if self.meets_threshold() {
            self.result_commands.iter().chain(statics).collect()
        } else {
            statics
        };
        group_by_category(&merged)
    }

    pub fn selected(&self) -> Option<&Command> {
        let index = self.navigator.selected()?;
        self.visible().get(index).copied()
    }

    pub fn next(&mut self) {
        self.navigator.next();
    }

    pub fn prev(&mut self) {
        self.navigator.prev();
    }

    pub fn select(&mut self, index: usize) {
        self.navigator.select(index);
    }

    /// Run the selected command, then close and reset the palette.
    pub fn activate(&mut self, bus: &EventBus) -> Option<CommandAction> {
        let action = self.selected()?.action.clone();
        action.perform(bus);
        bus.publish(UiSignal::ClosePalette);
        self.reset();
        Some(action)
    }

    /// Back to an empty query. Searches still in flight are ignored when they
    /// land.
    pub fn reset(&mut self) {
        if let Some(task) = self.debounce_task.take() {
            task.abort();
        }
        self.ticket += 1;
        self.generation += 1;
        self.query.clear();
        self.searching = false;
        self.set_results(Vec::new());
        self.reset_selection();
    }

    fn reset_selection(&mut self) {
        let len = self.visible().len();
        self.navigator.reset(len);
    }
}

//! The chat session: one transcript, at most one exchange in flight
//!
//! `ChatSession` is owned by a single task. Network calls and reveal delays
//! run in a spawned exchange task that reports back over an mpsc channel;
//! the owner feeds those events to [`ChatSession::apply`], so the session is
//! the only writer of its transcript.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::{ChatRequest, Feedback, RagBackend};
use crate::bus::EventBus;
use crate::citation::{AnchorSurface, CitationResolver};
use crate::config::Settings;
use crate::persistence::TranscriptStore;
use crate::reveal::{self, Increments};
use crate::state::{ChatRole, Citation, HistoryEntry, Message, GREETING_ID};

pub const FALLBACK_TEXT: &str = "I encountered a critical system error. Please contact Ayomide via email.";
pub const CANCELLED_TEXT: &str = "Response cancelled.";
pub const INTERRUPTED_TEXT: &str = "Response interrupted.";

/// How answers travel from the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// One JSON reply, revealed word by word on the client.
    Buffered,
    /// A server-sent event stream, revealed as it arrives.
    Streamed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeUpdate {
    Citations(Vec<Citation>),
    Delta(String),
    /// The answer is a fallback or was cut short.
    Failed,
    Finished,
}

/// An update from the exchange task numbered `exchange`
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeEvent {
    pub exchange: u64,
    pub update: ExchangeUpdate,
}

struct ActiveExchange {
    seq: u64,
    message_id: String,
    task: JoinHandle<()>,
}

pub struct ChatSession {
    transcript: Vec<Message>,
    loading: bool,
    typing: bool,
    active: Option<ActiveExchange>,
    next_seq: u64,
    session_id: String,
    store: TranscriptStore,
    backend: Arc<dyn RagBackend>,
    transport: Transport,
    reveal_delay: Duration,
    language: Option<String>,
    resolver: CitationResolver,
    tx: mpsc::UnboundedSender<ExchangeEvent>,
    rx: mpsc::UnboundedReceiver<ExchangeEvent>,
}

impl ChatSession {
    /// Restore the persisted transcript, or start from the greeting.
    pub fn new(backend: Arc<dyn RagBackend>, store: TranscriptStore, settings: &Settings) -> Self {
        let (transcript, repaired) = match store.load() {
            Some(mut messages) => {
                info!(count = messages.len(), "restored chat transcript");
                let repaired = close_interrupted_answer(&mut messages);
                (messages, repaired)
            }
            None => (vec![Message::greeting()], false),
        };
        let (tx, rx) = mpsc::unbounded_channel();

        let session = Self {
            transcript,
            loading: false,
            typing: false,
            active: None,
            next_seq: 0,
            session_id: new_id(),
            store,
            backend,
            transport: if settings.streaming {
                Transport::Streamed
            } else {
                Transport::Buffered
            },
            reveal_delay: settings.reveal_delay,
            language: settings.language.clone(),
            resolver: CitationResolver::new(settings.highlight),
            tx,
            rx,
        };
        if repaired {
            session.persist();
        }
        session
    }

    pub fn messages(&self) -> &[Message] {
        &self.transcript
    }

    /// An exchange is in flight; submitting is disabled.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Answer text is being revealed.
    pub fn is_typing(&self) -> bool {
        self.typing
    }

    /// Id of the message currently being revealed, if any
    pub fn revealing_id(&self) -> Option<&str> {
        match &self.active {
            Some(active) if self.typing => Some(active.message_id.as_str()),
            _ => None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Latest assistant answer that can be rated
    pub fn last_answer_id(&self) -> Option<&str> {
        self.transcript
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::Assistant && m.id != GREETING_ID && !m.content.is_empty())
            .map(|m| m.id.as_str())
    }

    /// Start an exchange for `query`.
    ///
    /// Returns false without touching the transcript when the query is blank
    /// or another exchange is still in flight. Must be called inside a tokio
    /// runtime.
    pub fn submit(&mut self, query: &str) -> bool {
        let query = query.trim();
        if query.is_empty() {
            return false;
        }
        if self.active.is_some() {
            debug!("submit rejected, exchange in flight");
            return false;
        }

        let history: Vec<HistoryEntry> = self.transcript.iter().map(HistoryEntry::from).collect();
        let reply_id = new_id();
        self.transcript.push(Message::user(new_id(), query));
        self.transcript.push(Message::assistant(reply_id.clone(), ""));
        self.persist();

        let request = ChatRequest {
            query: query.to_string(),
            conversation_history: history,
            session_id: Some(self.session_id.clone()),
            language: self.language.clone(),
        };

        self.next_seq += 1;
        let seq = self.next_seq;
        let exchange = Exchange {
            backend: Arc::clone(&self.backend),
            request,
            transport: self.transport,
            reveal_delay: self.reveal_delay,
            reporter: Reporter { seq, tx: self.tx.clone() },
        };
        let task = tokio::spawn(exchange.run());

        info!(exchange = seq, transport = ?self.transport, "chat exchange started");
        self.active = Some(ActiveExchange {
            seq,
            message_id: reply_id,
            task,
        });
        self.loading = true;
        true
    }

    /// Wait for the next update from an exchange task.
    pub async fn next_event(&mut self) -> Option<ExchangeEvent> {
        self.rx.recv().await
    }

    /// Apply an exchange update. Updates from an exchange that is no longer
    /// active are dropped.
    pub fn apply(&mut self, event: ExchangeEvent) {
        let Some(active) = self.active.as_ref() else {
            debug!(exchange = event.exchange, "dropping update, no active exchange");
            return;
        };
        if active.seq != event.exchange {
            debug!(exchange = event.exchange, active = active.seq, "dropping stale update");
            return;
        }
        let message_id = active.message_id.clone();

        match event.update {
            ExchangeUpdate::Citations(citations) => {
                self.typing = true;
                if let Some(message) = self.message_mut(&message_id) {
                    message.citations = Some(citations);
                }
            }
            ExchangeUpdate::Delta(text) => {
                self.typing = true;
                if let Some(message) = self.message_mut(&message_id) {
                    message.content.push_str(&text);
                }
            }
            ExchangeUpdate::Failed => {
                if let Some(message) = self.message_mut(&message_id) {
                    message.failed = true;
                }
            }
            ExchangeUpdate::Finished => {
                info!(exchange = event.exchange, "chat exchange finished");
                self.active = None;
                self.loading = false;
                self.typing = false;
            }
        }
        self.persist();
    }

    /// Drive the current exchange to completion.
    pub async fn settle(&mut self) {
        while self.active.is_some() {
            match self.next_event().await {
                Some(event) => self.apply(event),
                None => break,
            }
        }
    }

    /// Abort the in-flight exchange, keeping whatever text already arrived.
    pub fn cancel(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        active.task.abort();
        self.loading = false;
        self.typing = false;

        if let Some(message) = self.message_mut(&active.message_id) {
            if message.content.is_empty() {
                message.content = CANCELLED_TEXT.to_string();
            }
            message.failed = true;
        }
        info!(exchange = active.seq, "chat exchange cancelled");
        self.persist();
        true
    }

    /// Reset to the greeting, forget the persisted copy and start a new
    /// backend session. An exchange in flight is abandoned.
    pub fn clear(&mut self) {
        if let Some(active) = self.active.take() {
            active.task.abort();
        }
        self.loading = false;
        self.typing = false;
        self.transcript = vec![Message::greeting()];

        let ended = std::mem::replace(&mut self.session_id, new_id());
        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            if let Err(e) = backend.end_session(&ended).await {
                debug!(error = %e, "server session not cleared");
            }
        });

        if let Err(e) = self.store.clear() {
            warn!(error = %e, "failed to remove persisted transcript");
        }
        info!("chat cleared");
    }

    /// Follow a citation marker to its page anchor.
    pub fn resolve_citation<S: AnchorSurface + ?Sized>(&self, anchor: &str, surface: &S, bus: &EventBus) -> bool {
        self.resolver.resolve(anchor, surface, bus)
    }

    /// Send a 1..=5 rating for an answer in the background.
    pub fn rate(&self, message_id: &str, rating: u8, comment: Option<String>) -> bool {
        let rateable = self
            .transcript
            .iter()
            .any(|m| m.id == message_id && m.role == ChatRole::Assistant && !m.content.is_empty());
        if !rateable || !(1..=5).contains(&rating) {
            return false;
        }

        let backend = Arc::clone(&self.backend);
        let feedback = Feedback {
            message_id: message_id.to_string(),
            rating,
            comment,
        };
        tokio::spawn(async move {
            if let Err(e) = backend.feedback(&feedback).await {
                warn!(error = %e, "feedback not delivered");
            }
        });
        true
    }

    fn message_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.transcript.iter_mut().find(|m| m.id == id)
    }

    fn persist(&self) {
        if self.transcript.len() <= 1 {
            return;
        }
        if let Err(e) = self.store.save(&self.transcript) {
            warn!(error = %e, "failed to persist transcript");
        }
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// A transcript saved mid-exchange ends in an empty placeholder that nothing
/// will ever fill. Mark it as cut short.
fn close_interrupted_answer(messages: &mut [Message]) -> bool {
    match messages.last_mut() {
        Some(last) if last.role == ChatRole::Assistant && last.content.is_empty() => {
            warn!(id = %last.id, "restored transcript ends mid-answer");
            last.content = INTERRUPTED_TEXT.to_string();
            last.failed = true;
            true
        }
        _ => false,
    }
}

struct Reporter {
    seq: u64,
    tx: mpsc::UnboundedSender<ExchangeEvent>,
}

impl Reporter {
    fn send(&self, update: ExchangeUpdate) {
        // The session may already be gone.
        let _ = self.tx.send(ExchangeEvent {
            exchange: self.seq,
            update,
        });
    }
}

struct Exchange {
    backend: Arc<dyn RagBackend>,
    request: ChatRequest,
    transport: Transport,
    reveal_delay: Duration,
    reporter: Reporter,
}

impl Exchange {
    async fn run(self) {
        let opened = match self.transport {
            Transport::Buffered => self
                .backend
                .chat(&self.request)
                .await
                .map(|reply| (reply.citations, reveal::simulated(reply.response, self.reveal_delay))),
            Transport::Streamed => self
                .backend
                .chat_stream(&self.request)
                .await
                .map(|stream| (stream.citations, stream.increments)),
        };

        match opened {
            Ok((citations, increments)) => {
                self.reporter.send(ExchangeUpdate::Citations(citations));
                self.reveal(increments).await;
            }
            Err(e) => {
                warn!(error = %e, "chat request failed");
                self.reveal_fallback().await;
            }
        }
        self.reporter.send(ExchangeUpdate::Finished);
    }

    async fn reveal(&self, mut increments: Increments) {
        let mut revealed = false;
        while let Some(delta) = increments.next().await {
            match delta {
                Ok(text) => {
                    revealed |= !text.is_empty();
                    self.reporter.send(ExchangeUpdate::Delta(text));
                }
                Err(e) if revealed => {
                    warn!(error = %e, "answer stream interrupted");
                    self.reporter.send(ExchangeUpdate::Failed);
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "answer stream failed before any text");
                    self.reveal_fallback().await;
                    return;
                }
            }
        }
        if !revealed {
            debug!("backend returned an empty answer");
            self.reveal_fallback().await;
        }
    }

    async fn reveal_fallback(&self) {
        self.reporter.send(ExchangeUpdate::Failed);
        let mut fallback = reveal::simulated(FALLBACK_TEXT, self.reveal_delay);
        while let Some(Ok(text)) = fallback.next().await {
            self.reporter.send(ExchangeUpdate::Delta(text));
        }
    }
}

//! In-process `RagBackend` double for controller tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;

use crate::api::{ApiError, ChatReply, ChatRequest, ChatStream, Feedback, RagBackend};
use crate::state::{Citation, SearchResult};

pub type StreamScript = (Vec<Citation>, Vec<Result<Vec<u8>, ApiError>>);

#[derive(Default)]
pub struct FakeBackend {
    pub replies: Mutex<VecDeque<Result<ChatReply, ApiError>>>,
    pub streams: Mutex<VecDeque<Result<StreamScript, ApiError>>>,
    pub chat_latency: Mutex<Duration>,
    pub requests: Mutex<Vec<ChatRequest>>,
    pub searches: Mutex<Vec<String>>,
    pub search_latency: Mutex<HashMap<String, Duration>>,
    pub failing_searches: Mutex<HashSet<String>>,
    pub feedback: Mutex<Vec<Feedback>>,
    pub ended_sessions: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn reply(&self, response: &str, citations: Vec<Citation>) {
        self.replies.lock().unwrap().push_back(Ok(ChatReply {
            response: response.to_string(),
            citations,
        }));
    }

    pub fn fail_chat(&self) {
        self.replies.lock().unwrap().push_back(Err(ApiError::Status {
            endpoint: "/chat".to_string(),
            status: 500,
        }));
    }

    pub fn stream(&self, citations: Vec<Citation>, chunks: Vec<Result<Vec<u8>, ApiError>>) {
        self.streams.lock().unwrap().push_back(Ok((citations, chunks)));
    }

    pub fn set_chat_latency(&self, latency: Duration) {
        *self.chat_latency.lock().unwrap() = latency;
    }

    pub fn set_search_latency(&self, query: &str, latency: Duration) {
        self.search_latency.lock().unwrap().insert(query.to_string(), latency);
    }

    pub fn fail_search(&self, query: &str) {
        self.failing_searches.lock().unwrap().insert(query.to_string());
    }

    pub fn searches(&self) -> Vec<String> {
        self.searches.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn results_for(query: &str) -> Vec<SearchResult> {
        vec![SearchResult {
            id: format!("{query}-1"),
            kind: "project".to_string(),
            title: format!("Result for {query}"),
            preview: format!("Preview of {query}"),
            href: "/#projects".to_string(),
            score: 0.9,
            url: None,
        }]
    }

    async fn wait_for_chat(&self) {
        let latency = *self.chat_latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl RagBackend for FakeBackend {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, ApiError> {
        self.requests.lock().unwrap().push(request.clone());
        self.wait_for_chat().await;
        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Err(ApiError::Transport {
                endpoint: "/chat".to_string(),
                message: "no scripted reply".to_string(),
            })
        })
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChatStream, ApiError> {
        self.requests.lock().unwrap().push(request.clone());
        self.wait_for_chat().await;
        let next = self.streams.lock().unwrap().pop_front();
        let (citations, chunks) = next.unwrap_or_else(|| {
            Err(ApiError::Transport {
                endpoint: "/chat/stream".to_string(),
                message: "no scripted stream".to_string(),
            })
        })?;
        Ok(ChatStream {
            citations,
            increments: crate::stream::decode(stream::iter(chunks)),
        })
    }

    async fn search(&self, query: &str, _limit: usize) -> Result<Vec<SearchResult>, ApiError> {
        self.searches.lock().unwrap().push(query.to_string());
        let latency = self.search_latency.lock().unwrap().get(query).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing_searches.lock().unwrap().contains(query) {
            return Err(ApiError::Status {
                endpoint: "/search".to_string(),
                status: 500,
            });
        }
        Ok(Self::results_for(query))
    }

    async fn feedback(&self, feedback: &Feedback) -> Result<(), ApiError> {
        self.feedback.lock().unwrap().push(feedback.clone());
        Ok(())
    }

    async fn end_session(&self, session_id: &str) -> Result<(), ApiError> {
        self.ended_sessions.lock().unwrap().push(session_id.to_string());
        Ok(())
    }
}

pub fn frame(text: &str) -> Result<Vec<u8>, ApiError> {
    Ok(format!("data: {}\n\n", serde_json::json!({ "text": text })).into_bytes())
}

pub fn done_frame() -> Result<Vec<u8>, ApiError> {
    Ok(b"data: {\"done\": true}\n\n".to_vec())
}

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::Settings;
use crate::reveal::Increments;
use crate::state::{Citation, HistoryEntry, SearchResult};
use crate::stream;

/// Header the streaming endpoint uses to ship citations ahead of the body.
pub const CITATIONS_HEADER: &str = "X-Citations";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },
    #[error("could not decode {endpoint} response: {message}")]
    Decode { endpoint: String, message: String },
}

impl ApiError {
    fn transport(endpoint: &str, error: reqwest::Error) -> Self {
        ApiError::Transport {
            endpoint: endpoint.to_string(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub query: String,
    pub conversation_history: Vec<HistoryEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatReply {
    pub response: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

/// An open `/chat/stream` response
pub struct ChatStream {
    pub citations: Vec<Citation>,
    pub increments: Increments,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feedback {
    pub message_id: String,
    pub rating: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

/// The remote RAG service, seen only through its HTTP contract
#[async_trait]
pub trait RagBackend: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, ApiError>;
    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChatStream, ApiError>;
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ApiError>;
    async fn feedback(&self, feedback: &Feedback) -> Result<(), ApiError>;
    /// Drop the server-side memory kept for `session_id`.
    async fn end_session(&self, session_id: &str) -> Result<(), ApiError>;
}

#[derive(Clone)]
pub struct RagClient {
    client: Client,
    base_url: String,
    /// Whole-request limit for calls that return a single body. Streams are
    /// only bounded while connecting.
    request_timeout: Duration,
}

impl RagClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout: Settings::default().request_timeout,
        }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(settings.request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: settings.api_url.trim_end_matches('/').to_string(),
            request_timeout: settings.request_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl RagBackend for RagClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, ApiError> {
        let endpoint = "/chat";
        let response = self
            .client
            .post(self.url(endpoint))
            .timeout(self.request_timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| ApiError::transport(endpoint, e))?;

        if !response.status().is_success() {
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.json::<ChatReply>().await.map_err(|e| ApiError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChatStream, ApiError> {
        let endpoint = "/chat/stream";
        let response = self
            .client
            .post(self.url(endpoint))
            .json(request)
            .send()
            .await
            .map_err(|e| ApiError::transport(endpoint, e))?;

        if !response.status().is_success() {
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status: response.status().as_u16(),
            });
        }

        let citations = response
            .headers()
            .get(CITATIONS_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(parse_citations_header)
            .unwrap_or_default();

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ApiError::transport("/chat/stream", e)));

        Ok(ChatStream {
            citations,
            increments: stream::decode(bytes),
        })
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ApiError> {
        let endpoint = "/search";
        let limit = limit.to_string();
        let response = self
            .client
            .get(self.url(endpoint))
            .timeout(self.request_timeout)
            .query(&[("q", query), ("limit", limit.as_str())])
            .send()
            .await
            .map_err(|e| ApiError::transport(endpoint, e))?;

        if !response.status().is_success() {
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body: SearchResponse = response.json().await.map_err(|e| ApiError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;
        Ok(body.results)
    }

    async fn feedback(&self, feedback: &Feedback) -> Result<(), ApiError> {
        let endpoint = "/feedback";
        let response = self
            .client
            .post(self.url(endpoint))
            .timeout(self.request_timeout)
            .json(feedback)
            .send()
            .await
            .map_err(|e| ApiError::transport(endpoint, e))?;

        if !response.status().is_success() {
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }

    async fn end_session(&self, session_id: &str) -> Result<(), ApiError> {
        let endpoint = "/session";
        let response = self
            .client
            .delete(self.url(&format!("{endpoint}/{session_id}")))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| ApiError::transport(endpoint, e))?;

        if !response.status().is_success() {
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

/// Citations travel as a JSON array in a response header. Anything
/// unparseable means "no citations".
pub fn parse_citations_header(raw: &str) -> Vec<Citation> {
    match serde_json::from_str(raw) {
        Ok(citations) => citations,
        Err(e) => {
            debug!(error = %e, "ignoring malformed citations header");
            Vec::new()
        }
    }
}

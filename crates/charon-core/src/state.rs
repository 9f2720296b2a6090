//! UI-agnostic conversation and search types
//!
//! This module contains the data structures shared between the controllers
//! and whatever surface renders them. None of them depend on a UI framework.

use serde::{Deserialize, Serialize};

/// Id of the message every transcript starts with.
pub const GREETING_ID: &str = "greeting";

pub const GREETING_TEXT: &str = "I am Charon, Ayomide's guide through this portfolio. \
Ask me about his projects, his stack, or his experience.";

/// A chat message in the assistant conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Citation>>,
    /// Set when the content is a fallback or an interrupted answer rather
    /// than a complete reply from the backend.
    #[serde(default, skip_serializing_if = "is_false")]
    pub failed: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Message {
    pub fn user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: ChatRole::User,
            content: content.into(),
            citations: None,
            failed: false,
        }
    }

    pub fn assistant(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: ChatRole::Assistant,
            content: content.into(),
            citations: None,
            failed: false,
        }
    }

    pub fn greeting() -> Self {
        Self::assistant(GREETING_ID, GREETING_TEXT)
    }

    pub fn citations(&self) -> &[Citation] {
        self.citations.as_deref().unwrap_or(&[])
    }
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// A source the backend used for an answer. `anchor` is the id of a page
/// section the answer can link to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(rename = "ref")]
    pub anchor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One hit returned by the backend's quick search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub preview: String,
    #[serde(default)]
    pub href: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Role and content of a prior message, as sent to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: ChatRole,
    pub content: String,
}

impl From<&Message> for HistoryEntry {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_format() {
        let mut message = Message::assistant("a1", "See [REF: Sentinel]");
        message.citations = Some(vec![Citation {
            kind: "project".to_string(),
            name: "Sentinel".to_string(),
            anchor: "project_sentinel".to_string(),
            url: None,
        }]);

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["citations"][0]["ref"], "project_sentinel");
        assert_eq!(json["citations"][0]["type"], "project");
        assert!(json.get("failed").is_none());
    }

    #[test]
    fn test_search_result_tolerates_missing_optional_fields() {
        let result: SearchResult = serde_json::from_str(
            r#"{"id":"p1","type":"project","title":"Sentinel"}"#,
        )
        .unwrap();
        assert_eq!(result.href, "");
        assert_eq!(result.score, 0.0);
        assert!(result.url.is_none());
    }
}

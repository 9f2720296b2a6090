//! Incremental reveal of answer text
//!
//! Whether an answer arrives in one piece or as a real network stream, the
//! chat session consumes it the same way: an ordered stream of text deltas
//! that is appended to the placeholder message until the stream ends.

use std::time::Duration;

use futures_util::stream::{self, BoxStream, StreamExt};

use crate::api::ApiError;

pub type Increments = BoxStream<'static, Result<String, ApiError>>;

/// Split `text` into word-sized deltas whose concatenation is exactly `text`.
///
/// Each segment is a word plus the whitespace that follows it; leading
/// whitespace rides along with the first word.
pub fn word_segments(text: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_trailing_space = false;

    for ch in text.chars() {
        if ch.is_whitespace() {
            if !current.trim().is_empty() {
                in_trailing_space = true;
            }
            current.push(ch);
        } else {
            if in_trailing_space {
                segments.push(std::mem::take(&mut current));
                in_trailing_space = false;
            }
            current.push(ch);
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Reveal a buffered answer word by word with `delay` between words.
pub fn simulated(text: impl Into<String>, delay: Duration) -> Increments {
    let segments = word_segments(&text.into());
    stream::iter(segments.into_iter().enumerate())
        .then(move |(i, segment)| async move {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(segment)
        })
        .boxed()
}

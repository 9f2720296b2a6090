//! Decoding of the `/chat/stream` event stream
//!
//! The body is a sequence of newline-delimited frames. `data: {json}` frames
//! carry `{ "text"?: string, "done"?: bool }`; anything else is ignored. The
//! transport may split a frame (or a UTF-8 sequence) across reads, so raw
//! bytes are buffered until a full line is available.

use std::collections::VecDeque;
use std::pin::Pin;

use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use serde::Deserialize;
use tracing::debug;

#[derive(Deserialize)]
struct Frame {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    done: bool,
}

/// Incremental line splitter and frame parser
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    finished: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once a `done` frame has been seen. Later input is ignored.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one chunk, returning the text increments of every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }

        self.buf.extend_from_slice(chunk);
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            self.decode_line(&line[..line.len() - 1], &mut out);
            if self.finished {
                self.buf.clear();
                break;
            }
        }
        out
    }

    /// Flush whatever is left once the underlying stream has ended.
    pub fn finish(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.finished && !self.buf.is_empty() {
            let rest = std::mem::take(&mut self.buf);
            self.decode_line(&rest, &mut out);
        }
        self.finished = true;
        out
    }

    fn decode_line(&mut self, raw: &[u8], out: &mut Vec<String>) {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches('\r');
        let Some(payload) = line.strip_prefix("data:") else {
            return;
        };
        let payload = payload.trim();
        if payload.is_empty() {
            return;
        }

        match serde_json::from_str::<Frame>(payload) {
            Ok(frame) => {
                if let Some(text) = frame.text.filter(|t| !t.is_empty()) {
                    out.push(text);
                }
                if frame.done {
                    self.finished = true;
                }
            }
            Err(e) => debug!(error = %e, "skipping malformed stream frame"),
        }
    }
}

struct DecodeState<S> {
    inner: Pin<Box<S>>,
    decoder: FrameDecoder,
    pending: VecDeque<String>,
    ended: bool,
}

/// Turn a byte stream into a lazy stream of text increments.
///
/// The sequence ends at the first `done` frame or when `bytes` ends. A
/// transport error is yielded once and ends the sequence.
pub fn decode<S, B, E>(bytes: S) -> BoxStream<'static, Result<String, E>>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Send + 'static,
{
    let state = DecodeState {
        inner: Box::pin(bytes),
        decoder: FrameDecoder::new(),
        pending: VecDeque::new(),
        ended: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(text) = st.pending.pop_front() {
                return Some((Ok(text), st));
            }
            if st.ended || st.decoder.is_finished() {
                return None;
            }
            match st.inner.next().await {
                Some(Ok(chunk)) => {
                    let texts = st.decoder.push(chunk.as_ref());
                    st.pending.extend(texts);
                }
                Some(Err(e)) => {
                    st.ended = true;
                    return Some((Err(e), st));
                }
                None => {
                    st.ended = true;
                    let texts = st.decoder.finish();
                    st.pending.extend(texts);
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: Vec<Vec<u8>>) -> impl Stream<Item = Result<Vec<u8>, String>> + Send + 'static {
        stream::iter(parts.into_iter().map(Ok))
    }

    async fn collect(s: BoxStream<'static, Result<String, String>>) -> Vec<Result<String, String>> {
        s.collect().await
    }

    #[test]
    fn test_decoder_rejoins_split_lines() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"te").is_empty());
        assert_eq!(decoder.push(b"xt\":\"Hel\"}\n\ndata: {\"text\":\"lo\"}\n"), vec!["Hel", "lo"]);
    }

    #[test]
    fn test_decoder_ignores_non_data_frames() {
        let mut decoder = FrameDecoder::new();
        let out = decoder.push(b"event: ping\n: comment\nid: 4\ndata: {\"text\":\"ok\"}\n");
        assert_eq!(out, vec!["ok"]);
    }

    #[test]
    fn test_decoder_stops_at_done() {
        let mut decoder = FrameDecoder::new();
        let out = decoder.push(b"data: {\"text\":\"a\"}\ndata: {\"done\":true}\ndata: {\"text\":\"late\"}\n");
        assert_eq!(out, vec!["a"]);
        assert!(decoder.is_finished());
        assert!(decoder.push(b"data: {\"text\":\"later\"}\n").is_empty());
    }

    #[tokio::test]
    async fn test_multibyte_char_split_across_reads() {
        let line = "data: {\"text\":\"caf\u{e9}\"}\n".as_bytes().to_vec();
        let split = line.len() - 4;
        let out = collect(decode(chunks(vec![line[..split].to_vec(), line[split..].to_vec()]))).await;
        assert_eq!(out, vec![Ok("caf\u{e9}".to_string())]);
    }

    #[tokio::test]
    async fn test_malformed_frames_are_skipped() {
        let out = collect(decode(chunks(vec![
            b"data: {\"text\":\"one\"}\n".to_vec(),
            b"data: {broken\n".to_vec(),
            b"data: {\"text\":\"two\"}\ndata: {\"done\":true}\n".to_vec(),
        ])))
        .await;
        assert_eq!(out, vec![Ok("one".to_string()), Ok("two".to_string())]);
    }

    #[tokio::test]
    async fn test_stream_end_without_done_flushes_tail() {
        let out = collect(decode(chunks(vec![b"data: {\"text\":\"a\"}\ndata: {\"text\":\"b\"}".to_vec()]))).await;
        assert_eq!(out, vec![Ok("a".to_string()), Ok("b".to_string())]);
    }

    #[tokio::test]
    async fn test_transport_error_ends_sequence() {
        let parts: Vec<Result<Vec<u8>, String>> = vec![
            Ok(b"data: {\"text\":\"a\"}\n".to_vec()),
            Err("reset".to_string()),
            Ok(b"data: {\"text\":\"b\"}\n".to_vec()),
        ];
        let out = collect(decode(stream::iter(parts))).await;
        assert_eq!(out, vec![Ok("a".to_string()), Err("reset".to_string())]);
    }
}

//! Upstream provider events and the SSE decoding that produces them.
//!
//! The encoder depends only on [`ProviderEvent`]: a type tag plus the JSON
//! body that carried it. How the events were fetched is the caller's
//! business; [`provider_event_stream`] covers the common case of a
//! Responses-style SSE body.

use std::collections::VecDeque;
use std::fmt::Display;

use bytes::Bytes;
use futures::StreamExt as _;
use futures::stream::{self, Stream};
use tracing::debug;

use crate::errors::UpstreamError;

/// One event from the upstream model provider.
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderEvent {
    pub kind: String,
    pub body: serde_json::Value,
}

impl ProviderEvent {
    pub fn new(kind: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            body,
        }
    }

    /// Builds an event from a JSON object carrying its own `type` field.
    pub fn from_json(body: serde_json::Value) -> Option<Self> {
        let kind = body.get("type").and_then(|v| v.as_str())?.to_string();
        Some(Self { kind, body })
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.body.get(key).and_then(|v| v.as_str())
    }

    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.body.get(key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Line-oriented SSE field parser.
///
/// Bytes are held until a newline completes the line, so a chunk boundary
/// may fall anywhere, including inside a multi-byte character. A blank line
/// dispatches the fields collected since the previous one.
#[derive(Default)]
pub(crate) struct SseDecoder {
    line: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        for piece in chunk.split_inclusive(|byte| *byte == b'\n') {
            let Some(body) = piece.strip_suffix(b"\n") else {
                self.line.extend_from_slice(piece);
                continue;
            };
            self.line.extend_from_slice(body);
            let line = std::mem::take(&mut self.line);
            if let Some(frame) = self.feed_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Whatever is left once the body ends without a trailing blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let line = std::mem::take(&mut self.line);
        if !line.is_empty()
            && let Some(frame) = self.feed_line(&line)
        {
            return Some(frame);
        }
        self.dispatch()
    }

    fn feed_line(&mut self, raw: &[u8]) -> Option<SseFrame> {
        let text = String::from_utf8_lossy(raw);
        let line = text.strip_suffix('\r').unwrap_or(&*text);
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let data = std::mem::take(&mut self.data);
        if event.is_none() && data.is_empty() {
            return None;
        }
        Some(SseFrame {
            event,
            data: data.join("\n"),
        })
    }
}

/// Maps one SSE frame to a provider event.
///
/// `[DONE]` and empty frames produce nothing. A frame whose JSON lacks a
/// `type` falls back to the SSE `event:` name.
pub(crate) fn map_frame_to_event(frame: &SseFrame) -> Result<Option<ProviderEvent>, UpstreamError> {
    let data = frame.data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }
    let body: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| UpstreamError::protocol(format!("invalid SSE JSON frame: {e}")))?;
    if let Some(event) = ProviderEvent::from_json(body.clone()) {
        return Ok(Some(event));
    }
    match &frame.event {
        Some(name) => Ok(Some(ProviderEvent::new(name.clone(), body))),
        None => {
            debug!("SSE frame without type or event name; skipping");
            Ok(None)
        }
    }
}

/// Decodes an SSE byte stream into provider events.
///
/// A read failure ends the stream with one `UpstreamError::Transport` item.
pub fn provider_event_stream<S, E>(
    bytes_stream: S,
) -> impl Stream<Item = Result<ProviderEvent, UpstreamError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: Display,
{
    struct State<S> {
        bytes_stream: S,
        decoder: SseDecoder,
        pending: VecDeque<ProviderEvent>,
        done: bool,
    }

    stream::try_unfold(
        State {
            bytes_stream,
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Ok(Some((event, state)));
                }
                if state.done {
                    return Ok(None);
                }

                match state.bytes_stream.next().await {
                    Some(Ok(chunk)) => {
                        for frame in state.decoder.push_chunk(&chunk) {
                            if let Some(event) = map_frame_to_event(&frame)? {
                                state.pending.push_back(event);
                            }
                        }
                    }
                    Some(Err(e)) => {
                        return Err(UpstreamError::transport(format!(
                            "provider stream read failed: {e}"
                        )));
                    }
                    None => {
                        state.done = true;
                        if let Some(frame) = state.decoder.finish()
                            && let Some(event) = map_frame_to_event(&frame)?
                        {
                            state.pending.push_back(event);
                        }
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn kinds_of(chunks: Vec<Bytes>) -> Vec<String> {
        let body = stream::iter(chunks.into_iter().map(Ok::<_, std::io::Error>));
        provider_event_stream(body)
            .map(|event| event.expect("event").kind)
            .collect()
            .await
    }

    #[tokio::test]
    async fn events_survive_any_split_point() {
        let body = "event: message\r\n\
                    data: {\"type\":\"response.output_text.delta\",\"delta\":\"h\u{e9}llo\"}\r\n\r\n\
                    : keep-alive\n\n\
                    event: search_progress\n\
                    data: {\"pct\":\n\
                    data: 40}\n\n\
                    data: [DONE]\n\n"
            .as_bytes();
        let expected = vec!["response.output_text.delta", "search_progress"];
        assert_eq!(kinds_of(vec![Bytes::copy_from_slice(body)]).await, expected);
        for split in 1..body.len() {
            let chunks = vec![
                Bytes::copy_from_slice(&body[..split]),
                Bytes::copy_from_slice(&body[split..]),
            ];
            assert_eq!(kinds_of(chunks).await, expected, "split at byte {split}");
        }
    }

    #[test]
    fn split_multibyte_character_is_reassembled() {
        let mut decoder = SseDecoder::default();
        let line = "data: {\"delta\":\"\u{e9}\"}\n\n".as_bytes();
        let cut = line.iter().position(|b| *b >= 0x80).expect("multibyte") + 1;
        assert!(decoder.push_chunk(&line[..cut]).is_empty());
        let frames = decoder.push_chunk(&line[cut..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "{\"delta\":\"\u{e9}\"}");
    }

    #[test]
    fn crlf_delimited_frames_are_split() {
        let mut decoder = SseDecoder::default();
        let frames = decoder.push_chunk(b"data: {\"type\":\"a\"}\r\n\r\ndata: {\"type\":\"b\"}\r\n\r\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].data, "{\"type\":\"b\"}");
    }

    #[test]
    fn frame_without_type_uses_event_name() {
        let frame = SseFrame {
            event: Some("search_progress".into()),
            data: "{\"pct\":10}".into(),
        };
        let event = map_frame_to_event(&frame).expect("map").expect("event");
        assert_eq!(event.kind, "search_progress");
        assert_eq!(event.field("pct"), Some(&serde_json::json!(10)));
    }

    #[test]
    fn done_sentinel_maps_to_nothing() {
        let frame = SseFrame {
            event: None,
            data: "[DONE]".into(),
        };
        assert_eq!(map_frame_to_event(&frame).expect("map"), None);
    }

    #[tokio::test]
    async fn stream_yields_events_and_flushes_unterminated_tail() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(
                b"data: {\"type\":\"response.output_text.delta\",\"delta\":\"Hi\"}\n\ndata: {\"type\":\"resp",
            )),
            Ok(Bytes::from_static(b"onse.completed\"}")),
        ];
        let kinds: Vec<String> = provider_event_stream(stream::iter(chunks))
            .map(|e| e.expect("event").kind)
            .collect()
            .await;
        assert_eq!(kinds, vec!["response.output_text.delta", "response.completed"]);
    }

    #[tokio::test]
    async fn read_failure_becomes_transport_error() {
        let chunks: Vec<Result<Bytes, std::io::Error>> =
            vec![Err(std::io::Error::other("connection reset"))];
        let events: Vec<_> = provider_event_stream(stream::iter(chunks)).collect().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(UpstreamError::Transport { .. })));
    }
}

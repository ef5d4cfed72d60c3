//! Wire framing: one newline-terminated, prefixed unit per frame.
//!
//! ```text
//! f:{"messageId":"<id>"}
//! 0:"<JSON-escaped text fragment>"
//! t:{"type":"<tool-channel-subtype>", ...fields}
//! e:{"message":"<string>","details":<any>}
//! ```

use std::fmt;

use bytes::Bytes;
use serde::Serialize;

use crate::channel::{
    CONTENT_PART_DONE, ChannelDecode, ContentPartDone, ErrorFrame, MetaFrame, ToolChannelPayload,
};
use crate::errors::WireError;

pub const META_PREFIX: &str = "f:";
pub const TEXT_PREFIX: &str = "0:";
pub const TOOL_PREFIX: &str = "t:";
pub const ERROR_PREFIX: &str = "e:";

/// Wire channel a line belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Meta,
    TextDelta,
    ToolChannel,
    ErrorChannel,
    /// Bare JSON object without a prefix.
    Object,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Meta => META_PREFIX,
            Channel::TextDelta => TEXT_PREFIX,
            Channel::ToolChannel => TOOL_PREFIX,
            Channel::ErrorChannel => ERROR_PREFIX,
            Channel::Object => "object",
        };
        f.write_str(name)
    }
}

/// Result of looking at one line, before any JSON is parsed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classified<'a> {
    /// Blank or whitespace-only line.
    Ignored,
    Frame { channel: Channel, payload: &'a str },
    /// Non-empty line matching no channel.
    Unknown(&'a str),
}

/// Splits a line into its channel and raw payload.
pub fn classify_line(line: &str) -> Classified<'_> {
    let line = line.trim_end_matches('\r');
    if line.trim().is_empty() {
        return Classified::Ignored;
    }
    let prefixes = [
        (META_PREFIX, Channel::Meta),
        (TEXT_PREFIX, Channel::TextDelta),
        (TOOL_PREFIX, Channel::ToolChannel),
        (ERROR_PREFIX, Channel::ErrorChannel),
    ];
    for (prefix, channel) in prefixes {
        if let Some(payload) = line.strip_prefix(prefix) {
            return Classified::Frame { channel, payload };
        }
    }
    let trimmed = line.trim_start();
    if trimmed.starts_with('{') {
        return Classified::Frame {
            channel: Channel::Object,
            payload: trimmed,
        };
    }
    Classified::Unknown(line)
}

/// A fully decoded frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// Nothing to apply (blank line, empty `t:` payload).
    Noop,
    Meta(MetaFrame),
    TextDelta(String),
    Tool(ToolChannelPayload),
    /// `t:` object outside the closed subtype set.
    UnrecognizedTool(String),
    Error(ErrorFrame),
    ContentPartDone(ContentPartDone),
    /// Bare JSON object of no known shape.
    Object(serde_json::Value),
}

/// Classifies and parses one line.
///
/// Every parse failure is returned as a [`WireError`]; callers log and skip
/// it.
pub fn decode_line(line: &str) -> Result<Frame, WireError> {
    match classify_line(line) {
        Classified::Ignored => Ok(Frame::Noop),
        Classified::Unknown(raw) => Err(WireError::UnrecognizedType(truncate(raw, 32))),
        Classified::Frame { channel, payload } => decode_payload(channel, payload),
    }
}

fn decode_payload(channel: Channel, payload: &str) -> Result<Frame, WireError> {
    match channel {
        Channel::Meta => serde_json::from_str::<MetaFrame>(payload)
            .map(Frame::Meta)
            .map_err(|e| WireError::malformed(channel, e.to_string())),
        Channel::TextDelta => serde_json::from_str::<String>(payload)
            .map(Frame::TextDelta)
            .map_err(|e| WireError::malformed(channel, e.to_string())),
        Channel::ToolChannel => {
            if payload.trim().is_empty() {
                return Ok(Frame::Noop);
            }
            let value: serde_json::Value = serde_json::from_str(payload)
                .map_err(|e| WireError::malformed(channel, e.to_string()))?;
            match ToolChannelPayload::decode(value)? {
                ChannelDecode::Payload(payload) => Ok(Frame::Tool(payload)),
                ChannelDecode::Unrecognized(kind) => Ok(Frame::UnrecognizedTool(kind)),
            }
        }
        Channel::ErrorChannel => serde_json::from_str::<ErrorFrame>(payload)
            .map(Frame::Error)
            .map_err(|e| WireError::malformed(channel, e.to_string())),
        Channel::Object => {
            let value: serde_json::Value = serde_json::from_str(payload)
                .map_err(|e| WireError::malformed(channel, e.to_string()))?;
            if value.get("type").and_then(|v| v.as_str()) == Some(CONTENT_PART_DONE) {
                return serde_json::from_value::<ContentPartDone>(value)
                    .map(Frame::ContentPartDone)
                    .map_err(|e| WireError::malformed(channel, e.to_string()));
            }
            Ok(Frame::Object(value))
        }
    }
}

fn truncate(raw: &str, max_chars: usize) -> String {
    raw.chars().take(max_chars).collect()
}

fn line(prefix: &str, body: &str) -> Bytes {
    let mut out = String::with_capacity(prefix.len() + body.len() + 1);
    out.push_str(prefix);
    out.push_str(body);
    out.push('\n');
    Bytes::from(out)
}

fn json_line<T: Serialize + ?Sized>(prefix: &str, value: &T) -> Result<Bytes, WireError> {
    let body = serde_json::to_string(value)?;
    Ok(line(prefix, &body))
}

pub fn encode_meta(message_id: &str) -> Result<Bytes, WireError> {
    json_line(
        META_PREFIX,
        &MetaFrame {
            message_id: message_id.to_string(),
        },
    )
}

pub fn encode_text(text: &str) -> Result<Bytes, WireError> {
    json_line(TEXT_PREFIX, text)
}

pub fn encode_tool(payload: &ToolChannelPayload) -> Result<Bytes, WireError> {
    json_line(TOOL_PREFIX, payload)
}

/// Forwards an upstream object verbatim on the tool channel.
pub fn encode_passthrough(value: &serde_json::Value) -> Result<Bytes, WireError> {
    json_line(TOOL_PREFIX, value)
}

pub fn encode_error(frame: &ErrorFrame) -> Result<Bytes, WireError> {
    json_line(ERROR_PREFIX, frame)
}

pub fn encode_content_part_done(part: &ContentPartDone) -> Result<Bytes, WireError> {
    json_line("", part)
}

/// The terminal marker as a ready-made line.
pub fn stream_done_line() -> Bytes {
    Bytes::from_static(b"t:{\"type\":\"stream_done\"}\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ToolChannelPayload;

    #[test]
    fn classifies_each_prefix() {
        assert_eq!(
            classify_line(r#"0:"hi""#),
            Classified::Frame {
                channel: Channel::TextDelta,
                payload: r#""hi""#
            }
        );
        assert!(matches!(
            classify_line(r#"t:{"type":"stream_done"}"#),
            Classified::Frame {
                channel: Channel::ToolChannel,
                ..
            }
        ));
        assert!(matches!(
            classify_line(r#"e:{"message":"x"}"#),
            Classified::Frame {
                channel: Channel::ErrorChannel,
                ..
            }
        ));
        assert!(matches!(
            classify_line(r#"f:{"messageId":"m"}"#),
            Classified::Frame {
                channel: Channel::Meta,
                ..
            }
        ));
        assert_eq!(classify_line("   \r"), Classified::Ignored);
        assert_eq!(classify_line("garbage"), Classified::Unknown("garbage"));
    }

    #[test]
    fn text_payload_keeps_escaped_newlines_and_quotes() {
        let frame = decode_line(r#"0:"line one\nsaid \"hi\"""#).expect("decode");
        assert_eq!(frame, Frame::TextDelta("line one\nsaid \"hi\"".into()));
    }

    #[test]
    fn empty_tool_payload_is_a_noop() {
        assert_eq!(decode_line("t:").expect("decode"), Frame::Noop);
        assert_eq!(decode_line("t:   ").expect("decode"), Frame::Noop);
    }

    #[test]
    fn malformed_tool_payload_is_an_error_value() {
        let err = decode_line("t:not json").expect_err("should fail");
        assert!(matches!(
            err,
            WireError::MalformedPayload {
                channel: Channel::ToolChannel,
                ..
            }
        ));
    }

    #[test]
    fn bare_content_part_done_object_is_recognized() {
        let frame = decode_line(
            r#"{"type":"content-part-done","item_id":"msg_1","text":"Full","annotations":[]}"#,
        )
        .expect("decode");
        let Frame::ContentPartDone(part) = frame else {
            panic!("expected content-part-done");
        };
        assert_eq!(part.item_id, "msg_1");
        assert_eq!(part.text, "Full");
    }

    #[test]
    fn other_bare_objects_are_surfaced_as_objects() {
        let frame = decode_line(r#"{"type":"something-else"}"#).expect("decode");
        assert!(matches!(frame, Frame::Object(_)));
    }

    #[test]
    fn encoded_lines_decode_back() {
        let text = encode_text("a \"quoted\"\nline").expect("encode");
        let text = std::str::from_utf8(&text).expect("utf8");
        assert!(text.ends_with('\n'));
        assert_eq!(
            decode_line(text.trim_end_matches('\n')).expect("decode"),
            Frame::TextDelta("a \"quoted\"\nline".into())
        );

        let done = stream_done_line();
        let done = std::str::from_utf8(&done).expect("utf8");
        assert_eq!(
            decode_line(done.trim_end()).expect("decode"),
            Frame::Tool(ToolChannelPayload::StreamDone)
        );
    }
}

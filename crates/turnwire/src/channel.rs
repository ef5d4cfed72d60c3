//! Payload shapes carried on the `f:`, `t:` and `e:` channels, plus the
//! legacy bare `content-part-done` object.
//!
//! Tool-channel payloads are a closed set selected by their `type` field.
//! Decoding goes through [`ToolChannelPayload::decode`], which looks at the
//! discriminator first so an unknown subtype is reported as unrecognized
//! rather than as a parse failure.

use serde::{Deserialize, Serialize};

use crate::errors::WireError;
use crate::event::{CodeStage, FileAnnotation, ToolDescriptor};
use crate::frame::Channel;

/// `type` value of the terminal marker.
pub const STREAM_DONE: &str = "stream_done";
/// `type` value of the legacy full-replacement object.
pub const CONTENT_PART_DONE: &str = "content-part-done";

const KNOWN_TYPES: &[&str] = &[
    "tool_call",
    "tool_list",
    "code_interpreter",
    "reasoning",
    "web_search",
    "text_annotation",
    STREAM_DONE,
];

/// `f:` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaFrame {
    #[serde(rename = "messageId")]
    pub message_id: String,
}

/// `e:` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// `t:` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChannelPayload {
    ToolCall(ToolCallFrame),
    ToolList(ToolListFrame),
    CodeInterpreter(CodeInterpreterFrame),
    Reasoning(ReasoningFrame),
    WebSearch(WebSearchFrame),
    TextAnnotation(TextAnnotationFrame),
    StreamDone,
}

/// Outcome of decoding a `t:` object.
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelDecode {
    Payload(ToolChannelPayload),
    /// Well-formed object whose `type` is outside the closed set (passthrough
    /// families land here on the client).
    Unrecognized(String),
}

impl ToolChannelPayload {
    /// Discriminated decode of a parsed `t:` object.
    ///
    /// Unknown or missing `type` values come back as
    /// [`ChannelDecode::Unrecognized`]; a known type with the wrong field
    /// shapes is a [`WireError::MalformedPayload`].
    pub fn decode(value: serde_json::Value) -> Result<ChannelDecode, WireError> {
        let kind = match value.get("type").and_then(|v| v.as_str()) {
            Some(kind) => kind.to_string(),
            None => return Ok(ChannelDecode::Unrecognized(String::new())),
        };
        if !KNOWN_TYPES.contains(&kind.as_str()) {
            return Ok(ChannelDecode::Unrecognized(kind));
        }
        serde_json::from_value(value)
            .map(ChannelDecode::Payload)
            .map_err(|e| WireError::malformed(Channel::ToolChannel, format!("{kind}: {e}")))
    }
}

/// Tool invocation lifecycle frame. `event` is the raw upstream event name
/// the status is derived from.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFrame {
    pub event: String,
    pub item_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// JSON text of the full arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
    /// JSON text of an arguments fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolListFrame {
    pub event: String,
    pub item_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Stage carried by a code-interpreter frame. `Annotation` frames do not
/// advance the lifecycle of the entry they attach to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeFrameStage {
    InProgress,
    Delta,
    Done,
    Interpreting,
    Completed,
    Annotation,
}

impl CodeFrameStage {
    pub fn lifecycle(self) -> Option<CodeStage> {
        match self {
            CodeFrameStage::InProgress => Some(CodeStage::InProgress),
            CodeFrameStage::Delta => Some(CodeStage::Delta),
            CodeFrameStage::Done => Some(CodeStage::Done),
            CodeFrameStage::Interpreting => Some(CodeStage::Interpreting),
            CodeFrameStage::Completed => Some(CodeStage::Completed),
            CodeFrameStage::Annotation => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CodeInterpreterFrame {
    pub stage: CodeFrameStage,
    pub item_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<FileAnnotation>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningStage {
    Delta,
    Done,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReasoningFrame {
    pub stage: ReasoningStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
}

/// Complete status object for one search; replaces the previous one.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WebSearchFrame {
    pub item_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub raw: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextAnnotationFrame {
    /// Assistant message the annotation belongs to; the current message when
    /// absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    pub annotation: FileAnnotation,
}

/// Legacy bare-object line that replaces an assistant-text entry wholesale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentPartDone {
    #[serde(rename = "type")]
    pub kind: String,
    pub item_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub annotations: Vec<FileAnnotation>,
}

impl ContentPartDone {
    pub fn new(item_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: CONTENT_PART_DONE.to_string(),
            item_id: item_id.into(),
            text: text.into(),
            annotations: Vec::new(),
        }
    }
}

//! Relay side: provider events in, wire frames out.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::StreamExt as _;
use futures::stream::{self, Stream};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::channel::{
    CodeFrameStage, CodeInterpreterFrame, ContentPartDone, ErrorFrame, ReasoningFrame,
    ReasoningStage, TextAnnotationFrame, ToolCallFrame, ToolChannelPayload, ToolListFrame,
    WebSearchFrame,
};
use crate::config::EncoderConfig;
use crate::errors::{UpstreamError, WireError};
use crate::event::{FileAnnotation, ToolDescriptor};
use crate::frame;
use crate::upstream::ProviderEvent;

const PASSTHROUGH_PREFIXES: &[&str] = &["search_progress", "search-progress"];

/// Bookkeeping events that carry nothing the client renders.
const SILENT_EVENTS: &[&str] = &[
    "response.completed",
    "response.queued",
    "response.output_text.done",
    "response.content_part.added",
    "response.reasoning_summary_part.added",
    "response.reasoning_summary_part.done",
];

const FAILURE_EVENTS: &[&str] = &["response.failed", "response.error", "error"];

static HTTP_STATUS: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"(?i)[\s(\[]*\bhttp(?:\s+status)?(?:\s+code)?\s*[:=]?\s*\d{3}\b(?:\s*\([^)]*\))?[)\]]?\.?",
    )
    .map_err(|e| warn!(error = %e, "HTTP status pattern failed to compile; messages pass through unsanitized"))
    .ok()
});

/// Removes raw HTTP status fragments such as
/// `Http status code: 424 (Failed Dependency)` from an upstream message.
pub fn sanitize_message(message: &str) -> String {
    let cleaned = match HTTP_STATUS.as_ref() {
        Some(pattern) => pattern.replace_all(message, ""),
        None => message.into(),
    };
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "upstream request failed".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Serializes one turn of provider events into wire frames.
pub struct Encoder {
    config: EncoderConfig,
    message_id: String,
}

impl Encoder {
    /// Creates an encoder with a fresh message id.
    pub fn new(config: EncoderConfig) -> Self {
        Self {
            config,
            message_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = message_id.into();
        self
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Encodes the event sequence.
    ///
    /// The output always starts with the `f:` frame and always ends with the
    /// `stream_done` marker, on the failure path too. Upstream items after a
    /// failure are not consumed.
    pub fn encode<S>(self, events: S) -> impl Stream<Item = Bytes> + Send
    where
        S: Stream<Item = Result<ProviderEvent, UpstreamError>> + Send + Unpin + 'static,
    {
        struct State<S> {
            writer: FrameWriter,
            events: S,
            pending: VecDeque<Bytes>,
            closed: bool,
        }

        let mut writer = FrameWriter::new(self.config, self.message_id);
        let mut pending = VecDeque::new();
        let mut closed = false;
        match writer.start() {
            Ok(line) => pending.push_back(line),
            Err(failure) => {
                pending.extend(writer.fail(failure));
                closed = true;
            }
        }

        stream::unfold(
            State {
                writer,
                events,
                pending,
                closed,
            },
            |mut state| async move {
                loop {
                    if let Some(line) = state.pending.pop_front() {
                        return Some((line, state));
                    }
                    if state.closed {
                        return None;
                    }
                    match state.events.next().await {
                        Some(Ok(event)) => match state.writer.on_event(&event) {
                            Ok(lines) => state.pending.extend(lines),
                            Err(failure) => {
                                state.pending.extend(state.writer.fail(failure));
                                state.closed = true;
                            }
                        },
                        Some(Err(err)) => {
                            warn!(error = %err, "upstream provider failed mid-stream");
                            let failure = Failure::from(&err);
                            state.pending.extend(state.writer.fail(failure));
                            state.closed = true;
                        }
                        None => {
                            state.pending.extend(state.writer.finish());
                            state.closed = true;
                        }
                    }
                }
            },
        )
    }
}

/// Why the encoder stopped early; becomes the `e:` frame.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Failure {
    message: String,
    details: Option<serde_json::Value>,
}

impl From<&UpstreamError> for Failure {
    fn from(err: &UpstreamError) -> Self {
        Self {
            message: err.message().to_string(),
            details: err.details(),
        }
    }
}

impl From<WireError> for Failure {
    fn from(err: WireError) -> Self {
        Self {
            message: err.to_string(),
            details: Some(serde_json::json!({ "kind": "encoder" })),
        }
    }
}

#[derive(Debug, Default, Clone)]
struct ReasoningMeta {
    effort: Option<String>,
    model: Option<String>,
    service_tier: Option<String>,
    temperature: Option<f64>,
    top_p: Option<f64>,
}

enum Mapped {
    Nothing,
    Text(String),
    Tool(ToolChannelPayload),
    Passthrough(serde_json::Value),
    ContentPartDone(ContentPartDone),
}

/// Synchronous core of the encoder: one provider event in, zero or more
/// lines out.
pub(crate) struct FrameWriter {
    config: EncoderConfig,
    message_id: String,
    text: String,
    reasoning: ReasoningMeta,
    terminated: bool,
}

impl FrameWriter {
    pub(crate) fn new(config: EncoderConfig, message_id: String) -> Self {
        Self {
            config,
            message_id,
            text: String::new(),
            reasoning: ReasoningMeta::default(),
            terminated: false,
        }
    }

    pub(crate) fn start(&mut self) -> Result<Bytes, Failure> {
        Ok(frame::encode_meta(&self.message_id)?)
    }

    pub(crate) fn on_event(&mut self, event: &ProviderEvent) -> Result<Vec<Bytes>, Failure> {
        if self.terminated {
            return Ok(Vec::new());
        }
        let mut lines = Vec::new();
        match self.map_event(event)? {
            Mapped::Nothing => {}
            Mapped::Text(delta) => {
                self.text.push_str(&delta);
                if self.text.len() > self.config.text_flush_threshold || ends_sentence(&delta) {
                    lines.extend(self.flush_text()?);
                }
            }
            Mapped::Tool(payload) => {
                lines.extend(self.flush_text()?);
                lines.push(frame::encode_tool(&payload)?);
            }
            Mapped::Passthrough(value) => {
                lines.extend(self.flush_text()?);
                lines.push(frame::encode_passthrough(&value)?);
            }
            Mapped::ContentPartDone(part) => {
                lines.extend(self.flush_text()?);
                lines.push(frame::encode_content_part_done(&part)?);
            }
        }
        Ok(lines)
    }

    /// Success path: remaining text, then the terminal marker.
    pub(crate) fn finish(&mut self) -> Vec<Bytes> {
        if self.terminated {
            return Vec::new();
        }
        let mut lines = Vec::new();
        match self.flush_text() {
            Ok(text) => lines.extend(text),
            Err(err) => return self.fail(Failure::from(err)),
        }
        self.terminated = true;
        lines.push(frame::stream_done_line());
        lines
    }

    /// Failure path: remaining text, one sanitized `e:` frame, then the
    /// terminal marker.
    pub(crate) fn fail(&mut self, failure: Failure) -> Vec<Bytes> {
        if self.terminated {
            return Vec::new();
        }
        self.terminated = true;
        let mut lines = Vec::new();
        match self.flush_text() {
            Ok(text) => lines.extend(text),
            Err(err) => warn!(error = %err, "dropping buffered text on failure path"),
        }
        let error = ErrorFrame {
            message: sanitize_message(&failure.message),
            details: failure.details,
        };
        match frame::encode_error(&error) {
            Ok(line) => lines.push(line),
            Err(err) => {
                warn!(error = %err, "error frame could not be encoded; using fallback");
                lines.push(Bytes::from_static(b"e:{\"message\":\"stream failed\"}\n"));
            }
        }
        lines.push(frame::stream_done_line());
        lines
    }

    fn flush_text(&mut self) -> Result<Option<Bytes>, WireError> {
        if self.text.is_empty() {
            return Ok(None);
        }
        let text = std::mem::take(&mut self.text);
        frame::encode_text(&text).map(Some)
    }

    fn map_event(&mut self, event: &ProviderEvent) -> Result<Mapped, Failure> {
        let kind = event.kind.as_str();
        if FAILURE_EVENTS.contains(&kind) {
            return Err(failure_from_event(event));
        }
        if PASSTHROUGH_PREFIXES.iter().any(|p| kind.starts_with(p)) {
            let mut body = event.body.clone();
            if let Some(obj) = body.as_object_mut() {
                obj.entry("type")
                    .or_insert_with(|| serde_json::Value::String(kind.to_string()));
            }
            return Ok(Mapped::Passthrough(body));
        }

        let item_id = event.str_field("item_id").unwrap_or_default().to_string();
        let mapped = match kind {
            "response.created" | "response.in_progress" => {
                self.capture_reasoning_meta(event);
                Mapped::Nothing
            }
            "response.output_text.delta" => match event.str_field("delta") {
                Some(delta) if !delta.is_empty() => Mapped::Text(delta.to_string()),
                _ => Mapped::Nothing,
            },
            "response.output_text.annotation.added" => self.map_annotation(event, item_id),
            "response.content_part.done" => self.map_content_part_done(event),
            "response.output_item.added" | "response.output_item.done" => {
                self.map_output_item(event)
            }
            "response.mcp_call_arguments.delta" | "response.function_call_arguments.delta" => {
                Mapped::Tool(ToolChannelPayload::ToolCall(ToolCallFrame {
                    event: kind.to_string(),
                    tool_type: Some(tool_type_for(kind).to_string()),
                    delta: event.str_field("delta").map(str::to_string),
                    item_id,
                    ..ToolCallFrame::default()
                }))
            }
            "response.mcp_call_arguments.done" | "response.function_call_arguments.done" => {
                Mapped::Tool(ToolChannelPayload::ToolCall(ToolCallFrame {
                    event: kind.to_string(),
                    tool_type: Some(tool_type_for(kind).to_string()),
                    arguments: event.str_field("arguments").map(str::to_string),
                    item_id,
                    ..ToolCallFrame::default()
                }))
            }
            k if k.starts_with("response.mcp_call.") => {
                Mapped::Tool(ToolChannelPayload::ToolCall(ToolCallFrame {
                    event: kind.to_string(),
                    tool_type: Some("mcp".to_string()),
                    error: error_text(event.field("error")).map(|e| sanitize_message(&e)),
                    item_id,
                    ..ToolCallFrame::default()
                }))
            }
            k if k.starts_with("response.mcp_list_tools.") => {
                Mapped::Tool(ToolChannelPayload::ToolList(ToolListFrame {
                    event: kind.to_string(),
                    item_id,
                    error: error_text(event.field("error")).map(|e| sanitize_message(&e)),
                    ..ToolListFrame::default()
                }))
            }
            k if k.starts_with("response.code_interpreter_call") => {
                self.map_code_interpreter(event, item_id)
            }
            "response.reasoning_summary_text.delta" => {
                Mapped::Tool(ToolChannelPayload::Reasoning(self.reasoning_frame(
                    ReasoningStage::Delta,
                    event.str_field("delta").map(str::to_string),
                )))
            }
            "response.reasoning_summary_text.done" => Mapped::Tool(
                ToolChannelPayload::Reasoning(self.reasoning_frame(ReasoningStage::Done, None)),
            ),
            k if k.starts_with("response.web_search_call.") => {
                let status = k.rsplit('.').next().unwrap_or(k).to_string();
                Mapped::Tool(ToolChannelPayload::WebSearch(WebSearchFrame {
                    item_id,
                    status,
                    query: event.str_field("query").map(str::to_string),
                    error: error_text(event.field("error")),
                    raw: event.body.clone(),
                }))
            }
            k if SILENT_EVENTS.contains(&k) => Mapped::Nothing,
            other => {
                debug!(event_type = other, "dropping unhandled provider event");
                Mapped::Nothing
            }
        };
        Ok(mapped)
    }

    fn capture_reasoning_meta(&mut self, event: &ProviderEvent) {
        let Some(response) = event.field("response") else {
            return;
        };
        let text = |key: &str| {
            response
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        let meta = &mut self.reasoning;
        meta.model = text("model").or(meta.model.take());
        meta.service_tier = text("service_tier").or(meta.service_tier.take());
        meta.temperature = response
            .get("temperature")
            .and_then(|v| v.as_f64())
            .or(meta.temperature);
        meta.top_p = response
            .get("top_p")
            .and_then(|v| v.as_f64())
            .or(meta.top_p);
        meta.effort = response
            .get("reasoning")
            .and_then(|r| r.get("effort"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or(meta.effort.take());
    }

    fn reasoning_frame(&self, stage: ReasoningStage, delta: Option<String>) -> ReasoningFrame {
        ReasoningFrame {
            stage,
            delta,
            effort: self.reasoning.effort.clone(),
            model: self.reasoning.model.clone(),
            service_tier: self.reasoning.service_tier.clone(),
            temperature: self.reasoning.temperature,
            top_p: self.reasoning.top_p,
        }
    }

    fn map_annotation(&self, event: &ProviderEvent, item_id: String) -> Mapped {
        let Some(annotation) = event
            .field("annotation")
            .and_then(|v| serde_json::from_value::<FileAnnotation>(v.clone()).ok())
        else {
            debug!("annotation event without a readable annotation");
            return Mapped::Nothing;
        };
        if annotation.annotation_type.as_deref() == Some("container_file_citation") {
            return Mapped::Tool(ToolChannelPayload::CodeInterpreter(CodeInterpreterFrame {
                stage: CodeFrameStage::Annotation,
                item_id,
                code: None,
                container_id: annotation.container_id.clone(),
                annotation: Some(annotation),
            }));
        }
        // Upstream item ids differ from the turn's message id; let the
        // decoder attach it to the current message.
        Mapped::Tool(ToolChannelPayload::TextAnnotation(TextAnnotationFrame {
            item_id: None,
            annotation,
        }))
    }

    fn map_content_part_done(&self, event: &ProviderEvent) -> Mapped {
        if !self.config.emit_content_part_done {
            return Mapped::Nothing;
        }
        let Some(part) = event.field("part") else {
            return Mapped::Nothing;
        };
        let text = part
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let mut done = ContentPartDone::new(self.message_id.clone(), text);
        done.annotations = part
            .get("annotations")
            .and_then(|v| serde_json::from_value::<Vec<FileAnnotation>>(v.clone()).ok())
            .unwrap_or_default();
        Mapped::ContentPartDone(done)
    }

    fn map_output_item(&self, event: &ProviderEvent) -> Mapped {
        let Some(item) = event.field("item") else {
            return Mapped::Nothing;
        };
        let item_str = |key: &str| item.get(key).and_then(|v| v.as_str()).map(str::to_string);
        let item_type = item_str("type").unwrap_or_default();
        let item_id = item_str("id").unwrap_or_default();
        let status = item_str("status");
        let item_event = match &status {
            Some(status) => format!("response.{item_type}.{status}"),
            None => event.kind.clone(),
        };

        match item_type.as_str() {
            "mcp_call" | "function_call" => {
                Mapped::Tool(ToolChannelPayload::ToolCall(ToolCallFrame {
                    event: item_event,
                    item_id,
                    tool_type: Some(tool_type_for(&item_type).to_string()),
                    server_label: item_str("server_label"),
                    name: item_str("name"),
                    arguments: item_str("arguments"),
                    delta: None,
                    error: error_text(item.get("error")).map(|e| sanitize_message(&e)),
                }))
            }
            "mcp_list_tools" => {
                let tools = item
                    .get("tools")
                    .and_then(|v| serde_json::from_value::<Vec<ToolDescriptor>>(v.clone()).ok());
                Mapped::Tool(ToolChannelPayload::ToolList(ToolListFrame {
                    event: item_event,
                    item_id,
                    server_label: item_str("server_label"),
                    tools,
                    error: error_text(item.get("error")).map(|e| sanitize_message(&e)),
                }))
            }
            "code_interpreter_call" => {
                let stage = if event.kind.ends_with(".done") {
                    CodeFrameStage::Completed
                } else {
                    CodeFrameStage::InProgress
                };
                Mapped::Tool(ToolChannelPayload::CodeInterpreter(CodeInterpreterFrame {
                    stage,
                    item_id,
                    code: item_str("code"),
                    container_id: item_str("container_id"),
                    annotation: None,
                }))
            }
            "web_search_call" => Mapped::Tool(ToolChannelPayload::WebSearch(WebSearchFrame {
                item_id,
                status: status.unwrap_or_else(|| "in_progress".to_string()),
                query: item
                    .get("action")
                    .and_then(|a| a.get("query"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                error: error_text(item.get("error")),
                raw: item.clone(),
            })),
            _ => Mapped::Nothing,
        }
    }

    fn map_code_interpreter(&self, event: &ProviderEvent, item_id: String) -> Mapped {
        let (stage, code) = match event.kind.as_str() {
            "response.code_interpreter_call_code.delta" => {
                (CodeFrameStage::Delta, event.str_field("delta"))
            }
            "response.code_interpreter_call_code.done" => {
                (CodeFrameStage::Done, event.str_field("code"))
            }
            "response.code_interpreter_call.in_progress" => (CodeFrameStage::InProgress, None),
            "response.code_interpreter_call.interpreting" => (CodeFrameStage::Interpreting, None),
            "response.code_interpreter_call.completed" => (CodeFrameStage::Completed, None),
            other => {
                debug!(event_type = other, "dropping unhandled code interpreter event");
                return Mapped::Nothing;
            }
        };
        Mapped::Tool(ToolChannelPayload::CodeInterpreter(CodeInterpreterFrame {
            stage,
            item_id,
            code: code.map(str::to_string),
            container_id: event.str_field("container_id").map(str::to_string),
            annotation: None,
        }))
    }
}

fn tool_type_for(kind: &str) -> &'static str {
    if kind.contains("function_call") {
        "function"
    } else {
        "mcp"
    }
}

fn ends_sentence(delta: &str) -> bool {
    matches!(delta.chars().last(), Some('.' | '!' | '?' | '\n'))
}

/// Error payloads show up both as plain strings and as `{message: ..}`
/// objects.
fn error_text(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Object(obj) => obj
            .get("message")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        _ => None,
    }
}

fn failure_from_event(event: &ProviderEvent) -> Failure {
    let message = event
        .field("response")
        .and_then(|r| error_text(r.get("error")))
        .or_else(|| error_text(event.field("error")))
        .or_else(|| event.str_field("message").map(str::to_string))
        .unwrap_or_else(|| "upstream provider reported a failure".to_string());
    let details = event
        .field("response")
        .and_then(|r| r.get("error"))
        .or_else(|| event.field("error"))
        .cloned()
        .or_else(|| event.str_field("code").map(|c| serde_json::json!({ "code": c })));
    Failure { message, details }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ev(body: serde_json::Value) -> Result<ProviderEvent, UpstreamError> {
        Ok(ProviderEvent::from_json(body).expect("typed event"))
    }

    async fn encode_lines(
        config: EncoderConfig,
        events: Vec<Result<ProviderEvent, UpstreamError>>,
    ) -> Vec<String> {
        Encoder::new(config)
            .with_message_id("msg_turn")
            .encode(stream::iter(events))
            .map(|line| String::from_utf8(line.to_vec()).expect("utf8"))
            .collect()
            .await
    }

    fn text_delta(delta: &str) -> Result<ProviderEvent, UpstreamError> {
        ev(json!({"type": "response.output_text.delta", "item_id": "msg_up", "delta": delta}))
    }

    #[tokio::test]
    async fn success_path_is_framed_by_meta_and_stream_done() {
        let lines = encode_lines(
            EncoderConfig::default(),
            vec![text_delta("Hel"), text_delta("lo"), text_delta(" world.")],
        )
        .await;
        assert_eq!(
            lines,
            vec![
                "f:{\"messageId\":\"msg_turn\"}\n",
                "0:\"Hello world.\"\n",
                "t:{\"type\":\"stream_done\"}\n",
            ]
        );
    }

    #[tokio::test]
    async fn leftover_text_is_flushed_before_close() {
        let lines = encode_lines(EncoderConfig::default(), vec![text_delta("no punctuation")]).await;
        assert_eq!(lines[1], "0:\"no punctuation\"\n");
        assert_eq!(lines.last().map(String::as_str), Some("t:{\"type\":\"stream_done\"}\n"));
    }

    #[tokio::test]
    async fn size_threshold_flushes_without_punctuation() {
        let lines = encode_lines(
            EncoderConfig::default().text_flush_threshold(4),
            vec![text_delta("ab"), text_delta("cd"), text_delta("e"), text_delta("f")],
        )
        .await;
        assert_eq!(lines[1], "0:\"abcde\"\n");
        assert_eq!(lines[2], "0:\"f\"\n");
    }

    #[tokio::test]
    async fn text_is_flushed_before_tool_frames() {
        let lines = encode_lines(
            EncoderConfig::default(),
            vec![
                text_delta("Let me check"),
                ev(json!({"type": "response.mcp_call.in_progress", "item_id": "mcp_1"})),
            ],
        )
        .await;
        assert_eq!(lines[1], "0:\"Let me check\"\n");
        assert!(lines[2].starts_with("t:{\"type\":\"tool_call\""));
        assert!(lines[2].contains("\"event\":\"response.mcp_call.in_progress\""));
    }

    #[tokio::test]
    async fn upstream_error_emits_sanitized_error_then_stream_done_and_stops() {
        let lines = encode_lines(
            EncoderConfig::default(),
            vec![
                text_delta("partial"),
                Err(UpstreamError::provider(
                    "Error retrieving tool list from MCP server: 'docs'. Http status code: 424 (Failed Dependency)",
                    Some(424),
                )),
                text_delta("never sent."),
            ],
        )
        .await;
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "0:\"partial\"\n");
        assert!(lines[2].starts_with("e:"));
        let error: ErrorFrame =
            serde_json::from_str(lines[2].trim_end().trim_start_matches("e:")).expect("error frame");
        assert_eq!(
            error.message,
            "Error retrieving tool list from MCP server: 'docs'."
        );
        assert_eq!(error.details, Some(json!({"kind": "provider", "status_code": 424})));
        assert_eq!(lines[3], "t:{\"type\":\"stream_done\"}\n");
    }

    #[tokio::test]
    async fn response_failed_event_takes_failure_path() {
        let lines = encode_lines(
            EncoderConfig::default(),
            vec![ev(json!({
                "type": "response.failed",
                "response": {"error": {"code": "server_error", "message": "model overloaded"}}
            }))],
        )
        .await;
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("model overloaded"));
        assert_eq!(
            lines.iter().filter(|l| l.contains("stream_done")).count(),
            1
        );
    }

    #[tokio::test]
    async fn passthrough_events_are_forwarded_verbatim_and_unknown_dropped() {
        let lines = encode_lines(
            EncoderConfig::default(),
            vec![
                ev(json!({"type": "search_progress.update", "pct": 40})),
                ev(json!({"type": "response.some_future_event", "x": 1})),
            ],
        )
        .await;
        assert_eq!(lines.len(), 3);
        let forwarded: serde_json::Value =
            serde_json::from_str(lines[1].trim_end().trim_start_matches("t:")).expect("json");
        assert_eq!(forwarded, json!({"type": "search_progress.update", "pct": 40}));
    }

    #[tokio::test]
    async fn content_part_done_is_gated_and_rewritten_to_turn_message_id() {
        let part = || {
            ev(json!({
                "type": "response.content_part.done",
                "item_id": "msg_up",
                "part": {"type": "output_text", "text": "Final.", "annotations": []}
            }))
        };
        let off = encode_lines(EncoderConfig::default(), vec![part()]).await;
        assert_eq!(off.len(), 2);

        let on = encode_lines(EncoderConfig::default().emit_content_part_done(true), vec![part()]).await;
        assert_eq!(
            on[1],
            "{\"type\":\"content-part-done\",\"item_id\":\"msg_turn\",\"text\":\"Final.\",\"annotations\":[]}\n"
        );
    }

    #[tokio::test]
    async fn reasoning_frames_carry_metadata_from_response_created() {
        let lines = encode_lines(
            EncoderConfig::default(),
            vec![
                ev(json!({
                    "type": "response.created",
                    "response": {"model": "o4-mini", "service_tier": "default", "temperature": 1.0,
                                 "top_p": 1.0, "reasoning": {"effort": "high"}}
                })),
                ev(json!({"type": "response.reasoning_summary_text.delta", "delta": "Plan"})),
            ],
        )
        .await;
        let frame: serde_json::Value =
            serde_json::from_str(lines[1].trim_end().trim_start_matches("t:")).expect("json");
        assert_eq!(frame["type"], "reasoning");
        assert_eq!(frame["stage"], "delta");
        assert_eq!(frame["effort"], "high");
        assert_eq!(frame["model"], "o4-mini");
    }

    #[tokio::test]
    async fn container_file_citation_becomes_code_interpreter_annotation() {
        let lines = encode_lines(
            EncoderConfig::default(),
            vec![ev(json!({
                "type": "response.output_text.annotation.added",
                "item_id": "msg_abc12345",
                "annotation": {"type": "container_file_citation", "container_id": "cntr_1",
                               "file_id": "cfile_1", "filename": "plot.png"}
            }))],
        )
        .await;
        let frame: serde_json::Value =
            serde_json::from_str(lines[1].trim_end().trim_start_matches("t:")).expect("json");
        assert_eq!(frame["type"], "code_interpreter");
        assert_eq!(frame["stage"], "annotation");
        assert_eq!(frame["item_id"], "msg_abc12345");
        assert_eq!(frame["annotation"]["filename"], "plot.png");
    }

    #[test]
    fn http_status_pattern_compiles() {
        assert!(HTTP_STATUS.is_some());
    }

    #[test]
    fn sanitize_strips_status_fragments_only() {
        assert_eq!(sanitize_message("tool failed (HTTP 500)"), "tool failed");
        assert_eq!(
            sanitize_message("server said no. HTTP status 502"),
            "server said no."
        );
        assert_eq!(sanitize_message("plain message"), "plain message");
        assert_eq!(sanitize_message("Http status code: 404"), "upstream request failed");
    }
}

//! The ordered event log and the per-family merge rules.
//!
//! Entries keep their first-seen position; merges always update in place.
//! Lookups are linear scans over the current collection.

use chrono::Utc;
use tracing::{debug, warn};

use crate::channel::{
    CodeFrameStage, CodeInterpreterFrame, ContentPartDone, ReasoningFrame, ReasoningStage,
    TextAnnotationFrame, ToolCallFrame, ToolListFrame, WebSearchFrame,
};
use crate::event::{
    AssistantText, CodeInterpreter, ErrorEvent, FileAnnotation, Reasoning, StreamEvent, ToolCall,
    ToolList, ToolStatus, UserText, WebSearch,
};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventLog {
    events: Vec<StreamEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[StreamEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn push_user_text(&mut self, id: impl Into<String>, content: impl Into<String>) {
        self.events.push(StreamEvent::UserText(UserText {
            id: id.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }));
    }

    pub fn push_error(&mut self, message: impl Into<String>, details: Option<serde_json::Value>) {
        self.events.push(StreamEvent::Error(ErrorEvent {
            message: message.into(),
            details,
        }));
    }

    /// The assistant-text entry for `id`, appended at the end when absent.
    fn assistant_text_mut(&mut self, id: &str) -> Option<&mut AssistantText> {
        let known = self
            .events
            .iter()
            .any(|e| matches!(e, StreamEvent::AssistantText(t) if t.id == id));
        if !known {
            self.events.push(StreamEvent::AssistantText(AssistantText {
                id: id.to_string(),
                ..AssistantText::default()
            }));
        }
        self.events.iter_mut().find_map(|e| match e {
            StreamEvent::AssistantText(text) if text.id == id => Some(text),
            _ => None,
        })
    }

    /// Appends coalesced text to the message, creating it if absent.
    pub fn append_text(&mut self, message_id: &str, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(entry) = self.assistant_text_mut(message_id) {
            entry.content.push_str(text);
        }
    }

    /// Legacy full replacement of an assistant message, annotations included.
    pub fn replace_text(&mut self, part: ContentPartDone) {
        if let Some(entry) = self.assistant_text_mut(&part.item_id) {
            entry.content = part.text;
            entry.annotations = part.annotations;
        }
    }

    pub fn append_text_annotation(&mut self, message_id: &str, annotation: FileAnnotation) {
        if let Some(entry) = self.assistant_text_mut(message_id) {
            entry.annotations.push(annotation);
        }
    }

    /// Frames without an `item_id` belong to the message being streamed.
    pub fn merge_text_annotation(&mut self, current_message_id: &str, frame: TextAnnotationFrame) {
        let target = frame.item_id.as_deref().unwrap_or(current_message_id);
        if let Some(entry) = self.assistant_text_mut(target) {
            entry.annotations.push(frame.annotation);
        }
    }

    pub fn merge_tool_call(&mut self, frame: ToolCallFrame) {
        let status = ToolStatus::from_event_type(&frame.event);
        let arguments = frame.arguments.as_deref().map(decode_json_fragment);
        let delta = frame.delta.as_deref().map(decode_json_fragment);
        let existing = self.events.iter_mut().find_map(|e| match e {
            StreamEvent::ToolCall(call) if call.id == frame.item_id => Some(call),
            _ => None,
        });
        match existing {
            Some(call) => {
                overwrite(&mut call.tool_type, frame.tool_type);
                overwrite(&mut call.server_label, frame.server_label);
                overwrite(&mut call.name, frame.name);
                overwrite(&mut call.error, frame.error);
                overwrite_json(&mut call.arguments, arguments);
                overwrite_json(&mut call.delta, delta);
                call.status = status;
            }
            None => self.events.push(StreamEvent::ToolCall(ToolCall {
                id: frame.item_id,
                tool_type: non_empty(frame.tool_type),
                server_label: non_empty(frame.server_label),
                name: non_empty(frame.name),
                arguments: arguments.unwrap_or_else(empty_object),
                delta: delta.unwrap_or_else(empty_object),
                error: non_empty(frame.error),
                status,
            })),
        }
    }

    pub fn merge_tool_list(&mut self, frame: ToolListFrame) {
        let status = ToolStatus::from_event_type(&frame.event);
        let existing = self.events.iter_mut().find_map(|e| match e {
            StreamEvent::ToolList(list) if list.id == frame.item_id => Some(list),
            _ => None,
        });
        match existing {
            Some(list) => {
                overwrite(&mut list.server_label, frame.server_label);
                overwrite(&mut list.error, frame.error);
                if let Some(tools) = frame.tools.filter(|tools| !tools.is_empty()) {
                    list.tools = tools;
                }
                list.status = status;
            }
            None => self.events.push(StreamEvent::ToolList(ToolList {
                id: frame.item_id,
                server_label: non_empty(frame.server_label),
                tools: frame.tools.unwrap_or_default(),
                error: non_empty(frame.error),
                status,
            })),
        }
    }

    /// Folds a code-interpreter frame into its entry.
    ///
    /// `delta` appends the fragment, `done` replaces the code with the full
    /// text. `annotation` frames are routed to
    /// [`EventLog::attach_code_annotation`].
    pub fn merge_code_interpreter(&mut self, frame: CodeInterpreterFrame, suffix_len: usize) {
        let Some(stage) = frame.stage.lifecycle() else {
            debug_assert_eq!(frame.stage, CodeFrameStage::Annotation);
            match frame.annotation {
                Some(annotation) => self.attach_code_annotation(&frame.item_id, annotation, suffix_len),
                None => debug!(item_id = %frame.item_id, "code interpreter annotation frame without annotation"),
            }
            return;
        };
        let existing = self.events.iter_mut().find_map(|e| match e {
            StreamEvent::CodeInterpreter(ci) if ci.id == frame.item_id => Some(ci),
            _ => None,
        });
        match existing {
            Some(ci) => {
                match (frame.stage, frame.code) {
                    (CodeFrameStage::Delta, Some(fragment)) => ci.code.push_str(&fragment),
                    (CodeFrameStage::Done, Some(full)) => ci.code = full,
                    (_, Some(code)) if !code.is_empty() => ci.code = code,
                    _ => {}
                }
                overwrite(&mut ci.container_id, frame.container_id);
                if frame.annotation.is_some() {
                    ci.annotation = frame.annotation;
                }
                ci.stage = stage;
            }
            None => self
                .events
                .push(StreamEvent::CodeInterpreter(CodeInterpreter {
                    id: frame.item_id,
                    stage,
                    code: frame.code.unwrap_or_default(),
                    container_id: non_empty(frame.container_id),
                    annotation: frame.annotation,
                })),
        }
    }

    /// Attaches a file annotation to the code-interpreter entry whose id
    /// shares the last `suffix_len` characters with `annotation_id`.
    ///
    /// The most recent matching entry wins. Unmatched annotations are
    /// dropped.
    pub fn attach_code_annotation(
        &mut self,
        annotation_id: &str,
        annotation: FileAnnotation,
        suffix_len: usize,
    ) {
        let wanted = id_suffix(annotation_id, suffix_len);
        let target = self.events.iter_mut().rev().find_map(|e| match e {
            StreamEvent::CodeInterpreter(ci)
                if ci.id == annotation_id || id_suffix(&ci.id, suffix_len) == wanted =>
            {
                Some(ci)
            }
            _ => None,
        });
        match target {
            Some(ci) => ci.annotation = Some(annotation),
            None => {
                warn!(annotation_id, suffix = wanted, "no code interpreter entry for file annotation; dropping it");
            }
        }
    }

    /// Delta frames grow the latest open reasoning entry (or start one);
    /// done frames close the latest entry without touching its summary.
    pub fn merge_reasoning(&mut self, frame: ReasoningFrame) {
        let latest = self.events.iter_mut().rev().find_map(|e| match e {
            StreamEvent::Reasoning(r) => Some(r),
            _ => None,
        });
        match frame.stage {
            ReasoningStage::Delta => {
                let delta = frame.delta.clone().unwrap_or_default();
                match latest {
                    Some(r) if !r.done => {
                        r.summary.push_str(&delta);
                        apply_reasoning_meta(r, &frame);
                    }
                    _ => {
                        let mut r = Reasoning {
                            summary: delta,
                            ..Reasoning::default()
                        };
                        apply_reasoning_meta(&mut r, &frame);
                        self.events.push(StreamEvent::Reasoning(r));
                    }
                }
            }
            ReasoningStage::Done => match latest {
                Some(r) => {
                    r.done = true;
                    apply_reasoning_meta(r, &frame);
                }
                None => debug!("reasoning done frame with no reasoning entry"),
            },
        }
    }

    /// Web-search frames carry the complete status object, so the entry is
    /// replaced rather than merged.
    pub fn merge_web_search(&mut self, frame: WebSearchFrame) {
        let replacement = WebSearch {
            id: frame.item_id,
            status: frame.status,
            query: frame.query,
            error: frame.error,
            raw: frame.raw,
        };
        let existing = self.events.iter_mut().find_map(|e| match e {
            StreamEvent::WebSearch(search) if search.id == replacement.id => Some(search),
            _ => None,
        });
        match existing {
            Some(search) => *search = replacement,
            None => self.events.push(StreamEvent::WebSearch(replacement)),
        }
    }
}

fn apply_reasoning_meta(reasoning: &mut Reasoning, frame: &ReasoningFrame) {
    overwrite(&mut reasoning.effort, frame.effort.clone());
    overwrite(&mut reasoning.model, frame.model.clone());
    overwrite(&mut reasoning.service_tier, frame.service_tier.clone());
    if frame.temperature.is_some() {
        reasoning.temperature = frame.temperature;
    }
    if frame.top_p.is_some() {
        reasoning.top_p = frame.top_p;
    }
}

fn id_suffix(id: &str, len: usize) -> &str {
    let count = id.chars().count();
    if len == 0 || count <= len {
        return id;
    }
    let skip = id
        .char_indices()
        .nth(count - len)
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    &id[skip..]
}

/// Arguments and deltas travel as JSON text; partial fragments that do not
/// parse become an empty object.
fn decode_json_fragment(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return empty_object();
    }
    serde_json::from_str(raw).unwrap_or_else(|_| empty_object())
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn is_empty_json(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        serde_json::Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn overwrite(slot: &mut Option<String>, incoming: Option<String>) {
    if let Some(value) = non_empty(incoming) {
        *slot = Some(value);
    }
}

fn overwrite_json(slot: &mut serde_json::Value, incoming: Option<serde_json::Value>) {
    if let Some(value) = incoming.filter(|v| !is_empty_json(v)) {
        *slot = value;
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of the decoded event log.
///
/// Every entry that describes an in-progress item carries the correlation id
/// shared by all frames about that item; mergers look entries up by it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StreamEvent {
    AssistantText(AssistantText),
    UserText(UserText),
    ToolCall(ToolCall),
    ToolList(ToolList),
    CodeInterpreter(CodeInterpreter),
    Reasoning(Reasoning),
    WebSearch(WebSearch),
    Error(ErrorEvent),
}

/// File reference attached to assistant text or to code-interpreter output.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FileAnnotation {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub annotation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_index: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_index: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantText {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub annotations: Vec<FileAnnotation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserText {
    pub id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Lifecycle of a tool call or tool listing, derived from the raw event name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Failed,
    #[default]
    InProgress,
    Completed,
    ArgumentsDone,
    Done,
    ArgumentsDelta,
}

impl ToolStatus {
    /// Derives the status from a raw event type such as
    /// `response.mcp_call_arguments.delta`.
    ///
    /// Matching is by substring in fixed precedence, so
    /// `response.mcp_call.failed` is `Failed` even though it also ends a call.
    pub fn from_event_type(raw: &str) -> Self {
        let normalized = raw.to_ascii_lowercase().replace(['.', '-'], "_");
        if normalized.contains("failed") {
            ToolStatus::Failed
        } else if normalized.contains("in_progress") {
            ToolStatus::InProgress
        } else if normalized.contains("completed") {
            ToolStatus::Completed
        } else if normalized.contains("arguments_done") {
            ToolStatus::ArgumentsDone
        } else if normalized.contains("done") {
            ToolStatus::Done
        } else if normalized.contains("arguments_delta") {
            ToolStatus::ArgumentsDelta
        } else {
            ToolStatus::InProgress
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub tool_type: Option<String>,
    pub server_label: Option<String>,
    pub name: Option<String>,
    pub arguments: serde_json::Value,
    pub delta: serde_json::Value,
    pub error: Option<String>,
    pub status: ToolStatus,
}

/// One tool advertised by a tool server.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub input_schema: serde_json::Value,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolList {
    pub id: String,
    pub server_label: Option<String>,
    pub tools: Vec<ToolDescriptor>,
    pub error: Option<String>,
    pub status: ToolStatus,
}

/// Lifecycle stage of a code-interpreter invocation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeStage {
    #[default]
    InProgress,
    Delta,
    Done,
    Interpreting,
    Completed,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeInterpreter {
    pub id: String,
    pub stage: CodeStage,
    pub code: String,
    pub container_id: Option<String>,
    pub annotation: Option<FileAnnotation>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Reasoning {
    pub effort: Option<String>,
    pub summary: String,
    pub model: Option<String>,
    pub service_tier: Option<String>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub done: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WebSearch {
    pub id: String,
    pub status: String,
    pub query: Option<String>,
    pub error: Option<String>,
    pub raw: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Where a decode session stands. Exactly one holds at a time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    #[default]
    Idle,
    Streaming,
    Completed,
    /// The body ended without a `stream_done` marker; the response may be
    /// incomplete.
    TimedOut,
    Cancelled,
    Errored,
}

impl TurnState {
    pub fn is_streaming(self) -> bool {
        matches!(self, TurnState::Streaming)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TurnState::Completed | TurnState::TimedOut | TurnState::Cancelled | TurnState::Errored
        )
    }
}

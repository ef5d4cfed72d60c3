//! Client side: reads a wire body and folds it into the event log.

use futures::StreamExt as _;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::channel::ToolChannelPayload;
use crate::coalescer::{TextBatch, TextCoalescer};
use crate::config::DecoderConfig;
use crate::event::{StreamEvent, TurnState};
use crate::frame::{self, Frame};
use crate::merge::EventLog;
use crate::transport::WireResponse;

/// Message id used for text that arrives before any `f:` frame.
pub const DEFAULT_MESSAGE_ID: &str = "assistant";

const READ_FAILED: &str = "stream read failed";

/// Handle used to cancel a turn from another task.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation. The driver stops at its next line or read.
    ///
    /// The flag is stored even while no turn is running, so an abort issued
    /// before `begin` cancels that turn.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Read-only view of a turn handed to renderers.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TurnSnapshot {
    pub state: TurnState,
    pub events: Vec<StreamEvent>,
    pub request_id: Option<String>,
}

/// Splits chunks into lines, carrying partial lines and split UTF-8
/// sequences over to the next chunk.
#[derive(Debug, Default)]
struct LineBuffer {
    partial: String,
    carry: Vec<u8>,
}

impl LineBuffer {
    fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        self.carry.extend_from_slice(chunk);
        let bytes = std::mem::take(&mut self.carry);
        let boundary = complete_prefix_len(&bytes);
        self.partial
            .push_str(&String::from_utf8_lossy(&bytes[..boundary]));
        self.carry = bytes[boundary..].to_vec();

        let mut lines = Vec::new();
        while let Some(pos) = self.partial.find('\n') {
            let mut line: String = self.partial.drain(..=pos).collect();
            line.pop();
            lines.push(line);
        }
        lines
    }

    /// The unterminated tail left when the body ends.
    fn finish(&mut self) -> Option<String> {
        let carry = std::mem::take(&mut self.carry);
        self.partial.push_str(&String::from_utf8_lossy(&carry));
        let rest = std::mem::take(&mut self.partial);
        (!rest.is_empty()).then_some(rest)
    }

    fn clear(&mut self) {
        self.partial.clear();
        self.carry.clear();
    }
}

/// Length of `bytes` without a trailing, still incomplete UTF-8 sequence.
fn complete_prefix_len(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(3) {
        let byte = bytes[len - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let needed = match byte {
            0xF0..=0xFF => 4,
            0xE0..=0xEF => 3,
            0xC0..=0xDF => 2,
            _ => 1,
        };
        return if needed > back { len - back } else { len };
    }
    len
}

/// Drives one turn: owns the read loop, the coalescer and the event log.
pub struct StreamDriver {
    config: DecoderConfig,
    log: EventLog,
    state: TurnState,
    request_id: Option<String>,
    user_text: Option<String>,
    lines: LineBuffer,
    coalescer: TextCoalescer,
    message_id: String,
    completion_observed: bool,
    /// The log changed since the last published snapshot.
    dirty: bool,
    abort_tx: watch::Sender<bool>,
    snapshot_tx: watch::Sender<TurnSnapshot>,
}

impl StreamDriver {
    pub fn new(config: DecoderConfig) -> Self {
        let (abort_tx, _) = watch::channel(false);
        let (snapshot_tx, _) = watch::channel(TurnSnapshot::default());
        let coalescer = TextCoalescer::new(config.coalesce_window);
        Self {
            config,
            log: EventLog::new(),
            state: TurnState::Idle,
            request_id: None,
            user_text: None,
            lines: LineBuffer::default(),
            coalescer,
            message_id: DEFAULT_MESSAGE_ID.to_string(),
            completion_observed: false,
            dirty: false,
            abort_tx,
            snapshot_tx,
        }
    }

    /// Seeds a `user-text` entry at the start of the next turn.
    pub fn with_user_text(mut self, content: impl Into<String>) -> Self {
        self.user_text = Some(content.into());
        self
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            tx: self.abort_tx.clone(),
        }
    }

    /// Same as [`AbortHandle::abort`].
    pub fn cancel(&self) {
        self.abort_tx.send_replace(true);
    }

    /// Receives a fresh snapshot after every state transition and after
    /// every chunk or coalescer flush that changed the log.
    pub fn subscribe(&self) -> watch::Receiver<TurnSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> TurnSnapshot {
        TurnSnapshot {
            state: self.state,
            events: self.log.events().to_vec(),
            request_id: self.request_id.clone(),
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn events(&self) -> &[StreamEvent] {
        self.log.events()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Back to `idle` with an empty log. Also lifts a previous cancellation.
    pub fn clear(&mut self) {
        self.reset_turn();
        self.request_id = None;
        self.abort_tx.send_replace(false);
        self.state = TurnState::Idle;
        self.publish();
    }

    /// Runs the turn to a terminal state.
    pub async fn begin(&mut self, response: WireResponse) -> TurnState {
        self.reset_turn();
        self.request_id = response.request_id.clone();
        if let Some(content) = self.user_text.take() {
            self.log
                .push_user_text(uuid::Uuid::new_v4().to_string(), content);
        }

        if !response.is_success() {
            let message = format!(
                "Request failed with status {} {}",
                response.status, response.status_text
            );
            warn!(status = response.status, request_id = ?self.request_id, "wire request rejected");
            self.log.push_error(message.trim_end(), None);
            return self.transition(TurnState::Errored);
        }
        let Some(mut body) = response.body else {
            warn!(request_id = ?self.request_id, "wire response has no readable body");
            self.log.push_error("Response body is not readable", None);
            return self.transition(TurnState::Errored);
        };

        self.transition(TurnState::Streaming);
        let mut abort_rx = self.abort_tx.subscribe();
        loop {
            if *abort_rx.borrow() {
                return self.cancelled();
            }
            let deadline = self.coalescer.deadline();
            tokio::select! {
                biased;
                _ = aborted(&mut abort_rx) => {
                    return self.cancelled();
                }
                _ = until(deadline) => {
                    self.flush_text();
                    self.publish_if_changed();
                }
                next = body.next() => match next {
                    Some(Ok(chunk)) => {
                        for line in self.lines.push_chunk(&chunk) {
                            if *abort_rx.borrow() {
                                return self.cancelled();
                            }
                            self.process_line(&line);
                        }
                        self.publish_if_changed();
                    }
                    Some(Err(err)) => {
                        self.flush_text();
                        let message = err.to_string();
                        let message = if message.is_empty() { READ_FAILED.to_string() } else { message };
                        warn!(error = %message, "wire body read failed");
                        self.log.push_error(message, None);
                        return self.transition(TurnState::Errored);
                    }
                    None => {
                        if let Some(line) = self.lines.finish() {
                            self.process_line(&line);
                        }
                        self.flush_text();
                        let state = if self.completion_observed {
                            TurnState::Completed
                        } else {
                            TurnState::TimedOut
                        };
                        return self.transition(state);
                    }
                },
            }
        }
    }

    fn reset_turn(&mut self) {
        self.log.clear();
        self.lines.clear();
        self.coalescer.clear();
        self.message_id = DEFAULT_MESSAGE_ID.to_string();
        self.completion_observed = false;
    }

    fn cancelled(&mut self) -> TurnState {
        self.lines.clear();
        self.coalescer.clear();
        info!(request_id = ?self.request_id, "turn cancelled");
        self.transition(TurnState::Cancelled)
    }

    fn transition(&mut self, state: TurnState) -> TurnState {
        debug!(from = ?self.state, to = ?state, "turn state transition");
        self.state = state;
        self.publish();
        state
    }

    fn publish(&mut self) {
        self.dirty = false;
        self.snapshot_tx.send_replace(self.snapshot());
    }

    fn publish_if_changed(&mut self) {
        if self.dirty {
            self.publish();
        }
    }

    fn flush_text(&mut self) {
        if let Some(batch) = self.coalescer.flush() {
            self.apply_text(batch);
        }
    }

    fn apply_text(&mut self, batch: TextBatch) {
        self.log.append_text(&batch.message_id, &batch.text);
        self.dirty = true;
    }

    fn process_line(&mut self, line: &str) {
        let frame = match frame::decode_line(line) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "skipping undecodable line");
                return;
            }
        };
        match frame {
            Frame::Noop => {}
            Frame::Meta(meta) => self.message_id = meta.message_id,
            Frame::TextDelta(text) => {
                if let Some(batch) = self.coalescer.push(&self.message_id, &text) {
                    self.apply_text(batch);
                }
            }
            Frame::Tool(payload) => self.apply_tool(payload),
            Frame::UnrecognizedTool(kind) => {
                debug!(tool_type = %kind, "ignoring unrecognized tool-channel frame");
            }
            Frame::Error(error) => {
                self.flush_text();
                self.log.push_error(error.message, error.details);
                self.dirty = true;
            }
            Frame::ContentPartDone(part) => {
                self.flush_text();
                self.log.replace_text(part);
                self.dirty = true;
            }
            Frame::Object(_) => debug!("ignoring bare JSON object line"),
        }
    }

    /// Pending text is applied first so it keeps its place ahead of the
    /// frame that followed it on the wire.
    fn apply_tool(&mut self, payload: ToolChannelPayload) {
        self.flush_text();
        match payload {
            ToolChannelPayload::StreamDone => {
                self.completion_observed = true;
                return;
            }
            ToolChannelPayload::ToolCall(frame) => self.log.merge_tool_call(frame),
            ToolChannelPayload::ToolList(frame) => self.log.merge_tool_list(frame),
            ToolChannelPayload::CodeInterpreter(frame) => self
                .log
                .merge_code_interpreter(frame, self.config.annotation_suffix_len),
            ToolChannelPayload::Reasoning(frame) => self.log.merge_reasoning(frame),
            ToolChannelPayload::WebSearch(frame) => self.log.merge_web_search(frame),
            ToolChannelPayload::TextAnnotation(frame) => {
                self.log.merge_text_annotation(&self.message_id, frame)
            }
        }
        self.dirty = true;
    }
}

/// Resolves once cancellation is requested.
async fn aborted(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|flag| *flag).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

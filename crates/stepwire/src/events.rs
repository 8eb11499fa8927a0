//! Session events and the emitter interface they are delivered through.
//!
//! The orchestrator produces an ordered stream of [`AgentEvent`] values per
//! session and hands each one to a shared [`EventEmitter`], addressed by
//! [`SessionId`]. Emission is fire-and-forget: an emitter must not block and
//! the orchestrator never waits for delivery.
//!
//! # Choosing an emitter
//!
//! | Emitter | Use case |
//! |---------|----------|
//! | [`NoopEmitter`] | Tests or headless runs |
//! | [`LoggingEmitter`] | Structured logging via `tracing` |
//! | [`FnEmitter`] | Quick closures for simple callbacks |
//! | [`ChannelEmitter`] | One unbounded channel per subscribed session |
//! | [`CompositeEmitter`] | Fan out to several emitters in order |
//! | Custom `impl EventEmitter` | Transports (WebSocket, SSE, ...) |

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::id::SessionId;
use crate::session::workspace::FileInfo;

// ── Events ─────────────────────────────────────────────────────────

/// Why a run reached `completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// The agent loop reported that the task is done.
    TaskDone,
    /// The run used up its `max_steps` budget.
    StepLimit,
}

/// A lifecycle notification for one session.
///
/// Serializes as `{"event": <kind>, "data": {...}}`, so the JSON form can be
/// forwarded to clients as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum AgentEvent {
    /// The session was created for a newly connected client.
    Connected {
        session_id: SessionId,
        agent_version: String,
        api_provider: String,
        output_dir: Option<String>,
    },
    /// A run was launched.
    AgentStarted {
        instruction: String,
        max_steps: u32,
        auto_continue: u32,
        output_dir: Option<String>,
    },
    /// A new step is about to be requested from the loop.
    StepStart { step: u32, max_steps: u32 },
    /// The step produced assistant text.
    AssistantMessage { step: u32, content: String },
    /// The step invoked a tool.
    ToolCall {
        step: u32,
        function_name: String,
        function_args: serde_json::Value,
        result: String,
    },
    /// The step produced a summary line.
    StepSummary { step: u32, summary: String },
    /// The loop is blocked until the user supplies input.
    WaitingForInput { prompt: String },
    /// The task finished, either by the loop's own signal or by the step cap.
    TaskCompleted {
        message: String,
        reason: CompletionReason,
    },
    /// The run is over and the session is idle again.
    AgentFinished { message: String, steps: u32 },
    /// The agent loop failed; the run is over.
    AgentError { error: String },
    /// The run observed a stop request and ended.
    Stopped { message: String },
    /// The agent created a file in the session output directory.
    FileCreated { file: FileInfo },
}

/// The discriminant of an [`AgentEvent`], as sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    AgentStarted,
    StepStart,
    AssistantMessage,
    ToolCall,
    StepSummary,
    WaitingForInput,
    TaskCompleted,
    AgentFinished,
    AgentError,
    Stopped,
    FileCreated,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::AgentStarted => "agent_started",
            Self::StepStart => "step_start",
            Self::AssistantMessage => "assistant_message",
            Self::ToolCall => "tool_call",
            Self::StepSummary => "step_summary",
            Self::WaitingForInput => "waiting_for_input",
            Self::TaskCompleted => "task_completed",
            Self::AgentFinished => "agent_finished",
            Self::AgentError => "agent_error",
            Self::Stopped => "stopped",
            Self::FileCreated => "file_created",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AgentEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connected { .. } => EventKind::Connected,
            Self::AgentStarted { .. } => EventKind::AgentStarted,
            Self::StepStart { .. } => EventKind::StepStart,
            Self::AssistantMessage { .. } => EventKind::AssistantMessage,
            Self::ToolCall { .. } => EventKind::ToolCall,
            Self::StepSummary { .. } => EventKind::StepSummary,
            Self::WaitingForInput { .. } => EventKind::WaitingForInput,
            Self::TaskCompleted { .. } => EventKind::TaskCompleted,
            Self::AgentFinished { .. } => EventKind::AgentFinished,
            Self::AgentError { .. } => EventKind::AgentError,
            Self::Stopped { .. } => EventKind::Stopped,
            Self::FileCreated { .. } => EventKind::FileCreated,
        }
    }

    /// The event body without its kind tag.
    pub fn payload(&self) -> serde_json::Value {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(mut map)) => {
                map.remove("data").unwrap_or(serde_json::Value::Null)
            }
            _ => serde_json::Value::Null,
        }
    }

    /// Whether this event carries the observable output of a completed step.
    pub fn is_step_output(&self) -> bool {
        matches!(
            self,
            Self::AssistantMessage { .. } | Self::ToolCall { .. } | Self::StepSummary { .. }
        )
    }

    /// Whether this event ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::AgentFinished { .. } | Self::AgentError { .. } | Self::Stopped { .. }
        )
    }
}

// ── Emitters ───────────────────────────────────────────────────────

/// Sink for session events.
///
/// Implementations are shared by every session in a registry and must be
/// cheap and non-blocking: the orchestrator calls `emit` inline from the
/// run task and does not wait for acknowledgment. Delivery failures are the
/// emitter's concern and must never propagate back into a run.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, session_id: &SessionId, event: &AgentEvent);
}

impl<T: EventEmitter + ?Sized> EventEmitter for std::sync::Arc<T> {
    fn emit(&self, session_id: &SessionId, event: &AgentEvent) {
        (**self).emit(session_id, event)
    }
}

/// Discards every event.
pub struct NoopEmitter;
impl EventEmitter for NoopEmitter {
    fn emit(&self, _session_id: &SessionId, _event: &AgentEvent) {}
}

/// An emitter backed by a closure.
///
/// ```ignore
/// let emitter = FnEmitter::new(|session_id, event| {
///     println!("[{session_id}] {}", event.kind());
/// });
/// ```
pub struct FnEmitter<F>(F)
where
    F: Fn(&SessionId, &AgentEvent) + Send + Sync;

impl<F> FnEmitter<F>
where
    F: Fn(&SessionId, &AgentEvent) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventEmitter for FnEmitter<F>
where
    F: Fn(&SessionId, &AgentEvent) + Send + Sync,
{
    fn emit(&self, session_id: &SessionId, event: &AgentEvent) {
        (self.0)(session_id, event)
    }
}

/// Dispatches every event to each inner emitter, in registration order.
pub struct CompositeEmitter {
    emitters: Vec<Box<dyn EventEmitter>>,
}

impl CompositeEmitter {
    pub fn new() -> Self {
        Self {
            emitters: Vec::new(),
        }
    }

    /// Add an emitter to the chain.
    pub fn with(mut self, emitter: impl EventEmitter + 'static) -> Self {
        self.emitters.push(Box::new(emitter));
        self
    }

    /// Conditionally add an emitter; a no-op when `condition` is `false`.
    pub fn with_if(self, condition: bool, emitter: impl EventEmitter + 'static) -> Self {
        if condition { self.with(emitter) } else { self }
    }
}

impl Default for CompositeEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventEmitter for CompositeEmitter {
    fn emit(&self, session_id: &SessionId, event: &AgentEvent) {
        for emitter in &self.emitters {
            emitter.emit(session_id, event);
        }
    }
}

/// Routes each session's events into its own unbounded channel.
///
/// Call [`subscribe`](Self::subscribe) before the session is created to
/// receive its `connected` event. Events for sessions without a subscriber
/// are dropped; a subscriber whose receiver was dropped is pruned on the
/// next delivery.
#[derive(Default)]
pub struct ChannelEmitter {
    subscribers: Mutex<HashMap<SessionId, mpsc::UnboundedSender<AgentEvent>>>,
}

impl ChannelEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the subscriber for `session_id`, replacing any previous one.
    pub fn subscribe(&self, session_id: &SessionId) -> mpsc::UnboundedReceiver<AgentEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.insert(session_id.clone(), tx);
        rx
    }

    pub fn unsubscribe(&self, session_id: &SessionId) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.remove(session_id);
    }
}

impl EventEmitter for ChannelEmitter {
    fn emit(&self, session_id: &SessionId, event: &AgentEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = subscribers.get(session_id) else {
            return;
        };
        if tx.send(event.clone()).is_err() {
            debug!("Subscriber for session {session_id} went away; dropping it");
            subscribers.remove(session_id);
        }
    }
}

/// Logs events via `tracing`.
pub struct LoggingEmitter;

impl EventEmitter for LoggingEmitter {
    fn emit(&self, session_id: &SessionId, event: &AgentEvent) {
        match event {
            AgentEvent::Connected { .. } => info!("[{session_id}] connected"),
            AgentEvent::AgentStarted {
                instruction,
                max_steps,
                ..
            } => {
                let preview: String = instruction.chars().take(120).collect();
                info!("[{session_id}] run started (max_steps={max_steps}): {preview}");
            }
            AgentEvent::StepStart { step, max_steps } => {
                debug!("[{session_id}] step {step}/{max_steps}");
            }
            AgentEvent::AssistantMessage { content, .. } => {
                let preview: String = content.chars().take(200).collect();
                debug!(
                    "[{session_id}] assistant: {preview}{}",
                    if content.len() > 200 { "..." } else { "" }
                );
            }
            AgentEvent::ToolCall {
                function_name,
                result,
                ..
            } => {
                debug!(
                    "[{session_id}] tool {function_name}: {} bytes",
                    result.len()
                );
            }
            AgentEvent::StepSummary { summary, .. } => {
                debug!("[{session_id}] summary: {summary}");
            }
            AgentEvent::WaitingForInput { .. } => {
                info!("[{session_id}] waiting for input");
            }
            AgentEvent::TaskCompleted { reason, .. } => {
                info!("[{session_id}] task completed ({reason:?})");
            }
            AgentEvent::AgentFinished { steps, .. } => {
                info!("[{session_id}] run finished after {steps} step(s)");
            }
            AgentEvent::AgentError { error } => {
                warn!("[{session_id}] run failed: {error}");
            }
            AgentEvent::Stopped { .. } => info!("[{session_id}] run stopped"),
            AgentEvent::FileCreated { file } => {
                debug!("[{session_id}] file created: {}", file.relative_path);
            }
        }
    }
}

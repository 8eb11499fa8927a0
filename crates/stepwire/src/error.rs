//! Error types for session orchestration.
//!
//! Operational errors ([`SessionError`]) are returned synchronously to the
//! caller of the orchestration API. Failures of the agent loop itself
//! ([`LoopError`]) never surface here: the orchestrator contains them and
//! turns them into a terminal `agent_error` event.

use thiserror::Error;

use crate::id::SessionId;

/// Errors returned by [`AgentSession`](crate::session::AgentSession) and
/// [`SessionRegistry`](crate::session::SessionRegistry) operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// A run is already active on this session. Nothing was changed.
    #[error("Agent is already running")]
    AlreadyRunning,

    /// No session with this identity exists (never created, or removed).
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// The run configuration was rejected before launch.
    #[error("Invalid run configuration: {0}")]
    InvalidConfig(String),

    /// The execution context did not release within the allotted time and
    /// had to be torn down forcibly.
    #[error("Execution context for session {session_id} was not released: {reason}")]
    ContextReleaseFailure { session_id: SessionId, reason: String },

    /// The session output directory could not be prepared.
    #[error("Workspace error: {0}")]
    Workspace(#[from] std::io::Error),
}

/// An unrecoverable failure reported by the external agent loop.
///
/// Raised either by the loop factory (the loop could not be built) or by a
/// [`StepResult::Error`](crate::agent::StepResult::Error) step.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{detail}")]
pub struct LoopError {
    pub detail: String,
}

impl LoopError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// Errors raised while resolving the agent core at process start.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core metadata is missing `{0}`")]
    MissingField(&'static str),

    #[error("Core configuration error: {0}")]
    Configuration(String),
}

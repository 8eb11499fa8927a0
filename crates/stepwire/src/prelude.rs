//! Convenience re-exports for common `stepwire` types.
//!
//! ```ignore
//! use stepwire::prelude::*;
//! ```
//!
//! Workspace helpers ([`FileTracker`](crate::session::FileTracker),
//! [`provision_output_dir`](crate::session::workspace::provision_output_dir))
//! are left out; import them from [`crate::session`] when needed.

// ── Agent boundary ──────────────────────────────────────────────────
pub use crate::agent::{
    AgentCore, AgentLoop, CoreInfo, CoreLoader, FnLoopFactory, LoopFactory, RunContext,
    ScriptTail, ScriptedLoop, ScriptedLoopFactory, StepFuture, StepResult,
};

// ── Configuration ───────────────────────────────────────────────────
pub use crate::config::{RegistryConfig, RunConfig, SessionLimits};

// ── Events ──────────────────────────────────────────────────────────
pub use crate::events::{
    AgentEvent, ChannelEmitter, CompletionReason, CompositeEmitter, EventEmitter, EventKind,
    FnEmitter, LoggingEmitter, NoopEmitter,
};

// ── Sessions ────────────────────────────────────────────────────────
pub use crate::session::{
    AgentSession, FileInfo, RunHandle, SessionRegistry, SessionStatus, StatusSnapshot,
};

// ── Errors and ids ──────────────────────────────────────────────────
pub use crate::{CoreError, LoopError, SessionError, SessionId};

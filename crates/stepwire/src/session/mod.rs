//! Sessions, the runs they own, and the registry that owns them.
//!
//! - [`agent_session`] — per-client status, input queue, and run task.
//! - `orchestrator` — drives one run of the agent loop and emits its events.
//! - [`registry`] — the process-wide session table and transport façade.
//! - [`workspace`] — per-session output directories and created-file tracking.

pub mod agent_session;
mod orchestrator;
pub mod registry;
pub mod workspace;

pub use agent_session::{AgentSession, RunHandle, SessionStatus, StatusSnapshot};
pub use registry::SessionRegistry;
pub use workspace::{FileInfo, FileTracker};

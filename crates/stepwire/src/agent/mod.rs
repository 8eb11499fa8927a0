//! The boundary to the external agent loop.
//!
//! - [`agent_loop`] — the step-driven [`AgentLoop`] contract and its factory.
//! - [`loader`] — one-time resolution of the [`AgentCore`] at process start.
//! - [`scripted`] — a deterministic loop for tests and demos.

pub mod agent_loop;
pub mod loader;
pub mod scripted;

pub use agent_loop::{AgentLoop, FnLoopFactory, LoopFactory, RunContext, StepFuture, StepResult};
pub use loader::{AgentCore, CoreInfo, CoreLoader};
pub use scripted::{ScriptTail, ScriptedLoop, ScriptedLoopFactory};

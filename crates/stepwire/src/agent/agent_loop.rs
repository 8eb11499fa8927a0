//! The step-driven contract of the external agent loop.
//!
//! The orchestrator never calls into loop internals. It asks for one step at
//! a time via [`AgentLoop::advance`] and receives a tagged [`StepResult`];
//! when the loop reports [`StepResult::NeedsInput`] the orchestrator hands
//! exactly one user string back through [`AgentLoop::deliver_input`].
//!
//! A loop instance is owned by the task that runs it, so implementations
//! only need to be `Send`, not `Sync`.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use crate::config::RunConfig;
use crate::error::LoopError;
use crate::id::SessionId;

/// Boxed future returned by [`AgentLoop::advance`].
pub type StepFuture<'a> = Pin<Box<dyn Future<Output = StepResult> + Send + 'a>>;

/// Outcome of one `advance` call.
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    /// The model produced text.
    AssistantMessage { content: String },
    /// A tool was invoked and returned.
    ToolCall {
        name: String,
        args: serde_json::Value,
        result: String,
    },
    /// The loop summarized the step it just completed.
    StepSummary { summary: String },
    /// The loop cannot continue until it receives one user string.
    NeedsInput { prompt: String },
    /// The task is done.
    TaskCompleted,
    /// The loop hit an unrecoverable condition.
    Error { detail: String },
}

/// A stateful agent loop driven one step at a time.
///
/// # Example
///
/// ```ignore
/// struct CountingLoop(u32);
///
/// impl AgentLoop for CountingLoop {
///     fn advance(&mut self) -> StepFuture<'_> {
///         self.0 += 1;
///         let n = self.0;
///         Box::pin(async move {
///             StepResult::StepSummary { summary: format!("tick {n}") }
///         })
///     }
///
///     fn deliver_input(&mut self, _input: String) {}
/// }
/// ```
pub trait AgentLoop: Send {
    /// Run the next step. The future may take as long as the step takes;
    /// cancellation is only observed between steps.
    fn advance(&mut self) -> StepFuture<'_>;

    /// Deliver one user string after the loop returned
    /// [`StepResult::NeedsInput`].
    fn deliver_input(&mut self, input: String);
}

/// Per-run facts a loop factory may need besides the run configuration.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub session_id: SessionId,
    /// Directory the loop should write its artifacts into, when the
    /// registry provisions one.
    pub output_dir: Option<PathBuf>,
}

/// Builds a fresh [`AgentLoop`] for each run.
pub trait LoopFactory: Send + Sync {
    fn create(&self, config: &RunConfig, ctx: &RunContext)
    -> Result<Box<dyn AgentLoop>, LoopError>;
}

/// A loop factory backed by a closure.
///
/// ```ignore
/// let factory = FnLoopFactory::new(|config, _ctx| {
///     Ok(Box::new(MyLoop::new(&config.instruction)) as Box<dyn AgentLoop>)
/// });
/// ```
pub struct FnLoopFactory<F>(F)
where
    F: Fn(&RunConfig, &RunContext) -> Result<Box<dyn AgentLoop>, LoopError> + Send + Sync;

impl<F> FnLoopFactory<F>
where
    F: Fn(&RunConfig, &RunContext) -> Result<Box<dyn AgentLoop>, LoopError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> LoopFactory for FnLoopFactory<F>
where
    F: Fn(&RunConfig, &RunContext) -> Result<Box<dyn AgentLoop>, LoopError> + Send + Sync,
{
    fn create(
        &self,
        config: &RunConfig,
        ctx: &RunContext,
    ) -> Result<Box<dyn AgentLoop>, LoopError> {
        (self.0)(config, ctx)
    }
}

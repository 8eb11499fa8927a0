//! A deterministic agent loop that replays a fixed script of steps.
//!
//! Useful for tests and for exercising transports without a model behind
//! them. Each run gets its own copy of the script; delivered inputs are
//! appended to a log shared by every loop the factory builds.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::agent_loop::{AgentLoop, LoopFactory, RunContext, StepFuture, StepResult};
use crate::config::RunConfig;
use crate::error::LoopError;

/// What a [`ScriptedLoop`] returns once its script is exhausted.
#[derive(Debug, Clone, Default)]
pub enum ScriptTail {
    /// Report [`StepResult::TaskCompleted`].
    #[default]
    Complete,
    /// Return this step forever.
    Repeat(StepResult),
}

/// Replays a queue of [`StepResult`] values, one per `advance`.
#[derive(Debug, Clone)]
pub struct ScriptedLoop {
    steps: VecDeque<StepResult>,
    tail: ScriptTail,
    step_delay: Option<Duration>,
    echo_inputs: bool,
    pending_input: Option<String>,
    inputs: Arc<Mutex<Vec<String>>>,
}

impl ScriptedLoop {
    pub fn new(steps: impl IntoIterator<Item = StepResult>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            tail: ScriptTail::Complete,
            step_delay: None,
            echo_inputs: false,
            pending_input: None,
            inputs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set what happens after the last scripted step.
    pub fn with_tail(mut self, tail: ScriptTail) -> Self {
        self.tail = tail;
        self
    }

    /// Sleep this long inside every `advance`.
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = Some(delay);
        self
    }

    /// Answer each delivered input with an `AssistantMessage` reading
    /// `received: <input>` before resuming the script.
    pub fn with_echo_inputs(mut self) -> Self {
        self.echo_inputs = true;
        self
    }

    /// Log of every input delivered to this loop (and its clones).
    pub fn inputs(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.inputs)
    }

    fn next_step(&mut self) -> StepResult {
        if let Some(input) = self.pending_input.take() {
            return StepResult::AssistantMessage {
                content: format!("received: {input}"),
            };
        }
        match self.steps.pop_front() {
            Some(step) => step,
            None => match &self.tail {
                ScriptTail::Complete => StepResult::TaskCompleted,
                ScriptTail::Repeat(step) => step.clone(),
            },
        }
    }
}

impl AgentLoop for ScriptedLoop {
    fn advance(&mut self) -> StepFuture<'_> {
        let delay = self.step_delay;
        let step = self.next_step();
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            step
        })
    }

    fn deliver_input(&mut self, input: String) {
        self.inputs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(input.clone());
        if self.echo_inputs {
            self.pending_input = Some(input);
        }
    }
}

/// Builds a fresh clone of a template [`ScriptedLoop`] for every run.
#[derive(Debug, Clone)]
pub struct ScriptedLoopFactory {
    template: ScriptedLoop,
    failure: Option<String>,
}

impl Default for ScriptedLoopFactory {
    fn default() -> Self {
        Self::new(ScriptedLoop::new([]))
    }
}

impl ScriptedLoopFactory {
    pub fn new(template: ScriptedLoop) -> Self {
        Self {
            template,
            failure: None,
        }
    }

    /// Make every `create` call fail with this detail.
    pub fn failing(detail: impl Into<String>) -> Self {
        Self {
            template: ScriptedLoop::new([]),
            failure: Some(detail.into()),
        }
    }

    /// Shared log of inputs delivered to loops built by this factory.
    pub fn inputs(&self) -> Arc<Mutex<Vec<String>>> {
        self.template.inputs()
    }
}

impl LoopFactory for ScriptedLoopFactory {
    fn create(
        &self,
        _config: &RunConfig,
        _ctx: &RunContext,
    ) -> Result<Box<dyn AgentLoop>, LoopError> {
        if let Some(detail) = &self.failure {
            return Err(LoopError::new(detail.clone()));
        }
        Ok(Box::new(self.template.clone()))
    }
}

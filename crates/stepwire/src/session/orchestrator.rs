//! Drives one run of the agent loop and translates its steps into events.
//!
//! Per iteration:
//!
//! 1. If a stop was requested, emit `stopped` and exit.
//! 2. Announce the step (`step_start`) the first time it is attempted.
//! 3. `advance` the loop. A `NeedsInput` result takes one queued input, or
//!    parks the run in `waiting_for_input` until input or a stop arrives.
//! 4. Step outputs bump `step_count` and are emitted in order; tool calls
//!    are followed by `file_created` for anything new in the output dir.
//! 5. `TaskCompleted` or an exhausted step budget ends the run as
//!    `completed`; an `Error` ends it as `error`.
//!
//! The [`RunGuard`] runs on every exit path, including a panic inside the
//! loop, and releases the session's execution context.

use std::sync::{Arc, MutexGuard};

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::agent_session::{AgentSession, SessionState, SessionStatus};
use crate::agent::{AgentLoop, RunContext, StepResult};
use crate::config::RunConfig;
use crate::error::LoopError;
use crate::events::{AgentEvent, CompletionReason};

const TASK_COMPLETED_MESSAGE: &str = "Task completed successfully";
const STEP_LIMIT_MESSAGE: &str = "Reached the maximum number of steps";
const FINISHED_MESSAGE: &str = "Agent execution completed";
const STOPPED_MESSAGE: &str = "Agent was stopped by user or external request";
const ABANDONED_MESSAGE: &str = "Agent task exited unexpectedly";

enum InputWait {
    Delivered(String),
    Cancelled,
}

/// The body of a run task. Owns the loop instance for the run's lifetime.
pub(super) struct RunOrchestrator {
    session: Arc<AgentSession>,
    run_id: u64,
    config: RunConfig,
    steps: u32,
    announced: u32,
}

impl RunOrchestrator {
    pub(super) fn new(session: Arc<AgentSession>, run_id: u64, config: RunConfig) -> Self {
        Self {
            session,
            run_id,
            config,
            steps: 0,
            announced: 0,
        }
    }

    pub(super) async fn run(mut self) {
        let _guard = RunGuard {
            session: Arc::clone(&self.session),
            run_id: self.run_id,
        };

        let output_dir = self.session.output_dir().cloned();
        self.session.emit(&AgentEvent::AgentStarted {
            instruction: self.config.instruction.clone(),
            max_steps: self.config.max_steps,
            auto_continue: self.config.auto_continue,
            output_dir: output_dir
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        });

        let ctx = RunContext {
            session_id: self.session.id().clone(),
            output_dir,
        };
        let mut agent = match self.session.core().create_loop(&self.config, &ctx) {
            Ok(agent) => agent,
            Err(e) => {
                self.fail(e);
                return;
            }
        };

        self.drive(agent.as_mut()).await;
    }

    async fn drive(&mut self, agent: &mut dyn AgentLoop) {
        loop {
            if self.cancelled() {
                self.finish_stopped();
                return;
            }
            self.announce_step();

            match agent.advance().await {
                StepResult::NeedsInput { prompt } => match self.await_input(&prompt).await {
                    InputWait::Delivered(input) => agent.deliver_input(input),
                    // Reported by the stop check at the top of the loop.
                    InputWait::Cancelled => continue,
                },
                StepResult::AssistantMessage { content } => {
                    let Some(step) = self.record_step() else {
                        return;
                    };
                    self.session
                        .emit(&AgentEvent::AssistantMessage { step, content });
                }
                StepResult::ToolCall { name, args, result } => {
                    let Some(step) = self.record_step() else {
                        return;
                    };
                    self.session.emit(&AgentEvent::ToolCall {
                        step,
                        function_name: name,
                        function_args: args,
                        result,
                    });
                    for file in self.session.scan_new_files() {
                        self.session.emit(&AgentEvent::FileCreated { file });
                    }
                }
                StepResult::StepSummary { summary } => {
                    let Some(step) = self.record_step() else {
                        return;
                    };
                    self.session
                        .emit(&AgentEvent::StepSummary { step, summary });
                }
                StepResult::TaskCompleted => {
                    self.finish_completed(CompletionReason::TaskDone);
                    return;
                }
                StepResult::Error { detail } => {
                    self.fail(LoopError::new(detail));
                    return;
                }
            }

            if self.steps >= self.config.max_steps {
                self.finish_completed(CompletionReason::StepLimit);
                return;
            }
        }
    }

    /// The session state, if this run still owns the session. `None` once
    /// the run was force-stopped or superseded.
    fn owned_state(&self) -> Option<MutexGuard<'_, SessionState>> {
        let state = self.session.lock_state();
        if state.run_id == self.run_id && state.status.is_active() {
            Some(state)
        } else {
            None
        }
    }

    fn cancelled(&self) -> bool {
        self.owned_state().is_none_or(|state| state.cancel_requested)
    }

    fn announce_step(&mut self) {
        let next = self.steps + 1;
        if next > self.announced {
            self.announced = next;
            self.session.emit(&AgentEvent::StepStart {
                step: next,
                max_steps: self.config.max_steps,
            });
        }
    }

    /// Count one completed step. Returns its 1-based number.
    fn record_step(&mut self) -> Option<u32> {
        let step = self.steps + 1;
        {
            let mut state = self.owned_state()?;
            state.step_count = step;
            if state.status == SessionStatus::WaitingForInput {
                state.set_status(SessionStatus::Running);
            }
        }
        self.steps = step;
        debug!("[{}] step {step} recorded", self.session.id());
        Some(self.steps)
    }

    /// Take the next queued input, or report cancellation. `None` means
    /// neither is available yet.
    fn poll_input(&self) -> Option<InputWait> {
        let Some(mut state) = self.owned_state() else {
            return Some(InputWait::Cancelled);
        };
        if state.cancel_requested {
            return Some(InputWait::Cancelled);
        }
        let input = state.input_queue.pop_front()?;
        if state.status == SessionStatus::WaitingForInput {
            state.set_status(SessionStatus::Running);
        }
        Some(InputWait::Delivered(input))
    }

    async fn await_input(&self, prompt: &str) -> InputWait {
        if let Some(ready) = self.poll_input() {
            return ready;
        }

        match self.owned_state() {
            Some(mut state) => state.set_status(SessionStatus::WaitingForInput),
            None => return InputWait::Cancelled,
        }
        self.session.emit(&AgentEvent::WaitingForInput {
            prompt: prompt.to_string(),
        });

        let limits = self.session.limits();
        let deadline = limits.input_timeout.map(|t| Instant::now() + t);
        loop {
            let notified = self.session.wakeup().notified();
            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        warn!(
                            "[{}] no input within {:?}; stopping run {}",
                            self.session.id(),
                            limits.input_timeout.unwrap_or_default(),
                            self.run_id
                        );
                        self.session.request_stop();
                    }
                }
                None => notified.await,
            }
            if let Some(ready) = self.poll_input() {
                return ready;
            }
        }
    }

    fn finish_completed(&self, reason: CompletionReason) {
        if self.owned_state().is_none() {
            return;
        }
        let message = match reason {
            CompletionReason::TaskDone => TASK_COMPLETED_MESSAGE,
            CompletionReason::StepLimit => STEP_LIMIT_MESSAGE,
        };
        self.session.emit(&AgentEvent::TaskCompleted {
            message: message.to_string(),
            reason,
        });
        self.session.emit(&AgentEvent::AgentFinished {
            message: FINISHED_MESSAGE.to_string(),
            steps: self.steps,
        });
        info!(
            "[{}] run {} completed after {} step(s) ({reason:?})",
            self.session.id(),
            self.run_id,
            self.steps
        );
        self.settle(SessionStatus::Completed);
    }

    fn finish_stopped(&self) {
        if self.owned_state().is_none() {
            return;
        }
        self.session.emit(&AgentEvent::Stopped {
            message: STOPPED_MESSAGE.to_string(),
        });
        info!(
            "[{}] run {} stopped after {} step(s)",
            self.session.id(),
            self.run_id,
            self.steps
        );
        self.settle(SessionStatus::Stopped);
    }

    fn fail(&self, err: LoopError) {
        match self.owned_state() {
            Some(mut state) => state.last_error = Some(err.detail.clone()),
            None => return,
        }
        warn!(
            "[{}] run {} failed: {err}",
            self.session.id(),
            self.run_id
        );
        self.session.emit(&AgentEvent::AgentError {
            error: err.detail,
        });
        self.settle(SessionStatus::Error);
    }

    /// Publish the terminal status. Events are emitted before this so a
    /// run observer sees the full stream once the status lands.
    fn settle(&self, status: SessionStatus) {
        if let Some(mut state) = self.owned_state() {
            state.set_status(status);
        }
    }
}

/// Releases the execution context when the run task ends, however it ends.
struct RunGuard {
    session: Arc<AgentSession>,
    run_id: u64,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let abandoned = {
            let mut state = self.session.lock_state();
            if state.run_id != self.run_id {
                return;
            }
            state.task = None;
            if let Some(watchdog) = state.watchdog.take() {
                watchdog.abort();
            }
            if state.status.is_active() {
                state.last_error = Some(ABANDONED_MESSAGE.to_string());
                true
            } else {
                false
            }
        };

        if abandoned {
            error!(
                "[{}] run {} ended without reaching a terminal state",
                self.session.id(),
                self.run_id
            );
            self.session.emit(&AgentEvent::AgentError {
                error: ABANDONED_MESSAGE.to_string(),
            });
            let mut state = self.session.lock_state();
            if state.run_id == self.run_id && state.status.is_active() {
                state.set_status(SessionStatus::Error);
            }
        }
    }
}

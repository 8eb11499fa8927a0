//! A deterministic agent loop for running the server without a model.
//!
//! Each cycle is three steps: an assistant plan, a `write_file` tool call
//! that writes a note into the session's output directory, and a step
//! summary. With `auto_continue = N > 0` the loop asks
//! `Continue? (y/n)` after every N cycles; answering `n` completes the task.
//! With `auto_continue = 0` it never asks and runs until the step limit.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::json;
use stepwire::LoopError;
use stepwire::agent::{AgentLoop, LoopFactory, RunContext, StepFuture, StepResult};
use stepwire::config::RunConfig;

/// Prompt sent when the loop pauses between cycles.
pub const CONTINUE_PROMPT: &str = "Continue? (y/n)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Plan,
    Write,
    Summarize,
    Ask,
    Finish,
}

/// The demo loop. Created per run by [`DemoLoopFactory`].
pub struct DemoLoop {
    instruction: String,
    output_dir: Option<PathBuf>,
    auto_continue: u32,
    step_delay: Option<Duration>,
    phase: Phase,
    cycle: u32,
}

impl DemoLoop {
    pub fn new(config: &RunConfig, output_dir: Option<PathBuf>) -> Self {
        Self {
            instruction: config.instruction.clone(),
            output_dir,
            auto_continue: config.auto_continue,
            step_delay: None,
            phase: Phase::Plan,
            cycle: 1,
        }
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = Some(delay);
        self
    }

    fn note_name(&self) -> String {
        format!("step_{:03}_notes.md", self.cycle)
    }

    fn note_body(&self) -> String {
        format!(
            "# Cycle {}\n\nInstruction: {}\n",
            self.cycle, self.instruction
        )
    }
}

impl AgentLoop for DemoLoop {
    fn advance(&mut self) -> StepFuture<'_> {
        let delay = self.step_delay;
        let phase = self.phase;
        let name = self.note_name();
        let body = self.note_body();
        let target = self.output_dir.as_ref().map(|dir| dir.join(&name));

        self.phase = match phase {
            Phase::Plan => Phase::Write,
            Phase::Write => Phase::Summarize,
            Phase::Summarize => {
                let pause = self.auto_continue > 0 && self.cycle % self.auto_continue == 0;
                self.cycle += 1;
                if pause { Phase::Ask } else { Phase::Plan }
            }
            // Parked until `deliver_input` picks the next phase.
            Phase::Ask => Phase::Ask,
            Phase::Finish => Phase::Finish,
        };
        let cycle = self.cycle;
        let instruction = self.instruction.clone();

        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match phase {
                Phase::Plan => StepResult::AssistantMessage {
                    content: format!("Cycle {cycle}: working on \"{instruction}\""),
                },
                Phase::Write => {
                    let result = match target {
                        Some(path) => match tokio::fs::write(&path, body.as_bytes()).await {
                            Ok(()) => format!("Wrote {} bytes to {}", body.len(), path.display()),
                            Err(e) => format!("Error writing {}: {e}", path.display()),
                        },
                        None => "Error: no output directory".to_string(),
                    };
                    StepResult::ToolCall {
                        name: "write_file".to_string(),
                        args: json!({ "path": name, "content": body }),
                        result,
                    }
                }
                Phase::Summarize => StepResult::StepSummary {
                    summary: format!("Recorded notes in {name}"),
                },
                Phase::Ask => StepResult::NeedsInput {
                    prompt: CONTINUE_PROMPT.to_string(),
                },
                Phase::Finish => StepResult::TaskCompleted,
            }
        })
    }

    fn deliver_input(&mut self, input: String) {
        let answer = input.trim().to_ascii_lowercase();
        self.phase = if answer == "n" || answer == "no" {
            Phase::Finish
        } else {
            Phase::Plan
        };
    }
}

/// Builds a [`DemoLoop`] for every run.
#[derive(Debug, Clone, Default)]
pub struct DemoLoopFactory {
    step_delay: Option<Duration>,
}

impl DemoLoopFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before every step, so runs are observable in a browser.
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = Some(delay);
        self
    }
}

impl LoopFactory for DemoLoopFactory {
    fn create(&self, config: &RunConfig, ctx: &RunContext) -> Result<Box<dyn AgentLoop>, LoopError> {
        let mut demo = DemoLoop::new(config, ctx.output_dir.clone());
        if let Some(delay) = self.step_delay {
            demo = demo.with_step_delay(delay);
        }
        Ok(Box::new(demo))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(step: &StepResult) -> &'static str {
        match step {
            StepResult::AssistantMessage { .. } => "assistant",
            StepResult::ToolCall { .. } => "tool",
            StepResult::StepSummary { .. } => "summary",
            StepResult::NeedsInput { .. } => "input",
            StepResult::TaskCompleted => "done",
            StepResult::Error { .. } => "error",
        }
    }

    #[tokio::test]
    async fn cycles_without_asking_when_auto_continue_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let mut demo = DemoLoop::new(&RunConfig::new("x"), Some(dir.path().to_path_buf()));

        let mut kinds = Vec::new();
        for _ in 0..6 {
            kinds.push(kind(&demo.advance().await));
        }
        assert_eq!(
            kinds,
            ["assistant", "tool", "summary", "assistant", "tool", "summary"]
        );
        assert!(dir.path().join("step_001_notes.md").exists());
        assert!(dir.path().join("step_002_notes.md").exists());
    }

    #[tokio::test]
    async fn asks_after_auto_continue_cycles_and_stops_on_no() {
        let config = RunConfig::new("x").with_auto_continue(1);
        let mut demo = DemoLoop::new(&config, None);

        for _ in 0..3 {
            demo.advance().await;
        }
        assert_eq!(
            demo.advance().await,
            StepResult::NeedsInput {
                prompt: CONTINUE_PROMPT.into()
            }
        );

        demo.deliver_input("y".into());
        assert_eq!(kind(&demo.advance().await), "assistant");
        demo.advance().await;
        demo.advance().await;
        assert_eq!(kind(&demo.advance().await), "input");

        demo.deliver_input(" N ".into());
        assert_eq!(demo.advance().await, StepResult::TaskCompleted);
    }

    #[tokio::test]
    async fn write_without_output_dir_reports_error_result() {
        let mut demo = DemoLoop::new(&RunConfig::new("x"), None);
        demo.advance().await;
        let StepResult::ToolCall { name, result, .. } = demo.advance().await else {
            panic!("expected a tool call");
        };
        assert_eq!(name, "write_file");
        assert!(result.starts_with("Error"));
    }
}

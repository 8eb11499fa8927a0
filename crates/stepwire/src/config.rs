//! Configuration types for runs, sessions, and the registry.
//!
//! # Examples
//!
//! ```ignore
//! let run = RunConfig::new("Summarize the repository layout")
//!     .with_max_steps(20)
//!     .with_auto_continue(3);
//!
//! let registry_config = RegistryConfig::default()
//!     .with_output_root("output")
//!     .with_limits(SessionLimits::default().with_input_timeout(None));
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Default step budget for a run when the client does not specify one.
pub const DEFAULT_MAX_STEPS: u32 = 10;

/// How long a run may sit in `waiting_for_input` before it is stopped.
pub const DEFAULT_INPUT_TIMEOUT: Duration = Duration::from_secs(300);

/// How long registry removal waits for a run to wind down.
pub const DEFAULT_RELEASE_TIMEOUT: Duration = Duration::from_secs(5);

// ── RunConfig ─────────────────────────────────────────────────────

/// Parameters of one run. Immutable for the lifetime of that run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// The instruction handed to the agent loop.
    pub instruction: String,
    /// Hard cap on completed steps. Reaching it completes the run.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Passed through to the agent loop untouched.
    #[serde(default)]
    pub auto_continue: u32,
}

fn default_max_steps() -> u32 {
    DEFAULT_MAX_STEPS
}

impl RunConfig {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            max_steps: DEFAULT_MAX_STEPS,
            auto_continue: 0,
        }
    }

    /// Set the maximum number of steps.
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Set the auto-continue step count forwarded to the loop.
    pub fn with_auto_continue(mut self, auto_continue: u32) -> Self {
        self.auto_continue = auto_continue;
        self
    }

    /// Reject configurations that can never produce a meaningful run.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.instruction.trim().is_empty() {
            return Err(SessionError::InvalidConfig(
                "Instruction is required".to_string(),
            ));
        }
        if self.max_steps == 0 {
            return Err(SessionError::InvalidConfig(
                "max_steps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ── SessionLimits ─────────────────────────────────────────────────

/// Time limits applied to every session in a registry.
///
/// Expiry of either run limit goes through the ordinary cooperative stop
/// path; nothing is killed.
#[derive(Debug, Clone)]
pub struct SessionLimits {
    /// Stop a run that has waited this long for user input. `None` waits
    /// indefinitely.
    pub input_timeout: Option<Duration>,
    /// Stop a run that has been active this long. `None` disables the limit.
    pub max_run_duration: Option<Duration>,
    /// Upper bound on how long removal waits for a stopped run to release
    /// its execution context before aborting it.
    pub release_timeout: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            input_timeout: Some(DEFAULT_INPUT_TIMEOUT),
            max_run_duration: None,
            release_timeout: DEFAULT_RELEASE_TIMEOUT,
        }
    }
}

impl SessionLimits {
    pub fn with_input_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.input_timeout = timeout;
        self
    }

    pub fn with_max_run_duration(mut self, limit: Option<Duration>) -> Self {
        self.max_run_duration = limit;
        self
    }

    pub fn with_release_timeout(mut self, timeout: Duration) -> Self {
        self.release_timeout = timeout;
        self
    }
}

// ── RegistryConfig ────────────────────────────────────────────────

/// Configuration for a [`SessionRegistry`](crate::session::SessionRegistry).
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// Root under which each session gets its own output directory.
    /// `None` disables output directories and file tracking.
    pub output_root: Option<PathBuf>,
    /// Limits applied to each session's runs.
    pub limits: SessionLimits,
}

impl RegistryConfig {
    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = Some(root.into());
        self
    }

    pub fn with_limits(mut self, limits: SessionLimits) -> Self {
        self.limits = limits;
        self
    }
}

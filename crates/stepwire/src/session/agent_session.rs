//! One client's session: status, input queue, cancellation, and the task
//! that runs the agent loop.
//!
//! All mutable fields live in a single [`SessionState`] behind a
//! `std::sync::Mutex`. The lock is taken for short critical sections only
//! and never across an `.await`. The run task is woken for input and stop
//! requests through a [`Notify`]; the orchestrator is its only waiter, so
//! stored permits make a notification sent before the wait still count.

use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::orchestrator::RunOrchestrator;
use super::workspace::{FileInfo, FileTracker};
use crate::agent::AgentCore;
use crate::config::{RunConfig, SessionLimits};
use crate::error::SessionError;
use crate::events::{AgentEvent, EventEmitter};
use crate::id::SessionId;

// ── SessionStatus ──────────────────────────────────────────────────

/// Lifecycle status of a session's current (or last) run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Running,
    WaitingForInput,
    Completed,
    Error,
    Stopped,
}

impl SessionStatus {
    /// A run owns the session's execution context.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::WaitingForInput)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Stopped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::WaitingForInput => "waiting_for_input",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── StatusSnapshot ─────────────────────────────────────────────────

/// Point-in-time view of a session, safe to hand to transports.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub is_running: bool,
    pub step_count: u32,
    /// Configuration of the current or last run.
    pub config: Option<RunConfig>,
    /// 1-based sequence number of the current or last run; 0 before any.
    pub run_id: u64,
    pub last_error: Option<String>,
    pub connected_at: String,
    pub output_dir: Option<String>,
}

// ── RunHandle ──────────────────────────────────────────────────────

/// Observer for one run. Does not own the run's task; dropping it has no
/// effect on the run.
#[derive(Debug, Clone)]
pub struct RunHandle {
    run_id: u64,
    status: watch::Receiver<SessionStatus>,
}

impl RunHandle {
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Latest status of this run.
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Resolve once the run reaches a terminal status. Every event of the
    /// run has been emitted by then.
    pub async fn wait(mut self) -> SessionStatus {
        loop {
            let status = *self.status.borrow_and_update();
            if status.is_terminal() {
                return status;
            }
            if self.status.changed().await.is_err() {
                return *self.status.borrow();
            }
        }
    }
}

// ── SessionState ───────────────────────────────────────────────────

/// Mutable session fields. Guarded by [`AgentSession`]'s state lock.
pub(super) struct SessionState {
    pub(super) status: SessionStatus,
    pub(super) step_count: u32,
    pub(super) config: Option<RunConfig>,
    pub(super) run_id: u64,
    pub(super) input_queue: VecDeque<String>,
    pub(super) cancel_requested: bool,
    pub(super) last_error: Option<String>,
    pub(super) task: Option<JoinHandle<()>>,
    pub(super) watchdog: Option<JoinHandle<()>>,
    status_tx: watch::Sender<SessionStatus>,
}

impl SessionState {
    fn new() -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::Idle);
        Self {
            status: SessionStatus::Idle,
            step_count: 0,
            config: None,
            run_id: 0,
            input_queue: VecDeque::new(),
            cancel_requested: false,
            last_error: None,
            task: None,
            watchdog: None,
            status_tx,
        }
    }

    /// Update the status and publish it to the current run's observers.
    pub(super) fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
        self.status_tx.send_replace(status);
    }
}

// ── AgentSession ───────────────────────────────────────────────────

/// The execution unit for one connected client.
///
/// At most one run is active at a time. A run is launched with
/// [`start_run`](Self::start_run), fed with
/// [`submit_input`](Self::submit_input), and cancelled cooperatively with
/// [`request_stop`](Self::request_stop).
pub struct AgentSession {
    id: SessionId,
    connected_at: String,
    output_dir: Option<PathBuf>,
    core: Arc<AgentCore>,
    emitter: Arc<dyn EventEmitter>,
    limits: SessionLimits,
    state: Mutex<SessionState>,
    tracker: Mutex<Option<FileTracker>>,
    wakeup: Notify,
    /// Set when removal begins; new runs are refused from then on.
    closing: AtomicBool,
    /// `true` once the session is detached from the emitter.
    detached: Mutex<bool>,
}

impl AgentSession {
    /// Create an idle session. `output_dir`, when given, must already exist;
    /// files present at this point are never reported as created.
    pub fn new(
        id: SessionId,
        core: Arc<AgentCore>,
        emitter: Arc<dyn EventEmitter>,
        limits: SessionLimits,
        output_dir: Option<PathBuf>,
    ) -> Arc<Self> {
        let tracker = output_dir.as_ref().map(|dir| FileTracker::new(dir.clone()));
        Arc::new(Self {
            id,
            connected_at: Utc::now().to_rfc3339(),
            output_dir,
            core,
            emitter,
            limits,
            state: Mutex::new(SessionState::new()),
            tracker: Mutex::new(tracker),
            wakeup: Notify::new(),
            closing: AtomicBool::new(false),
            detached: Mutex::new(false),
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn output_dir(&self) -> Option<&PathBuf> {
        self.output_dir.as_ref()
    }

    pub fn connected_at(&self) -> &str {
        &self.connected_at
    }

    /// Launch a run and return immediately.
    ///
    /// Rejects the request with [`SessionError::AlreadyRunning`] while a run
    /// is active; nothing about the active run changes in that case.
    pub fn start_run(self: &Arc<Self>, config: RunConfig) -> Result<RunHandle, SessionError> {
        config.validate()?;

        let mut state = self.lock_state();
        if self.closing.load(Ordering::Acquire) {
            return Err(SessionError::SessionNotFound(self.id.clone()));
        }
        if state.status.is_active() {
            return Err(SessionError::AlreadyRunning);
        }

        state.run_id += 1;
        let run_id = state.run_id;
        state.cancel_requested = false;
        state.input_queue.clear();
        state.step_count = 0;
        state.last_error = None;
        state.config = Some(config.clone());
        // Fresh channel per run so a finished run's observers keep its
        // final status.
        let (status_tx, status_rx) = watch::channel(SessionStatus::Running);
        state.status_tx = status_tx;
        state.set_status(SessionStatus::Running);

        info!(
            "[{}] starting run {run_id} (max_steps={})",
            self.id, config.max_steps
        );

        // Spawned under the lock: the task cannot release its handle before
        // the handle is stored.
        let orchestrator = RunOrchestrator::new(Arc::clone(self), run_id, config);
        state.task = Some(tokio::spawn(orchestrator.run()));

        if let Some(previous) = state.watchdog.take() {
            previous.abort();
        }
        if let Some(limit) = self.limits.max_run_duration {
            state.watchdog = Some(spawn_watchdog(Arc::downgrade(self), run_id, limit));
        }

        Ok(RunHandle {
            run_id,
            status: status_rx,
        })
    }

    /// Queue one input string for the active run.
    ///
    /// Inputs are consumed first-in first-out, one per `needs_input` step.
    /// An input submitted while no run is waiting stays queued for the next
    /// suspension point of the same run; the queue is cleared when a new run
    /// starts.
    pub fn submit_input(&self, text: impl Into<String>) {
        let text = text.into();
        {
            let mut state = self.lock_state();
            debug!(
                "[{}] input queued ({} pending)",
                self.id,
                state.input_queue.len() + 1
            );
            state.input_queue.push_back(text);
        }
        self.wakeup.notify_one();
    }

    /// Ask the active run to stop at its next suspension point.
    ///
    /// Idempotent. Returns whether a run was active.
    pub fn request_stop(&self) -> bool {
        {
            let mut state = self.lock_state();
            if !state.status.is_active() {
                return false;
            }
            if !state.cancel_requested {
                info!("[{}] stop requested for run {}", self.id, state.run_id);
            }
            state.cancel_requested = true;
        }
        self.wakeup.notify_one();
        true
    }

    pub fn status(&self) -> StatusSnapshot {
        let state = self.lock_state();
        StatusSnapshot {
            session_id: self.id.clone(),
            status: state.status,
            is_running: state.status.is_active(),
            step_count: state.step_count,
            config: state.config.clone(),
            run_id: state.run_id,
            last_error: state.last_error.clone(),
            connected_at: self.connected_at.clone(),
            output_dir: self
                .output_dir
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        }
    }

    /// Whether a run currently owns the execution context.
    pub fn is_running(&self) -> bool {
        self.lock_state().status.is_active()
    }

    /// Files the agent created in the output directory so far.
    pub fn created_files(&self) -> Vec<FileInfo> {
        let tracker = self.tracker.lock().unwrap_or_else(|e| e.into_inner());
        tracker
            .as_ref()
            .map(|t| t.created_files().to_vec())
            .unwrap_or_default()
    }

    /// Rescan the output directory, emit `file_created` for each new file,
    /// and return the new files.
    pub fn refresh_files(&self) -> Vec<FileInfo> {
        let fresh = {
            let mut tracker = self.tracker.lock().unwrap_or_else(|e| e.into_inner());
            match tracker.as_mut() {
                Some(t) => t.scan_for_new(),
                None => return Vec::new(),
            }
        };
        for file in &fresh {
            self.emit(&AgentEvent::FileCreated { file: file.clone() });
        }
        fresh
    }

    /// Stop the active run and wait up to `timeout` for its task to exit.
    ///
    /// On timeout the task is aborted, the session is forced to `stopped`,
    /// and [`SessionError::ContextReleaseFailure`] is returned.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), SessionError> {
        self.request_stop();
        let (task, run_id) = {
            let mut state = self.lock_state();
            (state.task.take(), state.run_id)
        };
        let Some(mut task) = task else {
            return Ok(());
        };

        if tokio::time::timeout(timeout, &mut task).await.is_ok() {
            return Ok(());
        }

        // Settle before aborting so the run's guard finds nothing to clean up.
        let forced = {
            let mut state = self.lock_state();
            let forced = state.run_id == run_id && state.status.is_active();
            if forced {
                state.set_status(SessionStatus::Stopped);
                if let Some(watchdog) = state.watchdog.take() {
                    watchdog.abort();
                }
            }
            forced
        };
        task.abort();
        if !forced {
            // The run reached a terminal state on its own in the meantime.
            return Ok(());
        }
        self.emit(&AgentEvent::Stopped {
            message: "Agent was stopped after failing to release in time".to_string(),
        });
        Err(SessionError::ContextReleaseFailure {
            session_id: self.id.clone(),
            reason: format!("run did not exit within {timeout:?}"),
        })
    }

    /// Refuse new runs from now on. The registry calls this before
    /// shutting a session down so nothing can start behind its back.
    pub(super) fn begin_close(&self) {
        self.closing.store(true, Ordering::Release);
    }

    /// Stop delivering events for this session. Once this returns, the
    /// emitter never sees this session id again.
    pub fn detach(&self) {
        *self.detached.lock().unwrap_or_else(|e| e.into_inner()) = true;
    }

    // ── Crate-internal surface for the orchestrator and registry ──

    pub(super) fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(super) fn core(&self) -> &AgentCore {
        &self.core
    }

    pub(super) fn limits(&self) -> &SessionLimits {
        &self.limits
    }

    pub(super) fn wakeup(&self) -> &Notify {
        &self.wakeup
    }

    /// Deliver one event unless the session has been detached.
    pub(super) fn emit(&self, event: &AgentEvent) {
        // Held across the call so `detach` cannot interleave with delivery.
        let detached = self.detached.lock().unwrap_or_else(|e| e.into_inner());
        if *detached {
            return;
        }
        self.emitter.emit(&self.id, event);
    }

    /// Rescan the output directory after a tool call. Emission is left to
    /// the caller so it stays ordered with the step events.
    pub(super) fn scan_new_files(&self) -> Vec<FileInfo> {
        let mut tracker = self.tracker.lock().unwrap_or_else(|e| e.into_inner());
        tracker
            .as_mut()
            .map(FileTracker::scan_for_new)
            .unwrap_or_default()
    }
}

impl fmt::Debug for AgentSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSession")
            .field("id", &self.id)
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

/// Stop run `run_id` once it has been active for `limit`.
fn spawn_watchdog(session: Weak<AgentSession>, run_id: u64, limit: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(limit).await;
        let Some(session) = session.upgrade() else {
            return;
        };
        let same_run = {
            let state = session.lock_state();
            state.run_id == run_id && state.status.is_active()
        };
        if same_run {
            warn!(
                "[{}] run {run_id} exceeded max duration of {limit:?}; stopping",
                session.id
            );
            session.request_stop();
        }
    })
}

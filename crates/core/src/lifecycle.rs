//! Client-side job lifecycle state machine.
//!
//! ```text
//! Unauthenticated -> Authenticated -> Submitted -> Polling -> Done | Canceled
//!                                              \-> Done (inline result)
//! ```
//!
//! [`JobLifecycle`] performs no I/O. Drivers feed it login, submission and
//! poll outcomes and act on what it returns, so the blocking, cooperative,
//! and lazy-sequence surfaces all share one set of transition rules.

use std::fmt;

use crate::codec::PayloadCodec;
use crate::error::{ApiError, ApiResult};
use crate::payload::JobResult;
use crate::progress::{JobState, PollStep, ProgressSnapshot};
use crate::submission::{JobHandle, SubmitOutcome};

/// Where a job currently is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    Unauthenticated,
    Authenticated,
    Submitted(JobHandle),
    Polling(JobHandle),
    Done,
    Canceled,
}

impl LifecycleState {
    /// Whether no further transition is allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Canceled)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => f.write_str("unauthenticated"),
            Self::Authenticated => f.write_str("authenticated"),
            Self::Submitted(handle) => write!(f, "submitted({})", handle.job_id),
            Self::Polling(handle) => write!(f, "polling({})", handle.job_id),
            Self::Done => f.write_str("done"),
            Self::Canceled => f.write_str("canceled"),
        }
    }
}

/// What a poll means for the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// Report this snapshot and keep polling.
    Progress(ProgressSnapshot),
    /// Report the terminal snapshot and return the result.
    Finished {
        snapshot: ProgressSnapshot,
        result: JobResult,
    },
    /// Stop polling silently; there is no result.
    Canceled,
}

/// The lifecycle of one job.
#[derive(Debug)]
pub struct JobLifecycle {
    state: LifecycleState,
    last_progress: u8,
}

impl JobLifecycle {
    /// A lifecycle that still needs to log in.
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Unauthenticated,
            last_progress: 0,
        }
    }

    /// A lifecycle on a session that already holds an auth key.
    pub fn authenticated() -> Self {
        Self {
            state: LifecycleState::Authenticated,
            last_progress: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    /// Whether the job is done or canceled.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Handle of the submitted job, once there is one.
    pub fn job_handle(&self) -> Option<&JobHandle> {
        match &self.state {
            LifecycleState::Submitted(handle) | LifecycleState::Polling(handle) => Some(handle),
            _ => None,
        }
    }

    /// Record a successful login. Logging in again before submission is
    /// allowed and simply keeps the lifecycle authenticated.
    pub fn on_login(&mut self) -> ApiResult<()> {
        match self.state {
            LifecycleState::Unauthenticated | LifecycleState::Authenticated => {
                self.state = LifecycleState::Authenticated;
                Ok(())
            }
            _ => Err(self.invalid("login")),
        }
    }

    /// Record the submission outcome.
    ///
    /// Returns the result when the lifecycle ends here (inline result or a
    /// rejected submission), or `None` when the job must now be polled.
    pub fn on_submitted(&mut self, outcome: SubmitOutcome, codec: &PayloadCodec) -> ApiResult<Option<JobResult>> {
        if self.state != LifecycleState::Authenticated {
            return Err(self.invalid("submission"));
        }
        match outcome {
            SubmitOutcome::Accepted(handle) => {
                self.state = LifecycleState::Submitted(handle);
                Ok(None)
            }
            SubmitOutcome::Finished(fields) | SubmitOutcome::Rejected(fields) => {
                let result = JobResult::new(codec.decode_result(fields)?);
                self.state = LifecycleState::Done;
                Ok(Some(result))
            }
        }
    }

    /// Enter the polling phase and return the synthetic initial snapshot.
    pub fn begin_polling(&mut self) -> ApiResult<ProgressSnapshot> {
        let LifecycleState::Submitted(handle) = &self.state else {
            return Err(self.invalid("begin polling"));
        };
        let handle = handle.clone();
        let snapshot = ProgressSnapshot::initial(handle.job_id.clone());
        self.state = LifecycleState::Polling(handle);
        self.last_progress = 0;
        Ok(snapshot)
    }

    /// Fold one normalized poll response into the lifecycle.
    ///
    /// Reported progress never decreases. Unconfirmed responses become a
    /// processing snapshot carrying their payload, at the last known
    /// progress. After a terminal event any further poll is rejected.
    pub fn on_poll(&mut self, step: PollStep) -> ApiResult<LifecycleEvent> {
        if !matches!(self.state, LifecycleState::Polling(_)) {
            return Err(self.invalid("poll"));
        }
        match step {
            PollStep::Progress(mut snapshot) => {
                snapshot.progress = snapshot.progress.max(self.last_progress);
                self.last_progress = snapshot.progress;
                Ok(LifecycleEvent::Progress(snapshot))
            }
            PollStep::Unconfirmed { job_id, payload } => {
                let snapshot = ProgressSnapshot {
                    job_id,
                    job_state: JobState::Processing,
                    progress: self.last_progress,
                    queue_position: -1,
                    estimate: -1.0,
                    progress_data: Some(payload),
                };
                Ok(LifecycleEvent::Progress(snapshot))
            }
            PollStep::Done { snapshot, result } => {
                self.state = LifecycleState::Done;
                self.last_progress = snapshot.progress;
                Ok(LifecycleEvent::Finished { snapshot, result })
            }
            PollStep::Canceled(_) => {
                self.state = LifecycleState::Canceled;
                Ok(LifecycleEvent::Canceled)
            }
        }
    }

    fn invalid(&self, event: &str) -> ApiError {
        ApiError::InvalidTransition(format!("{event} while {}", self.state))
    }
}

impl Default for JobLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

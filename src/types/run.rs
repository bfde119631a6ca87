//! Workflow run wire model.
//!
//! These types mirror the GitHub Actions REST and webhook payloads for a
//! workflow run. The status and conclusion enums are open-world: GitHub adds
//! values without notice, so decoding an unrecognized string must fall back to
//! `Unknown` rather than fail. Both channels (polling and the webhook relay)
//! decode into the same [`RunSnapshot`] so the reconciliation engine sees one
//! shape regardless of source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{RunId, WorkflowId};

/// Lifecycle status of a workflow run.
///
/// `Unknown` is the fallback for wire values this crate does not know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Completed,
    Waiting,
    Pending,
    Requested,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Returns true for any status that is not yet completed: queued,
    /// in_progress, waiting, pending, or requested.
    ///
    /// `Unknown` is not considered active; a run whose status we cannot
    /// interpret should not keep the poller in its fast cadence.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RunStatus::Queued
                | RunStatus::InProgress
                | RunStatus::Waiting
                | RunStatus::Pending
                | RunStatus::Requested
        )
    }

    /// Returns true when the run has finished and its conclusion is
    /// meaningful.
    pub fn is_completed(&self) -> bool {
        matches!(self, RunStatus::Completed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
            RunStatus::Waiting => "waiting",
            RunStatus::Pending => "pending",
            RunStatus::Requested => "requested",
            RunStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Outcome of a completed workflow run.
///
/// Only present when [`RunStatus::Completed`]; open-world like [`RunStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunConclusion {
    Success,
    Failure,
    Cancelled,
    Skipped,
    TimedOut,
    ActionRequired,
    Neutral,
    Stale,
    StartupFailure,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for RunConclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunConclusion::Success => "success",
            RunConclusion::Failure => "failure",
            RunConclusion::Cancelled => "cancelled",
            RunConclusion::Skipped => "skipped",
            RunConclusion::TimedOut => "timed_out",
            RunConclusion::ActionRequired => "action_required",
            RunConclusion::Neutral => "neutral",
            RunConclusion::Stale => "stale",
            RunConclusion::StartupFailure => "startup_failure",
            RunConclusion::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One observed workflow run, as returned by the runs-list endpoint or carried
/// in a `workflow_run` webhook payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub id: RunId,

    /// Display name of the run (usually the workflow name).
    pub name: String,

    /// Branch the run was triggered on. Absent for some trigger events.
    pub head_branch: Option<String>,

    pub head_sha: String,

    pub status: RunStatus,

    /// Outcome; present only once `status` is `completed`.
    pub conclusion: Option<RunConclusion>,

    pub workflow_id: WorkflowId,

    /// Link to the run's page, carried through to notification intents.
    pub html_url: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub run_number: u64,

    /// Attempt counter; absent on older payloads.
    #[serde(default)]
    pub run_attempt: Option<u64>,

    /// Trigger event name (e.g. "push", "workflow_dispatch").
    pub event: String,
}

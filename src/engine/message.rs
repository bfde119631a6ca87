//! Messages in and out of the reconciliation engine task.

use std::collections::HashMap;
use tokio::sync::oneshot;

use crate::notify::NotificationIntent;
use crate::types::{RunSnapshot, WatchedWorkflow, WorkflowId};

/// Commands the owning session sends to the engine.
#[derive(Debug)]
pub enum EngineCommand {
    /// Replace the watched workflow set. Stored runs and prior statuses for
    /// workflows no longer in the set are dropped.
    SetWatched(Vec<WatchedWorkflow>),

    /// Drop one workflow's stored runs and prior statuses.
    Forget(WorkflowId),

    /// Request a copy of all current run lists.
    Snapshot(oneshot::Sender<HashMap<WorkflowId, Vec<RunSnapshot>>>),

    /// Clear all run state (sign-out). The watched set is kept; the next
    /// batch per workflow is treated as a fresh baseline.
    Reset,
}

/// Events the engine emits to its single subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A workflow's run list changed (poll batch applied or push event
    /// merged). Carries the new authoritative list, newest first.
    RunsUpdated {
        workflow_id: WorkflowId,
        runs: Vec<RunSnapshot>,
    },

    /// A raw webhook event arrived over the relay, before reconciliation.
    WebhookEvent {
        action: String,
        run: RunSnapshot,
        repository: String,
    },

    /// A run transition worth telling the user about.
    Notification(NotificationIntent),
}

/// Ask for one full poll cycle outside the regular schedule. Sent by the
/// engine a few seconds after a push event to pick up peripheral state the
/// single pushed run did not carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshRequest;

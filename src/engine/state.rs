//! Pure reconciliation state: run lists, the previous-status table, and the
//! transition rules that decide what gets notified.
//!
//! # Baseline Batches
//!
//! The first batch for a workflow (no stored list, or an empty one) only
//! seeds the previous-status table. Without this, starting the engine while
//! runs are already in flight would fire a storm of "started" notifications.
//!
//! # Transition Rules
//!
//! Per run in a batch, against the previous-status entry for its id:
//! - "started" fires when the run is queued or in progress and either no
//!   prior observation exists (brand-new run) or the prior one was neither
//!   queued nor in progress. Consecutive active observations never re-fire.
//! - "completed" fires when the run is completed, a prior observation exists
//!   and it was not already completed.
//!
//! The previous-status entry is updated regardless of whether anything fired
//! and regardless of the notifications toggle, so flipping notifications on
//! never replays old transitions.

use std::collections::HashMap;
use tracing::debug;

use crate::notify::{NotificationIntent, NotificationKind};
use crate::types::{RunId, RunSnapshot, RunStatus, WatchedWorkflow, WorkflowId};

/// Statuses that count as "running" for the started notification. Narrower
/// than [`RunStatus::is_active`]: waiting/pending/requested seed prior state
/// but do not notify.
fn is_running(status: RunStatus) -> bool {
    matches!(status, RunStatus::Queued | RunStatus::InProgress)
}

/// All mutable reconciliation state. Owned exclusively by the engine task;
/// the methods here are synchronous and never block, which keeps every batch
/// a single atomic step against one consistent snapshot of the table.
#[derive(Debug, Default)]
pub struct ReconcilerState {
    watched: Vec<WatchedWorkflow>,
    runs: HashMap<WorkflowId, Vec<RunSnapshot>>,
    previous: HashMap<WorkflowId, HashMap<RunId, RunStatus>>,
}

impl ReconcilerState {
    pub fn new() -> Self {
        ReconcilerState::default()
    }

    pub fn watched(&self) -> &[WatchedWorkflow] {
        &self.watched
    }

    /// Replaces the watched set and prunes state for removed workflows.
    pub fn set_watched(&mut self, watched: Vec<WatchedWorkflow>) {
        self.watched = watched;
        let keep = |id: &WorkflowId| self.watched.iter().any(|w| w.workflow_id == *id);
        self.runs.retain(|id, _| keep(id));
        self.previous.retain(|id, _| keep(id));
    }

    pub fn forget(&mut self, workflow_id: WorkflowId) {
        self.runs.remove(&workflow_id);
        self.previous.remove(&workflow_id);
    }

    /// Drops all run state. The next batch per workflow is a baseline again.
    pub fn reset(&mut self) {
        self.runs.clear();
        self.previous.clear();
    }

    pub fn runs_for(&self, workflow_id: WorkflowId) -> Option<&[RunSnapshot]> {
        self.runs.get(&workflow_id).map(Vec::as_slice)
    }

    pub fn snapshot(&self) -> HashMap<WorkflowId, Vec<RunSnapshot>> {
        self.runs.clone()
    }

    /// Applies one batch, replacing the stored list wholesale, and returns
    /// the notifications the transition rules produced (empty when
    /// `notifications_enabled` is off, the batch is a baseline, or nothing
    /// changed).
    pub fn apply_batch(
        &mut self,
        workflow_id: WorkflowId,
        runs: Vec<RunSnapshot>,
        notifications_enabled: bool,
    ) -> Vec<NotificationIntent> {
        let baseline = self.runs.get(&workflow_id).is_none_or(Vec::is_empty);
        let previous = self.previous.entry(workflow_id).or_default();

        if baseline {
            for run in &runs {
                previous.insert(run.id, run.status);
            }
            debug!(workflow = %workflow_id, runs = runs.len(), "seeded baseline");
            self.runs.insert(workflow_id, runs);
            return Vec::new();
        }

        // Unwatched workflows (stale batch after an unwatch) still reconcile,
        // with placeholder names in any resulting notification.
        let (workflow_name, repo_name) = self
            .watched
            .iter()
            .find(|w| w.workflow_id == workflow_id)
            .map(|w| (w.workflow_name.clone(), w.repo.full_name()))
            .unwrap_or_else(|| ("Workflow".to_string(), String::new()));

        let mut intents = Vec::new();
        for run in &runs {
            let prior = previous.get(&run.id).copied();

            if notifications_enabled {
                let started = is_running(run.status) && !prior.is_some_and(is_running);
                let completed = run.status == RunStatus::Completed
                    && prior.is_some_and(|p| p != RunStatus::Completed);

                if started {
                    intents.push(NotificationIntent {
                        kind: NotificationKind::Started,
                        run: run.clone(),
                        workflow_name: workflow_name.clone(),
                        repo_name: repo_name.clone(),
                    });
                }
                if completed {
                    intents.push(NotificationIntent {
                        kind: NotificationKind::Completed,
                        run: run.clone(),
                        workflow_name: workflow_name.clone(),
                        repo_name: repo_name.clone(),
                    });
                }
            }

            previous.insert(run.id, run.status);
        }

        self.runs.insert(workflow_id, runs);
        intents
    }

    /// Merges one pushed run into the stored list (replace by id, prepend if
    /// new) and hands the merged list to the batch logic. `None` when the run
    /// does not belong to any watched workflow.
    pub fn apply_push(
        &mut self,
        run: RunSnapshot,
        repository: &str,
        notifications_enabled: bool,
    ) -> Option<Vec<NotificationIntent>> {
        let workflow_id = run.workflow_id;
        self.watched
            .iter()
            .find(|w| w.workflow_id == workflow_id && w.repo.full_name() == repository)?;

        let mut merged = self.runs.get(&workflow_id).cloned().unwrap_or_default();
        match merged.iter_mut().find(|r| r.id == run.id) {
            Some(existing) => *existing = run,
            None => merged.insert(0, run),
        }
        Some(self.apply_batch(workflow_id, merged, notifications_enabled))
    }
}

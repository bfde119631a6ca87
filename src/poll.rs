//! Adaptive polling scheduler.
//!
//! Polling is one of the two observation channels (the relay client is the
//! other) and the only one that works with no webhook set up, so it is the
//! backbone: the relay only lowers latency. The scheduler fans out one
//! runs-list fetch per watched workflow, concurrently, and adapts its cadence
//! to whether anything is running: the active interval while any run is
//! in flight, the base interval otherwise.
//!
//! # Failure Isolation
//!
//! A per-workflow fetch failure (network, rate limit, decode) is swallowed and
//! counted as "not active" for that workflow; it never aborts the batch or the
//! other in-flight fetches. The next cycle simply tries again.
//!
//! # Batch Atomicity
//!
//! All fetches of one cycle are awaited jointly; run-update batches are only
//! emitted after the whole fan-out completes, so the reconciliation engine
//! never observes a partial cycle.

use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::SettingsSource;
use crate::github::RunApi;
use crate::types::{RunSnapshot, WatchedWorkflow, WorkflowId};

/// Runs fetched per workflow per cycle. Matches the run-list depth the engine
/// keeps per workflow.
const RUNS_PER_POLL: u8 = 5;

/// One workflow's runs from one completed poll cycle, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct RunBatch {
    pub workflow_id: WorkflowId,
    pub runs: Vec<RunSnapshot>,
}

struct PollTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Periodic fan-out poller over the watched workflow set.
///
/// Batches go out on the mpsc channel supplied at construction (single
/// subscriber: the reconciliation engine). Intervals are re-read from the
/// settings source before every sleep, so runtime changes take effect on the
/// next sleep, not the current one.
pub struct Poller {
    api: Arc<dyn RunApi>,
    settings: Arc<dyn SettingsSource>,
    batches: mpsc::Sender<RunBatch>,
    any_active: Arc<AtomicBool>,
    task: Mutex<Option<PollTask>>,
}

impl Poller {
    pub fn new(
        api: Arc<dyn RunApi>,
        settings: Arc<dyn SettingsSource>,
        batches: mpsc::Sender<RunBatch>,
    ) -> Self {
        Poller {
            api,
            settings,
            batches,
            any_active: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    /// Starts the polling loop: an immediate poll, then sleep/poll until
    /// stopped. Cancels any existing loop first. Does nothing for an empty
    /// watched set.
    pub fn start(&self, workflows: Vec<WatchedWorkflow>) {
        self.cancel_existing();
        if workflows.is_empty() {
            debug!("no watched workflows; polling loop not started");
            return;
        }
        info!(count = workflows.len(), "starting polling loop");

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            self.api.clone(),
            self.settings.clone(),
            workflows,
            self.batches.clone(),
            self.any_active.clone(),
            cancel.clone(),
        ));
        *self.task.lock().expect("poll task lock poisoned") = Some(PollTask { cancel, handle });
    }

    /// Stops the polling loop. Idempotent; safe when not running. No batch is
    /// delivered after this returns.
    pub async fn stop(&self) {
        let task = self.task.lock().expect("poll task lock poisoned").take();
        if let Some(task) = task {
            task.cancel.cancel();
            task.handle.abort();
            let _ = task.handle.await;
        }
    }

    /// Performs exactly one fan-out poll (manual refresh, post-dispatch
    /// confirmation). Does not touch the loop's in-flight sleep; does update
    /// the shared any-active flag, which the loop reads at its next sleep.
    pub async fn poll_once(&self, workflows: &[WatchedWorkflow]) {
        poll_all(&self.api, workflows, &self.batches, &self.any_active).await;
    }

    fn cancel_existing(&self) {
        if let Some(task) = self.task.lock().expect("poll task lock poisoned").take() {
            task.cancel.cancel();
            task.handle.abort();
        }
    }
}

async fn poll_loop(
    api: Arc<dyn RunApi>,
    settings: Arc<dyn SettingsSource>,
    workflows: Vec<WatchedWorkflow>,
    batches: mpsc::Sender<RunBatch>,
    any_active: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    poll_all(&api, &workflows, &batches, &any_active).await;

    loop {
        let current = settings.current();
        let interval = if any_active.load(Ordering::Relaxed) {
            current.active_interval()
        } else {
            current.base_interval()
        };

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
        poll_all(&api, &workflows, &batches, &any_active).await;
    }
}

/// One complete fan-out cycle: fetch all workflows concurrently, then emit a
/// batch per success and recompute the any-active flag from the union of
/// successful results.
async fn poll_all(
    api: &Arc<dyn RunApi>,
    workflows: &[WatchedWorkflow],
    batches: &mpsc::Sender<RunBatch>,
    any_active: &AtomicBool,
) {
    let fetches = workflows.iter().map(|workflow| async move {
        match api
            .list_runs(&workflow.repo, workflow.workflow_id, RUNS_PER_POLL)
            .await
        {
            Ok(runs) => Some((workflow.workflow_id, runs)),
            Err(e) => {
                debug!(workflow = %workflow, error = %e, "poll fetch failed; treated as not active");
                None
            }
        }
    });
    let results = join_all(fetches).await;

    let mut active = false;
    for (workflow_id, runs) in results.into_iter().flatten() {
        if runs.iter().any(|r| r.status.is_active()) {
            active = true;
        }
        if batches.send(RunBatch { workflow_id, runs }).await.is_err() {
            debug!("run-batch receiver dropped");
            break;
        }
    }
    any_active.store(active, Ordering::Relaxed);
}

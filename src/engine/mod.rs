//! Reconciliation and notification engine.
//!
//! The single serialization point for run-state observations. Poll batches
//! and relay push events from any number of producers funnel into one owned
//! state task; each batch is applied as one atomic step against a consistent
//! snapshot of the previous-status table, so transition decisions never see a
//! half-applied cycle and each transition notifies exactly once.
//!
//! # Module Structure
//!
//! - [`message`]: commands in, events out
//! - [`state`]: the pure reconciliation rules, testable without a runtime
//!
//! The actor itself lives here: it owns a [`ReconcilerState`], selects over
//! the command, batch, and relay channels, and schedules the delayed
//! follow-up poll after push events.

pub mod message;
pub mod state;

pub use message::{EngineCommand, EngineEvent, RefreshRequest};
pub use state::ReconcilerState;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::SettingsSource;
use crate::poll::RunBatch;
use crate::relay::RelayEvent;
use crate::types::{RunSnapshot, WatchedWorkflow, WorkflowId};

/// Delay before the follow-up full poll after a push event, long enough for
/// sibling-run state to settle on the remote side.
const PUSH_FOLLOW_UP: Duration = Duration::from_secs(3);

const COMMAND_BUFFER: usize = 16;

/// Spawns the engine task and returns its handle.
///
/// `batches` and `relay_events` are the observation inlets; `events` is the
/// single-subscriber outlet; `refresh` carries follow-up poll requests back
/// to whoever drives the poller.
pub fn spawn(
    settings: Arc<dyn SettingsSource>,
    batches: mpsc::Receiver<RunBatch>,
    relay_events: mpsc::Receiver<RelayEvent>,
    events: mpsc::Sender<EngineEvent>,
    refresh: mpsc::Sender<RefreshRequest>,
) -> EngineHandle {
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
    let cancel = CancellationToken::new();
    let task = EngineTask {
        state: ReconcilerState::new(),
        settings,
        events,
        refresh,
        pending_refresh: None,
    };
    let handle = tokio::spawn(task.run(commands_rx, batches, relay_events, cancel.clone()));
    EngineHandle {
        commands: commands_tx,
        cancel,
        handle: Mutex::new(Some(handle)),
    }
}

/// Owning handle to the engine task. Commands are fire-and-forget except
/// [`snapshot`](EngineHandle::snapshot), which round-trips.
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl EngineHandle {
    pub async fn set_watched(&self, watched: Vec<WatchedWorkflow>) {
        let _ = self.commands.send(EngineCommand::SetWatched(watched)).await;
    }

    pub async fn forget(&self, workflow_id: WorkflowId) {
        let _ = self.commands.send(EngineCommand::Forget(workflow_id)).await;
    }

    pub async fn reset(&self) {
        let _ = self.commands.send(EngineCommand::Reset).await;
    }

    /// Current run lists per workflow. Empty after shutdown.
    pub async fn snapshot(&self) -> HashMap<WorkflowId, Vec<RunSnapshot>> {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(EngineCommand::Snapshot(tx)).await.is_err() {
            return HashMap::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Stops the engine task. No event is emitted after this returns.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.handle.lock().expect("engine handle lock poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

struct EngineTask {
    state: ReconcilerState,
    settings: Arc<dyn SettingsSource>,
    events: mpsc::Sender<EngineEvent>,
    refresh: mpsc::Sender<RefreshRequest>,
    /// Delayed follow-up poll after a push event; replaced, not stacked, when
    /// pushes arrive in quick succession.
    pending_refresh: Option<JoinHandle<()>>,
}

impl EngineTask {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<EngineCommand>,
        mut batches: mpsc::Receiver<RunBatch>,
        mut relay_events: mpsc::Receiver<RelayEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(command) = commands.recv() => self.handle_command(command),
                Some(batch) = batches.recv() => self.handle_batch(batch).await,
                Some(event) = relay_events.recv() => self.handle_relay_event(event).await,
                else => break,
            }
        }
        if let Some(pending) = self.pending_refresh.take() {
            pending.abort();
        }
        debug!("engine task stopped");
    }

    fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::SetWatched(watched) => {
                debug!(count = watched.len(), "watched set replaced");
                self.state.set_watched(watched);
            }
            EngineCommand::Forget(workflow_id) => self.state.forget(workflow_id),
            EngineCommand::Snapshot(reply) => {
                let _ = reply.send(self.state.snapshot());
            }
            EngineCommand::Reset => self.state.reset(),
        }
    }

    async fn handle_batch(&mut self, batch: RunBatch) {
        let enabled = self.settings.current().notifications_enabled;
        let intents = self.state.apply_batch(batch.workflow_id, batch.runs, enabled);
        self.emit_runs_updated(batch.workflow_id).await;
        for intent in intents {
            self.emit(EngineEvent::Notification(intent)).await;
        }
    }

    async fn handle_relay_event(&mut self, event: RelayEvent) {
        self.emit(EngineEvent::WebhookEvent {
            action: event.action.clone(),
            run: event.run.clone(),
            repository: event.repository.clone(),
        })
        .await;

        let enabled = self.settings.current().notifications_enabled;
        let workflow_id = event.run.workflow_id;
        let Some(intents) = self
            .state
            .apply_push(event.run, &event.repository, enabled)
        else {
            debug!(workflow = %workflow_id, repo = %event.repository, "push event for unwatched workflow dropped");
            return;
        };

        self.emit_runs_updated(workflow_id).await;
        for intent in intents {
            self.emit(EngineEvent::Notification(intent)).await;
        }
        self.schedule_follow_up();
    }

    async fn emit_runs_updated(&self, workflow_id: WorkflowId) {
        let runs = self
            .state
            .runs_for(workflow_id)
            .map(<[RunSnapshot]>::to_vec)
            .unwrap_or_default();
        self.emit(EngineEvent::RunsUpdated { workflow_id, runs }).await;
    }

    async fn emit(&self, event: EngineEvent) {
        if self.events.send(event).await.is_err() {
            warn!("engine event receiver dropped");
        }
    }

    /// Arms (or re-arms) the delayed full poll that follows a push event.
    fn schedule_follow_up(&mut self) {
        if let Some(pending) = self.pending_refresh.take() {
            pending.abort();
        }
        let refresh = self.refresh.clone();
        self.pending_refresh = Some(tokio::spawn(async move {
            tokio::time::sleep(PUSH_FOLLOW_UP).await;
            let _ = refresh.send(RefreshRequest).await;
        }));
    }
}

//! Top-level session wiring the poller, relay client, hook manager, and
//! reconciliation engine together.
//!
//! A [`WatchSession`] owns all four components and the channels between them.
//! The embedding application drives it with watch/unwatch calls and settings
//! changes, and consumes the engine's event stream plus the relay's
//! connection-state channel.
//!
//! # Channel Topology
//!
//! ```text
//! Poller ──batches──────┐
//!                       ├──> Engine ──events──> application
//! RelayClient ──events──┘       │
//!       ▲                       └──refresh requests──> poll_once
//!       └── connection state ──> application
//! ```

use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::SettingsSource;
use crate::engine::{self, EngineEvent, EngineHandle, RefreshRequest};
use crate::github::RunApi;
use crate::hooks::{HookManager, HookRegistry};
use crate::poll::Poller;
use crate::relay::{ConnectionState, RelayClient, RelayError};
use crate::types::{RunSnapshot, WatchedWorkflow, WorkflowId};

const EVENT_BUFFER: usize = 64;
const BATCH_BUFFER: usize = 32;
const RELAY_BUFFER: usize = 32;

/// The event streams a session exposes to its owner.
pub struct SessionEvents {
    /// Run updates, raw webhook events, and notification intents.
    pub events: mpsc::Receiver<EngineEvent>,

    /// Relay connection state, for status display.
    pub connection: watch::Receiver<ConnectionState>,
}

/// One signed-in watching session.
pub struct WatchSession {
    settings: Arc<dyn SettingsSource>,
    poller: Arc<Poller>,
    relay: RelayClient,
    engine: EngineHandle,
    hooks: HookManager,
    registry: Mutex<HookRegistry>,
    watched: Arc<StdMutex<Vec<WatchedWorkflow>>>,
    relay_url: StdMutex<Option<String>>,
    refresh_task: StdMutex<Option<JoinHandle<()>>>,
}

impl WatchSession {
    /// Wires up a session over the given API client. Fails only if the relay
    /// HTTP client cannot be built.
    pub fn new(
        api: Arc<dyn RunApi>,
        settings: Arc<dyn SettingsSource>,
    ) -> Result<(Self, SessionEvents), RelayError> {
        let (batch_tx, batch_rx) = mpsc::channel(BATCH_BUFFER);
        let (relay_tx, relay_rx) = mpsc::channel(RELAY_BUFFER);
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (refresh_tx, refresh_rx) = mpsc::channel(4);

        let (relay, connection) = RelayClient::new(relay_tx)?;
        let engine = engine::spawn(
            settings.clone(),
            batch_rx,
            relay_rx,
            event_tx,
            refresh_tx,
        );
        let poller = Arc::new(Poller::new(api.clone(), settings.clone(), batch_tx));
        let watched = Arc::new(StdMutex::new(Vec::new()));

        let refresh_task = tokio::spawn(drive_refreshes(
            refresh_rx,
            poller.clone(),
            watched.clone(),
        ));

        let session = WatchSession {
            hooks: HookManager::new(api),
            settings,
            poller,
            relay,
            engine,
            registry: Mutex::new(HookRegistry::default()),
            watched,
            relay_url: StdMutex::new(None),
            refresh_task: StdMutex::new(Some(refresh_task)),
        };
        Ok((session, SessionEvents { events: event_rx, connection }))
    }

    /// Restores a persisted hook registry and relay channel URL, before
    /// `start`.
    pub fn restore(&self, registry: HookRegistry, relay_url: Option<String>) {
        *self.registry.try_lock().expect("restore before start") = registry;
        *self.relay_url.lock().expect("relay url lock poisoned") = relay_url;
    }

    /// Begins watching. Idempotent per workflow (keyed on repository and
    /// workflow id); restarts the polling loop and re-syncs webhooks.
    pub async fn watch(&self, workflow: WatchedWorkflow) {
        {
            let mut watched = self.watched.lock().expect("watched lock poisoned");
            if watched.contains(&workflow) {
                return;
            }
            info!(workflow = %workflow, "watching");
            watched.push(workflow);
        }
        self.apply_watched_set().await;
    }

    /// Stops watching one workflow and drops its run state.
    pub async fn unwatch(&self, workflow_id: WorkflowId) {
        {
            let mut watched = self.watched.lock().expect("watched lock poisoned");
            let before = watched.len();
            watched.retain(|w| w.workflow_id != workflow_id);
            if watched.len() == before {
                return;
            }
        }
        self.engine.forget(workflow_id).await;
        self.apply_watched_set().await;
    }

    pub fn watched(&self) -> Vec<WatchedWorkflow> {
        self.watched.lock().expect("watched lock poisoned").clone()
    }

    /// Starts (or restarts) the observation channels for the current watched
    /// set, honoring the polling and webhook toggles.
    pub async fn start(&self) {
        self.apply_watched_set().await;
        let url = self.relay_url.lock().expect("relay url lock poisoned").clone();
        if let Some(url) = url {
            if self.settings.current().webhooks_enabled {
                self.relay.start(url);
            }
        }
    }

    /// One immediate full poll, outside the regular schedule.
    pub async fn refresh_now(&self) {
        let watched = self.watched();
        self.poller.poll_once(&watched).await;
    }

    /// Turns the push channel on: connects the relay to `relay_url` and
    /// provisions webhooks for every watched repository.
    pub async fn enable_webhooks(&self, relay_url: impl Into<String>) {
        let url = relay_url.into();
        *self.relay_url.lock().expect("relay url lock poisoned") = Some(url.clone());
        self.relay.start(url.clone());
        let watched = self.watched();
        let mut registry = self.registry.lock().await;
        self.hooks.sync(&watched, &url, &mut registry).await;
    }

    /// Turns the push channel off: disconnects the relay and deletes every
    /// provisioned webhook. Polling is unaffected.
    pub async fn disable_webhooks(&self) {
        self.relay.stop().await;
        let mut registry = self.registry.lock().await;
        self.hooks.disable_all(&mut registry).await;
        *self.relay_url.lock().expect("relay url lock poisoned") = None;
    }

    /// Current hook registry, for persistence.
    pub async fn hook_registry(&self) -> HookRegistry {
        self.registry.lock().await.clone()
    }

    pub async fn snapshot(
        &self,
    ) -> std::collections::HashMap<WorkflowId, Vec<RunSnapshot>> {
        self.engine.snapshot().await
    }

    /// Drops all run state (sign-out) without touching the watched set or
    /// webhooks. The next poll per workflow is a fresh baseline.
    pub async fn reset(&self) {
        self.engine.reset().await;
    }

    /// Stops every long-running task. No event is delivered after this
    /// returns. The session cannot be restarted; build a new one.
    pub async fn shutdown(&self) {
        self.poller.stop().await;
        self.relay.stop().await;
        if let Some(task) = self
            .refresh_task
            .lock()
            .expect("refresh task lock poisoned")
            .take()
        {
            task.abort();
            let _ = task.await;
        }
        self.engine.shutdown().await;
        debug!("session shut down");
    }

    /// Pushes the current watched set to the engine, restarts or stops the
    /// polling loop per the polling toggle, and re-syncs webhooks when the
    /// push channel is up.
    async fn apply_watched_set(&self) {
        let watched = self.watched();
        self.engine.set_watched(watched.clone()).await;

        if self.settings.current().polling_enabled {
            self.poller.start(watched.clone());
        } else {
            self.poller.stop().await;
        }

        let url = self.relay_url.lock().expect("relay url lock poisoned").clone();
        if let Some(url) = url {
            if self.settings.current().webhooks_enabled {
                let mut registry = self.registry.lock().await;
                self.hooks.sync(&watched, &url, &mut registry).await;
            }
        }
    }
}

/// Consumes follow-up refresh requests from the engine and turns each into
/// one immediate poll of the current watched set.
async fn drive_refreshes(
    mut refreshes: mpsc::Receiver<RefreshRequest>,
    poller: Arc<Poller>,
    watched: Arc<StdMutex<Vec<WatchedWorkflow>>>,
) {
    while refreshes.recv().await.is_some() {
        let current = watched.lock().expect("watched lock poisoned").clone();
        debug!(count = current.len(), "push follow-up poll");
        poller.poll_once(&current).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Settings, SharedSettings};
    use crate::notify::NotificationKind;
    use crate::test_utils::{completed_run, run, watched, MockRunApi};
    use crate::types::{RunConclusion, RunStatus};
    use std::time::Duration;

    const RELAY: &str = "http://127.0.0.1:9/relay-channel";

    fn session_with(
        api: Arc<MockRunApi>,
        settings: Settings,
    ) -> (WatchSession, SessionEvents, SharedSettings) {
        let shared = SharedSettings::new(settings);
        let (session, events) =
            WatchSession::new(api, Arc::new(shared.clone())).expect("session builds");
        (session, events, shared)
    }

    #[tokio::test(start_paused = true)]
    async fn watch_starts_polling_and_feeds_the_engine() {
        let api = MockRunApi::new();
        api.push_runs(42, vec![run(1, 42, RunStatus::InProgress)]);
        let (session, mut out, _) = session_with(api.clone(), Settings::default());

        session.watch(watched("alice", "app", 42, "CI")).await;

        match out.events.recv().await.unwrap() {
            EngineEvent::RunsUpdated { workflow_id, runs } => {
                assert_eq!(workflow_id, WorkflowId(42));
                assert_eq!(runs.len(), 1);
            }
            other => panic!("expected RunsUpdated, got {other:?}"),
        }
        assert_eq!(session.snapshot().await[&WorkflowId(42)].len(), 1);
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn watching_twice_is_a_no_op() {
        let api = MockRunApi::new();
        let (session, _out, _) = session_with(api.clone(), Settings::default());

        session.watch(watched("alice", "app", 42, "CI")).await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        let calls = api.list_call_count();
        session.watch(watched("alice", "app", 42, "CI")).await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(session.watched().len(), 1);
        // No restart happened, so no extra immediate poll.
        assert_eq!(api.list_call_count(), calls);
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unwatch_drops_state_and_stops_polling_when_empty() {
        let api = MockRunApi::new();
        api.push_runs(42, vec![completed_run(1, 42, RunConclusion::Success)]);
        let (session, _out, _) = session_with(api.clone(), Settings::default());

        session.watch(watched("alice", "app", 42, "CI")).await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        session.unwatch(WorkflowId(42)).await;

        assert!(session.watched().is_empty());
        assert!(session.snapshot().await.is_empty());

        let calls = api.list_call_count();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(api.list_call_count(), calls);
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn polling_toggle_is_respected() {
        let api = MockRunApi::new();
        let (session, _out, _) = session_with(
            api.clone(),
            Settings {
                polling_enabled: false,
                ..Settings::default()
            },
        );

        session.watch(watched("alice", "app", 42, "CI")).await;
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(api.list_call_count(), 0);

        // Manual refresh still works with polling off.
        session.refresh_now().await;
        assert_eq!(api.list_call_count(), 1);
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn enable_webhooks_provisions_hooks_for_watched_repos() {
        let api = MockRunApi::new();
        let (session, _out, _) = session_with(api.clone(), Settings::default());

        session.watch(watched("alice", "app", 42, "CI")).await;
        session.watch(watched("bob", "lib", 7, "Test")).await;
        session.enable_webhooks(RELAY).await;

        let registry = session.hook_registry().await;
        assert_eq!(registry.len(), 2);
        assert!(registry.hook_for("alice/app").is_some());

        // A later watch in a new repository syncs its hook too.
        session.watch(watched("carol", "site", 9, "Pages")).await;
        assert_eq!(session.hook_registry().await.len(), 3);
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disable_webhooks_deletes_hooks_and_clears_the_registry() {
        let api = MockRunApi::new();
        let (session, _out, _) = session_with(api.clone(), Settings::default());

        session.watch(watched("alice", "app", 42, "CI")).await;
        session.enable_webhooks(RELAY).await;
        session.disable_webhooks().await;

        assert!(session.hook_registry().await.is_empty());
        assert_eq!(api.deleted_hooks().len(), 1);
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn restored_registry_is_not_reprovisioned() {
        let api = MockRunApi::new();
        let (session, _out, _) = session_with(api.clone(), Settings::default());

        let persisted: HookRegistry =
            serde_json::from_str(r#"{"alice/app":7}"#).unwrap();
        session.restore(persisted, Some(RELAY.to_string()));
        session.watch(watched("alice", "app", 42, "CI")).await;

        assert!(api.created_hooks().is_empty());
        assert_eq!(session.hook_registry().await.hook_for("alice/app"), Some(crate::types::HookId(7)));
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn transitions_surface_as_notification_intents() {
        let api = MockRunApi::new();
        api.push_runs(42, vec![run(1, 42, RunStatus::InProgress)]);
        api.push_runs(42, vec![completed_run(1, 42, RunConclusion::Failure)]);
        let (session, mut out, _) = session_with(api.clone(), Settings::default());

        session.watch(watched("alice", "app", 42, "CI")).await;
        // Baseline batch.
        assert!(matches!(
            out.events.recv().await.unwrap(),
            EngineEvent::RunsUpdated { .. }
        ));

        session.refresh_now().await;
        assert!(matches!(
            out.events.recv().await.unwrap(),
            EngineEvent::RunsUpdated { .. }
        ));
        match out.events.recv().await.unwrap() {
            EngineEvent::Notification(intent) => {
                assert_eq!(intent.kind, NotificationKind::Completed);
                assert_eq!(intent.title(), "Workflow Failed");
                assert_eq!(intent.body(), "CI in alice/app - #1 (main)");
            }
            other => panic!("expected Notification, got {other:?}"),
        }
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_silences_everything() {
        let api = MockRunApi::new();
        api.push_runs(42, vec![run(1, 42, RunStatus::Queued)]);
        let (session, mut out, _) = session_with(api.clone(), Settings::default());

        session.watch(watched("alice", "app", 42, "CI")).await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        session.shutdown().await;

        let calls = api.list_call_count();
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(api.list_call_count(), calls);
        while let Ok(event) = out.events.try_recv() {
            // Events applied before shutdown may still be buffered.
            let _ = event;
        }
        assert!(out.events.recv().await.is_none());
    }
}

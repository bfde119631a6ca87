//! Webhook subscription lifecycle.
//!
//! One `workflow_run` webhook per watched repository, pointed at the relay
//! channel URL. The registry of provisioned hook ids is owned by the caller
//! (the session persists it) and reconciled here against the current watch
//! set: stale hooks are deleted, missing ones created. Every remote call is
//! best effort; a failed delete still drops the registry entry so a hook
//! removed out of band does not wedge the set, and a failed create is retried
//! implicitly on the next sync.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::github::RunApi;
use crate::types::{HookId, RepoId, WatchedWorkflow};

/// Provisioned webhook ids keyed by repository full name.
///
/// Serializable so the session can persist it across restarts; a lost
/// registry only costs orphaned hooks on the remote side, never missed
/// events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HookRegistry {
    hooks: BTreeMap<String, HookId>,
}

impl HookRegistry {
    pub fn hook_for(&self, full_name: &str) -> Option<HookId> {
        self.hooks.get(full_name).copied()
    }

    pub fn repos(&self) -> impl Iterator<Item = &str> {
        self.hooks.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }
}

/// Reconciles remote webhooks against the watched repository set.
pub struct HookManager {
    api: Arc<dyn RunApi>,
}

impl HookManager {
    pub fn new(api: Arc<dyn RunApi>) -> Self {
        HookManager { api }
    }

    /// Brings the remote hook set in line with `watched`: deletes hooks for
    /// repositories no longer watched, creates hooks for newly watched ones.
    /// Creations run concurrently. Already-registered repositories are left
    /// untouched.
    pub async fn sync(
        &self,
        watched: &[WatchedWorkflow],
        relay_url: &str,
        registry: &mut HookRegistry,
    ) {
        let desired: BTreeSet<String> = watched.iter().map(|w| w.repo.full_name()).collect();

        let stale: Vec<String> = registry
            .hooks
            .keys()
            .filter(|name| !desired.contains(*name))
            .cloned()
            .collect();
        for full_name in &stale {
            if let Some(hook) = registry.hooks.remove(full_name) {
                self.delete(full_name, hook).await;
            }
        }

        let missing: Vec<RepoId> = desired
            .iter()
            .filter(|name| !registry.hooks.contains_key(*name))
            .filter_map(|name| RepoId::parse_full_name(name))
            .collect();
        let creations = missing.iter().map(|repo| async move {
            (repo.full_name(), self.api.create_hook(repo, relay_url).await)
        });
        for (full_name, result) in join_all(creations).await {
            match result {
                Ok(hook) => {
                    info!(repo = %full_name, hook = %hook, "webhook created");
                    registry.hooks.insert(full_name, hook);
                }
                Err(e) => {
                    warn!(repo = %full_name, error = %e, "webhook creation failed; will retry on next sync");
                }
            }
        }
    }

    /// Deletes every registered hook and empties the registry. Failures are
    /// logged and skipped; the entry is dropped either way.
    pub async fn disable_all(&self, registry: &mut HookRegistry) {
        let hooks = std::mem::take(&mut registry.hooks);
        for (full_name, hook) in hooks {
            self.delete(&full_name, hook).await;
        }
    }

    async fn delete(&self, full_name: &str, hook: HookId) {
        let Some(repo) = RepoId::parse_full_name(full_name) else {
            warn!(repo = %full_name, "dropping hook entry with malformed repo name");
            return;
        };
        match self.api.delete_hook(&repo, hook).await {
            Ok(()) => info!(repo = %full_name, hook = %hook, "webhook deleted"),
            Err(e) => {
                warn!(repo = %full_name, hook = %hook, error = %e, "webhook deletion failed; dropping entry anyway");
            }
        }
    }
}

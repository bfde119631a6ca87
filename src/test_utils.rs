//! Shared test utilities: snapshot builders plus a scripted in-memory
//! [`RunApi`] double used by the poller, hook-manager, and session tests.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::github::{ApiError, RunApi};
use crate::types::{
    HookId, RepoId, RunConclusion, RunSnapshot, RunStatus, WatchedWorkflow, WorkflowId,
};

pub fn watched(owner: &str, repo: &str, workflow_id: u64, name: &str) -> WatchedWorkflow {
    WatchedWorkflow {
        repo: RepoId::new(owner, repo),
        workflow_id: WorkflowId(workflow_id),
        workflow_name: name.to_string(),
    }
}

/// A run snapshot with the given status and placeholder metadata.
pub fn run(id: u64, workflow_id: u64, status: RunStatus) -> RunSnapshot {
    let created = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    RunSnapshot {
        id: crate::types::RunId(id),
        name: "CI".to_string(),
        head_branch: Some("main".to_string()),
        head_sha: "0fb5a4d2".to_string(),
        status,
        conclusion: None,
        workflow_id: WorkflowId(workflow_id),
        html_url: format!("https://github.com/o/r/actions/runs/{id}"),
        created_at: created,
        updated_at: created,
        run_number: id,
        run_attempt: Some(1),
        event: "push".to_string(),
    }
}

pub fn completed_run(id: u64, workflow_id: u64, conclusion: RunConclusion) -> RunSnapshot {
    RunSnapshot {
        status: RunStatus::Completed,
        conclusion: Some(conclusion),
        ..run(id, workflow_id, RunStatus::Completed)
    }
}

#[derive(Default)]
struct MockState {
    /// Scripted responses per workflow; the last entry repeats once reached.
    runs: HashMap<WorkflowId, VecDeque<Vec<RunSnapshot>>>,
    failing_workflows: HashSet<WorkflowId>,
    failing_hook_repos: HashSet<String>,
    failing_hook_deletes: HashSet<HookId>,
    list_calls: Vec<(WorkflowId, tokio::time::Instant)>,
    created_hooks: Vec<(String, String)>,
    deleted_hooks: Vec<(String, HookId)>,
}

/// Scripted [`RunApi`] double. Run responses are queued per workflow and the
/// final queued response repeats forever; hook creation hands out sequential
/// ids. Failures are simulated per workflow / per repo / per hook id.
pub struct MockRunApi {
    state: Mutex<MockState>,
    next_hook_id: AtomicU64,
}

impl MockRunApi {
    pub fn new() -> Arc<Self> {
        Arc::new(MockRunApi {
            state: Mutex::new(MockState::default()),
            next_hook_id: AtomicU64::new(100),
        })
    }

    pub fn push_runs(&self, workflow_id: u64, runs: Vec<RunSnapshot>) {
        self.state
            .lock()
            .unwrap()
            .runs
            .entry(WorkflowId(workflow_id))
            .or_default()
            .push_back(runs);
    }

    /// Makes every runs fetch for this workflow fail with a transient error.
    pub fn fail_runs_for(&self, workflow_id: u64) {
        self.state
            .lock()
            .unwrap()
            .failing_workflows
            .insert(WorkflowId(workflow_id));
    }

    pub fn fail_hook_creation_for(&self, full_name: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_hook_repos
            .insert(full_name.to_string());
    }

    pub fn fail_hook_deletion_of(&self, hook: HookId) {
        self.state
            .lock()
            .unwrap()
            .failing_hook_deletes
            .insert(hook);
    }

    pub fn list_calls(&self) -> Vec<(WorkflowId, tokio::time::Instant)> {
        self.state.lock().unwrap().list_calls.clone()
    }

    pub fn list_call_count(&self) -> usize {
        self.state.lock().unwrap().list_calls.len()
    }

    /// Hook creations recorded as (repo full name, relay url).
    pub fn created_hooks(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().created_hooks.clone()
    }

    /// Hook deletions recorded as (repo full name, hook id); failed attempts
    /// are recorded too.
    pub fn deleted_hooks(&self) -> Vec<(String, HookId)> {
        self.state.lock().unwrap().deleted_hooks.clone()
    }
}

#[async_trait]
impl RunApi for MockRunApi {
    async fn list_runs(
        &self,
        _repo: &RepoId,
        workflow: WorkflowId,
        _limit: u8,
    ) -> Result<Vec<RunSnapshot>, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.list_calls.push((workflow, tokio::time::Instant::now()));
        if state.failing_workflows.contains(&workflow) {
            return Err(ApiError::from_status(503, "scripted failure".to_string()));
        }
        let queue = state.runs.entry(workflow).or_default();
        let runs = if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap_or_default()
        };
        Ok(runs)
    }

    async fn create_hook(&self, repo: &RepoId, relay_url: &str) -> Result<HookId, ApiError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_hook_repos.contains(&repo.full_name()) {
            return Err(ApiError::from_status(403, "scripted failure".to_string()));
        }
        let id = HookId(self.next_hook_id.fetch_add(1, Ordering::Relaxed));
        state
            .created_hooks
            .push((repo.full_name(), relay_url.to_string()));
        Ok(id)
    }

    async fn delete_hook(&self, repo: &RepoId, hook: HookId) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.deleted_hooks.push((repo.full_name(), hook));
        if state.failing_hook_deletes.contains(&hook) {
            return Err(ApiError::from_status(404, "scripted failure".to_string()));
        }
        Ok(())
    }
}

//! Watched workflow identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

use super::ids::{RepoId, WorkflowId};

/// A (repository, workflow) pair the user has opted to track.
///
/// Identity is the `(repo, workflow_id)` pair: `workflow_name` is display-only
/// and excluded from equality and hashing, so a renamed workflow is still the
/// same watch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchedWorkflow {
    pub repo: RepoId,
    pub workflow_id: WorkflowId,
    pub workflow_name: String,
}

impl WatchedWorkflow {
    pub fn new(
        repo: RepoId,
        workflow_id: impl Into<WorkflowId>,
        workflow_name: impl Into<String>,
    ) -> Self {
        WatchedWorkflow {
            repo,
            workflow_id: workflow_id.into(),
            workflow_name: workflow_name.into(),
        }
    }

    /// Stable lookup key: `owner/repo/workflow_id`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.repo.full_name(), self.workflow_id)
    }
}

impl PartialEq for WatchedWorkflow {
    fn eq(&self, other: &Self) -> bool {
        self.repo == other.repo && self.workflow_id == other.workflow_id
    }
}

impl Eq for WatchedWorkflow {}

impl Hash for WatchedWorkflow {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.repo.hash(state);
        self.workflow_id.hash(state);
    }
}

impl fmt::Display for WatchedWorkflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.workflow_name, self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn equality_ignores_display_name() {
        let a = WatchedWorkflow::new(RepoId::new("octocat", "repo"), 42u64, "CI");
        let b = WatchedWorkflow::new(RepoId::new("octocat", "repo"), 42u64, "CI (renamed)");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn different_workflow_in_same_repo_is_distinct() {
        let a = WatchedWorkflow::new(RepoId::new("octocat", "repo"), 42u64, "CI");
        let b = WatchedWorkflow::new(RepoId::new("octocat", "repo"), 43u64, "CI");
        assert_ne!(a, b);
    }

    #[test]
    fn key_is_full_name_plus_workflow_id() {
        let w = WatchedWorkflow::new(RepoId::new("octocat", "repo"), 42u64, "CI");
        assert_eq!(w.key(), "octocat/repo/42");
    }
}

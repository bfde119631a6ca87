//! Notification intents emitted by the reconciliation engine.
//!
//! The engine decides *that* a transition deserves a notification; rendering
//! and delivery belong to the embedding application. An intent carries the
//! run snapshot plus enough context to render the standard title/body pair,
//! and the exactly-once guarantee is the engine's, not this module's.

use crate::types::{RunConclusion, RunSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Started,
    Completed,
}

/// One user-facing notification the engine has decided to emit.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationIntent {
    pub kind: NotificationKind,
    pub run: RunSnapshot,
    pub workflow_name: String,
    pub repo_name: String,
}

impl NotificationIntent {
    pub fn title(&self) -> &'static str {
        match self.kind {
            NotificationKind::Started => "Workflow Started",
            NotificationKind::Completed => match self.run.conclusion {
                Some(RunConclusion::Success) => "Workflow Succeeded",
                Some(RunConclusion::Failure) => "Workflow Failed",
                Some(RunConclusion::Cancelled) => "Workflow Cancelled",
                Some(RunConclusion::TimedOut) => "Workflow Timed Out",
                Some(RunConclusion::ActionRequired) => "Action Required",
                _ => "Workflow Completed",
            },
        }
    }

    pub fn body(&self) -> String {
        let branch = self.run.head_branch.as_deref().unwrap_or("unknown");
        format!(
            "{} in {} - #{} ({})",
            self.workflow_name, self.repo_name, self.run.run_number, branch
        )
    }
}

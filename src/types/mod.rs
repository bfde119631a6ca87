//! Core domain types.
//!
//! # Module Structure
//!
//! - [`ids`]: newtype identifiers (workflow, run, hook, repository)
//! - [`run`]: the workflow run wire model with open-world status enums
//! - [`watch`]: the watched-workflow identity

mod ids;
mod run;
mod watch;

pub use ids::{HookId, RepoId, RunId, WorkflowId};
pub use run::{RunConclusion, RunSnapshot, RunStatus};
pub use watch::WatchedWorkflow;

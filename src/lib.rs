//! runwatch - keeps a local view of GitHub Actions workflow runs in sync.
//!
//! Two observation channels feed one reconciliation engine: an adaptive
//! polling loop over the runs API and an SSE relay client for pushed
//! `workflow_run` webhook events. The engine decides which run transitions
//! deserve a notification, exactly once each.

pub mod config;
pub mod engine;
pub mod github;
pub mod hooks;
pub mod notify;
pub mod poll;
pub mod relay;
pub mod session;
pub mod types;

#[cfg(test)]
pub mod test_utils;

pub use config::{Settings, SettingsSource, SharedSettings};
pub use engine::{EngineEvent, EngineHandle};
pub use github::{ApiError, GitHubClient, RunApi};
pub use hooks::{HookManager, HookRegistry};
pub use notify::{NotificationIntent, NotificationKind};
pub use relay::{provision_channel, ConnectionState, RelayClient, RelayError};
pub use session::{SessionEvents, WatchSession};
pub use types::{RunConclusion, RunSnapshot, RunStatus, WatchedWorkflow};

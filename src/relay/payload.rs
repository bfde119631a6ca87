//! Relay envelope unwrapping.
//!
//! The relay wraps each forwarded webhook delivery in an envelope whose `body`
//! field carries the original payload. Depending on the relay and webhook
//! content type, `body` may be a JSON object, a JSON-encoded *string*
//! containing the payload (double-encoding), or absent entirely, in which
//! case the frame itself is tried as the payload.
//!
//! A payload that is not a `workflow_run` delivery (relay pings, other webhook
//! kinds, malformed frames) decodes to "no event", never to an error: the
//! stream carries plenty of traffic this client has no interest in.

use serde::Deserialize;
use serde_json::Value;

use crate::types::RunSnapshot;

/// A decoded `workflow_run` webhook event received over the relay.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayEvent {
    /// The webhook action (`requested`, `in_progress`, `completed`, ...).
    /// `"unknown"` when the payload omitted it.
    pub action: String,

    /// The run carried by the event.
    pub run: RunSnapshot,

    /// Repository full name (`owner/repo`).
    pub repository: String,
}

#[derive(Debug, Deserialize)]
struct HookPayload {
    action: Option<String>,
    workflow_run: Option<RunSnapshot>,
    repository: Option<RepoRef>,
}

#[derive(Debug, Deserialize)]
struct RepoRef {
    full_name: Option<String>,
}

/// Decodes one SSE frame's data into a [`RelayEvent`].
///
/// Returns `None` for anything that is not a complete `workflow_run` payload
/// with a repository full name.
pub fn decode_event(data: &str) -> Option<RelayEvent> {
    let outer: Value = serde_json::from_str(data).ok()?;

    let payload = match outer.get("body") {
        Some(Value::String(inner)) => serde_json::from_str::<Value>(inner).ok()?,
        Some(body @ Value::Object(_)) => body.clone(),
        Some(_) => return None,
        // No envelope: try the frame itself as the payload.
        None => outer,
    };

    let payload: HookPayload = serde_json::from_value(payload).ok()?;
    let run = payload.workflow_run?;
    let repository = payload.repository?.full_name?;

    Some(RelayEvent {
        action: payload.action.unwrap_or_else(|| "unknown".to_string()),
        run,
        repository,
    })
}

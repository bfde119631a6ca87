//! Streaming event relay client.
//!
//! GitHub webhooks cannot reach a desktop client directly, so deliveries are
//! forwarded through a relay channel (a smee.io-style endpoint) that re-emits
//! them as a server-sent-event stream. This module maintains that stream:
//! reconnecting with exponential backoff, parsing the SSE framing, and
//! unwrapping the relay envelope into typed run-update events.
//!
//! # Module Structure
//!
//! - [`frame`]: chunk-to-line reassembly and SSE frame accumulation
//! - [`payload`]: relay envelope unwrapping into [`RelayEvent`]
//! - [`client`]: the reconnect loop, connection state, channel provisioning

mod client;
mod frame;
mod payload;

pub use client::{provision_channel, ConnectionState, RelayClient, RelayError};
pub use frame::{Frame, FrameParser, LineBuffer};
pub use payload::{decode_event, RelayEvent};

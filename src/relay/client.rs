//! The relay client: a long-lived SSE connection with unbounded reconnect.
//!
//! The connection loop drives the state machine
//! `disconnected -> connecting -> connected -> disconnected -> ...` until an
//! explicit [`RelayClient::stop`]. Between attempts it sleeps an exponential
//! backoff delay (1s doubling to a 60s cap). Within one `start` invocation the
//! backoff only grows, except after a session that actually reached
//! `connected`, which resets it to 1s, since a connection that succeeded
//! signals the channel is reachable. A fresh `start` always begins at 1s.
//!
//! The reconnect loop retries forever by design: the relay channel is expected
//! to live for the whole session, and every failure mode (stream end, network
//! error, read timeout) takes the same path back through backoff.

use futures::StreamExt;
use reqwest::header::ACCEPT;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::frame::{FrameParser, LineBuffer};
use super::payload::{decode_event, RelayEvent};

/// Initial reconnect backoff delay.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Maximum reconnect backoff delay.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Read timeout on the streaming connection. Generous enough for normal idle
/// keep-alive gaps, short enough to notice a dead connection within minutes.
const READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Connect timeout for each attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Observable state of the relay connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Errors from relay operations that are surfaced to the caller.
///
/// Stream-level failures inside the connection loop are not errors: they feed
/// the reconnect path. Only setup problems (client construction, channel
/// provisioning) surface here.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The channel-provisioning endpoint did not yield a usable channel URL.
    #[error("failed to provision relay channel: {0}")]
    ChannelProvisioning(String),

    /// HTTP client construction or request failure during setup.
    #[error("relay HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Exponential reconnect backoff: 1s doubling to a 60s cap.
#[derive(Debug, Clone, Copy)]
struct Backoff {
    current: Duration,
}

impl Backoff {
    fn new() -> Self {
        Backoff {
            current: INITIAL_BACKOFF,
        }
    }

    fn delay(&self) -> Duration {
        self.current
    }

    fn grow(&mut self) {
        self.current = (self.current * 2).min(MAX_BACKOFF);
    }

    fn reset(&mut self) {
        self.current = INITIAL_BACKOFF;
    }
}

struct RelayTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Streaming client for the relay channel.
///
/// Decoded [`RelayEvent`]s go out over the mpsc channel supplied at
/// construction (single subscriber: the reconciliation engine). Connection
/// state changes are published on a `watch` channel that only this client
/// writes.
pub struct RelayClient {
    http: reqwest::Client,
    events: mpsc::Sender<RelayEvent>,
    state_tx: watch::Sender<ConnectionState>,
    task: Mutex<Option<RelayTask>>,
}

impl RelayClient {
    /// Creates a relay client. Returns the client and the receiver half of
    /// its connection-state channel.
    pub fn new(
        events: mpsc::Sender<RelayEvent>,
    ) -> Result<(Self, watch::Receiver<ConnectionState>), RelayError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .build()?;
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        Ok((
            RelayClient {
                http,
                events,
                state_tx,
                task: Mutex::new(None),
            },
            state_rx,
        ))
    }

    /// Starts the connection loop against a channel URL, cancelling any
    /// existing loop first. Backoff restarts at 1s.
    pub fn start(&self, channel_url: impl Into<String>) {
        let url = channel_url.into();
        self.cancel_existing();
        info!(url = %url, "starting relay connection loop");

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(connection_loop(
            self.http.clone(),
            url,
            self.events.clone(),
            self.state_tx.clone(),
            cancel.clone(),
        ));
        *self.task.lock().expect("relay task lock poisoned") = Some(RelayTask { cancel, handle });
    }

    /// Stops the connection loop and publishes `Disconnected`. Idempotent.
    /// No event is delivered after this returns.
    pub async fn stop(&self) {
        let task = self.task.lock().expect("relay task lock poisoned").take();
        if let Some(task) = task {
            task.cancel.cancel();
            if task.handle.await.is_err() {
                warn!("relay task panicked during shutdown");
            }
        }
        self.state_tx.send_replace(ConnectionState::Disconnected);
    }

    fn cancel_existing(&self) {
        if let Some(task) = self.task.lock().expect("relay task lock poisoned").take() {
            task.cancel.cancel();
            task.handle.abort();
        }
    }
}

async fn connection_loop(
    http: reqwest::Client,
    url: String,
    events: mpsc::Sender<RelayEvent>,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
) {
    let mut backoff = Backoff::new();

    while !cancel.is_cancelled() {
        state_tx.send_replace(ConnectionState::Connecting);
        debug!(url = %url, "relay connection attempt");

        let reached_connected = stream_session(&http, &url, &events, &state_tx, &cancel).await;
        if reached_connected {
            backoff.reset();
        }

        if cancel.is_cancelled() {
            break;
        }
        state_tx.send_replace(ConnectionState::Disconnected);

        let delay = backoff.delay();
        debug!(delay_secs = delay.as_secs(), "relay reconnect backoff");
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
        backoff.grow();
    }

    state_tx.send_replace(ConnectionState::Disconnected);
}

/// Runs one streaming session to completion.
///
/// Returns true if the session reached `connected` (received any data), which
/// is what resets the reconnect backoff. Stream errors are logged, not
/// returned: every termination feeds the same reconnect path.
async fn stream_session(
    http: &reqwest::Client,
    url: &str,
    events: &mpsc::Sender<RelayEvent>,
    state_tx: &watch::Sender<ConnectionState>,
    cancel: &CancellationToken,
) -> bool {
    let mut connected = false;

    let request = http.get(url).header(ACCEPT, "text/event-stream").send();
    let response = tokio::select! {
        _ = cancel.cancelled() => return connected,
        r = request => r,
    };
    let response = match response.and_then(|r| r.error_for_status()) {
        Ok(r) => r,
        Err(e) => {
            debug!(error = %e, "relay request failed");
            return connected;
        }
    };

    let mut stream = response.bytes_stream();
    let mut lines = LineBuffer::new();
    let mut parser = FrameParser::new();

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return connected,
            chunk = stream.next() => chunk,
        };
        let chunk = match next {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => {
                debug!(error = %e, "relay stream error");
                return connected;
            }
            None => {
                debug!("relay stream ended");
                return connected;
            }
        };

        if !connected {
            connected = true;
            state_tx.send_replace(ConnectionState::Connected);
            info!("relay connected");
        }

        for line in lines.push(&chunk) {
            let Some(frame) = parser.feed_line(&line) else {
                continue;
            };
            if !frame.is_message() {
                trace!(event_type = ?frame.event_type, "skipping non-message frame");
                continue;
            }
            let Some(event) = decode_event(&frame.data) else {
                trace!("frame carried no workflow_run event");
                continue;
            };
            debug!(
                action = %event.action,
                run = %event.run.id,
                repo = %event.repository,
                "relay event"
            );
            tokio::select! {
                _ = cancel.cancelled() => return connected,
                sent = events.send(event) => {
                    if sent.is_err() {
                        // Receiver dropped: nobody is listening anymore.
                        return connected;
                    }
                }
            }
        }
    }
}

/// Provisions a fresh relay channel.
///
/// Issues an HTTP HEAD to `{base}/new` with redirects disabled and extracts
/// the `Location` header, which must point back under `base`. One-time,
/// idempotent; the caller persists the returned URL.
pub async fn provision_channel(base: &str) -> Result<String, RelayError> {
    let base = base.trim_end_matches('/');
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(CONNECT_TIMEOUT)
        .build()?;

    let response = client.head(format!("{base}/new")).send().await?;
    let status = response.status();
    if !status.is_redirection() {
        return Err(RelayError::ChannelProvisioning(format!(
            "expected a redirect from {base}/new, got HTTP {}",
            status.as_u16()
        )));
    }

    let location = response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            RelayError::ChannelProvisioning("redirect carried no Location header".to_string())
        })?;
    if !location.starts_with(&format!("{base}/")) {
        return Err(RelayError::ChannelProvisioning(format!(
            "redirect location {location} is not under {base}"
        )));
    }

    info!(channel = %location, "provisioned relay channel");
    Ok(location.to_string())
}

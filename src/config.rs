//! Runtime settings consumed by the synchronization core.
//!
//! Settings are owned by the embedding application's storage (out of scope
//! here) and are re-read by each component on every relevant operation: the
//! poller reads the intervals before every sleep, the engine reads the
//! notification toggle per batch. Nothing in this crate caches a settings
//! value across operations.
//!
//! # Interval Clamps
//!
//! The base interval is clamped to at least 10 seconds and the active interval
//! to at least 5 seconds to bound API call volume, regardless of what the
//! stored values say.

use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Default interval between polls when no run is active (30 seconds).
const DEFAULT_BASE_INTERVAL_SECS: u64 = 30;

/// Default interval between polls while at least one run is active (10 seconds).
const DEFAULT_ACTIVE_INTERVAL_SECS: u64 = 10;

/// Minimum effective base interval.
const MIN_BASE_INTERVAL_SECS: u64 = 10;

/// Minimum effective active interval.
const MIN_ACTIVE_INTERVAL_SECS: u64 = 5;

/// Snapshot of the settings the core consumes.
///
/// The stored interval values are kept as-is; the clamps are applied by the
/// [`Settings::base_interval`] / [`Settings::active_interval`] accessors so a
/// later raise of a too-low stored value round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Seconds between polls when all runs are completed.
    pub base_interval_secs: u64,

    /// Seconds between polls while any run is active.
    pub active_interval_secs: u64,

    /// Whether notification intents are emitted at all. State tracking is
    /// unaffected by this toggle.
    pub notifications_enabled: bool,

    /// Whether the polling loop runs. Manual refresh is always allowed.
    pub polling_enabled: bool,

    /// Whether repository webhooks are kept in sync with the watched set.
    pub webhooks_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            base_interval_secs: DEFAULT_BASE_INTERVAL_SECS,
            active_interval_secs: DEFAULT_ACTIVE_INTERVAL_SECS,
            notifications_enabled: true,
            polling_enabled: true,
            webhooks_enabled: true,
        }
    }
}

impl Settings {
    /// Creates settings from environment variables, falling back to defaults.
    ///
    /// Reads `RUNWATCH_POLL_INTERVAL_SECS` and
    /// `RUNWATCH_ACTIVE_POLL_INTERVAL_SECS`.
    pub fn from_env() -> Self {
        let read = |name: &str, default: u64| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(default)
        };

        Settings {
            base_interval_secs: read("RUNWATCH_POLL_INTERVAL_SECS", DEFAULT_BASE_INTERVAL_SECS),
            active_interval_secs: read(
                "RUNWATCH_ACTIVE_POLL_INTERVAL_SECS",
                DEFAULT_ACTIVE_INTERVAL_SECS,
            ),
            ..Settings::default()
        }
    }

    /// Effective base poll interval, clamped to at least 10 seconds.
    pub fn base_interval(&self) -> Duration {
        Duration::from_secs(self.base_interval_secs.max(MIN_BASE_INTERVAL_SECS))
    }

    /// Effective active poll interval, clamped to at least 5 seconds.
    pub fn active_interval(&self) -> Duration {
        Duration::from_secs(self.active_interval_secs.max(MIN_ACTIVE_INTERVAL_SECS))
    }
}

/// Source of the current settings snapshot.
///
/// The embedding application implements this over its own settings storage;
/// [`SharedSettings`] is the in-memory implementation used by tests and by
/// applications without external storage.
pub trait SettingsSource: Send + Sync {
    /// Returns the current settings. Called on every operation that consumes
    /// a setting; implementations should be cheap.
    fn current(&self) -> Settings;
}

/// In-memory settings shared between an owner (who updates them) and the core
/// (which reads them per operation).
#[derive(Debug, Clone)]
pub struct SharedSettings {
    inner: Arc<RwLock<Settings>>,
}

impl SharedSettings {
    pub fn new(settings: Settings) -> Self {
        SharedSettings {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Replaces the settings wholesale. Takes effect on the next read, which
    /// for the poller means the next sleep, not the current one.
    pub fn set(&self, settings: Settings) {
        *self.inner.write().expect("settings lock poisoned") = settings;
    }

    /// Applies a mutation to the current settings.
    pub fn update(&self, f: impl FnOnce(&mut Settings)) {
        let mut guard = self.inner.write().expect("settings lock poisoned");
        f(&mut guard);
    }
}

impl Default for SharedSettings {
    fn default() -> Self {
        SharedSettings::new(Settings::default())
    }
}

impl SettingsSource for SharedSettings {
    fn current(&self) -> Settings {
        self.inner.read().expect("settings lock poisoned").clone()
    }
}

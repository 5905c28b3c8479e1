//! Resolver policy configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{ConfigResult, load_layered};
use crate::device::DEVICE_ID;

/// Longest period any lease, wait or timer is allowed to span, roughly
/// thirty years. Larger configured values are clamped to it.
pub const MAX_PERIOD: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Policy knobs for the resolver, its worker and its reaper.
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Grace period for a freshly loaded module awaiting first use
    pub short_lease_secs: u64,
    /// Protection window for a module that is, or just was, in use
    pub long_lease_secs: u64,
    /// Reaper period
    pub reaper_interval_secs: u64,
    /// How long one pass waits for an on-demand driver to be announced
    pub driver_wait_ms: u64,
    /// Timeout around every external call; 0 disables it
    pub call_timeout_ms: u64,
    /// Attach calls allowed per resolution pass
    pub max_attach_attempts: u32,
    /// Location prefix tagging modules installed on demand
    pub module_location_prefix: String,
    /// Device property used as persistent identity for the match cache
    pub persistent_id_property: String,
    /// Capacity of the resolver event channel
    pub event_capacity: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            short_lease_secs: 5 * 60,
            long_lease_secs: 15 * 60,
            reaper_interval_secs: 60,
            driver_wait_ms: 5_000,
            call_timeout_ms: 30_000,
            max_attach_attempts: 8,
            module_location_prefix: "_DD_".to_string(),
            persistent_id_property: DEVICE_ID.to_string(),
            event_capacity: 256,
        }
    }
}

impl ResolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from an optional file with `DEVMATCH_*` overrides on top.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        load_layered(path)
    }

    pub fn short_lease(&self) -> Duration {
        Duration::from_secs(self.short_lease_secs).min(MAX_PERIOD)
    }

    pub fn long_lease(&self) -> Duration {
        Duration::from_secs(self.long_lease_secs).min(MAX_PERIOD)
    }

    pub fn reaper_interval(&self) -> Duration {
        // A zero period would spin the worker.
        Duration::from_secs(self.reaper_interval_secs.max(1)).min(MAX_PERIOD)
    }

    pub fn driver_wait(&self) -> Duration {
        Duration::from_millis(self.driver_wait_ms).min(MAX_PERIOD)
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        (self.call_timeout_ms > 0)
            .then(|| Duration::from_millis(self.call_timeout_ms).min(MAX_PERIOD))
    }

    /// Attach calls allowed per pass; at least one, or no viable driver
    /// could ever be attached.
    pub fn max_attach_attempts(&self) -> u32 {
        self.max_attach_attempts.max(1)
    }

    pub fn with_short_lease(mut self, lease: Duration) -> Self {
        self.short_lease_secs = lease.as_secs();
        self
    }

    pub fn with_long_lease(mut self, lease: Duration) -> Self {
        self.long_lease_secs = lease.as_secs();
        self
    }

    pub fn with_reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval_secs = interval.as_secs();
        self
    }

    pub fn with_driver_wait(mut self, wait: Duration) -> Self {
        self.driver_wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout_ms =
            timeout.map_or(0, |t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_max_attach_attempts(mut self, max: u32) -> Self {
        self.max_attach_attempts = max;
        self
    }

    pub fn with_module_location_prefix(mut self, prefix: &str) -> Self {
        self.module_location_prefix = prefix.to_string();
        self
    }

    pub fn with_persistent_id_property(mut self, key: &str) -> Self {
        self.persistent_id_property = key.to_string();
        self
    }
}

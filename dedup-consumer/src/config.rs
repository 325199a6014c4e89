//! Configuration for the deduplicating consumer.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Persistence backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PersistType {
    /// Relational store, claim atomicity via a unique constraint
    #[default]
    Postgres,

    /// Key-value store, claim atomicity via SET-if-absent with TTL
    Redis,

    /// No deduplication; every delivery is handed to the callback
    Disabled,
}

/// Deduplication settings.
///
/// The processing TTL bounds how long a claim is honored: a consumer that
/// crashes mid-callback stops blocking redelivery once the TTL elapses.
/// The retention window bounds how long a successful consumption keeps
/// suppressing duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Application name, used as the identity namespace for all keys
    pub application_name: String,

    /// Which backend holds the dedup records
    #[serde(default)]
    pub persist: PersistType,

    /// How long a claim is honored before it is considered abandoned,
    /// in milliseconds. Default: 30 minutes.
    #[serde(default = "default_processing_expire_ms")]
    pub processing_expire_ms: u64,

    /// How long a finalized record keeps suppressing duplicates,
    /// in minutes. Default: 180 days.
    #[serde(default = "default_record_reserve_minutes")]
    pub record_reserve_minutes: u64,

    /// Interval between expired-record sweeps, in seconds. Default: 24 hours.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_processing_expire_ms() -> u64 {
    1000 * 60 * 30
}

fn default_record_reserve_minutes() -> u64 {
    60 * 24 * 180
}

fn default_sweep_interval_secs() -> u64 {
    60 * 60 * 24
}

impl DedupConfig {
    /// Create a config with defaults for the given application name.
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            persist: PersistType::default(),
            processing_expire_ms: default_processing_expire_ms(),
            record_reserve_minutes: default_record_reserve_minutes(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }

    pub fn with_persist(mut self, persist: PersistType) -> Self {
        self.persist = persist;
        self
    }

    pub fn with_processing_expire(mut self, ttl: Duration) -> Self {
        self.processing_expire_ms = ttl.as_millis() as u64;
        self
    }

    pub fn with_record_reserve(mut self, retention: Duration) -> Self {
        self.record_reserve_minutes = retention.as_secs() / 60;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_secs = interval.as_secs();
        self
    }

    /// Claim TTL as a `Duration`.
    pub fn processing_expire(&self) -> Duration {
        Duration::from_millis(self.processing_expire_ms)
    }

    /// Finalized-record retention as a `Duration`.
    pub fn record_reserve(&self) -> Duration {
        Duration::from_secs(self.record_reserve_minutes * 60)
    }

    /// Sweep interval as a `Duration`.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

//! Persistence contract for dedup records, and its backends.
//!
//! Both backends honor the same invariant: at most one live (non-expired)
//! record exists per [`DedupKey`] at any time, enforced by a single atomic
//! storage primitive - a unique-constraint insert in Postgres, SET-if-absent
//! with TTL in Redis. Everything else may be ordinary read-modify-write.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::DedupResult;
use crate::key::DedupKey;
use crate::model::ConsumeStatus;

mod postgres;
mod redis;

#[cfg(test)]
pub(crate) mod memory;

pub use self::postgres::PostgresDedupStore;
pub use self::redis::RedisDedupStore;

/// Storage contract shared by all dedup backends.
///
/// Implementations report storage failures honestly; the consumption
/// strategy decides which of them fail open. `claim_if_absent` is the one
/// operation that must be atomic at the storage layer - never emulate it
/// with a read followed by a write.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Atomically create a `Claimed` record expiring `processing_ttl` from
    /// now, iff no live record exists for `key`. Returns `true` iff this
    /// call created the record (the caller now owns processing).
    async fn claim_if_absent(&self, key: &DedupKey, processing_ttl: Duration)
        -> DedupResult<bool>;

    /// Unconditionally remove the record for `key`, regardless of state.
    /// Used to release a claim after failed processing.
    async fn delete(&self, key: &DedupKey) -> DedupResult<()>;

    /// Transition the record to `Finalized`, expiring `retention` from now.
    /// Idempotent; a missing record is not an error.
    async fn mark_finalized(&self, key: &DedupKey, retention: Duration) -> DedupResult<()>;

    /// Read the status of the live record for `key`. `None` means no live
    /// record: deleted, expired, or never created.
    async fn get_status(&self, key: &DedupKey) -> DedupResult<Option<ConsumeStatus>>;

    /// Remove finalized records whose retention has elapsed. Returns the
    /// number of records removed. Claimed-but-expired records are left for
    /// the next claim attempt to reclaim, so a sweep can never race an
    /// in-flight processor.
    async fn sweep_expired(&self) -> DedupResult<u64>;
}

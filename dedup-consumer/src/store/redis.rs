//! Key-value backend over Redis.
//!
//! The claim is a single `SET ... NX PX`, so there is no stale-record dance:
//! an expired claim simply no longer exists and a fresh claim succeeds.
//! Sweeping is a no-op because the store expires keys natively.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, warn};

use super::DedupStore;
use crate::error::DedupResult;
use crate::key::DedupKey;
use crate::model::ConsumeStatus;

/// Redis-backed dedup store.
///
/// Holds a [`ConnectionManager`], which reconnects on its own and is cheap
/// to clone per operation.
pub struct RedisDedupStore {
    conn: ConnectionManager,
}

impl RedisDedupStore {
    /// Create a store over an existing connection manager.
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl DedupStore for RedisDedupStore {
    async fn claim_if_absent(
        &self,
        key: &DedupKey,
        processing_ttl: Duration,
    ) -> DedupResult<bool> {
        let mut conn = self.conn.clone();

        // SET key <claimed> PX <ttl> NX - one atomic round trip; the nil
        // reply is the lost race.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key.storage_key())
            .arg(ConsumeStatus::Claimed.code())
            .arg("PX")
            .arg(processing_ttl.as_millis() as u64)
            .arg("NX")
            .query_async(&mut conn)
            .await?;

        let claimed = reply.is_some();
        debug!(key = %key, claimed, "dedup claim attempted");
        Ok(claimed)
    }

    async fn delete(&self, key: &DedupKey) -> DedupResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key.storage_key()).await?;
        debug!(key = %key, "released dedup record");
        Ok(())
    }

    async fn mark_finalized(&self, key: &DedupKey, retention: Duration) -> DedupResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(
                key.storage_key(),
                ConsumeStatus::Finalized.code(),
                retention.as_secs(),
            )
            .await?;
        Ok(())
    }

    async fn get_status(&self, key: &DedupKey) -> DedupResult<Option<ConsumeStatus>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key.storage_key()).await?;

        let Some(value) = value else {
            return Ok(None);
        };

        let status = value.parse::<i16>().ok().and_then(ConsumeStatus::from_code);
        if status.is_none() {
            warn!(key = %key, value = %value, "unrecognized consume status in dedup record");
        }

        Ok(status)
    }

    async fn sweep_expired(&self) -> DedupResult<u64> {
        // Native TTL already reclaims space; nothing to do.
        Ok(0)
    }
}

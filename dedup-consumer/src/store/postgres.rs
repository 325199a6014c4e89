//! Relational backend over PostgreSQL.
//!
//! The unique constraint on the full key tuple is the atomicity primitive:
//! winning the `INSERT` is winning the claim. Postgres has no native key
//! expiry, so expired leftovers are filtered out of every read and reclaimed
//! inline by the claim path (conditional delete, then one bounded retry).

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::{debug, warn};

use super::DedupStore;
use crate::error::DedupResult;
use crate::key::DedupKey;
use crate::model::{now_millis, ConsumeStatus};

/// A second collision after reclaiming expired rows can only be another
/// concurrent claimant winning the race, so one retry is enough.
const MAX_CLAIM_ATTEMPTS: u32 = 2;

/// PostgreSQL-backed dedup store.
///
/// Requires the `dedup_records` table; run the migration in
/// `migrations/001_create_dedup_records_table.sql` before first use.
pub struct PostgresDedupStore {
    pool: PgPool,
}

impl PostgresDedupStore {
    /// Create a store over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_claim(&self, key: &DedupKey, expire_at_ms: i64) -> DedupResult<()> {
        sqlx::query(
            r#"
            INSERT INTO dedup_records (
                application_name,
                topic,
                tag,
                consumer_group,
                unique_id,
                consume_status,
                expire_at_ms,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
            "#,
        )
        .bind(&key.application)
        .bind(&key.topic)
        .bind(&key.tag)
        .bind(&key.consumer_group)
        .bind(&key.unique_id)
        .bind(ConsumeStatus::Claimed.code())
        .bind(expire_at_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete rows for `key`; with `only_expired`, only rows whose expiry
    /// already passed. Returns the number of rows removed.
    async fn delete_rows(&self, key: &DedupKey, only_expired: bool) -> DedupResult<u64> {
        let result = if only_expired {
            sqlx::query(
                r#"
                DELETE FROM dedup_records
                WHERE application_name = $1
                  AND topic = $2
                  AND tag = $3
                  AND consumer_group = $4
                  AND unique_id = $5
                  AND expire_at_ms < $6
                "#,
            )
            .bind(&key.application)
            .bind(&key.topic)
            .bind(&key.tag)
            .bind(&key.consumer_group)
            .bind(&key.unique_id)
            .bind(now_millis())
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                DELETE FROM dedup_records
                WHERE application_name = $1
                  AND topic = $2
                  AND tag = $3
                  AND consumer_group = $4
                  AND unique_id = $5
                "#,
            )
            .bind(&key.application)
            .bind(&key.topic)
            .bind(&key.tag)
            .bind(&key.consumer_group)
            .bind(&key.unique_id)
            .execute(&self.pool)
            .await?
        };

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl DedupStore for PostgresDedupStore {
    async fn claim_if_absent(
        &self,
        key: &DedupKey,
        processing_ttl: Duration,
    ) -> DedupResult<bool> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let expire_at_ms = now_millis() + processing_ttl.as_millis() as i64;

            match self.insert_claim(key, expire_at_ms).await {
                Ok(()) => {
                    debug!(key = %key, expire_at_ms, "claimed dedup record");
                    return Ok(true);
                }
                Err(e) if e.is_duplicate_key() => {
                    if attempt >= MAX_CLAIM_ATTEMPTS {
                        return Ok(false);
                    }

                    // The existing row may be an expired leftover: Postgres
                    // never reclaims these on its own, so try removing it
                    // and claim again.
                    let removed = self.delete_rows(key, true).await?;
                    if removed == 0 {
                        debug!(key = %key, "live dedup record exists, claim lost");
                        return Ok(false);
                    }
                    debug!(key = %key, removed, "removed expired dedup rows, retrying claim");
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn delete(&self, key: &DedupKey) -> DedupResult<()> {
        let removed = self.delete_rows(key, false).await?;
        debug!(key = %key, removed, "released dedup record");
        Ok(())
    }

    async fn mark_finalized(&self, key: &DedupKey, retention: Duration) -> DedupResult<()> {
        let expire_at_ms = now_millis() + retention.as_millis() as i64;

        let result = sqlx::query(
            r#"
            UPDATE dedup_records
            SET consume_status = $1,
                expire_at_ms = $2,
                updated_at = NOW()
            WHERE application_name = $3
              AND topic = $4
              AND tag = $5
              AND consumer_group = $6
              AND unique_id = $7
            "#,
        )
        .bind(ConsumeStatus::Finalized.code())
        .bind(expire_at_ms)
        .bind(&key.application)
        .bind(&key.topic)
        .bind(&key.tag)
        .bind(&key.consumer_group)
        .bind(&key.unique_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!(key = %key, "no dedup record to finalize");
        }

        Ok(())
    }

    async fn get_status(&self, key: &DedupKey) -> DedupResult<Option<ConsumeStatus>> {
        let row = sqlx::query(
            r#"
            SELECT consume_status
            FROM dedup_records
            WHERE application_name = $1
              AND topic = $2
              AND tag = $3
              AND consumer_group = $4
              AND unique_id = $5
              AND expire_at_ms > $6
            "#,
        )
        .bind(&key.application)
        .bind(&key.topic)
        .bind(&key.tag)
        .bind(&key.consumer_group)
        .bind(&key.unique_id)
        .bind(now_millis())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let code: i16 = row.try_get("consume_status")?;
        let status = ConsumeStatus::from_code(code);
        if status.is_none() {
            warn!(key = %key, code, "unrecognized consume status in dedup record");
        }

        Ok(status)
    }

    async fn sweep_expired(&self) -> DedupResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM dedup_records
            WHERE expire_at_ms < $1
              AND consume_status = $2
            "#,
        )
        .bind(now_millis())
        .bind(ConsumeStatus::Finalized.code())
        .execute(&self.pool)
        .await?;

        let removed = result.rows_affected();
        debug!(removed, "swept expired dedup records");
        Ok(removed)
    }
}

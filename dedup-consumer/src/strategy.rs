//! Consumption strategies: deduplicating and passthrough.
//!
//! The dedup strategy sequences claim -> invoke -> finalize/delete against a
//! shared store. Design bias throughout: on ambiguous storage state the
//! message is consumed (risking a duplicate) rather than dropped, while a
//! failed consumption always releases its claim so nothing blocks a
//! legitimate retry.

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{DedupConfig, PersistType};
use crate::error::{DedupError, DedupResult};
use crate::key::DedupKey;
use crate::model::ConsumeStatus;
use crate::store::DedupStore;

/// Delivery metadata handed in by the transport layer.
#[derive(Debug, Clone)]
pub struct MessageMeta {
    /// Topic the message was delivered on
    pub topic: String,

    /// Message tag, if any
    pub tag: Option<String>,

    /// Consumer group receiving the delivery
    pub consumer_group: String,

    /// Broker-assigned message id
    pub msg_id: Option<String>,

    /// Client-assigned unique id, if the producer set one
    pub unique_client_id: Option<String>,
}

/// Derives the message-unique identifier used for deduplication.
/// Returning `None` means the delivery cannot be deduplicated and is handed
/// straight to the callback.
pub type KeyFn = Arc<dyn Fn(&[u8], &MessageMeta) -> Option<String> + Send + Sync>;

/// Default key derivation: prefer the client-assigned unique id, fall back
/// to the broker message id. Empty ids count as absent.
pub fn default_key_fn(_payload: &[u8], meta: &MessageMeta) -> Option<String> {
    meta.unique_client_id
        .clone()
        .filter(|id| !id.is_empty())
        .or_else(|| meta.msg_id.clone().filter(|id| !id.is_empty()))
}

/// Deduplicating consumption strategy.
///
/// Claims the message key before invoking the callback; losers of the claim
/// either defer (still in flight elsewhere) or ack (already finalized)
/// without running the callback.
pub struct DedupStrategy {
    config: DedupConfig,
    store: Arc<dyn DedupStore>,
    key_fn: KeyFn,
}

impl DedupStrategy {
    /// Create a strategy with the default key derivation.
    pub fn new(config: DedupConfig, store: Arc<dyn DedupStore>) -> Self {
        Self {
            config,
            store,
            key_fn: Arc::new(default_key_fn),
        }
    }

    /// Replace the key-derivation function.
    pub fn with_key_fn<F>(mut self, key_fn: F) -> Self
    where
        F: Fn(&[u8], &MessageMeta) -> Option<String> + Send + Sync + 'static,
    {
        self.key_fn = Arc::new(key_fn);
        self
    }

    /// Guard one delivery.
    ///
    /// Returns the consumption outcome for the transport layer: `Ok(true)`
    /// to acknowledge, `Ok(false)` to request redelivery. A callback error
    /// releases the claim and surfaces as [`DedupError::Processing`].
    pub async fn invoke<'a, F, Fut>(
        &self,
        payload: &'a [u8],
        meta: &'a MessageMeta,
        callback: F,
    ) -> DedupResult<bool>
    where
        F: FnOnce(&'a [u8], &'a MessageMeta) -> Fut,
        Fut: Future<Output = anyhow::Result<bool>>,
    {
        let unique_id = (self.key_fn)(payload, meta).filter(|id| !id.is_empty());
        let Some(unique_id) = unique_id else {
            debug!(
                topic = %meta.topic,
                msg_id = ?meta.msg_id,
                "delivery has no dedup key, consuming without a record"
            );
            return callback(payload, meta).await.map_err(DedupError::Processing);
        };

        let key = DedupKey::new(
            &self.config.application_name,
            &meta.topic,
            meta.tag.clone().unwrap_or_default(),
            &meta.consumer_group,
            unique_id,
        );

        let claimed = match self
            .store
            .claim_if_absent(&key, self.config.processing_expire())
            .await
        {
            Ok(claimed) => claimed,
            Err(e) => {
                // Losing a message is worse than an occasional duplicate
                // while the store is unhealthy.
                warn!(key = %key, error = %e, "claim failed on storage error, failing open");
                true
            }
        };

        if claimed {
            return self.consume_and_settle(&key, payload, meta, callback).await;
        }

        // Lost the claim: a live record decides between defer and ack.
        match self.store.get_status(&key).await {
            Ok(Some(ConsumeStatus::Claimed)) => {
                warn!(
                    key = %key,
                    msg_id = ?meta.msg_id,
                    "message is being consumed elsewhere, deferring for redelivery"
                );
                Ok(false)
            }
            Ok(Some(ConsumeStatus::Finalized)) => {
                warn!(
                    key = %key,
                    msg_id = ?meta.msg_id,
                    "message was already consumed, acking duplicate"
                );
                Ok(true)
            }
            Ok(None) => {
                // The record vanished (or its status was unreadable) between
                // the failed claim and this read. Consuming again without
                // re-claiming can double-process if the record was in fact
                // live, but deferring could drop the message for good.
                warn!(
                    key = %key,
                    msg_id = ?meta.msg_id,
                    "no live dedup record after lost claim, consuming anyway"
                );
                self.consume_and_settle(&key, payload, meta, callback).await
            }
            Err(e) => {
                warn!(
                    key = %key,
                    error = %e,
                    "status read failed after lost claim, failing open"
                );
                self.consume_and_settle(&key, payload, meta, callback).await
            }
        }
    }

    /// Run the callback as the claim owner, then settle the record:
    /// success finalizes it, failure releases it.
    async fn consume_and_settle<'a, F, Fut>(
        &self,
        key: &DedupKey,
        payload: &'a [u8],
        meta: &'a MessageMeta,
        callback: F,
    ) -> DedupResult<bool>
    where
        F: FnOnce(&'a [u8], &'a MessageMeta) -> Fut,
        Fut: Future<Output = anyhow::Result<bool>>,
    {
        let outcome = match callback(payload, meta).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // Release the claim so the redelivered attempt starts clean.
                if let Err(del_err) = self.store.delete(key).await {
                    error!(
                        key = %key,
                        error = %del_err,
                        "failed to release dedup record after processing error"
                    );
                }
                return Err(DedupError::Processing(e));
            }
        };

        // The callback's outcome is decided; housekeeping failures are
        // logged and swallowed so they can never mask it.
        let settled = if outcome {
            debug!(key = %key, "processing succeeded, finalizing dedup record");
            self.store
                .mark_finalized(key, self.config.record_reserve())
                .await
        } else {
            info!(key = %key, "processing returned failure, releasing dedup record");
            self.store.delete(key).await
        };
        if let Err(e) = settled {
            error!(key = %key, error = %e, "dedup record housekeeping failed, ignoring");
        }

        Ok(outcome)
    }
}

/// Strategy used when deduplication is disabled: every delivery goes
/// straight to the callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughStrategy;

impl PassthroughStrategy {
    pub async fn invoke<'a, F, Fut>(
        &self,
        payload: &'a [u8],
        meta: &'a MessageMeta,
        callback: F,
    ) -> DedupResult<bool>
    where
        F: FnOnce(&'a [u8], &'a MessageMeta) -> Fut,
        Fut: Future<Output = anyhow::Result<bool>>,
    {
        callback(payload, meta).await.map_err(DedupError::Processing)
    }
}

/// Consumption strategy, selected from configuration.
pub enum ConsumeStrategy {
    Dedup(DedupStrategy),
    Passthrough(PassthroughStrategy),
}

impl ConsumeStrategy {
    /// Build the strategy for `config`.
    ///
    /// Selecting a persistence backend without supplying its store is a
    /// configuration error, surfaced here - before any message is processed.
    pub fn new(config: DedupConfig, store: Option<Arc<dyn DedupStore>>) -> DedupResult<Self> {
        match config.persist {
            PersistType::Disabled => Ok(ConsumeStrategy::Passthrough(PassthroughStrategy)),
            persist => {
                let store = store.ok_or_else(|| {
                    DedupError::Config(format!(
                        "{persist:?} backend selected but no dedup store supplied"
                    ))
                })?;
                Ok(ConsumeStrategy::Dedup(DedupStrategy::new(config, store)))
            }
        }
    }

    /// Replace the key-derivation function of a dedup strategy. No-op for
    /// passthrough.
    pub fn with_key_fn<F>(self, key_fn: F) -> Self
    where
        F: Fn(&[u8], &MessageMeta) -> Option<String> + Send + Sync + 'static,
    {
        match self {
            ConsumeStrategy::Dedup(s) => ConsumeStrategy::Dedup(s.with_key_fn(key_fn)),
            passthrough => passthrough,
        }
    }

    /// Guard one delivery. See [`DedupStrategy::invoke`].
    pub async fn invoke<'a, F, Fut>(
        &self,
        payload: &'a [u8],
        meta: &'a MessageMeta,
        callback: F,
    ) -> DedupResult<bool>
    where
        F: FnOnce(&'a [u8], &'a MessageMeta) -> Fut,
        Fut: Future<Output = anyhow::Result<bool>>,
    {
        match self {
            ConsumeStrategy::Dedup(s) => s.invoke(payload, meta, callback).await,
            ConsumeStrategy::Passthrough(s) => s.invoke(payload, meta, callback).await,
        }
    }
}

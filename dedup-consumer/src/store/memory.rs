//! In-memory store used by unit tests.
//!
//! Implements the full contract, including expiry visibility: an entry past
//! its `expire_at_ms` is invisible to reads and reclaimable by a new claim,
//! exactly like the real backends.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

use super::DedupStore;
use crate::error::DedupResult;
use crate::key::DedupKey;
use crate::model::{now_millis, ConsumeStatus};

#[derive(Debug, Clone, Copy)]
struct Entry {
    status: ConsumeStatus,
    expire_at_ms: i64,
}

impl Entry {
    fn is_live(&self) -> bool {
        self.expire_at_ms > now_millis()
    }
}

#[derive(Default)]
pub(crate) struct MemoryDedupStore {
    entries: Mutex<HashMap<DedupKey, Entry>>,
}

impl MemoryDedupStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Test hook: plant an entry with an arbitrary status and expiry stamp.
    pub(crate) async fn insert_raw(&self, key: DedupKey, status: ConsumeStatus, expire_at_ms: i64) {
        self.entries.lock().await.insert(key, Entry { status, expire_at_ms });
    }

    pub(crate) async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn claim_if_absent(
        &self,
        key: &DedupKey,
        processing_ttl: Duration,
    ) -> DedupResult<bool> {
        let mut entries = self.entries.lock().await;

        if let Some(entry) = entries.get(key) {
            if entry.is_live() {
                return Ok(false);
            }
        }

        entries.insert(
            key.clone(),
            Entry {
                status: ConsumeStatus::Claimed,
                expire_at_ms: now_millis() + processing_ttl.as_millis() as i64,
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &DedupKey) -> DedupResult<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn mark_finalized(&self, key: &DedupKey, retention: Duration) -> DedupResult<()> {
        self.entries.lock().await.insert(
            key.clone(),
            Entry {
                status: ConsumeStatus::Finalized,
                expire_at_ms: now_millis() + retention.as_millis() as i64,
            },
        );
        Ok(())
    }

    async fn get_status(&self, key: &DedupKey) -> DedupResult<Option<ConsumeStatus>> {
        let entries = self.entries.lock().await;
        Ok(entries.get(key).filter(|e| e.is_live()).map(|e| e.status))
    }

    async fn sweep_expired(&self) -> DedupResult<u64> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| e.status != ConsumeStatus::Finalized || e.is_live());
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::Arc;

    fn key(unique_id: &str) -> DedupKey {
        DedupKey::new("app", "topic", "", "cg", unique_id)
    }

    #[tokio::test]
    async fn test_claim_then_duplicate_claim_loses() {
        let store = MemoryDedupStore::new();
        let k = key("m1");
        assert!(store.claim_if_absent(&k, Duration::from_secs(30)).await.unwrap());
        assert!(!store.claim_if_absent(&k, Duration::from_secs(30)).await.unwrap());
        assert_eq!(store.get_status(&k).await.unwrap(), Some(ConsumeStatus::Claimed));
    }

    #[tokio::test]
    async fn test_expired_claim_is_reclaimable() {
        let store = MemoryDedupStore::new();
        let k = key("m1");
        assert!(store.claim_if_absent(&k, Duration::from_millis(50)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.get_status(&k).await.unwrap(), None);
        assert!(store.claim_if_absent(&k, Duration::from_secs(30)).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_releases_claim() {
        let store = MemoryDedupStore::new();
        let k = key("m1");
        assert!(store.claim_if_absent(&k, Duration::from_secs(30)).await.unwrap());
        store.delete(&k).await.unwrap();
        assert!(store.claim_if_absent(&k, Duration::from_secs(30)).await.unwrap());
    }

    #[tokio::test]
    async fn test_finalized_status_visible_until_retention() {
        let store = MemoryDedupStore::new();
        let k = key("m1");
        assert!(store.claim_if_absent(&k, Duration::from_secs(30)).await.unwrap());
        store.mark_finalized(&k, Duration::from_millis(80)).await.unwrap();
        assert_eq!(store.get_status(&k).await.unwrap(), Some(ConsumeStatus::Finalized));
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(store.get_status(&k).await.unwrap(), None);
        assert!(store.claim_if_absent(&k, Duration::from_secs(30)).await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired_finalized() {
        let store = MemoryDedupStore::new();
        store
            .insert_raw(key("gone"), ConsumeStatus::Finalized, now_millis() - 1000)
            .await;
        store
            .insert_raw(key("kept"), ConsumeStatus::Finalized, now_millis() + 60_000)
            .await;
        // Expired claim: the next claim attempt reclaims it, not the sweeper.
        store
            .insert_raw(key("stale-claim"), ConsumeStatus::Claimed, now_millis() - 1000)
            .await;
        store
            .insert_raw(key("live-claim"), ConsumeStatus::Claimed, now_millis() + 60_000)
            .await;

        let removed = store.sweep_expired().await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len().await, 3);
        assert_eq!(
            store.get_status(&key("kept")).await.unwrap(),
            Some(ConsumeStatus::Finalized)
        );
        assert_eq!(
            store.get_status(&key("live-claim")).await.unwrap(),
            Some(ConsumeStatus::Claimed)
        );
    }

    #[tokio::test]
    async fn test_concurrent_claims_admit_one_winner() {
        let store = Arc::new(MemoryDedupStore::new());
        let k = key("contested");

        let attempts = (0..32).map(|_| {
            let store = Arc::clone(&store);
            let k = k.clone();
            tokio::spawn(async move {
                store.claim_if_absent(&k, Duration::from_secs(30)).await.unwrap()
            })
        });

        let winners = join_all(attempts)
            .await
            .into_iter()
            .filter(|r| *r.as_ref().unwrap())
            .count();
        assert_eq!(winners, 1);
    }
}

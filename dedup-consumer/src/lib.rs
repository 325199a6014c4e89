//! # Deduplicating Message Consumer
//!
//! Guards a message-consumption callback so its business effect is applied
//! at most once per logical message key, across any number of concurrent
//! consumer processes, using a shared store (PostgreSQL or Redis) as the
//! source of truth.
//!
//! ## Problem
//!
//! Queue transports deliver at-least-once. Without a shared guard:
//! - **Redeliveries**: the broker redelivers on slow acks, rebalances,
//!   and consumer restarts, and the same effect is applied twice
//! - **Fleet-wide races**: two consumer processes can hold the same
//!   delivery at the same instant; in-process sets cannot see each other
//! - **Data corruption**: a duplicated effect means double notifications,
//!   double charges, double rows
//!
//! ## Solution
//!
//! A claim/finalize protocol over one atomic storage primitive:
//! - **Claim**: atomically create a `Claimed` record for the message key
//!   iff no live record exists (unique-constraint insert in Postgres,
//!   `SET NX PX` in Redis). Exactly one concurrent caller wins.
//! - **Invoke**: only the claim winner runs the callback.
//! - **Finalize/release**: success finalizes the record for the retention
//!   window; failure deletes it so a redelivery starts clean.
//! - **Self-expiry**: a claim is honored for a bounded processing TTL, so
//!   a crashed consumer stops blocking redelivery on its own.
//!
//! ## Architecture
//!
//! ```text
//! Broker -> Transport -> ConsumeStrategy::invoke -----> callback
//!                             |        (claim winner)
//!                             v
//!                        DedupStore
//!                    (Postgres / Redis)
//!                             ^
//!                             |
//!                       ExpirySweeper
//!                    (interval reclamation)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use dedup_consumer::{
//!     ConsumeStrategy, DedupConfig, ExpirySweeper, MessageMeta, PersistType,
//!     PostgresDedupStore,
//! };
//! use std::sync::Arc;
//!
//! # async fn example(pool: sqlx::PgPool) -> anyhow::Result<()> {
//! let config = DedupConfig::new("order-service").with_persist(PersistType::Postgres);
//! let store = Arc::new(PostgresDedupStore::new(pool));
//!
//! // Background reclamation of finalized records past retention.
//! let sweeper = ExpirySweeper::new(store.clone(), config.sweep_interval()).spawn();
//!
//! let strategy = ConsumeStrategy::new(config, Some(store))?;
//!
//! // Per delivery, from the transport layer:
//! let payload: &[u8] = br#"{"order": 42}"#;
//! let meta = MessageMeta {
//!     topic: "order-events".into(),
//!     tag: Some("paid".into()),
//!     consumer_group: "order-cg".into(),
//!     msg_id: Some("7F000001ACE1".into()),
//!     unique_client_id: Some("order-42".into()),
//! };
//!
//! let ack = strategy
//!     .invoke(payload, &meta, |payload, _meta| async move {
//!         // Business logic here; Ok(false) requests redelivery.
//!         handle_order(payload).await?;
//!         Ok(true)
//!     })
//!     .await?;
//! // `ack == true`  -> acknowledge the delivery
//! // `ack == false` -> request redelivery
//! # Ok(())
//! # }
//! ```
//!
//! ## Design trade-offs
//!
//! - Duplicate suppression holds for the processing TTL window; a callback
//!   that outlives its claim can race a concurrent redelivery. Accepted:
//!   the alternative is blocking redelivery forever behind a crashed
//!   consumer.
//! - On ambiguous storage state the message is consumed rather than
//!   dropped (fail open). An occasional duplicate beats a lost message.
//! - Deliveries with no derivable key are consumed unguarded; there is
//!   nothing stable to deduplicate on.

mod config;
mod error;
mod key;
mod model;
mod store;
mod strategy;
mod sweeper;

pub use config::{DedupConfig, PersistType};
pub use error::{DedupError, DedupResult};
pub use key::DedupKey;
pub use model::ConsumeStatus;
pub use store::{DedupStore, PostgresDedupStore, RedisDedupStore};
pub use strategy::{
    default_key_fn, ConsumeStrategy, DedupStrategy, KeyFn, MessageMeta, PassthroughStrategy,
};
pub use sweeper::{ExpirySweeper, SweeperHandle};

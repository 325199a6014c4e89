//! Composite message identity used for deduplication.

use serde::{Deserialize, Serialize};

/// Namespace prefix for key-value entries, so dedup records never collide
/// with other keyspaces sharing the same Redis instance.
const KEY_NAMESPACE: &str = "mq:dedup";

/// Composite identity of one logical message, scoped to one consuming
/// application and consumer group.
///
/// Two deliveries are "the same message" exactly when all five fields match.
/// The `tag` may be empty (brokers treat an unset tag as the empty string);
/// `unique_id` is always present - derivation that yields no id means
/// deduplication is skipped before a key is ever built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey {
    /// Consuming application name (identity namespace)
    pub application: String,

    /// Message topic
    pub topic: String,

    /// Message tag, empty when the delivery carries none
    pub tag: String,

    /// Consumer group the delivery was made to
    pub consumer_group: String,

    /// Message-unique identifier (client-assigned key or broker message id)
    pub unique_id: String,
}

impl DedupKey {
    pub fn new(
        application: impl Into<String>,
        topic: impl Into<String>,
        tag: impl Into<String>,
        consumer_group: impl Into<String>,
        unique_id: impl Into<String>,
    ) -> Self {
        Self {
            application: application.into(),
            topic: topic.into(),
            tag: tag.into(),
            consumer_group: consumer_group.into(),
            unique_id: unique_id.into(),
        }
    }

    /// Render the key-value store entry name for this key.
    ///
    /// Layout: `mq:dedup:{application}:{topic}[:{tag}]:{group}:{unique_id}`.
    /// The tag segment is omitted when empty so untagged messages do not get
    /// a double-colon hole in the middle of the key.
    pub fn storage_key(&self) -> String {
        if self.tag.is_empty() {
            format!(
                "{}:{}:{}:{}:{}",
                KEY_NAMESPACE, self.application, self.topic, self.consumer_group, self.unique_id
            )
        } else {
            format!(
                "{}:{}:{}:{}:{}:{}",
                KEY_NAMESPACE,
                self.application,
                self.topic,
                self.tag,
                self.consumer_group,
                self.unique_id
            )
        }
    }
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.storage_key())
    }
}

//! Consumption state persisted alongside each dedup key.

use serde::{Deserialize, Serialize};

/// State of a dedup record.
///
/// A record is created `Claimed` when a claim wins, becomes `Finalized` when
/// the callback reports success, and is deleted outright when the callback
/// fails. The numeric codes are the wire/storage representation in both
/// backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsumeStatus {
    /// A processing attempt owns the key, bounded by the processing TTL
    Claimed,

    /// Processing completed successfully; duplicates are acked until the
    /// retention window elapses
    Finalized,
}

impl ConsumeStatus {
    /// Storage code for this status.
    pub fn code(self) -> i16 {
        match self {
            ConsumeStatus::Claimed => 0,
            ConsumeStatus::Finalized => 1,
        }
    }

    /// Decode a storage code. Unknown codes map to `None`; the strategy
    /// treats that the same as a missing record (fail open).
    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(ConsumeStatus::Claimed),
            1 => Some(ConsumeStatus::Finalized),
            _ => None,
        }
    }
}

/// Current time as absolute epoch milliseconds.
///
/// Expiry stamps are stored absolute (not relative) so a backend outage
/// cannot stretch a claim or retention window.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

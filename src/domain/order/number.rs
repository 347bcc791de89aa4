use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

/// Produces human-readable order numbers: `ORD-<epoch millis>-<seq>`.
///
/// Candidates are not guaranteed unique across processes; the store's unique
/// index is the final arbiter and the caller retries on collision.
#[derive(Debug, Default)]
pub struct OrderNumberGenerator {
    sequence: AtomicU64,
}

impl OrderNumberGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) % 10_000;
        format!("ORD-{}-{:04}", Utc::now().timestamp_millis(), seq)
    }
}

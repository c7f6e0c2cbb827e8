//! Opaque identifier generation.
//!
//! Ids are short content-derived hashes: a stable prefix plus a hex digest
//! truncated to a length that keeps collision probability low for the
//! expected table size.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

const DEFAULT_HASH_LEN: usize = 8;

/// Derive a short opaque id from `seed` material (a monotonically
/// increasing counter plus wall-clock time plus a human title) and a
/// `prefix` (e.g. `"wi"` for work items, `"dep"` for dependencies).
#[must_use]
pub fn derive_id(prefix: &str, seed: &str, now: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(now.to_rfc3339().as_bytes());
    let digest = hasher.finalize();
    let hex = format!("{digest:x}");
    format!("{prefix}-{}", &hex[..DEFAULT_HASH_LEN])
}

/// A monotonic per-process counter used to keep ids generated within the
/// same instant distinct even when wall-clock time does not advance.
#[derive(Debug, Default)]
pub struct IdSequence {
    counter: std::sync::atomic::AtomicU64,
}

impl IdSequence {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counter: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn next_id(&self, prefix: &str, seed: &str, now: DateTime<Utc>) -> String {
        let n = self
            .counter
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        derive_id(prefix, &format!("{seed}#{n}"), now)
    }
}

//! TTL-bounded cache of negative validation outcomes.
//!
//! Grounded on the pack's `KeyFetchCache` shape (a concurrent map of
//! TTL-stamped entries with an `is_expired` check), swapped to a `DashMap`
//! since nothing here needs size-bounded eviction, only TTL expiry.
//! Authorized outcomes are never stored here -- see [`Entry::is_cacheable`]
//! and the call site in `KeyService::validate_and_consume`: caching a
//! positive result would let a second request skip the store transaction
//! and reuse usage that was never actually decremented for it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use pdfgate_core::ValidationOutcome;

/// Default TTL for `{unauthorized, expired, revoked, exhausted}`.
pub const NEGATIVE_TTL: Duration = Duration::from_secs(30);
/// Default TTL for `error`, kept short so a recovered store is retried soon.
pub const ERROR_TTL: Duration = Duration::from_secs(5);

struct Entry {
    outcome: ValidationOutcome,
    expires_at: DateTime<Utc>,
}

/// Returns the default cache TTL for a given outcome.
#[must_use]
pub fn default_ttl(outcome: ValidationOutcome) -> Duration {
    match outcome {
        ValidationOutcome::Error => ERROR_TTL,
        _ => NEGATIVE_TTL,
    }
}

/// Thread-safe map from raw key to a cached negative outcome.
#[derive(Default)]
pub struct DecisionCache {
    entries: DashMap<String, Entry>,
}

impl DecisionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up `key`. An expired entry is evicted and reported as a miss.
    #[must_use]
    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<ValidationOutcome> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Some(entry.outcome);
            }
        }
        self.entries.remove(key);
        None
    }

    /// Stores `outcome` for `key` with the given TTL, overwriting any
    /// existing entry. No-op for [`ValidationOutcome::Authorized`] --
    /// positive decisions are never cached.
    pub fn set(&self, key: &str, outcome: ValidationOutcome, ttl: Duration, now: DateTime<Utc>) {
        if !outcome.is_cacheable_negative() {
            return;
        }
        self.entries.insert(
            key.to_string(),
            Entry {
                outcome,
                expires_at: now + ttl,
            },
        );
    }

    /// Unconditionally removes any cached entry for `key`.
    pub fn delete(&self, key: &str) {
        self.entries.remove(key);
    }
}

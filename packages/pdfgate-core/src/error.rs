//! Repository error taxonomy.
//!
//! These are kinds, not wire types -- `pdfgate-server`'s `KeyService` maps
//! them onto [`crate::outcome::ValidationOutcome`] for the HTTP response.
//! `StoreTransient` carries the underlying cause via `anyhow::Error` so
//! structured logs retain detail that never reaches a response body.

use thiserror::Error;

/// Repository-level error kinds.
#[derive(Debug, Error)]
pub enum RepoError {
    /// The requested key does not exist.
    #[error("key not found")]
    NotFound,
    /// `now > expires_at`.
    #[error("key expired")]
    Expired,
    /// `revoked_at` is set.
    #[error("key revoked")]
    Revoked,
    /// `remaining_usage <= 0`.
    #[error("usage limit reached")]
    Exhausted,
    /// Attempted to create a key whose ID already exists.
    #[error("key already exists")]
    Duplicate,
    /// Any other store error: network, timeout, internal. Bounded retry
    /// (see `StoreAdapter`) has already been exhausted by the time this
    /// surfaces.
    #[error("store unavailable: {0}")]
    StoreTransient(#[source] anyhow::Error),
    /// Out-of-range admin input (usage limit, TTL).
    #[error("validation failed: {0}")]
    Validation(String),
}

impl RepoError {
    /// Whether the underlying condition should be retried by
    /// [`crate`]-external retry loops (`StoreAdapter`'s bounded retry).
    /// The four logical-key outcomes and `NotFound` are never retryable --
    /// retrying won't change a transaction's outcome on the same key state.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, RepoError::StoreTransient(_))
    }
}

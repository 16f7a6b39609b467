//! Persistence contract for temporary keys.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pdfgate_core::{KeyRecord, RepoError};

/// Transactional store contract every temporary-key backend must satisfy.
///
/// `consume` is the operation the rest of the system leans on: its
/// read-check-decrement has to happen as a single transaction, or the
/// at-most-once usage guarantee on [`KeyRecord::remaining_usage`] is lost
/// under concurrent callers.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Persists a new record. Fails with [`RepoError::Duplicate`] if the
    /// key already exists.
    async fn create(&self, record: KeyRecord) -> Result<(), RepoError>;

    /// Returns the record for `key`, or [`RepoError::NotFound`].
    async fn get(&self, key: &str) -> Result<KeyRecord, RepoError>;

    /// Atomically decrements `remaining_usage` by one iff, at read time,
    /// `revoked_at` is unset, `expires_at > now`, and `remaining_usage > 0`.
    /// Checks apply in that precedence; on violation the transaction
    /// aborts without mutation and the corresponding error is returned.
    async fn consume(&self, key: &str, now: DateTime<Utc>) -> Result<KeyRecord, RepoError>;

    /// Sets `revoked_at` and zeroes `remaining_usage`. Idempotent: if
    /// already revoked, returns the existing record unchanged -- the
    /// earliest `revoked_at` always wins.
    async fn revoke(&self, key: &str, now: DateTime<Utc>) -> Result<KeyRecord, RepoError>;

    /// Best-effort removal. Absence of the key is not an error.
    async fn delete(&self, key: &str) -> Result<(), RepoError>;

    /// Removes up to `limit` records with `expires_at <= now`, returning
    /// the number actually removed. Partial progress is acceptable.
    async fn delete_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<usize, RepoError>;

    /// Counts records that are simultaneously non-revoked, non-expired,
    /// and have positive remaining usage.
    async fn count_active(&self, now: DateTime<Utc>) -> Result<usize, RepoError>;
}

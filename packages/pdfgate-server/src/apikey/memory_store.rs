//! In-memory `Repository`, backed by a sharded concurrent map.
//!
//! `DashMap`'s per-shard locking is what gives `consume` its atomicity here:
//! `get_mut` on a key holds that shard's write lock for the duration of the
//! read-check-decrement, so two concurrent consumes against the same key
//! serialize the same way a document-store transaction would. Suitable as a
//! local/dev backend and as the seam integration tests drive the full
//! validation pipeline through.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use pdfgate_core::{KeyRecord, RepoError};

use super::repository::Repository;

/// `Repository` over an in-process concurrent map. No persistence across
/// restarts; suitable for local development and tests.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    records: DashMap<String, KeyRecord>,
}

impl MemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    #[tracing::instrument(skip_all)]
    async fn create(&self, record: KeyRecord) -> Result<(), RepoError> {
        match self.records.entry(record.key.clone()) {
            Entry::Occupied(_) => Err(RepoError::Duplicate),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    #[tracing::instrument(skip_all)]
    async fn get(&self, key: &str) -> Result<KeyRecord, RepoError> {
        self.records
            .get(key)
            .map(|entry| entry.clone())
            .ok_or(RepoError::NotFound)
    }

    #[tracing::instrument(skip_all)]
    async fn consume(&self, key: &str, now: DateTime<Utc>) -> Result<KeyRecord, RepoError> {
        let mut entry = self.records.get_mut(key).ok_or(RepoError::NotFound)?;
        if entry.revoked_at.is_some() {
            return Err(RepoError::Revoked);
        }
        if entry.expires_at <= now {
            return Err(RepoError::Expired);
        }
        if entry.remaining_usage == 0 {
            return Err(RepoError::Exhausted);
        }
        entry.remaining_usage -= 1;
        Ok(entry.clone())
    }

    #[tracing::instrument(skip_all)]
    async fn revoke(&self, key: &str, now: DateTime<Utc>) -> Result<KeyRecord, RepoError> {
        let mut entry = self.records.get_mut(key).ok_or(RepoError::NotFound)?;
        if entry.revoked_at.is_none() {
            entry.revoked_at = Some(now);
            entry.remaining_usage = 0;
        }
        Ok(entry.clone())
    }

    #[tracing::instrument(skip_all)]
    async fn delete(&self, key: &str) -> Result<(), RepoError> {
        self.records.remove(key);
        Ok(())
    }

    #[tracing::instrument(skip(self, now))]
    async fn delete_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<usize, RepoError> {
        let expired: Vec<String> = self
            .records
            .iter()
            .filter(|entry| entry.expires_at <= now)
            .take(limit)
            .map(|entry| entry.key().clone())
            .collect();
        let removed = expired.len();
        for key in expired {
            self.records.remove(&key);
        }
        Ok(removed)
    }

    #[tracing::instrument(skip(self))]
    async fn count_active(&self, now: DateTime<Utc>) -> Result<usize, RepoError> {
        Ok(self
            .records
            .iter()
            .filter(|entry| {
                entry.revoked_at.is_none() && entry.expires_at > now && entry.remaining_usage > 0
            })
            .count())
    }
}

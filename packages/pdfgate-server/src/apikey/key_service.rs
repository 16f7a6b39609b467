//! Orchestrates issuance, lookup, revocation, cleanup, and validation.
//!
//! Holds the repository, a [`Clock`] (so tests can inject a fixed instant
//! instead of sleeping), and the decision cache. Metrics are recorded
//! through the free functions in [`crate::metrics`] against the
//! process-wide recorder installed at startup.

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use pdfgate_core::{Clock, KeyIdentityGen, KeyRecord, RepoError, ValidationOutcome};
use tracing::{info, warn};

use super::cache::{default_ttl, DecisionCache};
use super::repository::Repository;
use crate::metrics;

/// Length of a generated temporary key.
pub const KEY_LENGTH: usize = 32;
/// Hard ceiling on a single cleanup pass, regardless of the caller's request.
pub const DEFAULT_CLEANUP_LIMIT: usize = 200;
const IDENTIFIER_HASH_PREFIX: usize = 16;

/// Orchestration layer over a [`Repository`] and [`DecisionCache`].
pub struct KeyService {
    repository: Arc<dyn Repository>,
    clock: Arc<dyn Clock>,
    cache: DecisionCache,
}

impl KeyService {
    #[must_use]
    pub fn new(repository: Arc<dyn Repository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            clock,
            cache: DecisionCache::new(),
        }
    }

    /// Generates a fresh key, persists it, and reports issuance metrics.
    /// The raw key never appears in logs or metric labels -- only its hash.
    #[tracing::instrument(skip(self, operator))]
    pub async fn issue_temporary_key(
        &self,
        label: String,
        usage_limit: u32,
        ttl: ChronoDuration,
        operator: &str,
    ) -> Result<KeyRecord, RepoError> {
        let operator_hash = KeyIdentityGen::hash_identifier(operator, IDENTIFIER_HASH_PREFIX);
        let now = self.clock.now();
        let key = KeyIdentityGen::generate(KEY_LENGTH);
        let record = KeyRecord::issue(key.clone(), label, usage_limit, now, now + ttl);

        match self.repository.create(record.clone()).await {
            Ok(()) => {
                self.cache.delete(&key);
                metrics::record_issue("success", &operator_hash);
                self.refresh_active_gauge().await;
                info!(
                    key = %KeyIdentityGen::hash_identifier(&key, IDENTIFIER_HASH_PREFIX),
                    operator = %operator_hash,
                    "api_key_issue"
                );
                Ok(record)
            }
            Err(err) => {
                metrics::record_issue("error", &operator_hash);
                Err(err)
            }
        }
    }

    /// Returns the record for `key`, or propagates [`RepoError::NotFound`].
    #[tracing::instrument(skip_all)]
    pub async fn get(&self, key: &str) -> Result<KeyRecord, RepoError> {
        self.repository.get(key).await
    }

    /// Revokes `key`. Evicts/overwrites the decision cache with the
    /// negative `revoked` outcome so readers don't need to wait out a
    /// stale cached positive.
    #[tracing::instrument(skip_all)]
    pub async fn revoke(&self, key: &str, operator: &str) -> Result<KeyRecord, RepoError> {
        let now = self.clock.now();
        let record = self.repository.revoke(key, now).await?;
        self.cache.set(
            key,
            ValidationOutcome::Revoked,
            default_ttl(ValidationOutcome::Revoked),
            now,
        );
        self.refresh_active_gauge().await;
        info!(
            key = %KeyIdentityGen::hash_identifier(key, IDENTIFIER_HASH_PREFIX),
            operator = %KeyIdentityGen::hash_identifier(operator, IDENTIFIER_HASH_PREFIX),
            "api_key_revoke"
        );
        Ok(record)
    }

    /// Deletes up to `effective_limit` expired records, where
    /// `effective_limit = min(limit, DEFAULT_CLEANUP_LIMIT)` and
    /// non-positive `limit` becomes the default.
    #[tracing::instrument(skip(self))]
    pub async fn cleanup_expired(&self, limit: i64) -> Result<usize, RepoError> {
        let effective_limit = if limit <= 0 {
            DEFAULT_CLEANUP_LIMIT
        } else {
            (limit as usize).min(DEFAULT_CLEANUP_LIMIT)
        };
        let now = self.clock.now();
        let deleted = self.repository.delete_expired(now, effective_limit).await?;
        if deleted > 0 {
            self.refresh_active_gauge().await;
        }
        Ok(deleted)
    }

    /// Cache lookup, then transactional consume on a miss. Positive
    /// decisions are never cached, so every authorized call pays a
    /// transactional round-trip -- this is what preserves at-most-once
    /// consumption under concurrency.
    #[tracing::instrument(skip_all)]
    pub async fn validate_and_consume(&self, key: &str) -> (Option<KeyRecord>, ValidationOutcome) {
        let now = self.clock.now();

        if let Some(cached) = self.cache.get(key, now) {
            metrics::record_validation(cached.as_str());
            return (None, cached);
        }

        match self.repository.consume(key, now).await {
            Ok(record) => {
                self.cache.delete(key);
                metrics::record_validation(ValidationOutcome::Authorized.as_str());
                (Some(record), ValidationOutcome::Authorized)
            }
            Err(err) => {
                let outcome = Self::map_error(&err);
                self.cache.set(key, outcome, default_ttl(outcome), now);
                metrics::record_validation(outcome.as_str());

                if outcome == ValidationOutcome::Expired {
                    let _ = self.repository.delete(key).await;
                    self.refresh_active_gauge().await;
                }

                warn!(
                    key = %KeyIdentityGen::hash_identifier(key, IDENTIFIER_HASH_PREFIX),
                    outcome = outcome.as_str(),
                    "temporary key validation failed"
                );
                (None, outcome)
            }
        }
    }

    fn map_error(err: &RepoError) -> ValidationOutcome {
        match err {
            RepoError::NotFound => ValidationOutcome::Unauthorized,
            RepoError::Expired => ValidationOutcome::Expired,
            RepoError::Revoked => ValidationOutcome::Revoked,
            RepoError::Exhausted => ValidationOutcome::Exhausted,
            RepoError::Duplicate | RepoError::StoreTransient(_) | RepoError::Validation(_) => {
                ValidationOutcome::Error
            }
        }
    }

    async fn refresh_active_gauge(&self) {
        if let Ok(count) = self.repository.count_active(self.clock.now()).await {
            #[allow(clippy::cast_precision_loss)]
            metrics::set_active_keys(count as f64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apikey::memory_store::MemoryRepository;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicU64, Ordering};

    struct FixedClock(DateTime<Utc>);
    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn service_at(now: DateTime<Utc>) -> (KeyService, Arc<MemoryRepository>) {
        let repo = Arc::new(MemoryRepository::new());
        let svc = KeyService::new(
            Arc::clone(&repo) as Arc<dyn Repository>,
            Arc::new(FixedClock(now)),
        );
        (svc, repo)
    }

    #[tokio::test]
    async fn issue_round_trips_label_usage_and_expiry() {
        let now = Utc::now();
        let (svc, _repo) = service_at(now);

        let record = svc
            .issue_temporary_key("trial".to_string(), 7, ChronoDuration::minutes(60), "op")
            .await
            .unwrap();

        assert_eq!(record.label, "trial");
        assert_eq!(record.max_usage, 7);
        assert_eq!(record.remaining_usage, 7);
        assert_eq!(record.expires_at, now + ChronoDuration::minutes(60));

        let fetched = svc.get(&record.key).await.unwrap();
        assert_eq!(fetched, record);
    }

    #[tokio::test]
    async fn revoke_makes_subsequent_validation_return_revoked() {
        let now = Utc::now();
        let (svc, _repo) = service_at(now);
        let record = svc
            .issue_temporary_key("l".to_string(), 1, ChronoDuration::hours(1), "op")
            .await
            .unwrap();

        svc.revoke(&record.key, "op").await.unwrap();

        let (rec, outcome) = svc.validate_and_consume(&record.key).await;
        assert!(rec.is_none());
        assert_eq!(outcome, ValidationOutcome::Revoked);
    }

    #[tokio::test]
    async fn revoke_idempotent_same_record_and_outcome() {
        let now = Utc::now();
        let (svc, _repo) = service_at(now);
        let record = svc
            .issue_temporary_key("l".to_string(), 1, ChronoDuration::hours(1), "op")
            .await
            .unwrap();

        let first = svc.revoke(&record.key, "op").await.unwrap();
        let second = svc.revoke(&record.key, "op").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn validate_and_consume_authorized_is_never_cached() {
        let now = Utc::now();
        let (svc, _repo) = service_at(now);
        let record = svc
            .issue_temporary_key("l".to_string(), 2, ChronoDuration::hours(1), "op")
            .await
            .unwrap();

        let (rec1, outcome1) = svc.validate_and_consume(&record.key).await;
        assert_eq!(outcome1, ValidationOutcome::Authorized);
        assert_eq!(rec1.unwrap().remaining_usage, 1);

        let (rec2, outcome2) = svc.validate_and_consume(&record.key).await;
        assert_eq!(outcome2, ValidationOutcome::Authorized);
        assert_eq!(rec2.unwrap().remaining_usage, 0);

        let (rec3, outcome3) = svc.validate_and_consume(&record.key).await;
        assert!(rec3.is_none());
        assert_eq!(outcome3, ValidationOutcome::Exhausted);
    }

    #[tokio::test]
    async fn validate_and_consume_caches_negative_outcome() {
        let now = Utc::now();
        let (svc, repo) = service_at(now);
        let record = svc
            .issue_temporary_key("l".to_string(), 1, ChronoDuration::hours(1), "op")
            .await
            .unwrap();
        svc.revoke(&record.key, "op").await.unwrap();

        // Delete from the backing store directly; the cached negative
        // outcome should still answer without touching the repository.
        repo.delete(&record.key).await.unwrap();

        let (_rec, outcome) = svc.validate_and_consume(&record.key).await;
        assert_eq!(outcome, ValidationOutcome::Revoked);
    }

    #[tokio::test]
    async fn unknown_key_maps_to_unauthorized() {
        let now = Utc::now();
        let (svc, _repo) = service_at(now);
        let (rec, outcome) = svc.validate_and_consume("does-not-exist").await;
        assert!(rec.is_none());
        assert_eq!(outcome, ValidationOutcome::Unauthorized);
    }

    #[tokio::test]
    async fn expired_key_is_deleted_after_validation() {
        let now = Utc::now();
        let (svc, _repo) = service_at(now);
        let record = svc
            .issue_temporary_key("l".to_string(), 1, ChronoDuration::minutes(15), "op")
            .await
            .unwrap();

        let later_now = now + ChronoDuration::minutes(20);
        let later_svc = KeyService {
            repository: Arc::clone(&_repo) as Arc<dyn Repository>,
            clock: Arc::new(FixedClock(later_now)),
            cache: DecisionCache::new(),
        };

        let (_rec, outcome) = later_svc.validate_and_consume(&record.key).await;
        assert_eq!(outcome, ValidationOutcome::Expired);

        let err = later_svc.get(&record.key).await.unwrap_err();
        assert!(matches!(err, RepoError::NotFound));
    }

    #[tokio::test]
    async fn cleanup_expired_clamps_non_positive_limit_to_default() {
        let now = Utc::now();
        let (svc, repo) = service_at(now);
        for i in 0..3 {
            let key = format!("expired-{i}");
            repo.create(KeyRecord::issue(
                key,
                "l".to_string(),
                5,
                now - ChronoDuration::hours(2),
                now - ChronoDuration::hours(1),
            ))
            .await
            .unwrap();
        }

        let deleted = svc.cleanup_expired(0).await.unwrap();
        assert_eq!(deleted, 3);
    }

    #[tokio::test]
    async fn cleanup_expired_clamps_large_limit_to_default_ceiling() {
        let now = Utc::now();
        let (svc, _repo) = service_at(now);
        let deleted = svc.cleanup_expired(5_000).await.unwrap();
        assert_eq!(deleted, 0);
    }

    /// Repository stub that always reports a transient store failure, used
    /// to exercise the `Error` outcome and its caching/metrics path.
    struct AlwaysTransientRepository {
        calls: AtomicU64,
    }

    #[async_trait]
    impl Repository for AlwaysTransientRepository {
        async fn create(&self, _record: KeyRecord) -> Result<(), RepoError> {
            Err(RepoError::StoreTransient(anyhow::anyhow!("unreachable")))
        }
        async fn get(&self, _key: &str) -> Result<KeyRecord, RepoError> {
            Err(RepoError::StoreTransient(anyhow::anyhow!("unreachable")))
        }
        async fn consume(&self, _key: &str, _now: DateTime<Utc>) -> Result<KeyRecord, RepoError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RepoError::StoreTransient(anyhow::anyhow!("unreachable")))
        }
        async fn revoke(&self, _key: &str, _now: DateTime<Utc>) -> Result<KeyRecord, RepoError> {
            Err(RepoError::StoreTransient(anyhow::anyhow!("unreachable")))
        }
        async fn delete(&self, _key: &str) -> Result<(), RepoError> {
            Ok(())
        }
        async fn delete_expired(
            &self,
            _now: DateTime<Utc>,
            _limit: usize,
        ) -> Result<usize, RepoError> {
            Ok(0)
        }
        async fn count_active(&self, _now: DateTime<Utc>) -> Result<usize, RepoError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn store_error_is_cached_and_avoids_a_second_store_round_trip() {
        let now = Utc::now();
        let repo = Arc::new(AlwaysTransientRepository {
            calls: AtomicU64::new(0),
        });
        let svc = KeyService::new(
            Arc::clone(&repo) as Arc<dyn Repository>,
            Arc::new(FixedClock(now)),
        );

        let (_rec, first) = svc.validate_and_consume("k").await;
        assert_eq!(first, ValidationOutcome::Error);
        assert_eq!(repo.calls.load(Ordering::SeqCst), 1);

        let (_rec, second) = svc.validate_and_consume("k").await;
        assert_eq!(second, ValidationOutcome::Error);
        // Served from the cache -- the store was not called again.
        assert_eq!(repo.calls.load(Ordering::SeqCst), 1);
    }
}

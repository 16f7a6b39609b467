//! `Repository` backed by a Firestore-compatible transactional document
//! store.
//!
//! Every operation runs inside [`with_retry`]: up to 3 attempts, exponential
//! backoff starting at 100ms, each attempt capped at a 3s deadline.
//! `consume` and `revoke` run their read-check-write inside a single
//! Firestore transaction and make at most one attempt per outer retry --
//! the outer loop already handles contention, so nesting retries inside the
//! transaction would just compound backoff. A tracing span wraps each
//! attempt.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use firestore::FirestoreDb;
use pdfgate_core::{KeyKind, KeyRecord, RepoError};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use super::repository::Repository;

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const ATTEMPT_DEADLINE: Duration = Duration::from_secs(3);

/// Persisted document shape. Deliberately omits `key` -- the document ID
/// *is* the raw key string, so storage access control is what protects it.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FirestoreKeyDocument {
    #[serde(rename = "type")]
    kind: KeyKind,
    label: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    max_usage: u32,
    remaining_usage: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    revoked_at: Option<DateTime<Utc>>,
}

impl FirestoreKeyDocument {
    fn from_record(record: &KeyRecord) -> Self {
        Self {
            kind: record.kind,
            label: record.label.clone(),
            created_at: record.created_at,
            expires_at: record.expires_at,
            max_usage: record.max_usage,
            remaining_usage: record.remaining_usage,
            revoked_at: record.revoked_at,
        }
    }

    fn into_record(self, key: String) -> KeyRecord {
        KeyRecord {
            key,
            kind: self.kind,
            label: self.label,
            created_at: self.created_at,
            expires_at: self.expires_at,
            max_usage: self.max_usage,
            remaining_usage: self.remaining_usage,
            revoked_at: self.revoked_at,
        }
    }
}

/// `Repository` implementation talking to a Firestore-compatible store.
pub struct FirestoreStoreAdapter {
    db: FirestoreDb,
    collection: String,
}

impl FirestoreStoreAdapter {
    /// Connects to the project and binds operations to `collection`.
    pub async fn new(project_id: &str, collection: String) -> anyhow::Result<Self> {
        let db = FirestoreDb::new(project_id).await?;
        Ok(Self { db, collection })
    }
}

/// Maps a store-level failure onto the repository error taxonomy.
/// `DataNotFoundError`/`DataConflictError`/`InvalidParametersError` are
/// non-retryable; everything else (network, timeout, internal) is
/// `StoreTransient` and therefore retryable.
fn classify_error(err: firestore::errors::FirestoreError) -> RepoError {
    use firestore::errors::FirestoreError;
    match err {
        FirestoreError::DataNotFoundError(_) => RepoError::NotFound,
        FirestoreError::DataConflictError(_) => RepoError::Duplicate,
        FirestoreError::InvalidParametersError(_) => {
            RepoError::Validation("invalid firestore query parameters".to_string())
        }
        other => RepoError::StoreTransient(anyhow::Error::new(other)),
    }
}

/// Runs `f` up to [`MAX_ATTEMPTS`] times with exponential backoff, bailing
/// out immediately on a non-retryable error. Each attempt is bounded by
/// [`ATTEMPT_DEADLINE`] and wrapped in its own tracing span.
async fn with_retry<F, Fut, T>(operation: &'static str, mut f: F) -> Result<T, RepoError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RepoError>>,
{
    let mut backoff = INITIAL_BACKOFF;

    for attempt in 1..=MAX_ATTEMPTS {
        let span = tracing::info_span!("firestore_attempt", operation, attempt);
        let outcome = tokio::time::timeout(ATTEMPT_DEADLINE, f())
            .instrument(span)
            .await;

        match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) if !err.is_retryable() || attempt == MAX_ATTEMPTS => return Err(err),
            Ok(Err(_)) => {}
            Err(_elapsed) if attempt == MAX_ATTEMPTS => {
                return Err(RepoError::StoreTransient(anyhow::anyhow!(
                    "{operation} timed out after {ATTEMPT_DEADLINE:?} on attempt {attempt}"
                )));
            }
            Err(_elapsed) => {}
        }

        tokio::time::sleep(backoff).await;
        backoff *= 2;
    }

    unreachable!("loop always returns on its final attempt")
}

#[async_trait]
impl Repository for FirestoreStoreAdapter {
    #[tracing::instrument(skip_all, fields(collection = %self.collection))]
    async fn create(&self, record: KeyRecord) -> Result<(), RepoError> {
        let doc = FirestoreKeyDocument::from_record(&record);
        with_retry("create", || async {
            self.db
                .fluent()
                .insert()
                .into(self.collection.as_str())
                .document_id(&record.key)
                .object(&doc)
                .execute::<FirestoreKeyDocument>()
                .await
                .map(|_| ())
                .map_err(classify_error)
        })
        .await
    }

    #[tracing::instrument(skip_all, fields(collection = %self.collection))]
    async fn get(&self, key: &str) -> Result<KeyRecord, RepoError> {
        with_retry("get", || async {
            let doc: Option<FirestoreKeyDocument> = self
                .db
                .fluent()
                .select()
                .by_id_in(self.collection.as_str())
                .obj()
                .one(key)
                .await
                .map_err(classify_error)?;
            doc.map(|d| d.into_record(key.to_string()))
                .ok_or(RepoError::NotFound)
        })
        .await
    }

    #[tracing::instrument(skip_all, fields(collection = %self.collection))]
    async fn consume(&self, key: &str, now: DateTime<Utc>) -> Result<KeyRecord, RepoError> {
        with_retry("consume", || async {
            let collection = self.collection.clone();
            let key = key.to_string();

            let result = self
                .db
                .run_transaction(move |db, transaction| {
                    let collection = collection.clone();
                    let key = key.clone();
                    Box::pin(async move {
                        let existing: Option<FirestoreKeyDocument> = db
                            .fluent()
                            .select()
                            .by_id_in(collection.as_str())
                            .obj()
                            .one(&key)
                            .await?;

                        let Some(mut doc) = existing else {
                            return Ok(ConsumeOutcome::NotFound);
                        };
                        if doc.revoked_at.is_some() {
                            return Ok(ConsumeOutcome::Revoked);
                        }
                        if doc.expires_at <= now {
                            return Ok(ConsumeOutcome::Expired);
                        }
                        if doc.remaining_usage == 0 {
                            return Ok(ConsumeOutcome::Exhausted);
                        }

                        doc.remaining_usage -= 1;

                        db.fluent()
                            .update()
                            .in_col(collection.as_str())
                            .document_id(&key)
                            .object(&doc)
                            .add_to_transaction(transaction)
                            .execute::<FirestoreKeyDocument>()
                            .await?;

                        Ok(ConsumeOutcome::Applied(key, doc))
                    })
                })
                .await
                .map_err(classify_error)?;

            match result {
                ConsumeOutcome::Applied(key, doc) => Ok(doc.into_record(key)),
                ConsumeOutcome::NotFound => Err(RepoError::NotFound),
                ConsumeOutcome::Revoked => Err(RepoError::Revoked),
                ConsumeOutcome::Expired => Err(RepoError::Expired),
                ConsumeOutcome::Exhausted => Err(RepoError::Exhausted),
            }
        })
        .await
    }

    #[tracing::instrument(skip_all, fields(collection = %self.collection))]
    async fn revoke(&self, key: &str, now: DateTime<Utc>) -> Result<KeyRecord, RepoError> {
        with_retry("revoke", || async {
            let collection = self.collection.clone();
            let key = key.to_string();

            let result = self
                .db
                .run_transaction(move |db, transaction| {
                    let collection = collection.clone();
                    let key = key.clone();
                    Box::pin(async move {
                        let existing: Option<FirestoreKeyDocument> = db
                            .fluent()
                            .select()
                            .by_id_in(collection.as_str())
                            .obj()
                            .one(&key)
                            .await?;

                        let Some(mut doc) = existing else {
                            return Ok(ConsumeOutcome::NotFound);
                        };

                        if doc.revoked_at.is_none() {
                            doc.revoked_at = Some(now);
                            doc.remaining_usage = 0;

                            db.fluent()
                                .update()
                                .in_col(collection.as_str())
                                .document_id(&key)
                                .object(&doc)
                                .add_to_transaction(transaction)
                                .execute::<FirestoreKeyDocument>()
                                .await?;
                        }

                        Ok(ConsumeOutcome::Applied(key, doc))
                    })
                })
                .await
                .map_err(classify_error)?;

            match result {
                ConsumeOutcome::Applied(key, doc) => Ok(doc.into_record(key)),
                ConsumeOutcome::NotFound => Err(RepoError::NotFound),
                _ => unreachable!("revoke's transaction body only returns Applied or NotFound"),
            }
        })
        .await
    }

    #[tracing::instrument(skip_all, fields(collection = %self.collection))]
    async fn delete(&self, key: &str) -> Result<(), RepoError> {
        with_retry("delete", || async {
            match self
                .db
                .fluent()
                .delete()
                .from(self.collection.as_str())
                .document_id(key)
                .execute()
                .await
            {
                Ok(()) => Ok(()),
                Err(err) => match classify_error(err) {
                    RepoError::NotFound => Ok(()),
                    other => Err(other),
                },
            }
        })
        .await
    }

    #[tracing::instrument(skip(self, now), fields(collection = %self.collection))]
    async fn delete_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<usize, RepoError> {
        with_retry("delete_expired", || async {
            #[allow(clippy::cast_possible_truncation)]
            let docs = self
                .db
                .fluent()
                .select()
                .from(self.collection.as_str())
                .filter(|q| q.for_all([q.field("expires_at").less_than_or_equal(now)]))
                .limit(limit as u32)
                .query()
                .await
                .map_err(classify_error)?;

            let mut deleted = 0usize;
            for doc in docs {
                let Some(id) = doc.name.rsplit('/').next() else {
                    continue;
                };
                if self
                    .db
                    .fluent()
                    .delete()
                    .from(self.collection.as_str())
                    .document_id(id)
                    .execute()
                    .await
                    .is_ok()
                {
                    deleted += 1;
                }
            }
            Ok(deleted)
        })
        .await
    }

    #[tracing::instrument(skip_all, fields(collection = %self.collection))]
    async fn count_active(&self, now: DateTime<Utc>) -> Result<usize, RepoError> {
        with_retry("count_active", || async {
            let docs = self
                .db
                .fluent()
                .select()
                .from(self.collection.as_str())
                .filter(|q| {
                    q.for_all([
                        q.field("revoked_at").is_null(),
                        q.field("expires_at").greater_than(now),
                        q.field("remaining_usage").greater_than(0),
                    ])
                })
                .query()
                .await
                .map_err(classify_error)?;
            Ok(docs.len())
        })
        .await
    }
}

/// Result of the business-logic check inside a `consume`/`revoke`
/// transaction. Rejections are returned as `Ok` variants (the transaction
/// itself never mutated anything) and translated to `RepoError` after the
/// transaction completes.
enum ConsumeOutcome {
    Applied(String, FirestoreKeyDocument),
    NotFound,
    Revoked,
    Expired,
    Exhausted,
}

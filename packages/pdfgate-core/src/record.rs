//! The canonical temporary-key record and its derived status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tag distinguishing key varieties. Presently only `Temporary` exists;
/// left non-exhaustive so a future variant doesn't force every match arm
/// in downstream crates to be revisited in lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum KeyKind {
    /// A persisted, usage-limited, expiring key issued through the admin API.
    Temporary,
}

/// The canonical record for a temporary key.
///
/// `key` doubles as the primary storage identifier (see
/// [`crate::error`] for why this is a deliberate, documented choice).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    /// Opaque ASCII identifier, 32 symbols from `[A-Za-z0-9]`. Immutable.
    pub key: String,
    /// Key variety tag. Renamed to `type` on the wire to match the
    /// persisted document shape.
    #[serde(rename = "type")]
    pub kind: KeyKind,
    /// Human caption (<= 64 chars), free-form, non-unique.
    pub label: String,
    /// UTC instant the record was created.
    pub created_at: DateTime<Utc>,
    /// UTC instant after which the record is expired. Always `> created_at`.
    pub expires_at: DateTime<Utc>,
    /// Positive integer, 1-1000. Immutable after creation.
    pub max_usage: u32,
    /// Non-negative, monotonically non-increasing, never exceeds `max_usage`.
    pub remaining_usage: u32,
    /// Set once, permanently, by `Revoke`.
    pub revoked_at: Option<DateTime<Utc>>,
}

impl KeyRecord {
    /// Constructs a freshly issued record: `remaining_usage == max_usage`,
    /// not revoked.
    #[must_use]
    pub fn issue(
        key: String,
        label: String,
        max_usage: u32,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            kind: KeyKind::Temporary,
            label,
            created_at,
            expires_at,
            max_usage,
            remaining_usage: max_usage,
            revoked_at: None,
        }
    }

    /// Computes the record's status at `now`, per the fixed precedence:
    /// revoked -> expired -> exhausted -> active.
    #[must_use]
    pub fn status(&self, now: DateTime<Utc>) -> KeyStatus {
        if self.revoked_at.is_some() {
            KeyStatus::Revoked
        } else if now > self.expires_at {
            KeyStatus::Expired
        } else if self.remaining_usage == 0 {
            KeyStatus::Exhausted
        } else {
            KeyStatus::Active
        }
    }
}

/// Deterministic function of `(revoked_at, expires_at, remaining_usage, now)`.
/// Not stored -- always recomputed from the record and a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    /// `revoked_at` is set.
    Revoked,
    /// `now > expires_at` and not revoked.
    Expired,
    /// `remaining_usage == 0`, not revoked or expired.
    Exhausted,
    /// None of the above.
    Active,
}

impl KeyStatus {
    /// Lowercase wire representation, used by the admin API response body.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            KeyStatus::Revoked => "revoked",
            KeyStatus::Expired => "expired",
            KeyStatus::Exhausted => "exhausted",
            KeyStatus::Active => "active",
        }
    }
}

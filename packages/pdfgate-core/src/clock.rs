//! Clock abstraction for testable time.
//!
//! Production code depends on the [`Clock`] trait rather than calling
//! `Utc::now()` directly, so tests can inject a fixed or steppable clock
//! instead of sleeping to exercise expiry and TTL behavior.

use chrono::{DateTime, Utc};

/// Source of the current UTC instant.
///
/// Implementations must be cheap to call -- this is invoked on every
/// validation, issuance, and cache lookup.
pub trait Clock: Send + Sync {
    /// Returns the current UTC instant.
    fn now(&self) -> DateTime<Utc>;
}

/// `Clock` backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

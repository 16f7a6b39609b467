//! The closed set of validation outcomes and their fixed HTTP mapping.

/// Result of `ValidateAndConsume`. The mapping to HTTP belongs here, not to
/// callers, so every middleware maps identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// The key checked out and usage was consumed.
    Authorized,
    /// No key presented, or the key matches nothing.
    Unauthorized,
    /// The key's `expires_at` has passed.
    Expired,
    /// The key has been revoked.
    Revoked,
    /// The key's `remaining_usage` reached zero.
    Exhausted,
    /// The backing store could not be reached or consulted in time.
    Error,
}

impl ValidationOutcome {
    /// HTTP status code for this outcome. `Authorized` passes through to the
    /// next handler, so `200` here is nominal (callers never render it).
    #[must_use]
    pub fn status_code(self) -> u16 {
        match self {
            ValidationOutcome::Authorized => 200,
            ValidationOutcome::Unauthorized => 401,
            ValidationOutcome::Expired | ValidationOutcome::Revoked => 403,
            ValidationOutcome::Exhausted => 429,
            ValidationOutcome::Error => 503,
        }
    }

    /// Fixed error-body message. `Authorized` has none -- callers must not
    /// render an error body for it.
    #[must_use]
    pub fn message(self) -> Option<&'static str> {
        match self {
            ValidationOutcome::Authorized => None,
            ValidationOutcome::Unauthorized => Some("unauthorized"),
            ValidationOutcome::Expired | ValidationOutcome::Revoked => Some("key inactive"),
            ValidationOutcome::Exhausted => Some("usage limit reached"),
            ValidationOutcome::Error => Some("service unavailable"),
        }
    }

    /// Whether this outcome may be cached by the [`crate`]-level decision
    /// cache. Only negative outcomes are cacheable; caching `Authorized`
    /// would break at-most-once consumption.
    #[must_use]
    pub fn is_cacheable_negative(self) -> bool {
        !matches!(self, ValidationOutcome::Authorized)
    }

    /// Wire label used in metric dimensions and log fields.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationOutcome::Authorized => "authorized",
            ValidationOutcome::Unauthorized => "unauthorized",
            ValidationOutcome::Expired => "expired",
            ValidationOutcome::Revoked => "revoked",
            ValidationOutcome::Exhausted => "exhausted",
            ValidationOutcome::Error => "error",
        }
    }
}

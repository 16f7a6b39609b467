//! Tower `Layer`/`Service` pairs guarding the API-key and admin surfaces.
//!
//! Both follow the same shape: a cheap `Layer` that stamps out a `Service`
//! wrapper holding the inner service plus shared config, a passthrough
//! `poll_ready`, and a boxed future in `call`.

use std::collections::HashSet;

use subtle::ConstantTimeEq;

pub mod admin;
pub mod api_key;

pub use admin::{AdminIdentity, AdminLayer};
pub use api_key::{ApiKeyIdentity, ApiKeyLayer};

/// Checks whether `candidate` is a member of `keys` without letting branch
/// timing reveal which key (if any) matched. Every entry is compared in
/// full rather than short-circuiting on the first match.
pub(crate) fn contains_constant_time(keys: &HashSet<String>, candidate: &str) -> bool {
    let mut found = subtle::Choice::from(0u8);
    for key in keys {
        if key.len() == candidate.len() {
            found |= key.as_bytes().ct_eq(candidate.as_bytes());
        }
    }
    found.into()
}

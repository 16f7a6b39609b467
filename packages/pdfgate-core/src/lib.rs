//! `pdfgate-core` -- key record, validation outcomes, error taxonomy, key generation.
//!
//! This crate provides the foundation layer for the pdfgate authorization core:
//!
//! - **Record** ([`record`]): [`KeyRecord`], [`KeyKind`], and the derived [`KeyStatus`]
//! - **Outcome** ([`outcome`]): [`ValidationOutcome`], the closed set of validation
//!   results and their fixed HTTP mapping
//! - **Error** ([`error`]): [`RepoError`], the repository error taxonomy
//! - **Keygen** ([`keygen`]): secure key generation and identifier hashing
//! - **Clock** ([`clock`]): [`Clock`] trait and [`SystemClock`] for testable time

pub mod clock;
pub mod error;
pub mod keygen;
pub mod outcome;
pub mod record;

pub use clock::{Clock, SystemClock};
pub use error::RepoError;
pub use keygen::KeyIdentityGen;
pub use outcome::ValidationOutcome;
pub use record::{KeyKind, KeyRecord, KeyStatus};

//! Temporary-key persistence, caching, and orchestration.
//!
//! `repository` defines the transactional contract; `memory_store` and
//! `firestore_store` are the two conforming implementations; `cache` is the
//! negative-decision cache consulted before either; `key_service` wires all
//! of it together behind the operations `APIKeyMiddleware` and the admin
//! handlers call.

pub mod cache;
pub mod firestore_store;
pub mod key_service;
pub mod memory_store;
pub mod repository;

pub use cache::DecisionCache;
pub use firestore_store::FirestoreStoreAdapter;
pub use key_service::KeyService;
pub use memory_store::MemoryRepository;
pub use repository::Repository;

//! Storage abstractions for the service layer
//!
//! `kv_store` holds the trait request handlers use; `sled_store` the
//! engine-backed implementation owned by the service controller.

pub mod kv_store;
pub mod sled_store;

pub use kv_store::{KvStore, ManagedStore};
pub use sled_store::SledStore;

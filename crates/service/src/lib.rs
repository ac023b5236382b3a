//! Storage layer for the key-value HTTP front end.
//! - `KvStore` is the seam the request handlers program against.
//! - `SledStore` is the embedded, ordered, durable engine behind it.
//! - Opening creates the store on first use; closing consumes the handle.

pub mod errors;
pub mod storage;

pub use errors::StorageError;
pub use storage::{KvStore, ManagedStore, SledStore};

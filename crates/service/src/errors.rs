use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The store at `path` could not be opened (permissions, corruption, held by another process).
    #[error("unable to open storage at {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: sled::Error,
    },
    /// An operation against an already opened store failed.
    #[error("storage engine error: {0}")]
    Engine(String),
}

impl From<sled::Error> for StorageError {
    fn from(e: sled::Error) -> Self {
        Self::Engine(e.to_string())
    }
}

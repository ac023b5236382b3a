use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::errors::StorageError;
use crate::storage::kv_store::{KvStore, ManagedStore};

/// sled-backed store. One instance per successful open.
///
/// `close` consumes the store, so a closed handle cannot be used again.
pub struct SledStore {
    db: sled::Db,
    path: PathBuf,
}

impl SledStore {
    /// Open the store at `path`, creating it if missing.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, StorageError> {
        let path = path.into();
        let db = sled::Config::new()
            .path(&path)
            .open()
            .map_err(|source| StorageError::Open { path: path.clone(), source })?;
        info!(path = %path.display(), recovered = db.was_recovered(), "storage opened");
        Ok(Self { db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

}

impl ManagedStore for SledStore {
    /// Flush outstanding writes and release the engine handle.
    ///
    /// Callers must make sure no operation is still in flight.
    fn close(self) -> Result<(), StorageError> {
        let flushed = self.db.flush()?;
        info!(path = %self.path.display(), flushed_bytes = flushed, "storage closed");
        Ok(())
    }
}

impl KvStore for SledStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let value = self.db.get(key)?;
        Ok(value.map(|v| v.to_vec()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.db.insert(key, value)?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        let existed = self.db.remove(key)?.is_some();
        debug!(existed, "delete");
        Ok(())
    }

    fn contains(&self, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.db.contains_key(key)?)
    }
}

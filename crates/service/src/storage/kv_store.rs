use crate::errors::StorageError;

/// Trait abstraction over an opened key-value store.
///
/// Calls are synchronous and never retried here. Keys and values are opaque
/// byte strings; lookups are exact-match only.
pub trait KvStore: Send + Sync {
    /// `Ok(None)` means the key is absent, which is not an error.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;
    /// Removing an absent key succeeds.
    fn delete(&self, key: &[u8]) -> Result<(), StorageError>;

    fn contains(&self, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.get(key)?.is_some())
    }
}

/// A store the service controller owns for one running period.
///
/// `close` consumes the handle, so nothing can use it afterwards.
pub trait ManagedStore: KvStore + Sized + 'static {
    fn close(self) -> Result<(), StorageError>;
}

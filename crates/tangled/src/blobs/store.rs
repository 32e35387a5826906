//! Content-addressed blob storage

use crate::storage::{Storage, StorageError};
use std::sync::Arc;
use tangle_core::BlobRef;

/// Content-addressed blob storage interface
pub trait BlobStore: Send + Sync {
    fn has(&self, blob: &BlobRef) -> Result<bool, StorageError>;

    fn get(&self, blob: &BlobRef) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store `data` under its content address
    fn put(&self, data: &[u8]) -> Result<BlobRef, StorageError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Blob store backed by the node's sled database
pub struct SledBlobStore {
    storage: Arc<Storage>,
}

impl SledBlobStore {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl BlobStore for SledBlobStore {
    fn has(&self, blob: &BlobRef) -> Result<bool, StorageError> {
        self.storage.has_blob(blob)
    }

    fn get(&self, blob: &BlobRef) -> Result<Option<Vec<u8>>, StorageError> {
        self.storage.get_blob(blob)
    }

    fn put(&self, data: &[u8]) -> Result<BlobRef, StorageError> {
        let blob = BlobRef::of(data);
        if !self.storage.has_blob(&blob)? {
            self.storage.put_blob(&blob, data)?;
        }
        Ok(blob)
    }

    fn len(&self) -> usize {
        self.storage.blob_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_put_is_content_addressed() {
        let dir = tempdir().unwrap();
        let store = SledBlobStore::new(Arc::new(Storage::open(dir.path()).unwrap()));
        assert!(store.is_empty());

        let first = store.put(b"hello").unwrap();
        let second = store.put(b"hello").unwrap();
        assert_eq!(first, second);
        assert_eq!(first, BlobRef::of(b"hello"));
        assert_eq!(store.len(), 1);

        assert!(store.has(&first).unwrap());
        assert_eq!(store.get(&first).unwrap().as_deref(), Some(&b"hello"[..]));
        assert_eq!(store.get(&BlobRef::of(b"other")).unwrap(), None);
    }
}

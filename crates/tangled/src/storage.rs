//! Persistent storage using sled

use crate::config::NodeState;
use sled::Db;
use std::path::Path;
use tangle_core::{BlobRef, ContactMessage};
use thiserror::Error;

/// Metadata key holding the persisted node state
const NODE_STATE_KEY: &str = "node_state";

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] tangle_core::Error),
    #[error("Encoding error: {0}")]
    Encoding(#[from] postcard::Error),
    #[error("Corrupt record in {tree}: {reason}")]
    Corrupt { tree: &'static str, reason: String },
}

/// Storage backend for the node
pub struct Storage {
    db: Db,
    /// Contact tree: big-endian seq -> ContactMessage
    contacts: sled::Tree,
    /// Blob tree: sha256 -> content
    blobs: sled::Tree,
    /// Metadata tree: key -> value
    metadata: sled::Tree,
}

impl Storage {
    /// Open storage at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let contacts = db.open_tree("contacts")?;
        let blobs = db.open_tree("blobs")?;
        let metadata = db.open_tree("metadata")?;

        Ok(Self {
            db,
            contacts,
            blobs,
            metadata,
        })
    }

    /// Store a contact message under `seq`
    pub fn put_contact(&self, seq: u64, msg: &ContactMessage) -> Result<(), StorageError> {
        self.contacts.insert(seq.to_be_bytes(), msg.to_bytes()?)?;
        Ok(())
    }

    /// Highest stored contact sequence number
    pub fn last_contact_seq(&self) -> Result<Option<u64>, StorageError> {
        match self.contacts.last()? {
            Some((key, _)) => Ok(Some(decode_seq(&key)?)),
            None => Ok(None),
        }
    }

    /// Contact messages with sequence number >= `seq`, in order
    pub fn contacts_from(&self, seq: u64) -> Result<Vec<(u64, ContactMessage)>, StorageError> {
        let mut out = Vec::new();
        for result in self.contacts.range(seq.to_be_bytes()..) {
            let (key, value) = result?;
            out.push((decode_seq(&key)?, ContactMessage::from_bytes(&value)?));
        }
        Ok(out)
    }

    /// Count contact messages
    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    /// Store blob content
    pub fn put_blob(&self, blob: &BlobRef, data: &[u8]) -> Result<(), StorageError> {
        self.blobs.insert(blob.hash, data)?;
        Ok(())
    }

    /// Get blob content
    pub fn get_blob(&self, blob: &BlobRef) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.blobs.get(blob.hash)?.map(|v| v.to_vec()))
    }

    /// Check if a blob exists
    pub fn has_blob(&self, blob: &BlobRef) -> Result<bool, StorageError> {
        Ok(self.blobs.contains_key(blob.hash)?)
    }

    /// Count blobs
    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }

    /// Load the persisted node state
    pub fn node_state(&self) -> Result<Option<NodeState>, StorageError> {
        match self.metadata.get(NODE_STATE_KEY)? {
            Some(bytes) => Ok(Some(postcard::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Persist the node state
    pub fn put_node_state(&self, state: &NodeState) -> Result<(), StorageError> {
        self.metadata
            .insert(NODE_STATE_KEY, postcard::to_allocvec(state)?)?;
        Ok(())
    }

    /// Flush all pending writes
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

fn decode_seq(key: &[u8]) -> Result<u64, StorageError> {
    let bytes: [u8; 8] = key.try_into().map_err(|_| StorageError::Corrupt {
        tree: "contacts",
        reason: format!("sequence key has {} bytes", key.len()),
    })?;
    Ok(u64::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tangle_core::FeedRef;
    use tempfile::tempdir;

    #[test]
    fn test_storage_contacts() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        assert_eq!(storage.last_contact_seq().unwrap(), None);

        let a = FeedRef::ed25519([1; 32]);
        let b = FeedRef::ed25519([2; 32]);
        storage.put_contact(0, &ContactMessage::follow(a, b)).unwrap();
        storage.put_contact(1, &ContactMessage::block(b, a)).unwrap();
        storage.put_contact(256, &ContactMessage::neutral(a, b)).unwrap();

        assert_eq!(storage.last_contact_seq().unwrap(), Some(256));
        assert_eq!(storage.contact_count(), 3);

        let tail = storage.contacts_from(1).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0], (1, ContactMessage::block(b, a)));
        assert_eq!(tail[1].0, 256);
    }

    #[test]
    fn test_storage_blobs() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        let blob = BlobRef::of(b"payload");
        assert!(!storage.has_blob(&blob).unwrap());

        storage.put_blob(&blob, b"payload").unwrap();
        assert!(storage.has_blob(&blob).unwrap());
        assert_eq!(storage.get_blob(&blob).unwrap().unwrap(), b"payload");
        assert_eq!(storage.blob_count(), 1);
    }

    #[test]
    fn test_node_state() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        assert!(storage.node_state().unwrap().is_none());

        let state = NodeState {
            keypair_seed: [8; 32],
            created_at: 1_700_000_000,
        };
        storage.put_node_state(&state).unwrap();
        assert_eq!(storage.node_state().unwrap(), Some(state));
    }
}

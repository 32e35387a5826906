//! Append-only log of graph-relevant messages
//!
//! Log processing appends the contact, about and identity-link records it
//! extracts from feeds. The graph builder replays the log at startup and then
//! follows new appends through the head watch.

use crate::storage::{Storage, StorageError};
use parking_lot::Mutex;
use std::sync::Arc;
use tangle_core::ContactMessage;
use tokio::sync::watch;

/// Persisted contact history
pub struct ContactLog {
    storage: Arc<Storage>,
    /// Next sequence number to assign; appends are serialized on it
    next_seq: Mutex<u64>,
    /// Number of stored messages (next seq), published after each append
    head: watch::Sender<u64>,
}

impl ContactLog {
    /// Open the log over existing storage
    pub fn open(storage: Arc<Storage>) -> Result<Self, StorageError> {
        let next_seq = storage.last_contact_seq()?.map_or(0, |seq| seq + 1);
        let (head, _) = watch::channel(next_seq);
        Ok(Self {
            storage,
            next_seq: Mutex::new(next_seq),
            head,
        })
    }

    /// Append a message, returning its sequence number
    pub fn append(&self, msg: &ContactMessage) -> Result<u64, StorageError> {
        let mut next_seq = self.next_seq.lock();
        let seq = *next_seq;
        self.storage.put_contact(seq, msg)?;
        *next_seq = seq + 1;
        self.head.send_replace(seq + 1);
        Ok(seq)
    }

    /// Messages from `seq` onwards
    pub fn since(&self, seq: u64) -> Result<Vec<(u64, ContactMessage)>, StorageError> {
        self.storage.contacts_from(seq)
    }

    /// Number of messages appended so far
    pub fn len(&self) -> u64 {
        *self.next_seq.lock()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Watch the log head (one past the last sequence number)
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.head.subscribe()
    }
}

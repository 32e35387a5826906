//! Blob storage and the push feed of newly available blobs

mod broadcast;
mod store;

pub use broadcast::{BlobRefBroadcaster, BlobRefReceiver, SubscriptionError};
pub use store::{BlobStore, SledBlobStore};

use crate::storage::StorageError;
use std::sync::Arc;
use tangle_core::BlobRef;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Blob store plus the broadcaster announcing new blobs to replication sessions
pub struct BlobManager {
    store: Arc<dyn BlobStore>,
    pushes: BlobRefBroadcaster,
}

impl BlobManager {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            pushes: BlobRefBroadcaster::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    pub fn pushes(&self) -> &BlobRefBroadcaster {
        &self.pushes
    }

    /// Store `data` and announce it to every push subscriber
    pub async fn add(&self, data: &[u8]) -> Result<BlobRef, StorageError> {
        let blob = self.store.put(data)?;
        debug!("Stored blob {} ({} bytes)", blob, data.len());
        self.pushes.publish(blob).await;
        Ok(blob)
    }

    /// Announce a blob already present in the store.
    ///
    /// Returns false (and announces nothing) if the blob is unknown.
    pub async fn announce(&self, blob: BlobRef) -> Result<bool, StorageError> {
        if !self.store.has(&blob)? {
            return Ok(false);
        }
        self.pushes.publish(blob).await;
        Ok(true)
    }

    /// Push feed for the lifetime of `scope`
    pub async fn subscribe(&self, scope: CancellationToken) -> BlobRefReceiver {
        self.pushes.subscribe(scope).await
    }
}

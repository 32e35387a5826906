//! Fan-out of blob references to live replication sessions
//!
//! Every subscription is bound to a cancellation scope. `publish` holds the
//! subscription lock for the whole fan-out and, for each subscriber, waits
//! until the subscriber either takes the reference or its scope concludes.
//! A live subscriber that stops receiving therefore stalls `publish` and
//! every subscriber after it. Successive publishes reach each subscriber in
//! publish order.

use std::sync::Arc;
use tangle_core::BlobRef;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// A reference plus the hand-off acknowledgement for the publisher
type Delivery = (BlobRef, oneshot::Sender<()>);

/// Subscription lifecycle errors
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// The subscription was already removed. Correct callers never see this.
    #[error("subscription was already removed, this is a bug")]
    InvariantViolation,
}

struct Subscription {
    tx: mpsc::Sender<Delivery>,
    scope: CancellationToken,
}

/// Receiving end of a subscription.
///
/// `recv` returns `None` once the subscription's scope has concluded and the
/// broadcaster has removed it.
pub struct BlobRefReceiver {
    rx: mpsc::Receiver<Delivery>,
}

impl BlobRefReceiver {
    pub async fn recv(&mut self) -> Option<BlobRef> {
        loop {
            let (blob, ack) = self.rx.recv().await?;
            // a failed ack means the publisher gave up on us: not delivered
            if ack.send(()).is_ok() {
                return Some(blob);
            }
        }
    }
}

/// Multi-subscriber broadcaster of blob references
#[derive(Clone, Default)]
pub struct BlobRefBroadcaster {
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
}

impl BlobRefBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe for the lifetime of `scope`.
    ///
    /// When `scope` concludes the subscription is removed and the receiver
    /// is closed, once.
    pub async fn subscribe(&self, scope: CancellationToken) -> BlobRefReceiver {
        let (tx, rx) = mpsc::channel(1);
        self.subscriptions.lock().await.push(Subscription {
            tx: tx.clone(),
            scope: scope.clone(),
        });

        let this = self.clone();
        tokio::spawn(async move {
            scope.cancelled().await;
            if let Err(e) = this.remove(&tx).await {
                error!("Blob subscription teardown: {}", e);
                panic!("{e}");
            }
            // last sender: dropping it closes the receiver
            drop(tx);
        });

        BlobRefReceiver { rx }
    }

    /// Deliver `blob` to every current subscriber.
    ///
    /// Skips subscribers whose scope concludes first and ones whose receiver
    /// is gone.
    pub async fn publish(&self, blob: BlobRef) {
        let subscriptions = self.subscriptions.lock().await;
        for sub in subscriptions.iter() {
            tokio::select! {
                delivered = deliver(&sub.tx, blob) => {
                    if !delivered {
                        debug!("Receiver for {:?} gone, skipping", blob);
                    }
                }
                _ = sub.scope.cancelled() => {}
            }
        }
    }

    /// Number of registered subscriptions
    pub async fn subscriber_count(&self) -> usize {
        self.subscriptions.lock().await.len()
    }

    /// Remove the subscription owning `tx`
    pub(crate) async fn remove(
        &self,
        tx: &mpsc::Sender<Delivery>,
    ) -> Result<(), SubscriptionError> {
        let mut subscriptions = self.subscriptions.lock().await;
        let position = subscriptions
            .iter()
            .position(|sub| sub.tx.same_channel(tx))
            .ok_or(SubscriptionError::InvariantViolation)?;
        subscriptions.remove(position);
        Ok(())
    }
}

/// Hand `blob` to the receiver and wait until it has taken it
async fn deliver(tx: &mpsc::Sender<Delivery>, blob: BlobRef) -> bool {
    let (ack_tx, ack_rx) = oneshot::channel();
    if tx.send((blob, ack_tx)).await.is_err() {
        return false;
    }
    ack_rx.await.is_ok()
}

//! Notifications from the poll loop to its consumer.
//!
//! A session publishes at most one snapshot at a time. Each snapshot comes
//! wrapped in a [`SnapshotDelivery`]; the poll loop does not start its next
//! exchange with the device until the delivery is acknowledged, either
//! explicitly with [`SnapshotDelivery::acknowledge`] or implicitly by
//! dropping it.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::error::Error;
use crate::types::TelemetrySnapshot;

/// Event types delivered to the consumer.
#[derive(Debug)]
pub enum Event {
    /// A poll cycle completed.
    Snapshot(SnapshotDelivery),
    /// The session stopped on request; the device was reset.
    Stopped,
    /// The link failed; the session is faulted.
    Disconnected(Error),
}

/// A published snapshot awaiting acknowledgement.
#[derive(Debug)]
pub struct SnapshotDelivery {
    snapshot: Arc<TelemetrySnapshot>,
    ack: Option<oneshot::Sender<()>>,
}

impl SnapshotDelivery {
    pub(crate) fn new(snapshot: Arc<TelemetrySnapshot>) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                snapshot,
                ack: Some(tx),
            },
            rx,
        )
    }

    /// The delivered snapshot.
    #[must_use]
    pub const fn snapshot(&self) -> &Arc<TelemetrySnapshot> {
        &self.snapshot
    }

    /// Releases the poll loop to start the next cycle.
    pub fn acknowledge(mut self) {
        if let Some(ack) = self.ack.take() {
            // The poll loop may already be gone
            let _ = ack.send(());
        }
    }
}

/// The consumer's end of a session's event channel.
///
/// Dropping the subscription unsubscribes: further snapshots count as
/// acknowledged the moment they are published.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<Event>,
}

impl Subscription {
    pub(crate) const fn new(receiver: mpsc::Receiver<Event>) -> Self {
        Self { receiver }
    }

    /// Receives the next event.
    ///
    /// Returns `None` once the session has finished and every event has
    /// been received.
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Receives an event if one is ready.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{LINEAR_FRAME_LEN, PROXIMITY_FRAME_LEN};

    fn snapshot() -> Arc<TelemetrySnapshot> {
        Arc::new(
            TelemetrySnapshot::decode(1, &[0; LINEAR_FRAME_LEN], &[0; PROXIMITY_FRAME_LEN])
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_explicit_acknowledge() {
        let (delivery, ack) = SnapshotDelivery::new(snapshot());
        assert_eq!(delivery.snapshot().sequence, 1);
        delivery.acknowledge();
        assert!(ack.await.is_ok());
    }

    #[tokio::test]
    async fn test_drop_acknowledges() {
        let (delivery, ack) = SnapshotDelivery::new(snapshot());
        drop(delivery);
        // Sender dropped without a value, which the poll loop treats as an ack
        assert!(ack.await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_subscription_releases_buffered_delivery() {
        let (tx, rx) = mpsc::channel(4);
        let subscription = Subscription::new(rx);
        let (delivery, ack) = SnapshotDelivery::new(snapshot());
        tx.send(Event::Snapshot(delivery)).await.unwrap();

        drop(subscription);
        assert!(ack.await.is_err());
        assert!(tx.send(Event::Stopped).await.is_err());
    }
}

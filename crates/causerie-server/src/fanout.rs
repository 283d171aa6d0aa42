//! Broadcast fan-out: addressing live connections by id.
//!
//! Thin delivery layer between the hub's business logic and the transport.
//! Each attached connection gets a bounded mpsc channel; delivery is
//! fire-and-forget per connection, so one slow or dead consumer never blocks
//! or fails delivery to the rest.

use std::collections::HashMap;

use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use causerie_shared::protocol::ServerEvent;
use causerie_shared::types::ConnectionId;

/// Outbound queue depth per connection before events are dropped.
const OUTBOX_CAPACITY: usize = 256;

#[derive(Default)]
pub struct Fanout {
    links: Mutex<HashMap<ConnectionId, mpsc::Sender<ServerEvent>>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and hand back the receiving half its transport
    /// task drains.
    pub async fn attach(&self, conn: ConnectionId) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
        self.links.lock().await.insert(conn, tx);
        rx
    }

    pub async fn detach(&self, conn: ConnectionId) {
        self.links.lock().await.remove(&conn);
    }

    /// Unicast one event (join-group history replay, error reports).
    pub async fn to_connection(&self, conn: ConnectionId, event: ServerEvent) {
        let links = self.links.lock().await;
        if let Some(tx) = links.get(&conn) {
            if tx.try_send(event).is_err() {
                debug!(conn = %conn, "Dropping event for slow connection");
            }
        }
    }

    /// Deliver one event to every listed connection.
    pub async fn deliver<I>(&self, targets: I, event: ServerEvent)
    where
        I: IntoIterator<Item = ConnectionId>,
    {
        let links = self.links.lock().await;
        for conn in targets {
            let Some(tx) = links.get(&conn) else {
                continue;
            };
            if tx.try_send(event.clone()).is_err() {
                debug!(conn = %conn, "Dropping event for slow connection");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causerie_shared::types::UserId;
    use std::collections::BTreeSet;

    fn presence_event() -> ServerEvent {
        ServerEvent::OnlineUsers(BTreeSet::from([UserId::new("alice")]))
    }

    #[tokio::test]
    async fn test_unicast_reaches_only_target() {
        let fanout = Fanout::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let mut rx_a = fanout.attach(a).await;
        let mut rx_b = fanout.attach(b).await;

        fanout.to_connection(a, presence_event()).await;

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_deliver_skips_detached() {
        let fanout = Fanout::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let mut rx_a = fanout.attach(a).await;
        let _rx_b = fanout.attach(b).await;
        fanout.detach(b).await;

        fanout.deliver([a, b], presence_event()).await;
        assert!(rx_a.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_slow_consumer_does_not_block_others() {
        let fanout = Fanout::new();
        let slow = ConnectionId::new();
        let healthy = ConnectionId::new();
        let _rx_slow = fanout.attach(slow).await;
        let mut rx_healthy = fanout.attach(healthy).await;

        // Saturate the slow connection's outbox; nothing is drained.
        for _ in 0..(OUTBOX_CAPACITY + 10) {
            fanout.deliver([slow, healthy], presence_event()).await;
        }

        let mut healthy_count = 0;
        while rx_healthy.try_recv().is_ok() {
            healthy_count += 1;
        }
        assert_eq!(healthy_count, OUTBOX_CAPACITY);
    }
}

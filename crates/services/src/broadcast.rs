//! Per-thread topics for the real-time channel.
//!
//! Delivery is at-most-once: each connection has a bounded queue and an
//! event that does not fit is dropped for that connection only. There is no
//! backlog for late joiners.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use domains::{ServerEvent, ThreadId};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Events queued per connection before new ones are dropped.
pub const CONNECTION_QUEUE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

pub struct BroadcastHub {
    next_id: AtomicU64,
    connections: DashMap<ConnectionId, mpsc::Sender<ServerEvent>>,
    topics: DashMap<ThreadId, HashSet<ConnectionId>>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            connections: DashMap::new(),
            topics: DashMap::new(),
        }
    }

    /// Registers a connection. The receiver yields everything addressed to it.
    pub fn connect(&self) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(CONNECTION_QUEUE);
        self.connections.insert(id, tx);
        debug!(connection = %id, "connection registered");
        (id, rx)
    }

    /// Removes the connection from every topic.
    pub fn disconnect(&self, connection: ConnectionId) {
        self.connections.remove(&connection);
        self.topics.retain(|_, members| {
            members.remove(&connection);
            !members.is_empty()
        });
        debug!(%connection, "connection removed");
    }

    pub fn subscribe(&self, connection: ConnectionId, thread_id: ThreadId) -> bool {
        if !self.connections.contains_key(&connection) {
            return false;
        }
        self.topics.entry(thread_id).or_default().insert(connection)
    }

    pub fn unsubscribe(&self, connection: ConnectionId, thread_id: ThreadId) {
        self.topics.remove_if_mut(&thread_id, |_, members| {
            members.remove(&connection);
            members.is_empty()
        });
    }

    /// Sends `event` to every current subscriber of `thread_id`. Returns how
    /// many connections accepted it.
    pub fn publish(&self, thread_id: ThreadId, event: ServerEvent) -> usize {
        // Snapshot first so no map guard is held while sending.
        let members: Vec<ConnectionId> = match self.topics.get(&thread_id) {
            Some(members) => members.iter().copied().collect(),
            None => return 0,
        };
        let delivered = members
            .into_iter()
            .filter(|id| self.send_to(*id, event.clone()))
            .count();
        debug!(%thread_id, delivered, "event published");
        delivered
    }

    /// `postError` for one connection only.
    pub fn report_error(&self, connection: ConnectionId, message: impl Into<String>) -> bool {
        self.send_to(
            connection,
            ServerEvent::PostError {
                message: message.into(),
            },
        )
    }

    pub fn send_to(&self, connection: ConnectionId, event: ServerEvent) -> bool {
        let Some(tx) = self.connections.get(&connection).map(|tx| tx.clone()) else {
            return false;
        };
        match tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(%connection, "connection queue full, event dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn subscriber_count(&self, thread_id: ThreadId) -> usize {
        self.topics.get(&thread_id).map_or(0, |m| m.len())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::PostId;

    fn deleted(thread_id: ThreadId) -> ServerEvent {
        ServerEvent::PostDeleted {
            thread_id,
            post_id: PostId::new(),
        }
    }

    #[tokio::test]
    async fn publish_reaches_only_subscribers_of_the_thread() {
        let hub = BroadcastHub::new();
        let (a, mut rx_a) = hub.connect();
        let (b, mut rx_b) = hub.connect();
        let (t1, t2) = (ThreadId::new(), ThreadId::new());
        assert!(hub.subscribe(a, t1));
        assert!(hub.subscribe(b, t2));

        assert_eq!(hub.publish(t1, deleted(t1)), 1);
        assert!(matches!(rx_a.try_recv(), Ok(ServerEvent::PostDeleted { .. })));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn errors_go_to_the_originating_connection_only() {
        let hub = BroadcastHub::new();
        let (a, mut rx_a) = hub.connect();
        let (b, mut rx_b) = hub.connect();
        let thread = ThreadId::new();
        hub.subscribe(a, thread);
        hub.subscribe(b, thread);

        assert!(hub.report_error(a, "rate limited"));
        assert_eq!(
            rx_a.try_recv().unwrap(),
            ServerEvent::PostError {
                message: "rate limited".into()
            }
        );
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_clears_every_subscription() {
        let hub = BroadcastHub::new();
        let (a, _rx) = hub.connect();
        let (t1, t2) = (ThreadId::new(), ThreadId::new());
        hub.subscribe(a, t1);
        hub.subscribe(a, t2);
        hub.disconnect(a);
        assert_eq!(hub.subscriber_count(t1), 0);
        assert_eq!(hub.subscriber_count(t2), 0);
        assert_eq!(hub.connection_count(), 0);
        assert!(!hub.subscribe(a, t1));
        assert_eq!(hub.publish(t1, deleted(t1)), 0);
    }

    #[tokio::test]
    async fn late_joiners_get_no_backlog() {
        let hub = BroadcastHub::new();
        let (a, _rx_a) = hub.connect();
        let thread = ThreadId::new();
        hub.subscribe(a, thread);
        hub.publish(thread, deleted(thread));

        let (b, mut rx_b) = hub.connect();
        hub.subscribe(b, thread);
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn leaving_stops_delivery() {
        let hub = BroadcastHub::new();
        let (a, mut rx) = hub.connect();
        let thread = ThreadId::new();
        hub.subscribe(a, thread);
        hub.unsubscribe(a, thread);
        assert_eq!(hub.publish(thread, deleted(thread)), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking_others() {
        let hub = BroadcastHub::new();
        let (slow, _rx_slow) = hub.connect();
        let (fast, mut rx_fast) = hub.connect();
        let thread = ThreadId::new();
        hub.subscribe(slow, thread);
        hub.subscribe(fast, thread);
        for _ in 0..CONNECTION_QUEUE {
            hub.publish(thread, deleted(thread));
            rx_fast.try_recv().unwrap();
        }
        assert_eq!(hub.publish(thread, deleted(thread)), 1);
    }
}

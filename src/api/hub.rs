//! Connection registry for realtime notification rooms.
//!
//! One room per account id; an account may hold several live connections
//! (multiple tabs). Pushes are best-effort: a dead connection is pruned on the
//! next send and never fails the caller.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

pub struct NotificationHub {
    rooms: DashMap<Uuid, Vec<(u64, UnboundedSender<String>)>>,
    next_conn_id: AtomicU64,
}

impl NotificationHub {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Register a connection in the account's room; returns its id for
    /// cleanup on disconnect.
    pub fn join(&self, account_id: Uuid, tx: UnboundedSender<String>) -> u64 {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        self.rooms.entry(account_id).or_default().push((conn_id, tx));
        conn_id
    }

    /// Drop one connection; empty rooms are removed entirely.
    pub fn leave(&self, account_id: Uuid, conn_id: u64) {
        if let Some(mut room) = self.rooms.get_mut(&account_id) {
            room.retain(|(id, _)| *id != conn_id);
            let empty = room.is_empty();
            drop(room);
            if empty {
                self.rooms.remove_if(&account_id, |_, room| room.is_empty());
            }
        }
    }

    /// Send a frame to every live connection of the account, pruning senders
    /// whose receiving task has gone away.
    pub fn push(&self, account_id: Uuid, frame: &str) {
        if let Some(mut room) = self.rooms.get_mut(&account_id) {
            room.retain(|(_, tx)| tx.send(frame.to_string()).is_ok());
        }
    }

    #[must_use]
    pub fn connections(&self, account_id: Uuid) -> usize {
        self.rooms.get(&account_id).map_or(0, |room| room.len())
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn join_push_leave_round_trip() {
        let hub = NotificationHub::new();
        let account = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let conn = hub.join(account, tx);
        assert_eq!(hub.connections(account), 1);

        hub.push(account, "{\"type\":\"notification\"}");
        assert_eq!(rx.recv().await.as_deref(), Some("{\"type\":\"notification\"}"));

        hub.leave(account, conn);
        assert_eq!(hub.connections(account), 0);
    }

    #[tokio::test]
    async fn dead_connections_are_pruned_on_push() {
        let hub = NotificationHub::new();
        let account = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        hub.join(account, tx);
        drop(rx);

        hub.push(account, "frame");
        assert_eq!(hub.connections(account), 0);
    }

    #[tokio::test]
    async fn push_reaches_every_tab_of_the_account() {
        let hub = NotificationHub::new();
        let account = Uuid::new_v4();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        hub.join(account, tx1);
        hub.join(account, tx2);

        hub.push(account, "frame");
        assert_eq!(rx1.recv().await.as_deref(), Some("frame"));
        assert_eq!(rx2.recv().await.as_deref(), Some("frame"));

        // Other accounts see nothing.
        let other = Uuid::new_v4();
        assert_eq!(hub.connections(other), 0);
    }
}

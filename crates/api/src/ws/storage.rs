use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use futures::stream::SplitSink;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

pub type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Tracks all connected listeners by connection ID.
///
/// Joins and leaves happen concurrently with broadcasts; `senders()` takes a
/// snapshot of the map so a broadcast never iterates a collection that is
/// being mutated underneath it.
pub struct SubscriberStorage {
    connections: DashMap<Uuid, WsSender>,
}

impl SubscriberStorage {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    pub fn add(&self, connection_id: Uuid, sender: WsSender) {
        self.connections.insert(connection_id, sender);
    }

    pub fn remove(&self, connection_id: &Uuid) {
        self.connections.remove(connection_id);
    }

    /// Snapshot of all current listeners.
    pub fn senders(&self) -> Vec<(Uuid, WsSender)> {
        self.connections
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for SubscriberStorage {
    fn default() -> Self {
        Self::new()
    }
}

// Live connection set
//
// Each connection is represented by the sending half of its outbound queue.
// The lock is only held to add, remove or snapshot entries; sends happen
// outside it, so a slow or closing connection never blocks the others.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::downloader::traits::MessageSink;
use crate::server::protocol::ServerMessage;

/// Identifier assigned to each accepted connection.
pub type ConnectionId = u64;

#[derive(Default)]
struct Inner {
    next_id: AtomicU64,
    connections: Mutex<HashMap<ConnectionId, UnboundedSender<ServerMessage>>>,
}

/// Shared registry handle; clones refer to the same set.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<Inner>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, UnboundedSender<ServerMessage>>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.inner
            .connections
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Register a connection and hand back the receiver its writer drains.
    pub fn add(&self) -> (ConnectionId, UnboundedReceiver<ServerMessage>) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(id, tx);
        debug!(connection = id, "Connection registered");
        (id, rx)
    }

    /// Forget a connection. Its writer stops once the queue drains.
    pub fn remove(&self, id: ConnectionId) {
        if self.lock().remove(&id).is_some() {
            debug!(connection = id, "Connection removed");
        }
    }

    /// Number of live connections
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Send to one connection; falls back to a broadcast when it is gone.
    pub fn send_to(&self, id: ConnectionId, message: ServerMessage) {
        let target = self.lock().get(&id).cloned();

        match target {
            Some(tx) => {
                if let Err(err) = tx.send(message) {
                    debug!(connection = id, "Connection closed before delivery");
                    self.remove(id);
                    self.broadcast(err.0);
                }
            }
            None => {
                debug!(connection = id, kind = message.kind(), "Origin gone, broadcasting");
                self.broadcast(message);
            }
        }
    }

    /// Send to every live connection, skipping ones that closed meanwhile.
    /// Returns how many connections accepted the message.
    pub fn broadcast(&self, message: ServerMessage) -> usize {
        let snapshot: Vec<(ConnectionId, UnboundedSender<ServerMessage>)> = self
            .lock()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        for (id, tx) in snapshot {
            if tx.send(message.clone()).is_ok() {
                delivered += 1;
            } else {
                warn!(
                    connection = id,
                    kind = message.kind(),
                    "Skipping closed connection during broadcast"
                );
            }
        }
        delivered
    }

    /// Sink that routes a session's messages back to its own connection.
    pub fn sink_for(&self, id: ConnectionId) -> ConnectionSink {
        ConnectionSink {
            id,
            registry: self.clone(),
        }
    }
}

/// `MessageSink` bound to one connection.
pub struct ConnectionSink {
    id: ConnectionId,
    registry: ConnectionRegistry,
}

impl MessageSink for ConnectionSink {
    fn send(&self, message: ServerMessage) {
        self.registry.send_to(self.id, message);
    }
}

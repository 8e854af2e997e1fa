//! The per-channel set of live connections and its broadcast primitive.

use crate::error::TransportError;
use crate::ws::types::{Connection, ConnectionId, within};
use axum::extract::ws::Utf8Bytes;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Outcome of one broadcast. Purely informational: callers of the
/// notification path never see delivery failures as errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections present in the snapshot, i.e. write attempts made.
    pub attempted: usize,
    pub delivered: usize,
    /// Connections whose write failed or timed out.
    pub failed: Vec<ConnectionId>,
}

/// Set of active connections for one channel, keyed by connection identity.
///
/// The lock only guards membership. `broadcast` copies the membership under a
/// read lock and releases it before writing, so a stalled client can delay
/// neither other recipients nor registrations.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    write_timeout: Option<Duration>,
}

impl ConnectionRegistry {
    pub fn new(write_timeout: Option<Duration>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            write_timeout,
        }
    }

    /// Adds a connection. Registering the same connection twice keeps one entry.
    pub async fn register(&self, connection: Arc<Connection>) -> ConnectionId {
        let id = connection.id();
        let mut connections = self.connections.write().await;
        connections.insert(id, connection);
        debug!(conn_id = %id, total = connections.len(), "Connection registered.");
        id
    }

    /// Removes a connection and closes it. Returns `false` if it was not present.
    /// The close waits for the send lock no longer than the write timeout.
    pub async fn unregister(&self, id: &ConnectionId) -> bool {
        let removed = {
            let mut connections = self.connections.write().await;
            connections.remove(id)
        };

        match removed {
            Some(connection) => {
                if let Err(e) = within(self.write_timeout, connection.close()).await {
                    debug!(conn_id = %id, "Error closing unregistered connection: {}", e);
                }
                debug!(conn_id = %id, "Connection unregistered.");
                true
            }
            None => false,
        }
    }

    pub async fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    pub async fn ids(&self) -> Vec<ConnectionId> {
        self.connections.read().await.keys().copied().collect()
    }

    /// Writes `payload` to every connection in the current membership.
    ///
    /// Best effort: a failed write is logged and delivery to the remaining
    /// connections continues. Writes run concurrently and the call returns once
    /// each of them finished or hit the write timeout.
    pub async fn broadcast(&self, payload: Utf8Bytes) -> BroadcastReport {
        let snapshot: Vec<Arc<Connection>> = {
            let connections = self.connections.read().await;
            connections.values().cloned().collect()
        };

        if snapshot.is_empty() {
            debug!("Broadcast skipped, no connections registered.");
            return BroadcastReport::default();
        }

        let outcomes = join_all(
            snapshot
                .iter()
                .map(|connection| self.deliver(connection, payload.clone())),
        )
        .await;

        let mut report = BroadcastReport {
            attempted: snapshot.len(),
            ..Default::default()
        };
        for (connection, outcome) in snapshot.iter().zip(outcomes) {
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        conn_id = %connection.id(),
                        "Failed to deliver broadcast, client likely disconnected: {}",
                        e
                    );
                    report.failed.push(connection.id());
                }
            }
        }

        debug!(
            attempted = report.attempted,
            delivered = report.delivered,
            "Broadcast finished."
        );
        report
    }

    async fn deliver(
        &self,
        connection: &Connection,
        payload: Utf8Bytes,
    ) -> Result<(), TransportError> {
        within(self.write_timeout, connection.write(payload)).await
    }
}

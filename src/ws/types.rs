// inventory-notify/src/ws/types.rs

//! Connection-level types shared by the registry, sessions and services.

use crate::error::TransportError;
use async_trait::async_trait;
use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use futures_util::{SinkExt, stream::SplitSink};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

/// Identity of one physical connection. Used as the registry key.
pub type ConnectionId = Uuid;

/// Logical session identifier, either client supplied or generated per channel.
pub type SessionId = String;

/// One of the three independent notification channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Low-stock alerts.
    Stock,
    /// Creation of customer orders, sales and supplier orders.
    OrderCreation,
    /// Cancellation of any order kind.
    Cancellation,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Stock, Channel::OrderCreation, Channel::Cancellation];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Stock => "stock",
            Channel::OrderCreation => "orders",
            Channel::Cancellation => "cancellations",
        }
    }

    /// The upgrade endpoint clients connect to for this channel.
    pub fn path(&self) -> &'static str {
        match self {
            Channel::Stock => "/ws/stock",
            Channel::OrderCreation => "/ws/orders",
            Channel::Cancellation => "/ws/cancellations",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outbound capability of a client connection: write a text frame, or close.
///
/// Implementations are never called concurrently; [`Connection`] holds them
/// behind its send lock.
#[async_trait]
pub trait Transport: Send + 'static {
    async fn write(&mut self, payload: Utf8Bytes) -> Result<(), TransportError>;
    async fn close(&mut self) -> Result<(), TransportError>;
}

#[async_trait]
impl Transport for SplitSink<WebSocket, Message> {
    async fn write(&mut self, payload: Utf8Bytes) -> Result<(), TransportError> {
        self.send(Message::Text(payload)).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        SinkExt::close(self).await?;
        Ok(())
    }
}

/// A registered client connection.
///
/// The transport sits behind an async `Mutex` which acts as the per-session
/// send lock: broadcasts and direct sends to the same client serialize here
/// and never interleave frames.
pub struct Connection {
    id: ConnectionId,
    transport: Mutex<Box<dyn Transport>>,
    closed: AtomicBool,
    shutdown: Notify,
}

impl Connection {
    pub fn new<T: Transport>(transport: T) -> Self {
        Self {
            id: ConnectionId::new_v4(),
            transport: Mutex::new(Box::new(transport)),
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Writes one text frame while holding the send lock.
    pub async fn write(&self, payload: Utf8Bytes) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let mut transport = self.transport.lock().await;
        transport.write(payload).await
    }

    /// Closes the underlying transport. Only the first call reaches the transport.
    ///
    /// The connection counts as closed, and [`closed`](Self::closed) resolves,
    /// before the send lock is taken.
    pub async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.shutdown.notify_one();
        let mut transport = self.transport.lock().await;
        transport.close().await
    }

    /// Resolves once [`close`](Self::close) has been called. Meant for a single
    /// waiter, the session's receive loop.
    pub async fn closed(&self) {
        if self.is_closed() {
            return;
        }
        self.shutdown.notified().await;
    }
}

/// Runs a write or close under an optional time limit.
pub(crate) async fn within<F>(limit: Option<Duration>, op: F) -> Result<(), TransportError>
where
    F: Future<Output = Result<(), TransportError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, op)
            .await
            .unwrap_or(Err(TransportError::TimedOut(limit))),
        None => op.await,
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::testing::{RecordingTransport, StalledTransport};

    #[tokio::test]
    async fn close_reaches_transport_once_and_blocks_writes() {
        let transport = RecordingTransport::default();
        let conn = Connection::new(transport.clone());

        conn.write("before".into()).await.unwrap();
        conn.close().await.unwrap();
        conn.close().await.unwrap();

        assert!(conn.is_closed());
        assert_eq!(transport.close_calls(), 1);
        assert!(matches!(
            conn.write("after".into()).await,
            Err(TransportError::Closed)
        ));
        assert_eq!(transport.frames(), vec!["before".to_string()]);
    }

    #[tokio::test]
    async fn close_behind_a_stalled_write_still_signals_shutdown() {
        let conn = std::sync::Arc::new(Connection::new(StalledTransport));
        let writer = tokio::spawn({
            let conn = std::sync::Arc::clone(&conn);
            async move { conn.write("stuck".into()).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let limit = Duration::from_millis(100);
        let closing = within(Some(limit), conn.close()).await;

        assert!(matches!(closing, Err(TransportError::TimedOut(_))));
        assert!(conn.is_closed());
        tokio::time::timeout(Duration::from_secs(1), conn.closed())
            .await
            .expect("closed() must resolve once close was called");
        writer.abort();
    }

    #[test]
    fn channel_paths_are_distinct() {
        let paths: std::collections::HashSet<_> = Channel::ALL.iter().map(|c| c.path()).collect();
        assert_eq!(paths.len(), 3);
        assert_eq!(Channel::OrderCreation.to_string(), "orders");
    }
}

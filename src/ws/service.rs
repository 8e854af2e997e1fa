//! The per-channel `BroadcastService` that accepts clients and fans out payloads.

use crate::config::ChannelConfig;
use crate::ws::{
    directory::SessionDirectory,
    registry::{BroadcastReport, ConnectionRegistry},
    session::Session,
    types::{Channel, Connection, ConnectionId, SessionId, Transport},
};
use axum::extract::ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::stream::{Stream, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, instrument, warn};

/// Owns the connection registry and session directory of one channel.
///
/// Construct one per channel at startup and hand the `Arc` to whoever needs to
/// accept clients or broadcast. Channels never share state: a broadcast on one
/// service reaches only that service's clients.
#[derive(Debug)]
pub struct BroadcastService {
    channel: Channel,
    registry: ConnectionRegistry,
    directory: SessionDirectory,
    next_session_id: AtomicU64,
    config: ChannelConfig,
}

impl BroadcastService {
    pub fn new(channel: Channel, config: ChannelConfig) -> Arc<Self> {
        info!(%channel, "Broadcast service ready.");
        Arc::new(Self {
            channel,
            registry: ConnectionRegistry::new(config.write_timeout),
            directory: SessionDirectory::new(),
            next_session_id: AtomicU64::new(1),
            config,
        })
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn directory(&self) -> &SessionDirectory {
        &self.directory
    }

    /// Snapshot of the session directory.
    pub fn sessions(&self) -> HashMap<SessionId, Arc<Session>> {
        self.directory.list()
    }

    pub fn session_count(&self) -> usize {
        self.directory.len()
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.len().await
    }

    /// Uses the client supplied identifier when present and non-empty,
    /// otherwise the next value of this channel's counter.
    pub fn resolve_session_id(&self, requested: Option<String>) -> SessionId {
        match requested {
            Some(id) if !id.is_empty() => id,
            _ => {
                let id = self
                    .next_session_id
                    .fetch_add(1, Ordering::Relaxed)
                    .to_string();
                debug!(channel = %self.channel, session_id = %id, "Generated session id.");
                id
            }
        }
    }

    /// Completes the upgrade handshake and hands the socket to this service.
    ///
    /// The session identifier is fixed when the request arrives; the session
    /// itself is registered once the handshake succeeds. Handshake failures are
    /// logged and no session is created.
    pub fn handle_upgrade(
        self: &Arc<Self>,
        ws: WebSocketUpgrade,
        requested_id: Option<String>,
    ) -> (SessionId, Response) {
        let session_id = self.resolve_session_id(requested_id);
        let channel = self.channel;
        let service = Arc::clone(self);
        let id = session_id.clone();

        let response = ws
            .on_failed_upgrade(move |e: axum::Error| {
                error!(%channel, "WebSocket handshake failed: {}", e);
            })
            .on_upgrade(move |socket| async move {
                let (sink, stream) = socket.split();
                service.accept_transport(sink, stream, id).await;
            });

        (session_id, response)
    }

    /// Registers an already upgraded socket and starts its receive loop.
    pub async fn accept(self: &Arc<Self>, socket: WebSocket, requested_id: Option<String>) -> SessionId {
        let session_id = self.resolve_session_id(requested_id);
        let (sink, stream) = socket.split();
        self.accept_transport(sink, stream, session_id).await
    }

    /// Registers a connection in both the registry and the directory, then
    /// spawns its receive loop. Returns without waiting for the loop.
    #[instrument(skip_all, fields(channel = %self.channel, session_id = %session_id))]
    pub async fn accept_transport<T, S>(
        self: &Arc<Self>,
        transport: T,
        inbound: S,
        session_id: SessionId,
    ) -> SessionId
    where
        T: Transport,
        S: Stream<Item = Result<Message, axum::Error>> + Unpin + Send + 'static,
    {
        let connection = Arc::new(Connection::new(transport));
        let conn_id = self.registry.register(Arc::clone(&connection)).await;

        let session = Arc::new(Session::new(
            session_id.clone(),
            self.channel,
            connection,
            self.directory.clone(),
            self.config.echo_client_messages,
            self.config.write_timeout,
        ));
        if let Some(previous) = self.directory.add(session_id.clone(), Arc::clone(&session)) {
            warn!(
                replaced_conn_id = %previous.connection_id(),
                "Session id reused; directory entry replaced, previous connection stays registered."
            );
        }
        info!(
            %conn_id,
            total_sessions = self.directory.len(),
            "Client connected and registered."
        );

        let service = Arc::clone(self);
        tokio::spawn(async move {
            session
                .run_receive_loop(inbound, move |id| async move {
                    service.release(conn_id, &id).await;
                })
                .await;
        });

        session_id
    }

    /// Cleanup for a finished receive loop.
    async fn release(&self, conn_id: ConnectionId, session_id: &str) {
        self.registry.unregister(&conn_id).await;
        info!(
            channel = %self.channel,
            session_id,
            remaining_sessions = self.directory.len(),
            "Client disconnected and released."
        );
    }

    /// Sends `payload` to every client of this channel. See
    /// [`ConnectionRegistry::broadcast`] for delivery semantics.
    ///
    /// With eviction enabled, a client whose write failed leaves the registry
    /// and the directory before this returns, and its receive loop stops.
    pub async fn broadcast(&self, payload: impl Into<Utf8Bytes>) -> BroadcastReport {
        let report = self.registry.broadcast(payload.into()).await;
        if self.config.evict_on_write_failure {
            for conn_id in &report.failed {
                if self.registry.unregister(conn_id).await {
                    let session_id = self.directory.remove_connection(conn_id);
                    info!(
                        channel = %self.channel,
                        %conn_id,
                        session_id = session_id.as_deref().unwrap_or("-"),
                        "Evicted connection after failed write."
                    );
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::session::SessionState;
    use crate::ws::testing::{RecordingTransport, StalledTransport, TRACING, eventually, inbound};
    use crate::ws::types::Channel;
    use std::time::Duration;
    use once_cell::sync::Lazy;

    fn service(config: ChannelConfig) -> Arc<BroadcastService> {
        Lazy::force(&TRACING);
        BroadcastService::new(Channel::Stock, config)
    }

    #[tokio::test]
    async fn generated_ids_increase_and_requested_ids_are_kept() {
        let svc = service(ChannelConfig::default());
        assert_eq!(svc.resolve_session_id(None), "1");
        assert_eq!(svc.resolve_session_id(Some(String::new())), "2");
        assert_eq!(svc.resolve_session_id(Some("dashboard".into())), "dashboard");
        assert_eq!(svc.resolve_session_id(None), "3");
    }

    #[tokio::test]
    async fn accept_registers_and_disconnect_releases() {
        let svc = service(ChannelConfig::default());
        let transport = RecordingTransport::default();
        let (tx, rx) = inbound();

        let id = svc.accept_transport(transport.clone(), rx, "client-a".into()).await;

        assert_eq!(id, "client-a");
        assert_eq!(svc.connection_count().await, 1);
        assert!(svc.sessions().contains_key("client-a"));

        let report = svc.broadcast("hello").await;
        assert_eq!(report.delivered, 1);
        assert_eq!(transport.frames(), vec!["hello".to_string()]);

        drop(tx);
        eventually("client released", || {
            let svc = Arc::clone(&svc);
            async move { svc.connection_count().await == 0 && svc.session_count() == 0 }
        })
        .await;
        assert_eq!(transport.close_calls(), 1);
    }

    #[tokio::test]
    async fn reused_session_id_diverges_directory_and_registry() {
        let svc = service(ChannelConfig::default());
        let (first_tx, first_rx) = inbound();
        let (second_tx, second_rx) = inbound();
        let first = RecordingTransport::default();
        let second = RecordingTransport::default();

        svc.accept_transport(first.clone(), first_rx, "shared".into()).await;
        svc.accept_transport(second.clone(), second_rx, "shared".into()).await;

        assert_eq!(svc.session_count(), 1);
        assert_eq!(svc.connection_count().await, 2);

        // both connections still receive broadcasts
        let report = svc.broadcast("x").await;
        assert_eq!(report.delivered, 2);

        // the stale session leaves without evicting the newer directory entry
        drop(first_tx);
        eventually("first connection released", || {
            let svc = Arc::clone(&svc);
            async move { svc.connection_count().await == 1 }
        })
        .await;
        assert_eq!(svc.session_count(), 1);
        assert_eq!(first.close_calls(), 1);

        drop(second_tx);
        eventually("second connection released", || {
            let svc = Arc::clone(&svc);
            async move { svc.connection_count().await == 0 && svc.session_count() == 0 }
        })
        .await;
    }

    #[tokio::test]
    async fn failed_write_keeps_connection_by_default() {
        let svc = service(ChannelConfig::default());
        let (_tx, rx) = inbound();
        svc.accept_transport(RecordingTransport::failing(), rx, "dead".into())
            .await;

        let report = svc.broadcast("x").await;

        assert_eq!(report.failed.len(), 1);
        assert_eq!(svc.connection_count().await, 1);
    }

    #[tokio::test]
    async fn eviction_on_write_failure_when_enabled() {
        let svc = service(ChannelConfig {
            evict_on_write_failure: true,
            ..ChannelConfig::default()
        });
        let (_dead_tx, dead_rx) = inbound();
        let (_live_tx, live_rx) = inbound();
        let dead = RecordingTransport::failing();
        svc.accept_transport(dead.clone(), dead_rx, "dead".into()).await;
        svc.accept_transport(RecordingTransport::default(), live_rx, "live".into())
            .await;

        let report = svc.broadcast("x").await;

        assert_eq!(report.delivered, 1);
        assert_eq!(svc.connection_count().await, 1);
        assert_eq!(svc.session_count(), 1);
        assert!(svc.directory().get("dead").is_none());
        assert_eq!(dead.close_calls(), 1);
    }

    #[tokio::test]
    async fn eviction_stops_the_receive_loop() {
        let svc = service(ChannelConfig {
            evict_on_write_failure: true,
            ..ChannelConfig::default()
        });
        let (_tx, rx) = inbound();
        svc.accept_transport(RecordingTransport::failing(), rx, "dead".into())
            .await;
        let session = svc.directory().get("dead").unwrap();

        svc.broadcast("x").await;

        assert_eq!(svc.connection_count().await, 0);
        assert_eq!(svc.session_count(), 0);
        eventually("evicted session closed", || {
            let session = Arc::clone(&session);
            async move { session.state() == SessionState::Closed }
        })
        .await;
    }

    #[tokio::test]
    async fn slow_reader_cannot_hang_an_evicting_broadcast() {
        let svc = service(ChannelConfig {
            write_timeout: Some(Duration::from_millis(200)),
            echo_client_messages: true,
            evict_on_write_failure: true,
        });
        let (tx, rx) = inbound();
        svc.accept_transport(StalledTransport, rx, "stalled".into())
            .await;

        // the echo reply parks on the stalled transport holding the send lock
        tx.unbounded_send(Ok(Message::Text("hi".into()))).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let report = tokio::time::timeout(Duration::from_secs(3), svc.broadcast("x"))
            .await
            .expect("broadcast hung behind a stalled client");

        assert_eq!(report.failed.len(), 1);
        assert_eq!(svc.connection_count().await, 0);
        assert_eq!(svc.session_count(), 0);
    }
}

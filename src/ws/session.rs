//! One accepted client on a channel and its receive loop.

use crate::error::TransportError;
use crate::ws::directory::SessionDirectory;
use crate::ws::types::{Channel, Connection, ConnectionId, SessionId, within};
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, close_code};
use futures_util::stream::{Stream, StreamExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Registered and receiving.
    Registered,
    /// Receive loop has ended; connection is being closed and deregistered.
    Draining,
    Closed,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Registered,
            1 => SessionState::Draining,
            _ => SessionState::Closed,
        }
    }
}

/// Why a receive loop stopped.
enum LoopExit {
    ClosedByPeer(Option<CloseFrame>),
    /// The connection was closed from the server side, e.g. evicted.
    ClosedByServer,
    Failed(axum::Error),
    StreamEnded,
}

/// Server side of one client connection on a channel.
pub struct Session {
    id: SessionId,
    channel: Channel,
    connection: Arc<Connection>,
    directory: SessionDirectory,
    echo_replies: bool,
    send_timeout: Option<Duration>,
    state: AtomicU8,
}

impl Session {
    pub fn new(
        id: SessionId,
        channel: Channel,
        connection: Arc<Connection>,
        directory: SessionDirectory,
        echo_replies: bool,
        send_timeout: Option<Duration>,
    ) -> Self {
        Self {
            id,
            channel,
            connection,
            directory,
            echo_replies,
            send_timeout,
            state: AtomicU8::new(SessionState::Registered as u8),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection.id()
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Sends a text frame to this client only, under the session's send lock.
    /// Waiting for the lock counts against the send timeout.
    pub async fn send(&self, payload: impl Into<Utf8Bytes>) -> Result<(), TransportError> {
        let result = within(self.send_timeout, self.connection.write(payload.into())).await;
        if let Err(e) = &result {
            warn!(session_id = %self.id, channel = %self.channel, "Failed to send to session: {}", e);
        }
        result
    }

    /// Reads inbound frames until the client leaves, the connection fails or
    /// the connection is closed from the server side.
    ///
    /// On exit the connection is closed, this session's directory entry is
    /// dropped and `on_close` runs exactly once. Inbound text is never fanned
    /// out; with echo enabled the sender alone gets an acknowledgement.
    #[instrument(skip_all, fields(channel = %self.channel, session_id = %self.id))]
    pub async fn run_receive_loop<S, F, Fut>(self: Arc<Self>, mut inbound: S, on_close: F)
    where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
        F: FnOnce(SessionId) -> Fut,
        Fut: Future<Output = ()>,
    {
        info!("Starting receive loop for session.");
        let exit = loop {
            let frame = tokio::select! {
                frame = inbound.next() => frame,
                _ = self.connection.closed() => break LoopExit::ClosedByServer,
            };
            match frame {
                Some(Ok(Message::Text(text))) => {
                    debug!(len = text.as_str().len(), "Received text frame from client.");
                    if self.echo_replies {
                        let ack = format!("Received message from client {}", self.id);
                        let _ = self.send(ack).await;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => {
                    debug!(len = bytes.len(), "Ignoring binary frame from client.");
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(frame))) => break LoopExit::ClosedByPeer(frame),
                Some(Err(e)) => break LoopExit::Failed(e),
                None => break LoopExit::StreamEnded,
            }
        };

        self.state
            .store(SessionState::Draining as u8, Ordering::Release);
        match &exit {
            LoopExit::ClosedByPeer(None) => debug!("Client closed the connection."),
            LoopExit::ClosedByPeer(Some(frame))
                if frame.code == close_code::NORMAL || frame.code == close_code::AWAY =>
            {
                debug!(code = frame.code, "Client closed the connection.");
            }
            LoopExit::ClosedByPeer(Some(frame)) => {
                warn!(code = frame.code, reason = frame.reason.as_str(), "Client closed the connection unexpectedly.");
            }
            LoopExit::ClosedByServer => debug!("Connection closed by the server."),
            LoopExit::Failed(e) => warn!("Receive loop failed: {}", e),
            LoopExit::StreamEnded => debug!("Inbound stream ended."),
        }

        if let Err(e) = within(self.send_timeout, self.connection.close()).await {
            debug!("Error closing connection: {}", e);
        }
        self.directory.remove_session(&self);
        on_close(self.id.clone()).await;
        self.state.store(SessionState::Closed as u8, Ordering::Release);
        info!("Session closed.");
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("connection", &self.connection)
            .field("state", &self.state())
            .finish()
    }
}

//! Error types shared across the notification channels.

use axum::{
    Json,
    extract::ws::rejection::WebSocketUpgradeRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::time::Duration;
use thiserror::Error;

/// Failure while writing to or closing a single client connection.
///
/// These never escape a broadcast: they are logged and counted in the
/// [`BroadcastReport`](crate::ws::registry::BroadcastReport).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection is closed")]
    Closed,
    #[error("write timed out after {0:?}")]
    TimedOut(Duration),
    #[error("websocket error: {0}")]
    WebSocket(#[from] axum::Error),
}

/// The HTTP request could not be upgraded to a WebSocket. No session is created.
#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("websocket upgrade rejected: {0}")]
    Rejected(#[from] WebSocketUpgradeRejection),
}

impl IntoResponse for UpgradeError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

/// A notification could not be turned into a wire payload.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("amount must be a finite number, got {0}")]
    NonFiniteAmount(f64),
    #[error("failed to serialize notification: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

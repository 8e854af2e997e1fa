//! The Axum handler that turns an HTTP request into a channel subscription.

use crate::error::UpgradeError;
use crate::ws::service::BroadcastService;
use axum::{
    extract::{
        Query, State,
        ws::{WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Query string accepted by every channel endpoint, e.g. `/ws/stock?session_id=kiosk-1`.
#[derive(Debug, Default, Deserialize)]
pub struct SessionQuery {
    pub session_id: Option<String>,
}

/// Generic upgrade endpoint for any channel's [`BroadcastService`].
///
/// Mount it once per channel with that channel's service as state:
///
/// ```rust,no_run
/// # use axum::{Router, routing::get};
/// # use inventory_notify::{config::ChannelConfig, ws::{service::BroadcastService, types::Channel, upgrade::upgrade_handler}};
/// let stock = BroadcastService::new(Channel::Stock, ChannelConfig::default());
/// let app: Router = Router::new().route("/ws/stock", get(upgrade_handler).with_state(stock));
/// ```
///
/// A request that cannot be upgraded gets a `500` with a JSON error body.
#[instrument(skip_all)]
pub async fn upgrade_handler(
    State(service): State<Arc<BroadcastService>>,
    Query(query): Query<SessionQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, UpgradeError> {
    let channel = service.channel();
    let ws = ws.map_err(|rejection| {
        error!(%channel, "WebSocket upgrade rejected: {}", rejection);
        UpgradeError::from(rejection)
    })?;

    let (session_id, response) = service.handle_upgrade(ws, query.session_id);
    info!(%channel, %session_id, "Accepted WebSocket upgrade request.");
    Ok(response)
}

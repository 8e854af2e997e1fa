//! The three notification channels, constructed once at startup.

use crate::config::ChannelConfig;
use crate::ws::{service::BroadcastService, types::Channel, upgrade::upgrade_handler};
use axum::{Router, routing::get};
use std::sync::Arc;

/// One independent [`BroadcastService`] per channel.
///
/// Cloning is cheap and shares the services. Pass this (or a single service)
/// explicitly to whatever layer triggers notifications.
#[derive(Debug, Clone)]
pub struct Channels {
    pub stock: Arc<BroadcastService>,
    pub orders: Arc<BroadcastService>,
    pub cancellations: Arc<BroadcastService>,
}

impl Channels {
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            stock: BroadcastService::new(Channel::Stock, config.clone()),
            orders: BroadcastService::new(Channel::OrderCreation, config.clone()),
            cancellations: BroadcastService::new(Channel::Cancellation, config.clone()),
        }
    }

    pub fn get(&self, channel: Channel) -> &Arc<BroadcastService> {
        match channel {
            Channel::Stock => &self.stock,
            Channel::OrderCreation => &self.orders,
            Channel::Cancellation => &self.cancellations,
        }
    }

    /// Routes `/ws/stock`, `/ws/orders` and `/ws/cancellations` to their services.
    /// Merge the result into the application's router.
    pub fn router<S>(&self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        Channel::ALL.iter().fold(Router::new(), |router, &channel| {
            router.route(
                channel.path(),
                get(upgrade_handler).with_state(Arc::clone(self.get(channel))),
            )
        })
    }
}

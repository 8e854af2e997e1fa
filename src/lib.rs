//! # Inventory Notify
//!
//! Real-time notification channels for an inventory and order-management API.
//! Request handlers mutate stock, orders, sales and supplier orders elsewhere;
//! this crate fans the resulting events out to WebSocket clients over three
//! independent channels.
//!
//! ## Core Features
//!
//! - **`BroadcastService`**: one per channel. Accepts upgrades, tracks each
//!   client in a connection registry and a session directory, and broadcasts
//!   best-effort to every live connection.
//! - **Per-session send lock**: broadcasts and direct replies to the same client
//!   never interleave frames.
//! - **No head-of-line blocking**: broadcasts write outside the registry lock,
//!   with an optional per-write timeout.
//! - **`Notifier`**: the entry points called after a domain mutation
//!   (`notify_low_stock`, `notify_new_order`, `notify_canceled_order`, ...).
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use axum::Router;
//! use inventory_notify::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() {
//! let channels = Channels::new(&ChannelConfig::default());
//! let notifier = Notifier::new(channels.clone(), Arc::new(StaticProviders::new()));
//! let app: Router = channels.router();
//!
//! // after decrementing stock of product 9 to 4 units:
//! notifier.notify_low_stock(9, 4).await;
//! # }
//! ```
//!
//! Clients connect to `/ws/stock`, `/ws/orders` or `/ws/cancellations`,
//! optionally passing `?session_id=<id>`.

pub mod channels;
pub mod config;
pub mod error;
pub mod notification;
pub mod ws;

/// Public prelude for convenience.
///
/// `use inventory_notify::prelude::*;`
pub mod prelude {
    pub use crate::channels::Channels;
    pub use crate::config::{ChannelConfig, ServerConfig};
    pub use crate::notification::{
        LOW_STOCK_THRESHOLD, Notification, NotificationKind, Notifier, OrderKind,
        ProviderDirectory, StaticProviders,
    };
    pub use crate::ws::{
        registry::BroadcastReport,
        service::BroadcastService,
        types::{Channel, SessionId},
        upgrade::upgrade_handler,
    };
}

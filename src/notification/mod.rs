//! Notification payloads and the service that routes them to channels.

pub mod model;
pub mod notifier;

pub use model::{LOW_STOCK_THRESHOLD, Notification, NotificationKind};
pub use notifier::{Notifier, OrderKind, ProviderDirectory, StaticProviders};

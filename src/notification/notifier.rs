//! Entry points the CRUD layer calls after a mutation.

use crate::channels::Channels;
use crate::notification::model::{LOW_STOCK_THRESHOLD, Notification};
use crate::ws::registry::BroadcastReport;
use crate::ws::types::Channel;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Resolves a provider id to its display name. Backed by the provider
/// repository in a full deployment.
#[async_trait]
pub trait ProviderDirectory: Send + Sync + 'static {
    async fn provider_name(&self, provider_id: i64) -> anyhow::Result<Option<String>>;
}

/// Fixed in-memory provider names.
#[derive(Debug, Clone, Default)]
pub struct StaticProviders {
    names: HashMap<i64, String>,
}

impl StaticProviders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, provider_id: i64, name: impl Into<String>) {
        self.names.insert(provider_id, name.into());
    }
}

impl<N: Into<String>> FromIterator<(i64, N)> for StaticProviders {
    fn from_iter<I: IntoIterator<Item = (i64, N)>>(iter: I) -> Self {
        Self {
            names: iter
                .into_iter()
                .map(|(id, name)| (id, name.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl ProviderDirectory for StaticProviders {
    async fn provider_name(&self, provider_id: i64) -> anyhow::Result<Option<String>> {
        Ok(self.names.get(&provider_id).cloned())
    }
}

/// The three order families sharing the order notification shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    /// Purchase order placed by a customer (`pedido`).
    CustomerOrder,
    /// Sale (`venta`).
    Sale,
    /// Order placed with a supplier (`orden de proveedor`).
    SupplierOrder,
}

impl OrderKind {
    /// Where a client can fetch the products of the order.
    pub fn products_url(&self, id: i64) -> String {
        let resource = match self {
            OrderKind::CustomerOrder => "pedidos",
            OrderKind::Sale => "ventas",
            OrderKind::SupplierOrder => "ordenes",
        };
        format!("/api/{resource}/{id}/productos")
    }
}

/// Builds notifications and routes each one to exactly one channel.
///
/// An event that concerns several channels (a cancellation that also restocks
/// products) must be reported on each of them by the caller. Every method
/// returns `None` when nothing was broadcast.
#[derive(Clone)]
pub struct Notifier {
    channels: Channels,
    providers: Arc<dyn ProviderDirectory>,
}

impl Notifier {
    pub fn new(channels: Channels, providers: Arc<dyn ProviderDirectory>) -> Self {
        Self {
            channels,
            providers,
        }
    }

    pub fn channels(&self) -> &Channels {
        &self.channels
    }

    /// Alerts the stock channel when `stock_level` is at or below the threshold.
    #[instrument(skip(self))]
    pub async fn notify_low_stock(&self, product_id: i64, stock_level: i64) -> Option<BroadcastReport> {
        if stock_level > LOW_STOCK_THRESHOLD {
            return None;
        }
        let notification = Notification::low_stock(product_id.to_string(), stock_level);
        let report = self.publish(Channel::Stock, &notification).await?;
        info!(recipients = report.delivered, "Low stock notification sent.");
        Some(report)
    }

    pub async fn notify_new_order(
        &self,
        entity_id: impl Into<String>,
        amount: f64,
        products_url: impl Into<String>,
    ) -> Option<BroadcastReport> {
        let notification = Notification::order_created(entity_id, amount, products_url);
        let report = self.publish(Channel::OrderCreation, &notification).await?;
        info!(
            entity_id = notification.entity_id(),
            amount,
            recipients = report.delivered,
            "New order notification sent."
        );
        Some(report)
    }

    pub async fn notify_order_created(&self, kind: OrderKind, id: i64, amount: f64) -> Option<BroadcastReport> {
        self.notify_new_order(id.to_string(), amount, kind.products_url(id))
            .await
    }

    pub async fn notify_new_customer_order(&self, order_id: i64, amount: f64) -> Option<BroadcastReport> {
        self.notify_order_created(OrderKind::CustomerOrder, order_id, amount)
            .await
    }

    pub async fn notify_new_sale(&self, sale_id: i64, amount: f64) -> Option<BroadcastReport> {
        self.notify_order_created(OrderKind::Sale, sale_id, amount)
            .await
    }

    pub async fn notify_new_supplier_order(&self, order_id: i64, amount: f64) -> Option<BroadcastReport> {
        self.notify_order_created(OrderKind::SupplierOrder, order_id, amount)
            .await
    }

    pub async fn notify_canceled_order(
        &self,
        entity_id: impl Into<String>,
        amount: f64,
        provider_name: impl Into<String>,
    ) -> Option<BroadcastReport> {
        let notification = Notification::order_canceled(entity_id, amount, provider_name);
        let report = self.publish(Channel::Cancellation, &notification).await?;
        info!(
            entity_id = notification.entity_id(),
            amount,
            provider = notification.provider().unwrap_or_default(),
            recipients = report.delivered,
            "Cancellation notification sent."
        );
        Some(report)
    }

    pub async fn notify_canceled_customer_order(&self, order_id: i64, amount: f64) -> Option<BroadcastReport> {
        self.notify_canceled_order(order_id.to_string(), amount, "")
            .await
    }

    pub async fn notify_canceled_sale(&self, sale_id: i64, amount: f64) -> Option<BroadcastReport> {
        self.notify_canceled_order(sale_id.to_string(), amount, "")
            .await
    }

    /// Looks up the provider name first; a failed or empty lookup sends an
    /// empty provider instead of dropping the notification.
    #[instrument(skip(self))]
    pub async fn notify_canceled_supplier_order(
        &self,
        order_id: i64,
        amount: f64,
        provider_id: i64,
    ) -> Option<BroadcastReport> {
        let provider_name = match self.providers.provider_name(provider_id).await {
            Ok(Some(name)) => name,
            Ok(None) => {
                warn!("Provider not found, sending cancellation without provider name.");
                String::new()
            }
            Err(e) => {
                warn!("Provider lookup failed, sending cancellation without provider name: {:#}", e);
                String::new()
            }
        };
        self.notify_canceled_order(order_id.to_string(), amount, provider_name)
            .await
    }

    /// Serializes and broadcasts. A payload that cannot be built is logged and
    /// nothing is sent.
    async fn publish(&self, channel: Channel, notification: &Notification) -> Option<BroadcastReport> {
        match notification.to_payload() {
            Ok(payload) => Some(self.channels.get(channel).broadcast(payload).await),
            Err(e) => {
                error!(%channel, kind = ?notification.kind(), "Notification suppressed: {}", e);
                None
            }
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("channels", &self.channels)
            .finish_non_exhaustive()
    }
}

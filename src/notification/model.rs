//! The notification payload sent to channel clients.

use crate::error::NotificationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stock level at or below which a product triggers a low-stock alert.
pub const LOW_STOCK_THRESHOLD: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    LowStock,
    NewOrder,
    CancelOrder,
}

/// An immutable, fire-and-forget notification.
///
/// Serializes to a single JSON object. Fields that do not apply to the kind
/// are omitted rather than sent as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    kind: NotificationKind,
    message: String,
    timestamp: DateTime<Utc>,
    entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stock_level: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    products_url: Option<String>,
}

impl Notification {
    fn base(kind: NotificationKind, message: &str, entity_id: String) -> Self {
        Self {
            kind,
            message: message.to_string(),
            timestamp: Utc::now(),
            entity_id,
            amount: None,
            stock_level: None,
            provider: None,
            products_url: None,
        }
    }

    pub fn low_stock(entity_id: impl Into<String>, stock_level: i64) -> Self {
        Self {
            stock_level: Some(stock_level),
            ..Self::base(
                NotificationKind::LowStock,
                "Product stock is running low",
                entity_id.into(),
            )
        }
    }

    /// Shared by customer orders, sales and supplier orders; only the
    /// `products_url` prefix tells them apart.
    pub fn order_created(
        entity_id: impl Into<String>,
        amount: f64,
        products_url: impl Into<String>,
    ) -> Self {
        Self {
            amount: Some(amount),
            products_url: Some(products_url.into()),
            ..Self::base(
                NotificationKind::NewOrder,
                "A new order has been created",
                entity_id.into(),
            )
        }
    }

    /// `provider` is empty when the order has none or it could not be resolved.
    pub fn order_canceled(
        entity_id: impl Into<String>,
        amount: f64,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            amount: Some(amount),
            provider: Some(provider.into()),
            ..Self::base(
                NotificationKind::CancelOrder,
                "The order has been canceled",
                entity_id.into(),
            )
        }
    }

    pub fn kind(&self) -> NotificationKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn amount(&self) -> Option<f64> {
        self.amount
    }

    pub fn stock_level(&self) -> Option<i64> {
        self.stock_level
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    pub fn products_url(&self) -> Option<&str> {
        self.products_url.as_deref()
    }

    /// The JSON text frame for this notification.
    pub fn to_payload(&self) -> Result<String, NotificationError> {
        if let Some(amount) = self.amount.filter(|a| !a.is_finite()) {
            return Err(NotificationError::NonFiniteAmount(amount));
        }
        Ok(serde_json::to_string(self)?)
    }
}

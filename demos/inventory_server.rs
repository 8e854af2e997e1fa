//! A small in-memory inventory API wired to the notification channels.
//!
//! Run with `cargo run --example inventory_server`, then watch a channel with
//! `cargo run --example watch_channel -- stock` and try:
//!
//! ```text
//! curl -X PATCH localhost:4000/api/productos/1/stock -H 'content-type: application/json' -d '{"cantidad": -8}'
//! curl -X POST  localhost:4000/api/ventas -H 'content-type: application/json' -d '{"total": 120.5}'
//! curl -X POST  localhost:4000/api/ordenes/1/cancel
//! ```

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use inventory_notify::prelude::*;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
struct Product {
    id: i64,
    name: String,
    stock: i64,
}

#[derive(Debug, Clone, Serialize)]
struct Order {
    id: i64,
    kind: &'static str,
    total: f64,
    provider_id: Option<i64>,
    canceled: bool,
}

#[derive(Default)]
struct Store {
    products: HashMap<i64, Product>,
    orders: HashMap<i64, Order>,
    next_order_id: i64,
}

#[derive(Clone)]
struct AppState {
    store: Arc<Mutex<Store>>,
    notifier: Notifier,
}

#[derive(Debug)]
enum ApiError {
    NotFound(String),
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        (status, Json(serde_json::json!({ "error": msg }))).into_response()
    }
}

#[derive(Deserialize)]
struct StockChange {
    /// Signed delta applied to the current stock.
    cantidad: i64,
}

#[derive(Deserialize)]
struct NewOrder {
    total: f64,
    #[serde(default)]
    id_proveedor: Option<i64>,
}

fn order_kind(resource: &str) -> Result<(OrderKind, &'static str), ApiError> {
    match resource {
        "pedidos" => Ok((OrderKind::CustomerOrder, "pedido")),
        "ventas" => Ok((OrderKind::Sale, "venta")),
        "ordenes" => Ok((OrderKind::SupplierOrder, "orden")),
        other => Err(ApiError::NotFound(format!("unknown resource {other}"))),
    }
}

async fn list_products(State(state): State<AppState>) -> Json<Vec<Product>> {
    let store = state.store.lock().await;
    let mut products: Vec<_> = store.products.values().cloned().collect();
    products.sort_by_key(|p| p.id);
    Json(products)
}

async fn update_stock(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(change): Json<StockChange>,
) -> Result<Json<Product>, ApiError> {
    let product = {
        let mut store = state.store.lock().await;
        let product = store
            .products
            .get_mut(&id)
            .ok_or_else(|| ApiError::NotFound(format!("product {id} not found")))?;
        let stock = product.stock + change.cantidad;
        if stock < 0 {
            return Err(ApiError::BadRequest("stock cannot go negative".into()));
        }
        product.stock = stock;
        product.clone()
    };

    state.notifier.notify_low_stock(product.id, product.stock).await;
    Ok(Json(product))
}

async fn create_order(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Json(body): Json<NewOrder>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let (kind, label) = order_kind(&resource)?;
    let order = {
        let mut store = state.store.lock().await;
        store.next_order_id += 1;
        let order = Order {
            id: store.next_order_id,
            kind: label,
            total: body.total,
            provider_id: body.id_proveedor,
            canceled: false,
        };
        store.orders.insert(order.id, order.clone());
        order
    };

    state
        .notifier
        .notify_order_created(kind, order.id, order.total)
        .await;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn cancel_order(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, i64)>,
) -> Result<Json<Order>, ApiError> {
    let (kind, label) = order_kind(&resource)?;
    let order = {
        let mut store = state.store.lock().await;
        let order = store
            .orders
            .get_mut(&id)
            .filter(|o| o.kind == label)
            .ok_or_else(|| ApiError::NotFound(format!("{label} {id} not found")))?;
        if order.canceled {
            return Err(ApiError::BadRequest(format!("{label} {id} already canceled")));
        }
        order.canceled = true;
        order.clone()
    };

    let notifier = &state.notifier;
    match kind {
        OrderKind::CustomerOrder => notifier.notify_canceled_customer_order(id, order.total).await,
        OrderKind::Sale => notifier.notify_canceled_sale(id, order.total).await,
        OrderKind::SupplierOrder => {
            let provider_id = order.provider_id.unwrap_or_default();
            notifier
                .notify_canceled_supplier_order(id, order.total, provider_id)
                .await
        }
    };
    Ok(Json(order))
}

async fn session_counts(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mut counts = serde_json::Map::new();
    for channel in Channel::ALL {
        let service = state.notifier.channels().get(channel);
        let mut ids: Vec<_> = service.sessions().into_keys().collect();
        ids.sort();
        counts.insert(
            channel.to_string(),
            serde_json::json!({
                "connections": service.connection_count().await,
                "sessions": ids,
            }),
        );
    }
    Json(serde_json::Value::Object(counts))
}

fn seed() -> Store {
    let products = [(1, "Teclado", 10), (2, "Mouse", 3), (3, "Monitor", 25)]
        .into_iter()
        .map(|(id, name, stock)| {
            (
                id,
                Product {
                    id,
                    name: name.to_string(),
                    stock,
                },
            )
        })
        .collect();
    Store {
        products,
        ..Store::default()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inventory_server=info,inventory_notify=info".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let channels = Channels::new(&config.channel);
    let providers = StaticProviders::from_iter([(1, "Distribuidora Central"), (2, "Tecno Partes")]);
    let state = AppState {
        store: Arc::new(Mutex::new(seed())),
        notifier: Notifier::new(channels.clone(), Arc::new(providers)),
    };

    let app = Router::new()
        .route("/api/productos", get(list_products))
        .route("/api/productos/{id}/stock", patch(update_stock))
        .route("/api/{resource}", post(create_order))
        .route("/api/{resource}/{id}/cancel", post(cancel_order))
        .route("/api/ws/sessions", get(session_counts))
        .route("/health", get(|| async { Json(serde_json::json!({ "status": "UP" })) }))
        .with_state(state)
        .merge(channels.router());

    let addr = config.socket_addr();
    info!("Listening on {}", addr);
    info!("Channels: /ws/stock, /ws/orders, /ws/cancellations");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}

//! Subscribes to one notification channel and prints what arrives.
//!
//! ```text
//! cargo run --example watch_channel -- orders
//! WS_URL=ws://inventory.local:4000 cargo run --example watch_channel -- stock
//! ```

use futures_util::{SinkExt, StreamExt};
use inventory_notify::prelude::*;
use serde_json::Value;
use std::time::Duration;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        Message,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use tracing::{info, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

fn parse_channel(arg: Option<String>) -> anyhow::Result<Channel> {
    let name = arg.unwrap_or_else(|| "stock".to_string());
    Channel::ALL
        .into_iter()
        .find(|c| c.as_str() == name)
        .ok_or_else(|| anyhow::anyhow!("unknown channel {name:?}, expected stock, orders or cancellations"))
}

fn render(raw: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        return format!("[text] {raw}");
    };
    let id = value["entity_id"].as_str().unwrap_or("?");
    let amount = value["amount"].as_f64().unwrap_or_default();
    match value["type"].as_str() {
        Some("low_stock") => format!(
            "[stock] product {id} down to {} units",
            value["stock_level"].as_i64().unwrap_or_default()
        ),
        Some("new_order") => format!(
            "[order] {id} for {amount:.2}, products at {}",
            value["products_url"].as_str().unwrap_or("-")
        ),
        Some("cancel_order") => match value["provider"].as_str().filter(|p| !p.is_empty()) {
            Some(provider) => format!("[cancel] {id} for {amount:.2} from {provider}"),
            None => format!("[cancel] {id} for {amount:.2}"),
        },
        _ => format!("[unknown] {raw}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "watch_channel=info".into()),
        )
        .init();

    let channel = parse_channel(std::env::args().nth(1))?;
    let base = std::env::var("WS_URL").unwrap_or_else(|_| "ws://127.0.0.1:4000".to_string());
    let url = format!("{base}{}?session_id=watch-{channel}", channel.path());

    let (socket, _) = connect_async(url.as_str()).await?;
    info!("Connected to {}", url);
    let (mut sink, mut stream) = socket.split();

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => println!("{}", render(text.as_str())),
                Some(Ok(Message::Close(frame))) => {
                    info!("Server closed the channel: {:?}", frame);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Connection lost: {}", e);
                    break;
                }
                None => break,
            },
            _ = heartbeat.tick() => {
                sink.send(Message::Text("heartbeat".into())).await?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Closing connection");
                sink.send(Message::Close(Some(CloseFrame {
                    code: CloseCode::Normal,
                    reason: "bye".into(),
                })))
                .await?;
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_each_notification_kind() {
        assert_eq!(
            render(r#"{"type":"low_stock","entity_id":"9","stock_level":4}"#),
            "[stock] product 9 down to 4 units"
        );
        assert_eq!(
            render(r#"{"type":"cancel_order","entity_id":"3","amount":10.0,"provider":""}"#),
            "[cancel] 3 for 10.00"
        );
        assert_eq!(render("Received message from client 1"), "[text] Received message from client 1");
    }

    #[test]
    fn channel_names_match_routes() {
        assert_eq!(parse_channel(Some("orders".into())).unwrap(), Channel::OrderCreation);
        assert_eq!(parse_channel(None).unwrap(), Channel::Stock);
        assert!(parse_channel(Some("invoices".into())).is_err());
    }
}

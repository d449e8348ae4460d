//! Telemetry demo: a broker, two simulated vehicles publishing position
//! updates, and a monitor that watches both the `positioning` topic and
//! the reserved `system` topic.
//!
//! Run with `cargo run -p telemetry`; set `RUST_LOG=debug` for the full
//! frame-level trace.

use std::time::Duration;

use rand::Rng;
use tracing_subscriber::EnvFilter;

use wirebus::{
    BrokerServer, Client, ClientConfig, Frame, SYSTEM_TOPIC,
};

const ADDR: &str = "127.0.0.1:7450";
const POSITION_TOPIC: &str = "positioning";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let server = BrokerServer::builder()
        .bind(ADDR)
        .broker_name("telemetry-hub")
        .build()
        .await?;
    tokio::spawn(server.run());

    tokio::spawn(monitor());
    tokio::spawn(vehicle("vehicle-1"));
    tokio::spawn(vehicle("vehicle-2"));

    // Run until interrupted.
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    Ok(())
}

/// Subscribes to positions and system notices and logs everything.
async fn monitor() {
    let mut client =
        match Client::connect(ADDR, ClientConfig::named("monitor")).await
        {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(error = %e, "monitor failed to connect");
                return;
            }
        };

    for topic in [POSITION_TOPIC, SYSTEM_TOPIC] {
        if let Err(e) = client.subscribe(topic).await {
            tracing::error!(error = %e, topic, "subscribe failed");
            return;
        }
    }

    while let Some(event) = client.next_event().await {
        if let Frame::Event {
            event_type,
            topic,
            sender,
            payload,
            ..
        } = event
        {
            tracing::info!(
                %event_type,
                %topic,
                sender = sender.as_deref().unwrap_or("?"),
                payload = %serde_json::Value::Object(payload),
                "event"
            );
        }
    }
    tracing::warn!("monitor connection closed");
}

/// Publishes a random-walk position every 3 seconds.
async fn vehicle(name: &str) {
    let client =
        match Client::connect(ADDR, ClientConfig::named(name)).await {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(error = %e, name, "vehicle failed to connect");
                return;
            }
        };

    let mut x: i64 = 0;
    let mut y: i64 = 0;
    let mut ticker =
        tokio::time::interval(Duration::from_secs(3));
    loop {
        ticker.tick().await;
        {
            let mut rng = rand::rng();
            x += rng.random_range(-5..=5);
            y += rng.random_range(-5..=5);
        }

        let payload = serde_json::json!({ "X": x, "Y": y });
        if let Some(payload) = payload.as_object() {
            client.publish_with_payload(
                "POS_UPDATE",
                POSITION_TOPIC,
                payload.clone(),
            );
        }
        tracing::debug!(name, x, y, "published position");
    }
}

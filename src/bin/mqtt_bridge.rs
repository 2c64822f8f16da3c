//! Subscribes to the telegram topic and forwards readings to the gateway.
//!
//! Usage:
//!   MQTT_TOPIC=farm/15046220 cargo run --bin mqtt_bridge

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use field_telemetry_service::{
    bridge::{GatewayClient, MqttBridge},
    config::BridgeConfig,
    shutdown_signal,
};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = BridgeConfig::from_env()?;
    let gateway = GatewayClient::new(&config.api_base_url, config.api_timeout)?;
    info!(api_base_url = %config.api_base_url, "Forwarding readings to gateway");

    MqttBridge::new(config, Arc::new(gateway))
        .run(shutdown_signal())
        .await;

    Ok(())
}

use std::time::Duration;

use anyhow::{Context, Result};

// ---------------------------------------------------------------------------
// Gateway (HTTP service) config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            database_url: required(&get, "DATABASE_URL")?,
            server_host: optional(&get, "SERVER_HOST", "0.0.0.0"),
            server_port: optional(&get, "SERVER_PORT", "8000")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Bridge (MQTT subscriber) config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_topic: String,
    pub mqtt_client_id: String,
    pub keep_alive: Duration,
    /// Pause after a failed (re)connect before the next attempt.
    pub reconnect_delay: Duration,
    /// Base URL of the ingestion API, without trailing slash,
    /// e.g. `http://localhost:8000/api`.
    pub api_base_url: String,
    /// Bound on each gateway call.
    pub api_timeout: Duration,
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            mqtt_host: optional(&get, "MQTT_HOST", "broker.emqx.io"),
            mqtt_port: optional(&get, "MQTT_PORT", "1883")
                .parse()
                .context("MQTT_PORT must be a valid port number")?,
            mqtt_topic: required(&get, "MQTT_TOPIC")?,
            mqtt_client_id: optional(&get, "MQTT_CLIENT_ID", "field_telemetry_bridge"),
            keep_alive: secs(&get, "MQTT_KEEP_ALIVE_SECS", "60")?,
            reconnect_delay: secs(&get, "MQTT_RECONNECT_DELAY_SECS", "5")?,
            api_base_url: optional(&get, "API_BASE_URL", "http://localhost:8000/api")
                .trim_end_matches('/')
                .to_owned(),
            api_timeout: secs(&get, "API_TIMEOUT_SECS", "5")?,
        })
    }
}

fn required(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    get(key)
        .filter(|v| !v.is_empty())
        .with_context(|| format!("missing required env var: {key}"))
}

fn optional(get: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    get(key).unwrap_or_else(|| default.to_owned())
}

fn secs(get: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> Result<Duration> {
    let secs: u64 = optional(get, key, default)
        .parse()
        .with_context(|| format!("{key} must be a positive integer"))?;
    anyhow::ensure!(secs > 0, "{key} must be a positive integer");
    Ok(Duration::from_secs(secs))
}

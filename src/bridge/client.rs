use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{api::dto::SensorDataPayload, channels::NormalizedReading};

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("gateway rejected reading with status {status}: {body}")]
    Rejected { status: StatusCode, body: String },
    #[error("gateway unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

/// What the gateway did with a forwarded reading.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Stored { data_id: Uuid },
    /// The gateway has no sensor with this external id; the reading is dropped.
    UnknownSensor,
}

/// Destination for normalized readings.
#[async_trait]
pub trait ReadingSink: Send + Sync {
    async fn forward(&self, reading: &NormalizedReading) -> Result<Delivery, ForwardError>;
}

#[derive(Debug, Deserialize)]
struct IngestAck {
    data_id: Uuid,
}

/// HTTP client for the ingestion gateway.
#[derive(Clone)]
pub struct GatewayClient {
    http: Client,
    base_url: String,
}

impl GatewayClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ForwardError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned() })
    }
}

#[async_trait]
impl ReadingSink for GatewayClient {
    async fn forward(&self, reading: &NormalizedReading) -> Result<Delivery, ForwardError> {
        let url = format!("{}/sensors/{}/data", self.base_url, reading.external_id);
        let payload = SensorDataPayload {
            value: reading.value,
            unit: reading.unit.to_owned(),
            timestamp: Some(reading.timestamp),
            sensor_id: Some(reading.external_id.to_owned()),
            sensor_type: Some(reading.class.to_string()),
        };

        let resp = self.http.post(&url).json(&payload).send().await?;
        let status = resp.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(Delivery::UnknownSensor);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ForwardError::Rejected { status, body });
        }

        let ack: IngestAck = resp.json().await?;
        Ok(Delivery::Stored { data_id: ack.data_id })
    }
}

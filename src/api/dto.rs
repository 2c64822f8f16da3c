use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::models::{Alert, AlertSeverity, Reading};

/// Request body for `POST /api/sensors/{external_id}/data`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SensorDataPayload {
    /// Value in the sensor's physical unit (already scaled).
    pub value: f64,
    pub unit: String,
    /// ISO 8601. Offset-less timestamps are taken as UTC. Defaults to the
    /// server's receipt time.
    #[serde(default, deserialize_with = "deserialize_utc_opt")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Accepted for compatibility; the path identifies the sensor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_id: Option<String>,
    /// Sensor class hint sent by the bridge; informational only.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub sensor_type: Option<String>,
}

/// Response for a successful ingestion.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IngestResponse {
    /// Always `"success"`.
    pub status: String,
    /// Identifier of the stored reading.
    pub data_id: Uuid,
    pub message: String,
}

impl IngestResponse {
    pub fn success(data_id: Uuid) -> Self {
        Self {
            status: "success".to_owned(),
            data_id,
            message: "Data ingested successfully".to_owned(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SensorDataOut {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub unit: String,
}

impl From<Reading> for SensorDataOut {
    fn from(r: Reading) -> Self {
        Self { timestamp: r.recorded_at, value: r.value, unit: r.unit }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AlertDto {
    pub id: Uuid,
    pub sensor_id: Uuid,
    /// Timestamp of the reading that triggered the alert.
    pub timestamp: DateTime<Utc>,
    pub severity: AlertSeverity,
    pub message: String,
    pub is_active: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl From<Alert> for AlertDto {
    fn from(a: Alert) -> Self {
        Self {
            id: a.id,
            sensor_id: a.sensor_id,
            timestamp: a.recorded_at,
            severity: a.severity,
            message: a.message,
            is_active: a.is_active,
            acknowledged_at: a.acknowledged_at,
        }
    }
}

/// Accepts RFC 3339 and offset-less ISO 8601 (read as UTC).
pub(crate) fn deserialize_utc_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(|e| serde::de::Error::custom(format!("invalid timestamp {raw:?}: {e}")))
}

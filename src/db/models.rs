use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Mirrors the `sensor_class` Postgres enum.
///
/// The class fixes the physical unit a sensor's thresholds are expressed in
/// (°C for temperature, % for humidity and soil moisture, lx, ppm, ppb).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "sensor_class", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SensorClass {
    Temperature,
    Humidity,
    SoilMoisture,
    Light,
    Co2,
    Voc,
    Nox,
}

impl SensorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorClass::Temperature => "temperature",
            SensorClass::Humidity => "humidity",
            SensorClass::SoilMoisture => "soil_moisture",
            SensorClass::Light => "light",
            SensorClass::Co2 => "co2",
            SensorClass::Voc => "voc",
            SensorClass::Nox => "nox",
        }
    }
}

impl fmt::Display for SensorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mirrors the `sensor_status` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "sensor_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SensorStatus {
    Active,
    Inactive,
    Maintenance,
}

/// Mirrors the `alert_severity` Postgres enum.
///
/// Threshold evaluation only ever produces `Warning`; `Critical` is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "alert_severity", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        })
    }
}

/// A provisioned sensor. The ingestion core only ever reads these.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Sensor {
    pub id: Uuid,
    /// Stable identifier used across system boundaries, e.g. `"SENS-002"`.
    pub external_id: String,
    pub name: String,
    pub sensor_class: SensorClass,
    pub status: SensorStatus,
    pub parcel_id: Option<Uuid>,
    pub threshold_min: Option<f64>,
    pub threshold_max: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
impl Sensor {
    /// Active humidity sensor with the given bounds.
    pub(crate) fn fixture(external_id: &str, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_id: external_id.to_owned(),
            name: format!("{external_id} probe"),
            sensor_class: SensorClass::Humidity,
            status: SensorStatus::Active,
            parcel_id: None,
            threshold_min: min,
            threshold_max: max,
            created_at: Utc::now(),
        }
    }
}

/// One time-series point. Immutable once written.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Reading {
    pub id: Uuid,
    pub sensor_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub value: f64,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub sensor_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub value: f64,
    pub unit: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub sensor_id: Uuid,
    /// Timestamp of the reading that triggered the alert.
    pub recorded_at: DateTime<Utc>,
    pub severity: AlertSeverity,
    pub message: String,
    pub is_active: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub sensor_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub severity: AlertSeverity,
    pub message: String,
}

/// Filter for a sensor's reading history. Results are newest first.
#[derive(Debug, Clone)]
pub struct ReadingRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: i64,
}

#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    /// `None` returns both open and acknowledged alerts.
    pub active: Option<bool>,
    pub severity: Option<AlertSeverity>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_class_display_matches_postgres_labels() {
        assert_eq!(SensorClass::Temperature.to_string(), "temperature");
        assert_eq!(SensorClass::SoilMoisture.to_string(), "soil_moisture");
        assert_eq!(SensorClass::Co2.as_str(), "co2");
    }

    #[test]
    fn sensor_class_serializes_snake_case() {
        let json = serde_json::to_string(&SensorClass::SoilMoisture).unwrap();
        assert_eq!(json, "\"soil_moisture\"");
    }
}

//! Threshold evaluation and alert lifecycle.
//!
//! Every breaching reading opens a new alert; there is no deduplication or
//! cooldown window, so a sustained breach produces one alert per reading.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::{
        models::{Alert, AlertFilter, AlertSeverity, NewAlert, Sensor},
        StoreError, TelemetryStore,
    },
    ingest::IngestError,
};

/// Compare `value` against the sensor's configured bounds.
///
/// Bounds are checked independently, so an inverted configuration
/// (`min > max`) can yield two alerts for one reading. A value equal to a
/// bound is not a breach. Absent bounds are never evaluated.
pub fn evaluate(
    sensor: &Sensor,
    value: f64,
    unit: &str,
    recorded_at: DateTime<Utc>,
) -> Vec<NewAlert> {
    let mut alerts = Vec::new();

    if let Some(min) = sensor.threshold_min {
        if value < min {
            alerts.push(NewAlert {
                sensor_id: sensor.id,
                recorded_at,
                severity: AlertSeverity::Warning,
                message: format!("Value {value} {unit} is below minimum threshold {min}"),
            });
        }
    }

    if let Some(max) = sensor.threshold_max {
        if value > max {
            alerts.push(NewAlert {
                sensor_id: sensor.id,
                recorded_at,
                severity: AlertSeverity::Warning,
                message: format!("Value {value} {unit} is above maximum threshold {max}"),
            });
        }
    }

    alerts
}

/// Read and acknowledge alerts raised by ingestion.
#[derive(Clone)]
pub struct AlertService {
    store: Arc<dyn TelemetryStore>,
}

impl AlertService {
    pub fn new(store: Arc<dyn TelemetryStore>) -> Self {
        Self { store }
    }

    /// Alerts matching `filter`, newest first.
    pub async fn list(&self, filter: &AlertFilter) -> Result<Vec<Alert>, StoreError> {
        self.store.alerts(filter).await
    }

    /// Close an alert. Acknowledging an already closed alert keeps its
    /// original acknowledgement time.
    pub async fn acknowledge(&self, id: Uuid) -> Result<Alert, IngestError> {
        self.store
            .acknowledge_alert(id, Utc::now())
            .await?
            .ok_or(IngestError::AlertNotFound(id))
    }
}

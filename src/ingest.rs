use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    alerts,
    db::{
        models::{NewReading, Reading, ReadingRange},
        StoreError, TelemetryStore,
    },
};

/// Default page size for history queries.
pub const DEFAULT_HISTORY_LIMIT: i64 = 100;
/// Upper bound on a single history page.
pub const MAX_HISTORY_LIMIT: i64 = 1000;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Sensor with ID {0} not found")]
    SensorNotFound(String),
    #[error("Alert {0} not found")]
    AlertNotFound(Uuid),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub reading_id: Uuid,
    pub alerts_created: usize,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

/// Entry point for readings addressed by external sensor identifier.
///
/// Stateless apart from the injected store, so it can be cloned into every
/// request handler and scaled horizontally.
#[derive(Clone)]
pub struct IngestionGateway {
    store: Arc<dyn TelemetryStore>,
}

impl IngestionGateway {
    pub fn new(store: Arc<dyn TelemetryStore>) -> Self {
        Self { store }
    }

    /// Persist one reading and evaluate the sensor's thresholds.
    ///
    /// The reading and any alerts are written in one unit of work, reading
    /// first. A failed reading write (or commit) fails the call. A failed
    /// alert write is logged and the reading is still committed.
    pub async fn ingest(
        &self,
        external_id: &str,
        value: f64,
        unit: &str,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<IngestOutcome, IngestError> {
        let sensor = self
            .store
            .find_sensor(external_id)
            .await?
            .ok_or_else(|| IngestError::SensorNotFound(external_id.to_owned()))?;

        let recorded_at = timestamp.unwrap_or_else(Utc::now);
        let mut uow = self.store.begin().await?;

        let reading = uow
            .insert_reading(&NewReading {
                sensor_id: sensor.id,
                recorded_at,
                value,
                unit: unit.to_owned(),
            })
            .await?;

        let mut alerts_created = 0;
        for draft in alerts::evaluate(&sensor, value, unit, recorded_at) {
            match uow.insert_alert(&draft).await {
                Ok(alert) => {
                    alerts_created += 1;
                    warn!(
                        external_id = %external_id,
                        alert_id = %alert.id,
                        alert_message = %alert.message,
                        "Threshold breached"
                    );
                }
                Err(e) => {
                    warn!(
                        external_id = %external_id,
                        error = %e,
                        alert_message = %draft.message,
                        "Failed to record alert; keeping reading"
                    );
                }
            }
        }

        uow.commit().await?;

        info!(
            external_id = %external_id,
            reading_id = %reading.id,
            value,
            unit = %unit,
            alerts_created,
            "Reading ingested"
        );

        Ok(IngestOutcome { reading_id: reading.id, alerts_created })
    }

    /// Readings for a sensor, newest first.
    pub async fn history(
        &self,
        external_id: &str,
        query: &HistoryQuery,
    ) -> Result<Vec<Reading>, IngestError> {
        let sensor = self
            .store
            .find_sensor(external_id)
            .await?
            .ok_or_else(|| IngestError::SensorNotFound(external_id.to_owned()))?;

        let range = ReadingRange {
            from: query.from,
            to: query.to,
            limit: query
                .limit
                .unwrap_or(DEFAULT_HISTORY_LIMIT)
                .clamp(1, MAX_HISTORY_LIMIT),
        };
        Ok(self.store.readings(sensor.id, &range).await?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

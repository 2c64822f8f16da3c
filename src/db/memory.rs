use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    models::{Alert, AlertFilter, NewAlert, NewReading, Reading, ReadingRange, Sensor},
    StoreError, TelemetryStore, UnitOfWork,
};

/// In-process `TelemetryStore` holding sensors, readings and alerts in memory.
///
/// Wrapped in `Arc` so it can be cheaply cloned and shared across tasks.
/// Clones observe the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<State>>,
}

#[derive(Default)]
struct State {
    sensors: Vec<Sensor>,
    readings: Vec<Reading>,
    alerts: Vec<Alert>,
    fail_alert_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_sensor(&self, sensor: Sensor) {
        self.inner.write().await.sensors.push(sensor);
    }

    /// Make every subsequent `insert_alert` fail while readings still succeed.
    pub async fn fail_alert_writes(&self, fail: bool) {
        self.inner.write().await.fail_alert_writes = fail;
    }

    /// Snapshot of all committed readings in insertion order.
    pub async fn all_readings(&self) -> Vec<Reading> {
        self.inner.read().await.readings.clone()
    }

    /// Snapshot of all committed alerts in insertion order.
    pub async fn all_alerts(&self) -> Vec<Alert> {
        self.inner.read().await.alerts.clone()
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn find_sensor(&self, external_id: &str) -> Result<Option<Sensor>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .sensors
            .iter()
            .find(|s| s.external_id == external_id)
            .cloned())
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let fail_alert_writes = self.inner.read().await.fail_alert_writes;
        Ok(Box::new(MemoryUnitOfWork {
            store: self.inner.clone(),
            readings: Vec::new(),
            alerts: Vec::new(),
            fail_alert_writes,
        }))
    }

    async fn readings(
        &self,
        sensor_id: Uuid,
        range: &ReadingRange,
    ) -> Result<Vec<Reading>, StoreError> {
        let state = self.inner.read().await;
        let mut rows: Vec<Reading> = state
            .readings
            .iter()
            .filter(|r| r.sensor_id == sensor_id)
            .filter(|r| range.from.map_or(true, |from| r.recorded_at >= from))
            .filter(|r| range.to.map_or(true, |to| r.recorded_at <= to))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        rows.truncate(usize::try_from(range.limit).unwrap_or(0));
        Ok(rows)
    }

    async fn alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>, StoreError> {
        let state = self.inner.read().await;
        let mut rows: Vec<Alert> = state
            .alerts
            .iter()
            .filter(|a| filter.active.map_or(true, |active| a.is_active == active))
            .filter(|a| filter.severity.map_or(true, |severity| a.severity == severity))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(rows)
    }

    async fn acknowledge_alert(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>, StoreError> {
        let mut state = self.inner.write().await;
        Ok(state.alerts.iter_mut().find(|a| a.id == id).map(|alert| {
            alert.is_active = false;
            alert.acknowledged_at.get_or_insert(at);
            alert.clone()
        }))
    }
}

/// Staged writes, applied to the shared state on `commit`.
struct MemoryUnitOfWork {
    store: Arc<RwLock<State>>,
    readings: Vec<Reading>,
    alerts: Vec<Alert>,
    fail_alert_writes: bool,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn insert_reading(&mut self, reading: &NewReading) -> Result<Reading, StoreError> {
        let row = Reading {
            id: Uuid::new_v4(),
            sensor_id: reading.sensor_id,
            recorded_at: reading.recorded_at,
            value: reading.value,
            unit: reading.unit.clone(),
        };
        self.readings.push(row.clone());
        Ok(row)
    }

    async fn insert_alert(&mut self, alert: &NewAlert) -> Result<Alert, StoreError> {
        if self.fail_alert_writes {
            return Err(StoreError::Unavailable("alert writes disabled".to_owned()));
        }
        let row = Alert {
            id: Uuid::new_v4(),
            sensor_id: alert.sensor_id,
            recorded_at: alert.recorded_at,
            severity: alert.severity,
            message: alert.message.clone(),
            is_active: true,
            acknowledged_at: None,
        };
        self.alerts.push(row.clone());
        Ok(row)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryUnitOfWork { store, readings, alerts, .. } = *self;
        let mut state = store.write().await;
        state.readings.extend(readings);
        state.alerts.extend(alerts);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::db::models::{AlertSeverity, SensorClass, SensorStatus};

    fn make_sensor(external_id: &str) -> Sensor {
        Sensor {
            id: Uuid::new_v4(),
            external_id: external_id.to_owned(),
            name: format!("{external_id} probe"),
            sensor_class: SensorClass::Temperature,
            status: SensorStatus::Active,
            parcel_id: None,
            threshold_min: None,
            threshold_max: None,
            created_at: Utc::now(),
        }
    }

    fn make_reading(sensor_id: Uuid, value: f64, recorded_at: DateTime<Utc>) -> NewReading {
        NewReading { sensor_id, recorded_at, value, unit: "C".to_owned() }
    }

    fn make_alert(sensor_id: Uuid, recorded_at: DateTime<Utc>) -> NewAlert {
        NewAlert {
            sensor_id,
            recorded_at,
            severity: AlertSeverity::Warning,
            message: "breach".to_owned(),
        }
    }

    #[tokio::test]
    async fn empty_store_finds_nothing() {
        let store = MemoryStore::new();
        assert!(store.find_sensor("SENS-001").await.unwrap().is_none());
        assert!(store.all_readings().await.is_empty());
        assert!(store.all_alerts().await.is_empty());
    }

    #[tokio::test]
    async fn writes_are_invisible_until_commit() {
        let store = MemoryStore::new();
        let sensor = make_sensor("SENS-001");
        store.add_sensor(sensor.clone()).await;

        let mut uow = store.begin().await.unwrap();
        uow.insert_reading(&make_reading(sensor.id, 1.0, Utc::now())).await.unwrap();
        assert!(store.all_readings().await.is_empty());

        uow.commit().await.unwrap();
        assert_eq!(store.all_readings().await.len(), 1);
    }

    #[tokio::test]
    async fn dropped_unit_of_work_discards_writes() {
        let store = MemoryStore::new();
        let sensor = make_sensor("SENS-001");
        store.add_sensor(sensor.clone()).await;

        {
            let mut uow = store.begin().await.unwrap();
            uow.insert_reading(&make_reading(sensor.id, 1.0, Utc::now())).await.unwrap();
        }
        assert!(store.all_readings().await.is_empty());
    }

    #[tokio::test]
    async fn alert_write_failure_is_isolated() {
        let store = MemoryStore::new();
        let sensor = make_sensor("SENS-001");
        store.add_sensor(sensor.clone()).await;
        store.fail_alert_writes(true).await;

        let mut uow = store.begin().await.unwrap();
        uow.insert_reading(&make_reading(sensor.id, 1.0, Utc::now())).await.unwrap();
        assert!(uow.insert_alert(&make_alert(sensor.id, Utc::now())).await.is_err());
        uow.commit().await.unwrap();

        assert_eq!(store.all_readings().await.len(), 1);
        assert!(store.all_alerts().await.is_empty());
    }

    #[tokio::test]
    async fn readings_filtered_sorted_and_limited() {
        let store = MemoryStore::new();
        let sensor = make_sensor("SENS-001");
        let other = make_sensor("SENS-002");
        let base = Utc::now() - Duration::hours(5);

        let mut uow = store.begin().await.unwrap();
        for h in 0..5 {
            uow.insert_reading(&make_reading(sensor.id, h as f64, base + Duration::hours(h)))
                .await
                .unwrap();
        }
        uow.insert_reading(&make_reading(other.id, 99.0, base)).await.unwrap();
        uow.commit().await.unwrap();

        let range = ReadingRange {
            from: Some(base + Duration::hours(1)),
            to: Some(base + Duration::hours(3)),
            limit: 2,
        };
        let values: Vec<f64> = store
            .readings(sensor.id, &range)
            .await
            .unwrap()
            .iter()
            .map(|r| r.value)
            .collect();
        assert_eq!(values, vec![3.0, 2.0]);
    }

    #[tokio::test]
    async fn acknowledge_keeps_first_timestamp() {
        let store = MemoryStore::new();
        let sensor = make_sensor("SENS-001");
        let now = Utc::now();

        let mut uow = store.begin().await.unwrap();
        let alert = uow.insert_alert(&make_alert(sensor.id, now)).await.unwrap();
        uow.commit().await.unwrap();

        let first = store.acknowledge_alert(alert.id, now).await.unwrap().unwrap();
        let second = store
            .acknowledge_alert(alert.id, now + Duration::minutes(1))
            .await
            .unwrap()
            .unwrap();
        assert!(!second.is_active);
        assert_eq!(first.acknowledged_at, Some(now));
        assert_eq!(second.acknowledged_at, Some(now));

        let open = AlertFilter { active: Some(true), severity: None };
        assert!(store.alerts(&open).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let store = MemoryStore::new();
        let clone = store.clone();
        store.add_sensor(make_sensor("SENS-003")).await;

        assert!(clone.find_sensor("SENS-003").await.unwrap().is_some());
    }
}

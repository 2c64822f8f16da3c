use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Acquire, PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::{
    models::{Alert, AlertFilter, NewAlert, NewReading, Reading, ReadingRange, Sensor},
    StoreError, TelemetryStore, UnitOfWork,
};

const SENSOR_COLUMNS: &str = "id, external_id, name, sensor_class, status, parcel_id, \
                              threshold_min, threshold_max, created_at";
const ALERT_COLUMNS: &str =
    "id, sensor_id, recorded_at, severity, message, is_active, acknowledged_at";

/// `TelemetryStore` backed by the shared connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TelemetryStore for PgStore {
    async fn find_sensor(&self, external_id: &str) -> Result<Option<Sensor>, StoreError> {
        let sensor = sqlx::query_as::<_, Sensor>(&format!(
            "SELECT {SENSOR_COLUMNS} FROM sensors WHERE external_id = $1"
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(sensor)
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn readings(
        &self,
        sensor_id: Uuid,
        range: &ReadingRange,
    ) -> Result<Vec<Reading>, StoreError> {
        let rows = sqlx::query_as::<_, Reading>(
            r#"
            SELECT id, sensor_id, recorded_at, value, unit
            FROM sensor_readings
            WHERE sensor_id = $1
              AND ($2::timestamptz IS NULL OR recorded_at >= $2)
              AND ($3::timestamptz IS NULL OR recorded_at <= $3)
            ORDER BY recorded_at DESC
            LIMIT $4
            "#,
        )
        .bind(sensor_id)
        .bind(range.from)
        .bind(range.to)
        .bind(range.limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>, StoreError> {
        let rows = sqlx::query_as::<_, Alert>(&format!(
            r#"
            SELECT {ALERT_COLUMNS}
            FROM alerts
            WHERE ($1::boolean IS NULL OR is_active = $1)
              AND ($2::alert_severity IS NULL OR severity = $2)
            ORDER BY recorded_at DESC
            "#
        ))
        .bind(filter.active)
        .bind(filter.severity)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn acknowledge_alert(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>, StoreError> {
        let row = sqlx::query_as::<_, Alert>(&format!(
            r#"
            UPDATE alerts
            SET is_active = FALSE,
                acknowledged_at = COALESCE(acknowledged_at, $2)
            WHERE id = $1
            RETURNING {ALERT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn insert_reading(&mut self, reading: &NewReading) -> Result<Reading, StoreError> {
        let row = sqlx::query_as::<_, Reading>(
            r#"
            INSERT INTO sensor_readings (sensor_id, recorded_at, value, unit)
            VALUES ($1, $2, $3, $4)
            RETURNING id, sensor_id, recorded_at, value, unit
            "#,
        )
        .bind(reading.sensor_id)
        .bind(reading.recorded_at)
        .bind(reading.value)
        .bind(&reading.unit)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn insert_alert(&mut self, alert: &NewAlert) -> Result<Alert, StoreError> {
        // A failed statement aborts the whole Postgres transaction, so each
        // alert gets its own savepoint. Dropping it on error rolls back to it.
        let mut savepoint = Acquire::begin(&mut self.tx).await?;
        let row = sqlx::query_as::<_, Alert>(&format!(
            r#"
            INSERT INTO alerts (sensor_id, recorded_at, severity, message)
            VALUES ($1, $2, $3, $4)
            RETURNING {ALERT_COLUMNS}
            "#
        ))
        .bind(alert.sensor_id)
        .bind(alert.recorded_at)
        .bind(alert.severity)
        .bind(&alert.message)
        .fetch_one(&mut *savepoint)
        .await?;
        savepoint.commit().await?;
        debug!(alert_id = %row.id, "alert staged");
        Ok(row)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PgUnitOfWork { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::db::models::AlertSeverity;

    async fn insert_sensor(pool: &PgPool, external_id: &str) -> Uuid {
        sqlx::query_scalar(
            "INSERT INTO sensors (external_id, name, sensor_class) \
             VALUES ($1, $2, 'temperature'::sensor_class) RETURNING id",
        )
        .bind(external_id)
        .bind(format!("{external_id} probe"))
        .fetch_one(pool)
        .await
        .unwrap()
    }

    fn new_reading(sensor_id: Uuid, value: f64, recorded_at: DateTime<Utc>) -> NewReading {
        NewReading { sensor_id, recorded_at, value, unit: "C".to_owned() }
    }

    fn new_alert(sensor_id: Uuid, recorded_at: DateTime<Utc>) -> NewAlert {
        NewAlert {
            sensor_id,
            recorded_at,
            severity: AlertSeverity::Warning,
            message: "Value 15 C is below minimum threshold 20".to_owned(),
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn find_sensor_matches_external_id_exactly(pool: PgPool) {
        insert_sensor(&pool, "SENS-002").await;
        let store = PgStore::new(pool);

        let sensor = store.find_sensor("SENS-002").await.unwrap().unwrap();
        assert_eq!(sensor.external_id, "SENS-002");
        assert!(sensor.threshold_min.is_none());
        assert!(store.find_sensor("sens-002").await.unwrap().is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn committed_unit_of_work_is_visible(pool: PgPool) {
        let sensor_id = insert_sensor(&pool, "SENS-002").await;
        let store = PgStore::new(pool);
        let now = Utc::now();

        let mut uow = store.begin().await.unwrap();
        let reading = uow.insert_reading(&new_reading(sensor_id, 15.0, now)).await.unwrap();
        uow.insert_alert(&new_alert(sensor_id, now)).await.unwrap();
        uow.commit().await.unwrap();

        let range = ReadingRange { from: None, to: None, limit: 100 };
        let readings = store.readings(sensor_id, &range).await.unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].id, reading.id);
        assert_eq!(store.alerts(&AlertFilter::default()).await.unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn dropped_unit_of_work_rolls_back(pool: PgPool) {
        let sensor_id = insert_sensor(&pool, "SENS-002").await;
        let store = PgStore::new(pool);

        {
            let mut uow = store.begin().await.unwrap();
            uow.insert_reading(&new_reading(sensor_id, 15.0, Utc::now())).await.unwrap();
        }

        let range = ReadingRange { from: None, to: None, limit: 100 };
        assert!(store.readings(sensor_id, &range).await.unwrap().is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn failed_alert_insert_keeps_reading_committable(pool: PgPool) {
        let sensor_id = insert_sensor(&pool, "SENS-002").await;
        let store = PgStore::new(pool);
        let now = Utc::now();

        let mut uow = store.begin().await.unwrap();
        uow.insert_reading(&new_reading(sensor_id, 15.0, now)).await.unwrap();
        // Unknown sensor id violates the foreign key.
        let err = uow.insert_alert(&new_alert(Uuid::new_v4(), now)).await;
        assert!(err.is_err());
        uow.commit().await.unwrap();

        let range = ReadingRange { from: None, to: None, limit: 100 };
        assert_eq!(store.readings(sensor_id, &range).await.unwrap().len(), 1);
        assert!(store.alerts(&AlertFilter::default()).await.unwrap().is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn readings_are_newest_first_within_range(pool: PgPool) {
        let sensor_id = insert_sensor(&pool, "SENS-004").await;
        let store = PgStore::new(pool);
        let base = Utc::now() - Duration::hours(3);

        let mut uow = store.begin().await.unwrap();
        for h in 0..3 {
            uow.insert_reading(&new_reading(sensor_id, h as f64, base + Duration::hours(h)))
                .await
                .unwrap();
        }
        uow.commit().await.unwrap();

        let all = ReadingRange { from: None, to: None, limit: 100 };
        let values: Vec<f64> = store
            .readings(sensor_id, &all)
            .await
            .unwrap()
            .iter()
            .map(|r| r.value)
            .collect();
        assert_eq!(values, vec![2.0, 1.0, 0.0]);

        let windowed = ReadingRange {
            from: Some(base + Duration::minutes(30)),
            to: None,
            limit: 1,
        };
        let rows = store.readings(sensor_id, &windowed).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, 2.0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn acknowledge_closes_alert_once(pool: PgPool) {
        let sensor_id = insert_sensor(&pool, "SENS-002").await;
        let store = PgStore::new(pool);
        let now = Utc::now();

        let mut uow = store.begin().await.unwrap();
        let alert = uow.insert_alert(&new_alert(sensor_id, now)).await.unwrap();
        uow.commit().await.unwrap();

        let first = store.acknowledge_alert(alert.id, now).await.unwrap().unwrap();
        assert!(!first.is_active);
        let second = store
            .acknowledge_alert(alert.id, now + Duration::minutes(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.acknowledged_at, first.acknowledged_at);

        let open = AlertFilter { active: Some(true), severity: None };
        assert!(store.alerts(&open).await.unwrap().is_empty());
        assert!(store.acknowledge_alert(Uuid::new_v4(), now).await.unwrap().is_none());
    }
}

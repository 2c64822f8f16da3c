pub mod memory;
pub mod models;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use self::models::{Alert, AlertFilter, NewAlert, NewReading, Reading, ReadingRange, Sensor};

pub use self::{memory::MemoryStore, postgres::PgStore};

pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Persistence seam for the ingestion pipeline.
///
/// Components receive an `Arc<dyn TelemetryStore>` at construction; there is
/// no process-wide handle.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Exact match on the sensor's external identifier.
    async fn find_sensor(&self, external_id: &str) -> Result<Option<Sensor>, StoreError>;

    /// Open a unit of work. Dropping it without `commit` discards every write.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;

    async fn readings(
        &self,
        sensor_id: Uuid,
        range: &ReadingRange,
    ) -> Result<Vec<Reading>, StoreError>;

    async fn alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>, StoreError>;

    /// Close an alert. Returns `None` when no alert has this id.
    async fn acknowledge_alert(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>, StoreError>;
}

/// Writes that become visible together on `commit`.
///
/// A failed `insert_alert` must leave the unit of work usable so the reading
/// written before it can still be committed.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn insert_reading(&mut self, reading: &NewReading) -> Result<Reading, StoreError>;

    async fn insert_alert(&mut self, alert: &NewAlert) -> Result<Alert, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

//! SQLite storage backend implementation
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Dashboard reads do not block sampler writes
//! - **Migrations**: Schema versioning with sqlx (`migrations/`)

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use crate::config::Selection;
use crate::{Entity, MetricSample};

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{
    PLACEHOLDER_STATUS, aggregate_samples, millis_to_timestamp, timestamp_to_millis,
};

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Open (or create) the database at `db_path` and run migrations.
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path = db_path.as_ref();
        let db_path_str = db_path.to_string_lossy().to_string();

        info!("initializing SQLite backend at: {db_path_str}");

        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn sample_from_row(row: &SqliteRow) -> MetricSample {
        MetricSample {
            id: row.get("id"),
            name: row.get("name"),
            cpu_usage: row.get("cpu_usage"),
            memory_usage: row.get::<i64, _>("memory_usage").max(0) as u64,
            memory_limit: row.get::<i64, _>("memory_limit").max(0) as u64,
            network_rx_speed: row.get("network_rx_speed"),
            network_tx_speed: row.get("network_tx_speed"),
            disk_read_speed: row.get("disk_read_speed"),
            disk_write_speed: row.get("disk_write_speed"),
            status: row.get("status"),
            notifications_sent: row.get::<i64, _>("notifications_sent").max(0) as u64,
            last_update: millis_to_timestamp(row.get("last_update")),
        }
    }

    async fn service_counts(&self) -> StorageResult<HashMap<String, u64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT name, notifications_sent FROM service_notifications")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(name, count)| (name, count.max(0) as u64))
            .collect())
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip(self, sample), fields(container = %sample.name))]
    async fn upsert_sample(&self, sample: &MetricSample) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO container_metrics (
                id, name, cpu_usage, memory_usage, memory_limit,
                network_rx_speed, network_tx_speed, disk_read_speed, disk_write_speed,
                notifications_sent, status, last_update
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                cpu_usage = excluded.cpu_usage,
                memory_usage = excluded.memory_usage,
                memory_limit = excluded.memory_limit,
                network_rx_speed = excluded.network_rx_speed,
                network_tx_speed = excluded.network_tx_speed,
                disk_read_speed = excluded.disk_read_speed,
                disk_write_speed = excluded.disk_write_speed,
                status = excluded.status,
                last_update = excluded.last_update
            "#,
        )
        .bind(&sample.id)
        .bind(&sample.name)
        .bind(sample.cpu_usage)
        .bind(sample.memory_usage as i64)
        .bind(sample.memory_limit as i64)
        .bind(sample.network_rx_speed)
        .bind(sample.network_tx_speed)
        .bind(sample.disk_read_speed)
        .bind(sample.disk_write_speed)
        .bind(&sample.status)
        .bind(timestamp_to_millis(&sample.last_update))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn increment_notification_count(&self, entity: &Entity) -> StorageResult<()> {
        let now = timestamp_to_millis(&Utc::now());

        match entity {
            Entity::Container { id, name } => {
                sqlx::query(
                    r#"
                    INSERT INTO container_metrics (id, name, notifications_sent, status, last_update)
                    VALUES (?, ?, 1, ?, ?)
                    ON CONFLICT(id) DO UPDATE SET
                        notifications_sent = notifications_sent + 1
                    "#,
                )
                .bind(id)
                .bind(name)
                .bind(PLACEHOLDER_STATUS)
                .bind(now)
                .execute(&self.pool)
                .await?;
            }
            Entity::Service { name } => {
                sqlx::query(
                    r#"
                    INSERT INTO service_notifications (name, notifications_sent, last_alert)
                    VALUES (?, 1, ?)
                    ON CONFLICT(name) DO UPDATE SET
                        notifications_sent = notifications_sent + 1,
                        last_alert = excluded.last_alert
                    "#,
                )
                .bind(name)
                .bind(now)
                .execute(&self.pool)
                .await?;
            }
        }

        Ok(())
    }

    async fn get_notification_count(&self, container_id: &str) -> StorageResult<u64> {
        let count: Option<(i64,)> =
            sqlx::query_as("SELECT notifications_sent FROM container_metrics WHERE id = ?")
                .bind(container_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(count.map(|(count,)| count.max(0) as u64).unwrap_or_default())
    }

    #[instrument(skip(self))]
    async fn get_aggregated_metrics(&self) -> StorageResult<Vec<MetricSample>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, cpu_usage, memory_usage, memory_limit,
                   network_rx_speed, network_tx_speed, disk_read_speed, disk_write_speed,
                   notifications_sent, status, last_update
            FROM container_metrics
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let samples: Vec<MetricSample> = rows.iter().map(Self::sample_from_row).collect();
        let services = self.service_counts().await?;

        debug!("aggregating {} container rows", samples.len());
        Ok(aggregate_samples(samples, &services))
    }

    #[instrument(skip(self, selection))]
    async fn prune_unmonitored(&self, selection: &Selection) -> StorageResult<usize> {
        if matches!(selection, Selection::All) {
            return Ok(0);
        }

        let rows: Vec<(String, String)> = sqlx::query_as("SELECT id, name FROM container_metrics")
            .fetch_all(&self.pool)
            .await?;

        let mut deleted = 0;
        for (id, name) in rows.iter().filter(|(_, name)| !selection.matches(name)) {
            debug!("removing metrics of unmonitored container {name}");
            deleted += sqlx::query("DELETE FROM container_metrics WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?
                .rows_affected() as usize;
        }

        Ok(deleted)
    }

    #[instrument(skip(self), fields(before = %before))]
    async fn cleanup_stale(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let result = sqlx::query("DELETE FROM container_metrics WHERE last_update < ?")
            .bind(timestamp_to_millis(&before))
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() as usize;
        if deleted > 0 {
            info!("deleted {deleted} stale container records");
        }

        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("db_path".to_string(), self.db_path.clone());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite backend operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {e}");
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {e}"),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_stats(&self) -> StorageResult<String> {
        let (containers,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM container_metrics")
            .fetch_one(&self.pool)
            .await?;

        let (services,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM service_notifications")
            .fetch_one(&self.pool)
            .await?;

        let file_size = std::fs::metadata(&self.db_path)
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(format!(
            "SQLite: {containers} containers, {services} services with alerts, {:.2} MB on disk",
            file_size as f64 / 1_000_000.0
        ))
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}

//! Storage backend trait definition

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::Selection;
use crate::{Entity, MetricSample};

use super::error::StorageResult;

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: std::collections::HashMap<String, String>,
}

/// Persistence boundary for container metrics and alert counters
///
/// One record per container id. The sampler is the only writer of the
/// measured fields; the alerting path is the only writer of the
/// notification counters.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Insert or overwrite the measured fields of a container's record.
    ///
    /// `notifications_sent` of the sample is ignored: an existing counter is
    /// kept, a new record starts at zero.
    async fn upsert_sample(&self, sample: &MetricSample) -> StorageResult<()>;

    /// Count one dispatched alert for an entity.
    ///
    /// Containers are counted on their record (created as a placeholder
    /// when missing), services on a per-service counter.
    async fn increment_notification_count(&self, entity: &Entity) -> StorageResult<()>;

    /// Alerts counted for a container, 0 when unknown
    async fn get_notification_count(&self, container_id: &str) -> StorageResult<u64>;

    /// Dashboard view: one row per base name.
    ///
    /// Each group is represented by its most recently updated `running`
    /// record (or the most recent one when none is running), renamed to the
    /// base name, with the notification counts of the whole group summed,
    /// service counters included.
    async fn get_aggregated_metrics(&self) -> StorageResult<Vec<MetricSample>>;

    /// Delete records of containers the selection does not monitor.
    ///
    /// Returns the number of records deleted.
    async fn prune_unmonitored(&self, selection: &Selection) -> StorageResult<usize>;

    /// Delete records not updated since `before`.
    ///
    /// Returns the number of records deleted.
    async fn cleanup_stale(&self, before: DateTime<Utc>) -> StorageResult<usize>;

    /// Check backend health
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Human-readable stats (row counts, file size)
    async fn get_stats(&self) -> StorageResult<String>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}

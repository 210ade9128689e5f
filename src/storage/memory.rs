//! In-memory storage backend (no persistence)
//!
//! Used when storage is disabled and in tests. All data is lost on restart.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::Selection;
use crate::{Entity, MetricSample};

use super::backend::{HealthStatus, StorageBackend};
use super::error::StorageResult;
use super::schema::{PLACEHOLDER_STATUS, aggregate_samples};

/// In-memory storage backend
#[derive(Default)]
pub struct MemoryBackend {
    /// Latest sample per container id
    containers: RwLock<HashMap<String, MetricSample>>,

    /// Alert counters per service name
    services: RwLock<HashMap<String, u64>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn upsert_sample(&self, sample: &MetricSample) -> StorageResult<()> {
        let mut containers = self.containers.write().await;

        let notifications_sent = containers
            .get(&sample.id)
            .map(|existing| existing.notifications_sent)
            .unwrap_or_default();

        let mut sample = sample.clone();
        sample.notifications_sent = notifications_sent;
        containers.insert(sample.id.clone(), sample);

        Ok(())
    }

    async fn increment_notification_count(&self, entity: &Entity) -> StorageResult<()> {
        match entity {
            Entity::Container { id, name } => {
                let mut containers = self.containers.write().await;
                containers
                    .entry(id.clone())
                    .or_insert_with(|| MetricSample::empty(id, name, PLACEHOLDER_STATUS))
                    .notifications_sent += 1;
            }
            Entity::Service { name } => {
                *self.services.write().await.entry(name.clone()).or_default() += 1;
            }
        }

        Ok(())
    }

    async fn get_notification_count(&self, container_id: &str) -> StorageResult<u64> {
        Ok(self
            .containers
            .read()
            .await
            .get(container_id)
            .map(|sample| sample.notifications_sent)
            .unwrap_or_default())
    }

    async fn get_aggregated_metrics(&self) -> StorageResult<Vec<MetricSample>> {
        let rows: Vec<MetricSample> = self.containers.read().await.values().cloned().collect();
        let services = self.services.read().await.clone();

        Ok(aggregate_samples(rows, &services))
    }

    async fn prune_unmonitored(&self, selection: &Selection) -> StorageResult<usize> {
        let mut containers = self.containers.write().await;
        let before = containers.len();
        containers.retain(|_, sample| selection.matches(&sample.name));
        Ok(before - containers.len())
    }

    async fn cleanup_stale(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let mut containers = self.containers.write().await;
        let count = containers.len();
        containers.retain(|_, sample| sample.last_update >= before);

        let deleted = count - containers.len();
        debug!("in-memory backend: removed {deleted} stale records");
        Ok(deleted)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let mut metadata = HashMap::new();
        metadata.insert("backend".to_string(), "memory".to_string());
        metadata.insert(
            "containers".to_string(),
            self.containers.read().await.len().to_string(),
        );

        Ok(HealthStatus {
            healthy: true,
            message: "In-memory backend operational".to_string(),
            metadata,
        })
    }

    async fn get_stats(&self) -> StorageResult<String> {
        Ok(format!(
            "In-memory: {} containers, {} services with alerts",
            self.containers.read().await.len(),
            self.services.read().await.len()
        ))
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend");
        Ok(())
    }
}

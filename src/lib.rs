pub mod actors;
pub mod alerts;
pub mod config;
pub mod monitors;
pub mod notification;
pub mod runtime;
pub mod storage;
pub mod util;

#[cfg(feature = "api")]
pub mod api;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status a container or service must report to count as healthy.
pub const HEALTHY_STATUS: &str = "running";

/// A monitored container or swarm service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Entity {
    Container { id: String, name: String },
    Service { name: String },
}

impl Entity {
    pub fn container(id: impl Into<String>, name: impl Into<String>) -> Self {
        Entity::Container {
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn service(name: impl Into<String>) -> Self {
        Entity::Service { name: name.into() }
    }

    pub fn key(&self) -> EntityKey {
        match self {
            Entity::Container { id, .. } => EntityKey::Container(id.clone()),
            Entity::Service { name } => EntityKey::Service(name.clone()),
        }
    }

    /// Name used in alert messages and dashboards
    pub fn display_name(&self) -> &str {
        match self {
            Entity::Container { name, .. } => name,
            Entity::Service { name } => name,
        }
    }
}

/// Stable identity of an entity.
///
/// Containers are keyed by runtime id, never by name: several containers can
/// share a base name across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKey {
    Container(String),
    Service(String),
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Container(id) => write!(f, "container:{id}"),
            EntityKey::Service(name) => write!(f, "service:{name}"),
        }
    }
}

/// Point-in-time resource usage of one container.
///
/// Field names are the wire names of the dashboard stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Runtime container id
    pub id: String,

    /// Container name without the leading slash
    pub name: String,

    /// Fraction of host CPU time used since the previous runtime reading
    pub cpu_usage: f64,

    /// Memory in use (bytes)
    pub memory_usage: u64,

    /// Memory limit (bytes)
    pub memory_limit: u64,

    /// Network receive rate (bytes/second)
    pub network_rx_speed: f64,

    /// Network transmit rate (bytes/second)
    pub network_tx_speed: f64,

    /// Block device read rate (bytes/second)
    pub disk_read_speed: f64,

    /// Block device write rate (bytes/second)
    pub disk_write_speed: f64,

    /// Runtime status (running, exited, ...)
    pub status: String,

    /// Alerts dispatched for this container so far
    pub notifications_sent: u64,

    /// When the sample was taken
    pub last_update: DateTime<Utc>,
}

impl MetricSample {
    /// An empty sample for a container, all measurements zero
    pub fn empty(id: impl Into<String>, name: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            cpu_usage: 0.0,
            memory_usage: 0,
            memory_limit: 0,
            network_rx_speed: 0.0,
            network_tx_speed: 0.0,
            disk_read_speed: 0.0,
            disk_write_speed: 0.0,
            status: status.into(),
            notifications_sent: 0,
            last_update: Utc::now(),
        }
    }
}

//! Wire shapes of the Docker Engine API
//!
//! Only the fields the monitor reads are modelled. Everything else in the
//! runtime's JSON is ignored.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::util::normalize_name;

/// Entry of `GET /containers/json`
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerSummary {
    #[serde(rename = "Id")]
    pub id: String,

    #[serde(rename = "Names", default)]
    pub names: Vec<String>,

    #[serde(rename = "State", default)]
    pub state: String,
}

impl ContainerSummary {
    /// Primary name without the leading slash
    pub fn name(&self) -> &str {
        self.names
            .first()
            .map(|name| normalize_name(name))
            .unwrap_or(self.id.as_str())
    }
}

/// Body of `GET /containers/{id}/json`
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerDetail {
    #[serde(rename = "Id")]
    pub id: String,

    #[serde(rename = "Name", default)]
    pub name: String,

    #[serde(rename = "State", default)]
    pub state: ContainerState,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerState {
    #[serde(rename = "Status", default)]
    pub status: String,

    #[serde(rename = "Error", default)]
    pub error: Option<String>,

    #[serde(rename = "ExitCode", default)]
    pub exit_code: Option<i64>,
}

impl ContainerDetail {
    pub fn name(&self) -> &str {
        normalize_name(&self.name)
    }

    pub fn status(&self) -> &str {
        &self.state.status
    }

    /// Runtime error text, absent when the runtime reports an empty string
    pub fn error(&self) -> Option<&str> {
        self.state.error.as_deref().filter(|e| !e.is_empty())
    }
}

/// Label the swarm puts on every task container
pub const SWARM_SERVICE_LABEL: &str = "com.docker.swarm.service.name";

/// One line of `GET /events`
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeEvent {
    #[serde(rename = "Type", default)]
    pub kind: String,

    #[serde(rename = "Action", default)]
    pub action: String,

    #[serde(rename = "Actor", default)]
    pub actor: EventActor,

    #[serde(default)]
    pub time: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventActor {
    #[serde(rename = "ID", default)]
    pub id: String,

    #[serde(rename = "Attributes", default)]
    pub attributes: HashMap<String, String>,
}

impl RuntimeEvent {
    /// Actor name from the event attributes, without the leading slash
    pub fn name(&self) -> Option<&str> {
        self.actor
            .attributes
            .get("name")
            .map(|name| normalize_name(name))
    }

    /// Swarm service a task container belongs to (from its labels)
    pub fn swarm_service(&self) -> Option<&str> {
        self.actor
            .attributes
            .get(SWARM_SERVICE_LABEL)
            .map(String::as_str)
    }

    /// Action without a detail suffix (`health_status: healthy` -> `health_status`)
    pub fn base_action(&self) -> &str {
        self.action
            .split(':')
            .next()
            .map(str::trim)
            .unwrap_or(self.action.as_str())
    }
}

/// Body of `GET /containers/{id}/stats?stream=false`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResourceSnapshot {
    /// When the runtime took the reading
    pub read: Option<DateTime<Utc>>,
    pub cpu_stats: CpuStats,
    pub precpu_stats: CpuStats,
    pub memory_stats: MemoryStats,
    pub networks: Option<HashMap<String, NetworkStats>>,
    pub blkio_stats: BlkioStats,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CpuStats {
    pub cpu_usage: CpuUsage,
    pub system_cpu_usage: Option<u64>,
    pub online_cpus: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CpuUsage {
    pub total_usage: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MemoryStats {
    pub usage: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NetworkStats {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BlkioStats {
    pub io_service_bytes_recursive: Option<Vec<BlkioEntry>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BlkioEntry {
    pub op: String,
    pub value: u64,
}

/// Entry of `GET /services`
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSummary {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "Spec", default)]
    pub spec: ServiceSpec,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceSpec {
    #[serde(rename = "Name", default)]
    pub name: String,
}

impl ServiceSummary {
    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

/// Entry of `GET /tasks`
#[derive(Debug, Clone, Deserialize)]
pub struct Task {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "ServiceID", default)]
    pub service_id: String,

    #[serde(rename = "Status", default)]
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskStatus {
    #[serde(rename = "State", default)]
    pub state: String,

    #[serde(rename = "Timestamp", default)]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(rename = "Err", default)]
    pub err: Option<String>,
}

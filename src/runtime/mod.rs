//! Container runtime boundary
//!
//! Everything the monitor needs from the container runtime goes through the
//! [`RuntimeClient`] trait: listing and inspecting containers, the event
//! stream, resource snapshots and swarm services/tasks. [`DockerClient`]
//! implements it against the Docker Engine HTTP API; tests provide fakes.

pub mod docker;
pub mod error;
pub mod types;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use docker::DockerClient;
pub use error::{RuntimeError, RuntimeResult};
pub use types::{
    ContainerDetail, ContainerSummary, ResourceSnapshot, RuntimeEvent, ServiceSummary, Task,
};

/// Filter for [`RuntimeClient::list_containers`]
#[derive(Debug, Clone, Default)]
pub struct ContainerFilter {
    /// Include stopped containers
    pub all: bool,

    /// Only containers whose name contains one of these (runtime semantics)
    pub names: Option<Vec<String>>,
}

impl ContainerFilter {
    pub fn all() -> Self {
        Self {
            all: true,
            names: None,
        }
    }

    pub fn named(names: Vec<String>) -> Self {
        Self {
            all: true,
            names: Some(names),
        }
    }
}

/// Filter for [`RuntimeClient::subscribe_events`]
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub types: Vec<String>,
    pub actions: Vec<String>,
}

/// Event types the health feed subscribes to
pub const HEALTH_EVENT_TYPES: &[&str] = &["container", "service"];

/// Event actions the health feed subscribes to
pub const HEALTH_EVENT_ACTIONS: &[&str] = &[
    "start",
    "stop",
    "die",
    "kill",
    "update",
    "remove",
    "create",
    "health_status",
    "shutdown",
    "destroy",
    "pause",
    "unpause",
];

impl EventFilter {
    /// The fixed filter used by the health feed
    pub fn health_feed() -> Self {
        Self {
            types: HEALTH_EVENT_TYPES.iter().map(|s| s.to_string()).collect(),
            actions: HEALTH_EVENT_ACTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Whether an event passes this filter (empty lists match everything)
    pub fn accepts(&self, event: &RuntimeEvent) -> bool {
        let type_ok = self.types.is_empty() || self.types.iter().any(|t| *t == event.kind);
        let action_ok =
            self.actions.is_empty() || self.actions.iter().any(|a| a == event.base_action());
        type_ok && action_ok
    }
}

/// Live stream of runtime events.
///
/// Decoding failures of single events are delivered as `Err` items and the
/// stream goes on; `None` from [`EventSubscription::next`] means the
/// runtime closed the feed.
pub struct EventSubscription {
    receiver: mpsc::Receiver<RuntimeResult<RuntimeEvent>>,
}

impl EventSubscription {
    pub fn new(receiver: mpsc::Receiver<RuntimeResult<RuntimeEvent>>) -> Self {
        Self { receiver }
    }

    pub async fn next(&mut self) -> Option<RuntimeResult<RuntimeEvent>> {
        self.receiver.recv().await
    }
}

/// Read access to a container runtime
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    async fn list_containers(&self, filter: &ContainerFilter)
    -> RuntimeResult<Vec<ContainerSummary>>;

    /// Current detail of one container, [`RuntimeError::NotFound`] once it is gone
    async fn inspect_container(&self, id: &str) -> RuntimeResult<ContainerDetail>;

    async fn subscribe_events(&self, filter: &EventFilter) -> RuntimeResult<EventSubscription>;

    /// One-shot resource reading (the runtime does not keep streaming)
    async fn resource_snapshot(&self, id: &str) -> RuntimeResult<ResourceSnapshot>;

    async fn list_services(&self) -> RuntimeResult<Vec<ServiceSummary>>;

    /// Tasks of a service, identified by service name
    async fn list_tasks(&self, service: &str) -> RuntimeResult<Vec<Task>>;
}

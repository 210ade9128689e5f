//! Message types for actor communication
//!
//! 1. **Commands**: Request/response messages sent to one actor via mpsc
//! 2. **Replies**: oneshot channels carried inside commands
//! 3. **Pushes**: dashboard updates fan out over a broadcast channel

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::monitors::StateRecord;
use crate::{Entity, EntityKey};

use super::broadcaster::Subscription;

/// An alert admitted by the debounce gate, on its way to the sink
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRequest {
    pub entity: Entity,

    /// Status (or action) that caused the alert
    pub status: String,

    /// Runtime error text, if any
    pub error: Option<String>,

    /// When the failure happened
    pub at: DateTime<Utc>,
}

/// Outcome of one observation in the health actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// An alert was forwarded to the alert actor
    Alerted,

    /// A failure was seen but an alert went out too recently
    Debounced,

    /// Nothing to alert on
    NoTransition,
}

/// Commands that can be sent to the HealthActor
#[derive(Debug)]
pub enum HealthCommand {
    /// Record a status without evaluating it (startup seeding)
    Seed {
        key: EntityKey,
        status: String,
        at: DateTime<Utc>,
    },

    /// Compare a container's live status with its record and update it.
    ///
    /// Alerts when the record was healthy and the new status is not.
    ObserveContainer {
        entity: Entity,
        status: String,
        error: Option<String>,
        at: DateTime<Utc>,
        respond_to: oneshot::Sender<Decision>,
    },

    /// A service event that directly signals failure
    ServiceFailureSignal {
        name: String,
        action: String,
        at: DateTime<Utc>,
        respond_to: oneshot::Sender<Decision>,
    },

    /// A fresh failed task found by the swarm poller.
    ///
    /// Alerts only while the service record is healthy; the record then
    /// takes the task's state.
    ServiceTaskFailure {
        name: String,
        state: String,
        error: Option<String>,

        /// Task status timestamp, reported in the alert
        failed_at: DateTime<Utc>,

        /// Observation time, used for the debounce
        at: DateTime<Utc>,
        respond_to: oneshot::Sender<Decision>,
    },

    /// No fresh failed task: reset the service record to healthy
    ServiceHealthy { name: String, at: DateTime<Utc> },

    /// Drop the record of an entity that no longer exists
    Forget {
        key: EntityKey,
        respond_to: oneshot::Sender<bool>,
    },

    GetState {
        key: EntityKey,
        respond_to: oneshot::Sender<Option<StateRecord>>,
    },

    GetLastAlert {
        key: EntityKey,
        respond_to: oneshot::Sender<Option<DateTime<Utc>>>,
    },

    Shutdown,
}

/// Commands that can be sent to the AlertActor
#[derive(Debug)]
pub enum AlertCommand {
    /// Format and deliver an alert, then count it
    Dispatch(AlertRequest),

    GetStats {
        respond_to: oneshot::Sender<AlertStats>,
    },

    /// Gracefully shut down the alert actor
    ///
    /// Alerts queued before the command are still delivered.
    Shutdown,
}

/// Delivery counters of the alert actor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertStats {
    pub sent: u64,
    pub failed: u64,
}

/// Commands that can be sent to the SamplerActor
#[derive(Debug)]
pub enum SamplerCommand {
    /// Run one tick immediately
    SampleNow {
        respond_to: oneshot::Sender<SampleReport>,
    },

    /// Gracefully shut down the sampler
    ///
    /// A tick in flight completes first.
    Shutdown,
}

/// Summary of one sampler tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleReport {
    /// Samples written
    pub sampled: usize,

    /// Containers skipped because they were sampled recently
    pub skipped: usize,

    /// Containers that disappeared before their snapshot
    pub gone: usize,

    /// Snapshots that failed for other reasons
    pub failed: usize,
}

/// Commands that can be sent to the BroadcastActor
#[derive(Debug)]
pub enum BroadcastCommand {
    /// Register a subscriber: current snapshot plus future pushes
    Subscribe {
        respond_to: oneshot::Sender<anyhow::Result<Subscription>>,
    },

    Shutdown,
}

/// Commands that can be sent to the SwarmPollerActor
#[derive(Debug)]
pub enum PollerCommand {
    /// Run one poll immediately
    PollNow {
        respond_to: oneshot::Sender<anyhow::Result<()>>,
    },

    Shutdown,
}

/// Commands that can be sent to the EventFeedActor
#[derive(Debug)]
pub enum FeedCommand {
    Shutdown,
}

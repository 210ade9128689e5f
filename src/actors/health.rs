//! HealthActor - Single owner of entity state and alert debounce
//!
//! The event feed and the swarm poller both report observations here. The
//! actor handles one command at a time, so the compare-and-update of a
//! state record and the debounce check-and-set happen as one step and two
//! sources observing the same failure cannot both alert.
//!
//! ```text
//! EventFeed ──┐
//!             ├─→ HealthActor (tracker + debouncer) ─→ AlertActor
//! SwarmPoller ┘
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, instrument, trace};

use crate::monitors::{Debouncer, StateRecord, StateTracker};
use crate::{Entity, EntityKey, HEALTHY_STATUS};

use super::alert::AlertHandle;
use super::messages::{AlertRequest, Decision, HealthCommand};

pub struct HealthActor {
    tracker: StateTracker,
    debouncer: Debouncer,
    alerts: AlertHandle,
    command_rx: mpsc::Receiver<HealthCommand>,
}

impl HealthActor {
    pub fn new(
        cooldown: Duration,
        alerts: AlertHandle,
        command_rx: mpsc::Receiver<HealthCommand>,
    ) -> Self {
        Self {
            tracker: StateTracker::new(),
            debouncer: Debouncer::new(cooldown),
            alerts,
            command_rx,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting health actor");

        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                HealthCommand::Seed { key, status, at } => {
                    trace!("seeding {key} as {status}");
                    self.tracker.set(key, status, at);
                }

                HealthCommand::ObserveContainer {
                    entity,
                    status,
                    error,
                    at,
                    respond_to,
                } => {
                    let decision = self.observe_container(entity, status, error, at).await;
                    let _ = respond_to.send(decision);
                }

                HealthCommand::ServiceFailureSignal {
                    name,
                    action,
                    at,
                    respond_to,
                } => {
                    let decision = self
                        .alert_if_admitted(Entity::service(name), action, None, at, at)
                        .await;
                    let _ = respond_to.send(decision);
                }

                HealthCommand::ServiceTaskFailure {
                    name,
                    state,
                    error,
                    failed_at,
                    at,
                    respond_to,
                } => {
                    let decision = self
                        .service_task_failure(name, state, error, failed_at, at)
                        .await;
                    let _ = respond_to.send(decision);
                }

                HealthCommand::ServiceHealthy { name, at } => {
                    let key = EntityKey::Service(name);
                    if let Some(previous) = self.tracker.set(key.clone(), HEALTHY_STATUS, at)
                        && previous.status != HEALTHY_STATUS
                    {
                        info!("{key} recovered (was {})", previous.status);
                    }
                }

                HealthCommand::Forget { key, respond_to } => {
                    let removed = self.tracker.remove(&key).is_some();
                    if removed {
                        debug!("forgot state of {key}");
                    }
                    let _ = respond_to.send(removed);
                }

                HealthCommand::GetState { key, respond_to } => {
                    let _ = respond_to.send(self.tracker.get(&key).cloned());
                }

                HealthCommand::GetLastAlert { key, respond_to } => {
                    let _ = respond_to.send(self.debouncer.last_alert_at(&key));
                }

                HealthCommand::Shutdown => {
                    debug!("received shutdown command");
                    break;
                }
            }
        }

        debug!("health actor stopped with {} records", self.tracker.len());
    }

    async fn observe_container(
        &mut self,
        entity: Entity,
        status: String,
        error: Option<String>,
        at: DateTime<Utc>,
    ) -> Decision {
        let previous = self.tracker.set(entity.key(), status.clone(), at);

        let was_healthy = previous.is_some_and(|record| record.status == HEALTHY_STATUS);
        if !was_healthy || status == HEALTHY_STATUS {
            return Decision::NoTransition;
        }

        info!("{} changed from {HEALTHY_STATUS} to {status}", entity.display_name());
        self.alert_if_admitted(entity, status, error, at, at).await
    }

    async fn service_task_failure(
        &mut self,
        name: String,
        state: String,
        error: Option<String>,
        failed_at: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Decision {
        let key = EntityKey::Service(name.clone());

        let healthy = self
            .tracker
            .get(&key)
            .is_some_and(|record| record.status == HEALTHY_STATUS);
        if !healthy {
            return Decision::NoTransition;
        }

        let decision = self
            .alert_if_admitted(Entity::service(name), state.clone(), error, failed_at, at)
            .await;

        if decision == Decision::Alerted {
            self.tracker.set(key, state, at);
        }

        decision
    }

    /// Debounce on `now`; the alert itself reports `failed_at`.
    async fn alert_if_admitted(
        &mut self,
        entity: Entity,
        status: String,
        error: Option<String>,
        failed_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Decision {
        if !self.debouncer.should_alert(&entity.key(), now) {
            debug!(
                "alert for {} suppressed by debounce ({}s cooldown)",
                entity.key(),
                self.debouncer.cooldown().num_seconds()
            );
            return Decision::Debounced;
        }

        let request = AlertRequest {
            entity,
            status,
            error,
            at: failed_at,
        };

        if let Err(e) = self.alerts.dispatch(request).await {
            error!("{e:#}");
        }

        Decision::Alerted
    }
}

/// Handle for controlling a HealthActor
#[derive(Clone)]
pub struct HealthHandle {
    sender: mpsc::Sender<HealthCommand>,
}

impl HealthHandle {
    pub fn spawn(cooldown: Duration, alerts: AlertHandle) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = HealthActor::new(cooldown, alerts, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> HealthCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .context("health actor is not running")?;

        rx.await.context("health actor dropped the request")
    }

    pub async fn seed(&self, key: EntityKey, status: impl Into<String>) -> Result<()> {
        self.sender
            .send(HealthCommand::Seed {
                key,
                status: status.into(),
                at: Utc::now(),
            })
            .await
            .context("failed to send Seed command")
    }

    pub async fn observe_container(
        &self,
        entity: Entity,
        status: impl Into<String>,
        error: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Decision> {
        let status = status.into();
        self.request(|respond_to| HealthCommand::ObserveContainer {
            entity,
            status,
            error,
            at,
            respond_to,
        })
        .await
    }

    pub async fn service_failure_signal(
        &self,
        name: impl Into<String>,
        action: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<Decision> {
        let (name, action) = (name.into(), action.into());
        self.request(|respond_to| HealthCommand::ServiceFailureSignal {
            name,
            action,
            at,
            respond_to,
        })
        .await
    }

    /// Report a failed task that failed at `failed_at`, observed at `at`
    pub async fn service_task_failure(
        &self,
        name: impl Into<String>,
        state: impl Into<String>,
        error: Option<String>,
        failed_at: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<Decision> {
        let (name, state) = (name.into(), state.into());
        self.request(|respond_to| HealthCommand::ServiceTaskFailure {
            name,
            state,
            error,
            failed_at,
            at,
            respond_to,
        })
        .await
    }

    pub async fn service_healthy(&self, name: impl Into<String>, at: DateTime<Utc>) -> Result<()> {
        self.sender
            .send(HealthCommand::ServiceHealthy {
                name: name.into(),
                at,
            })
            .await
            .context("failed to send ServiceHealthy command")
    }

    /// Drop an entity's record, returning whether one existed
    pub async fn forget(&self, key: EntityKey) -> Result<bool> {
        self.request(|respond_to| HealthCommand::Forget { key, respond_to })
            .await
    }

    pub async fn get_state(&self, key: EntityKey) -> Result<Option<StateRecord>> {
        self.request(|respond_to| HealthCommand::GetState { key, respond_to })
            .await
    }

    pub async fn last_alert_at(&self, key: EntityKey) -> Result<Option<DateTime<Utc>>> {
        self.request(|respond_to| HealthCommand::GetLastAlert { key, respond_to })
            .await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(HealthCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")
    }
}

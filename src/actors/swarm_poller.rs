//! SwarmPollerActor - Periodic fallback scan of swarm tasks
//!
//! The event feed can miss or delay task failures. Every tick this actor
//! lists the monitored services and their tasks; a recent failed task is
//! reported to the health actor, a service without one is reset to healthy.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, instrument, trace, warn};

use crate::config::Selection;
use crate::monitors::swarm::latest_fresh_failure;
use crate::runtime::RuntimeClient;

use super::health::HealthHandle;
use super::messages::PollerCommand;

pub struct SwarmPollerActor {
    runtime: Arc<dyn RuntimeClient>,
    health: HealthHandle,
    selection: Selection,
    poll_interval: Duration,
    freshness: chrono::Duration,
    command_rx: mpsc::Receiver<PollerCommand>,
}

impl SwarmPollerActor {
    pub fn new(
        runtime: Arc<dyn RuntimeClient>,
        health: HealthHandle,
        selection: Selection,
        poll_interval: Duration,
        freshness: chrono::Duration,
        command_rx: mpsc::Receiver<PollerCommand>,
    ) -> Self {
        Self {
            runtime,
            health,
            selection,
            poll_interval,
            freshness,
            command_rx,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting swarm poller");

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll().await {
                        warn!("swarm poll failed: {e:#}");
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        PollerCommand::PollNow { respond_to } => {
                            let _ = respond_to.send(self.poll().await);
                        }
                        PollerCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("swarm poller stopped");
    }

    async fn poll(&self) -> Result<()> {
        let services = self
            .runtime
            .list_services()
            .await
            .context("failed to list services")?;

        for service in services.iter().filter(|s| self.selection.matches_exact(s.name())) {
            // one failing service must not stop the others
            if let Err(e) = self.check_service(service.name()).await {
                warn!("failed to check service {}: {e:#}", service.name());
            }
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn check_service(&self, name: &str) -> Result<()> {
        let tasks = self
            .runtime
            .list_tasks(name)
            .await
            .context("failed to list tasks")?;

        let now = Utc::now();
        match latest_fresh_failure(&tasks, now, self.freshness) {
            Some(task) => {
                let failed_at = task.status.timestamp.unwrap_or(now);
                let decision = self
                    .health
                    .service_task_failure(
                        name,
                        task.status.state.clone(),
                        task.status.err.clone(),
                        failed_at,
                        now,
                    )
                    .await?;
                trace!("task {} is {}: {decision:?}", task.id, task.status.state);
            }
            None => self.health.service_healthy(name, now).await?,
        }

        Ok(())
    }
}

/// Handle for controlling a SwarmPollerActor
#[derive(Clone)]
pub struct SwarmPollerHandle {
    sender: mpsc::Sender<PollerCommand>,
}

impl SwarmPollerHandle {
    pub fn spawn(
        runtime: Arc<dyn RuntimeClient>,
        health: HealthHandle,
        selection: Selection,
        poll_interval: Duration,
        freshness: chrono::Duration,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let actor =
            SwarmPollerActor::new(runtime, health, selection, poll_interval, freshness, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Poll immediately, bypassing the ticker
    pub async fn poll_now(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PollerCommand::PollNow { respond_to: tx })
            .await
            .context("failed to send PollNow command")?;

        rx.await.context("failed to receive PollNow response")?
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(PollerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")
    }
}


//! EventFeedActor - Consumes the runtime event stream
//!
//! Seeds the health actor with the current container (and service) states,
//! then reads lifecycle events one at a time. Each event is fully handled,
//! including the runtime inspection, before the next one is read.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::Selection;
use crate::runtime::{
    ContainerFilter, EventFilter, EventSubscription, RuntimeClient, RuntimeError, RuntimeEvent,
};
use crate::{Entity, EntityKey, HEALTHY_STATUS};

use super::health::HealthHandle;
use super::messages::FeedCommand;

/// Service event actions that signal a failure
pub const SERVICE_FAILURE_ACTIONS: &[&str] = &["remove", "die", "kill", "shutdown", "failed"];

/// Why a subscription stopped being consumed
#[derive(Debug, PartialEq, Eq)]
enum FeedOutcome {
    Closed,
    Shutdown,
}

/// Settings of the event feed
#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub selection: Selection,

    /// Also seed and watch swarm services
    pub swarm: bool,

    /// Resubscribe this long after the feed closes; stop when absent
    pub resubscribe_delay: Option<Duration>,
}

pub struct EventFeedActor {
    runtime: Arc<dyn RuntimeClient>,
    health: HealthHandle,
    settings: FeedSettings,
    filter: EventFilter,
    command_rx: mpsc::Receiver<FeedCommand>,
}

impl EventFeedActor {
    pub fn new(
        runtime: Arc<dyn RuntimeClient>,
        health: HealthHandle,
        settings: FeedSettings,
        command_rx: mpsc::Receiver<FeedCommand>,
    ) -> Self {
        Self {
            runtime,
            health,
            settings,
            filter: EventFilter::health_feed(),
            command_rx,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting event feed actor");

        self.seed_states().await;

        loop {
            let outcome = match self.runtime.subscribe_events(&self.filter).await {
                Ok(subscription) => {
                    info!("subscribed to runtime events");
                    self.consume(subscription).await
                }
                Err(e) => {
                    error!("failed to subscribe to runtime events: {e}");
                    FeedOutcome::Closed
                }
            };

            if outcome == FeedOutcome::Shutdown {
                break;
            }

            error!("runtime event feed closed");

            let Some(delay) = self.settings.resubscribe_delay else {
                break;
            };

            info!("resubscribing in {delay:?}");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                Some(FeedCommand::Shutdown) = self.command_rx.recv() => break,
            }
        }

        debug!("event feed actor stopped");
    }

    async fn consume(&mut self, mut subscription: EventSubscription) -> FeedOutcome {
        loop {
            tokio::select! {
                Some(cmd) = self.command_rx.recv() => match cmd {
                    FeedCommand::Shutdown => {
                        debug!("received shutdown command");
                        return FeedOutcome::Shutdown;
                    }
                },

                item = subscription.next() => match item {
                    Some(Ok(event)) if !self.filter.accepts(&event) => {
                        trace!("ignoring {} {} event", event.kind, event.action);
                    }
                    Some(Ok(event)) => self.handle_event(event).await,
                    Some(Err(e @ RuntimeError::Decode(_))) => {
                        warn!("dropping undecodable runtime event: {e}");
                    }
                    Some(Err(e)) => error!("runtime event stream error: {e}"),
                    None => return FeedOutcome::Closed,
                },
            }
        }
    }

    /// Record the current status of every monitored container and service
    #[instrument(skip(self))]
    async fn seed_states(&self) {
        match self.runtime.list_containers(&ContainerFilter::all()).await {
            Ok(containers) => {
                for container in containers
                    .iter()
                    .filter(|c| self.settings.selection.matches_exact(c.name()))
                {
                    let key = EntityKey::Container(container.id.clone());
                    if let Err(e) = self.health.seed(key, container.state.clone()).await {
                        error!("{e:#}");
                    }
                }
            }
            Err(e) => warn!("failed to list containers for initial states: {e}"),
        }

        if !self.settings.swarm {
            return;
        }

        match self.runtime.list_services().await {
            Ok(services) => {
                for service in services
                    .iter()
                    .filter(|s| self.settings.selection.matches_exact(s.name()))
                {
                    let key = EntityKey::Service(service.name().to_string());
                    if let Err(e) = self.health.seed(key, HEALTHY_STATUS).await {
                        error!("{e:#}");
                    }
                }
            }
            Err(e) => warn!("failed to list services for initial states: {e}"),
        }
    }

    async fn handle_event(&self, event: RuntimeEvent) {
        let result = match event.kind.as_str() {
            "container" => self.handle_container_event(&event).await,
            "service" => self.handle_service_event(&event).await,
            other => {
                trace!("ignoring {other} event");
                Ok(())
            }
        };

        if let Err(e) = result {
            error!("failed to process {} event {}: {e:#}", event.kind, event.actor.id);
        }
    }

    #[instrument(skip_all, fields(container = event.name(), action = %event.action))]
    async fn handle_container_event(&self, event: &RuntimeEvent) -> Result<()> {
        let Some(name) = event.name() else {
            return Ok(());
        };
        let id = &event.actor.id;
        if id.is_empty() || !self.settings.selection.matches_exact(name) {
            trace!("container is not monitored");
            return Ok(());
        }
        if self.settings.swarm
            && let Some(service) = event.swarm_service()
            && self.settings.selection.matches_exact(service)
        {
            trace!("task of monitored service {service}, left to the swarm poller");
            return Ok(());
        }

        match self.runtime.inspect_container(id).await {
            Ok(detail) => {
                let entity = Entity::container(id.clone(), name);
                let error = detail.error().map(str::to_string);
                let decision = self
                    .health
                    .observe_container(entity, detail.status(), error, Utc::now())
                    .await?;
                trace!("observed {}: {decision:?}", detail.status());
            }
            Err(RuntimeError::NotFound(_)) => {
                debug!("container is gone, dropping its state");
                self.health
                    .forget(EntityKey::Container(id.clone()))
                    .await
                    .context("failed to forget container state")?;
            }
            Err(e) => warn!("failed to inspect container: {e}"),
        }

        Ok(())
    }

    #[instrument(skip_all, fields(service = event.name(), action = %event.action))]
    async fn handle_service_event(&self, event: &RuntimeEvent) -> Result<()> {
        let Some(name) = event.name() else {
            return Ok(());
        };
        if !self.settings.selection.matches_exact(name) {
            trace!("service is not monitored");
            return Ok(());
        }

        let action = event.base_action();
        if !SERVICE_FAILURE_ACTIONS.contains(&action) {
            return Ok(());
        }

        let decision = self
            .health
            .service_failure_signal(name, action, Utc::now())
            .await?;
        trace!("service failure signal: {decision:?}");

        Ok(())
    }
}

/// Handle for controlling an EventFeedActor
#[derive(Clone)]
pub struct EventFeedHandle {
    sender: mpsc::Sender<FeedCommand>,
}

impl EventFeedHandle {
    pub fn spawn(
        runtime: Arc<dyn RuntimeClient>,
        health: HealthHandle,
        settings: FeedSettings,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(4);

        let actor = EventFeedActor::new(runtime, health, settings, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(FeedCommand::Shutdown)
            .await
            .context("event feed already stopped")
    }
}

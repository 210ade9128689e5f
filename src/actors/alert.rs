//! AlertActor - Delivers admitted alerts and counts them
//!
//! The health actor decides *whether* to alert; this actor only formats,
//! delivers and counts. Delivery is best effort: a failed delivery is logged
//! and never retried.
//!
//! ```text
//! HealthActor → AlertRequest → format → Notifier::send_alert → count per entity
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, instrument, warn};

use crate::alerts::AlertFormatter;
use crate::notification::Notifier;
use crate::storage::StorageBackend;

use super::messages::{AlertCommand, AlertRequest, AlertStats};

/// Alerts queued between the health actor and delivery
const ALERT_QUEUE: usize = 256;

/// Actor that delivers alerts to the configured sink
pub struct AlertActor {
    formatter: AlertFormatter,
    notifier: Arc<dyn Notifier>,
    storage: Arc<dyn StorageBackend>,
    command_rx: mpsc::Receiver<AlertCommand>,
    stats: AlertStats,
}

impl AlertActor {
    pub fn new(
        formatter: AlertFormatter,
        notifier: Arc<dyn Notifier>,
        storage: Arc<dyn StorageBackend>,
        command_rx: mpsc::Receiver<AlertCommand>,
    ) -> Self {
        Self {
            formatter,
            notifier,
            storage,
            command_rx,
            stats: AlertStats::default(),
        }
    }

    #[instrument(skip(self), fields(sink = self.notifier.name()))]
    pub async fn run(mut self) {
        debug!("starting alert actor");

        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                AlertCommand::Dispatch(alert) => self.dispatch(alert).await,
                AlertCommand::GetStats { respond_to } => {
                    let _ = respond_to.send(self.stats);
                }
                AlertCommand::Shutdown => {
                    debug!("received shutdown command");
                    break;
                }
            }
        }

        debug!("alert actor stopped");
    }

    #[instrument(skip(self, alert), fields(entity = %alert.entity.key(), status = %alert.status))]
    async fn dispatch(&mut self, alert: AlertRequest) {
        let message = self.formatter.format(&alert);

        if let Err(e) = self.notifier.send_alert(&message).await {
            error!("failed to deliver alert for {}: {e}", alert.entity.display_name());
            self.stats.failed += 1;
            return;
        }

        info!("alert delivered for {}", alert.entity.display_name());
        self.stats.sent += 1;

        if let Err(e) = self.storage.increment_notification_count(&alert.entity).await {
            warn!("failed to count notification: {e}");
        }
    }
}

/// Handle for controlling an AlertActor
#[derive(Clone)]
pub struct AlertHandle {
    sender: mpsc::Sender<AlertCommand>,
}

impl AlertHandle {
    pub fn spawn(
        formatter: AlertFormatter,
        notifier: Arc<dyn Notifier>,
        storage: Arc<dyn StorageBackend>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(ALERT_QUEUE);

        let actor = AlertActor::new(formatter, notifier, storage, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Queue an alert for delivery
    pub async fn dispatch(&self, alert: AlertRequest) -> Result<()> {
        self.sender
            .send(AlertCommand::Dispatch(alert))
            .await
            .context("failed to queue alert")
    }

    pub async fn get_stats(&self) -> Result<AlertStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AlertCommand::GetStats { respond_to: tx })
            .await
            .context("failed to send GetStats command")?;

        rx.await.context("failed to receive alert stats")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(AlertCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")
    }
}

//! BroadcastActor - Coalesces metric updates for dashboard subscribers
//!
//! The sampler may report new data every tick. Subscribers get at most one
//! push per throttle window, sent when the window closes and carrying the
//! aggregated view as of that moment (trailing edge).
//!
//! ```text
//! notify ─┬─ opens window ──────── 2s ──────→ read storage → broadcast
//! notify ─┤  (coalesced)
//! notify ─┘  (coalesced)
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, instrument, trace, warn};

use crate::MetricSample;
use crate::storage::StorageBackend;

use super::messages::BroadcastCommand;

/// Pushes buffered per subscriber before it starts lagging
const PUSH_BUFFER: usize = 16;

/// Textual envelope sent to dashboard subscribers
///
/// Serializes as `{"type": "metrics", "data": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum MetricsEnvelope {
    Metrics(Vec<MetricSample>),
}

/// A new subscriber's view: the current state and every later push
#[derive(Debug)]
pub struct Subscription {
    pub snapshot: Arc<MetricsEnvelope>,
    pub updates: broadcast::Receiver<Arc<MetricsEnvelope>>,
}

pub struct BroadcastActor {
    storage: Arc<dyn StorageBackend>,
    throttle: Duration,
    notify_rx: mpsc::Receiver<()>,
    command_rx: mpsc::Receiver<BroadcastCommand>,
    push_tx: broadcast::Sender<Arc<MetricsEnvelope>>,

    /// End of the open window, if any
    deadline: Option<Instant>,
}

impl BroadcastActor {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        throttle: Duration,
        notify_rx: mpsc::Receiver<()>,
        command_rx: mpsc::Receiver<BroadcastCommand>,
    ) -> Self {
        let (push_tx, _) = broadcast::channel(PUSH_BUFFER);

        Self {
            storage,
            throttle,
            notify_rx,
            command_rx,
            push_tx,
            deadline: None,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting broadcast actor");

        loop {
            let deadline = self.deadline;

            tokio::select! {
                Some(()) = self.notify_rx.recv() => {
                    if self.deadline.is_none() {
                        trace!("opening broadcast window");
                        self.deadline = Some(Instant::now() + self.throttle);
                    }
                }

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.deadline = None;
                    self.push().await;
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        BroadcastCommand::Subscribe { respond_to } => {
                            let _ = respond_to.send(self.subscribe().await);
                        }
                        BroadcastCommand::Shutdown => {
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

        debug!("broadcast actor stopped");
    }

    async fn snapshot(&self) -> Result<Arc<MetricsEnvelope>> {
        let metrics = self
            .storage
            .get_aggregated_metrics()
            .await
            .context("failed to read aggregated metrics")?;

        Ok(Arc::new(MetricsEnvelope::Metrics(metrics)))
    }

    async fn subscribe(&self) -> Result<Subscription> {
        // subscribe before reading so no push falls between snapshot and receiver
        let updates = self.push_tx.subscribe();
        let snapshot = self.snapshot().await?;

        Ok(Subscription { snapshot, updates })
    }

    async fn push(&self) {
        if self.push_tx.receiver_count() == 0 {
            trace!("no subscribers, skipping push");
            return;
        }

        match self.snapshot().await {
            Ok(envelope) => match self.push_tx.send(envelope) {
                Ok(receivers) => trace!("pushed metrics to {receivers} subscribers"),
                Err(_) => trace!("subscribers left before the push"),
            },
            Err(e) => error!("{e:#}"),
        }
    }
}

/// Handle for controlling a BroadcastActor
#[derive(Clone)]
pub struct BroadcastHandle {
    sender: mpsc::Sender<BroadcastCommand>,
    notify: mpsc::Sender<()>,
}

impl BroadcastHandle {
    pub fn spawn(storage: Arc<dyn StorageBackend>, throttle: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        // one pending notification is enough: the push reads the latest state
        let (notify_tx, notify_rx) = mpsc::channel(1);

        let actor = BroadcastActor::new(storage, throttle, notify_rx, cmd_rx);
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            notify: notify_tx,
        }
    }

    /// Report that stored metrics changed. Never waits.
    pub fn notify_metrics_changed(&self) {
        match self.notify.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => {}
            Err(mpsc::error::TrySendError::Closed(())) => {
                trace!("broadcast actor stopped, dropping notification");
            }
        }
    }

    pub async fn subscribe(&self) -> Result<Subscription> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(BroadcastCommand::Subscribe { respond_to: tx })
            .await
            .context("failed to send Subscribe command")?;

        rx.await.context("failed to receive subscription")?
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(BroadcastCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")
    }
}

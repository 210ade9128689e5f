//! SamplerActor - Periodic per-container resource sampling
//!
//! Every tick the sampler lists the monitored containers, fetches one
//! resource snapshot for each container not sampled recently, turns the
//! cumulative counters into rates and writes the result to storage.
//!
//! Snapshots are fetched in concurrent batches; a batch is joined and its
//! results applied before the next batch starts, so the rate bases are only
//! ever touched by this task and an id is never fetched twice per tick.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, info, instrument, trace, warn};

use crate::MetricSample;
use crate::config::Selection;
use crate::monitors::RateBasis;
use crate::monitors::rates::cpu_fraction;
use crate::runtime::{
    ContainerFilter, ContainerSummary, ResourceSnapshot, RuntimeClient, RuntimeError,
    RuntimeResult,
};
use crate::storage::StorageBackend;

use super::broadcaster::BroadcastHandle;
use super::messages::{SampleReport, SamplerCommand};

/// How often stale records are purged when retention is configured
const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Settings of the metrics sampler
#[derive(Debug, Clone)]
pub struct SamplerSettings {
    pub selection: Selection,

    /// Tick period
    pub interval: Duration,

    /// Containers sampled more recently than this are skipped
    pub fresh_window: chrono::Duration,

    /// Snapshots fetched concurrently
    pub batch_size: usize,

    /// Records not updated for this long are deleted
    pub retention: Option<chrono::Duration>,
}

pub struct SamplerActor {
    runtime: Arc<dyn RuntimeClient>,
    storage: Arc<dyn StorageBackend>,
    broadcaster: BroadcastHandle,
    settings: SamplerSettings,
    command_rx: mpsc::Receiver<SamplerCommand>,

    /// Previous counters per container id
    bases: HashMap<String, RateBasis>,

    /// Last sample per container id, with the stored notification count
    cache: HashMap<String, MetricSample>,

    last_cleanup: Option<Instant>,
}

impl SamplerActor {
    pub fn new(
        runtime: Arc<dyn RuntimeClient>,
        storage: Arc<dyn StorageBackend>,
        broadcaster: BroadcastHandle,
        settings: SamplerSettings,
        command_rx: mpsc::Receiver<SamplerCommand>,
    ) -> Self {
        Self {
            runtime,
            storage,
            broadcaster,
            settings,
            command_rx,
            bases: HashMap::new(),
            cache: HashMap::new(),
            last_cleanup: None,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting metrics sampler");

        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    trace!("sampler tick: {report:?}");
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        SamplerCommand::SampleNow { respond_to } => {
                            let _ = respond_to.send(self.tick().await);
                        }
                        SamplerCommand::Shutdown => {
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

        debug!("metrics sampler stopped");
    }

    async fn tick(&mut self) -> SampleReport {
        let mut report = SampleReport::default();

        if self.settings.selection.is_empty() {
            return report;
        }

        let filter = match self.settings.selection.names() {
            Some(names) => ContainerFilter::named(names),
            None => ContainerFilter::all(),
        };

        let containers = match self.runtime.list_containers(&filter).await {
            Ok(containers) => containers,
            Err(e) => {
                warn!("failed to list containers: {e}");
                return report;
            }
        };

        if !matches!(self.settings.selection, Selection::All) {
            match self.storage.prune_unmonitored(&self.settings.selection).await {
                Ok(0) => {}
                Ok(pruned) => debug!("pruned {pruned} unmonitored containers"),
                Err(e) => warn!("failed to prune unmonitored containers: {e}"),
            }
        }

        // the runtime name filter matches substrings
        let monitored: Vec<ContainerSummary> = containers
            .into_iter()
            .filter(|c| self.settings.selection.matches(c.name()))
            .collect();

        let listed: HashSet<&str> = monitored.iter().map(|c| c.id.as_str()).collect();
        self.bases.retain(|id, _| listed.contains(id.as_str()));
        self.cache.retain(|id, _| listed.contains(id.as_str()));

        let now = Utc::now();
        let mut scheduled = HashSet::new();
        let mut due = Vec::new();
        for container in &monitored {
            if !scheduled.insert(container.id.as_str()) {
                continue;
            }
            if self.is_fresh(&container.id, now) {
                report.skipped += 1;
                continue;
            }
            due.push(container);
        }

        for batch in due.chunks(self.settings.batch_size.max(1)) {
            let snapshots = join_all(
                batch
                    .iter()
                    .map(|container| self.runtime.resource_snapshot(&container.id)),
            )
            .await;

            for (container, result) in batch.iter().zip(snapshots) {
                self.apply(container, result, &mut report).await;
            }
        }

        self.broadcaster.notify_metrics_changed();
        self.maybe_cleanup().await;

        report
    }

    fn is_fresh(&self, id: &str, now: DateTime<Utc>) -> bool {
        self.cache
            .get(id)
            .is_some_and(|sample| now.signed_duration_since(sample.last_update) < self.settings.fresh_window)
    }

    #[instrument(skip_all, fields(container = container.name()))]
    async fn apply(
        &mut self,
        container: &ContainerSummary,
        result: RuntimeResult<ResourceSnapshot>,
        report: &mut SampleReport,
    ) {
        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(RuntimeError::NotFound(_)) => {
                debug!("container is gone, dropping its rate basis");
                self.bases.remove(&container.id);
                self.cache.remove(&container.id);
                report.gone += 1;
                return;
            }
            Err(e) => {
                warn!("failed to fetch resource snapshot: {e}");
                report.failed += 1;
                return;
            }
        };

        let now = Utc::now();
        let basis = RateBasis::from_snapshot(&snapshot, now);
        let rates = basis.rates_since(self.bases.get(&container.id));
        self.bases.insert(container.id.clone(), basis);

        let mut sample = MetricSample {
            id: container.id.clone(),
            name: container.name().to_string(),
            cpu_usage: cpu_fraction(&snapshot),
            memory_usage: snapshot.memory_stats.usage.unwrap_or_default(),
            memory_limit: snapshot.memory_stats.limit.unwrap_or_default(),
            network_rx_speed: rates.network_rx,
            network_tx_speed: rates.network_tx,
            disk_read_speed: rates.disk_read,
            disk_write_speed: rates.disk_write,
            status: container.state.to_lowercase(),
            notifications_sent: 0,
            last_update: now,
        };

        if let Err(e) = self.storage.upsert_sample(&sample).await {
            warn!("failed to store sample: {e}");
            report.failed += 1;
            return;
        }

        match self.storage.get_notification_count(&container.id).await {
            Ok(count) => sample.notifications_sent = count,
            Err(e) => debug!("failed to read notification count: {e}"),
        }

        self.cache.insert(container.id.clone(), sample);
        report.sampled += 1;
    }

    async fn maybe_cleanup(&mut self) {
        let Some(retention) = self.settings.retention else {
            return;
        };

        if self
            .last_cleanup
            .is_some_and(|last| last.elapsed() < CLEANUP_INTERVAL)
        {
            return;
        }
        self.last_cleanup = Some(Instant::now());

        match self.storage.cleanup_stale(Utc::now() - retention).await {
            Ok(0) => {}
            Ok(deleted) => info!("retention removed {deleted} stale container records"),
            Err(e) => warn!("retention cleanup failed: {e}"),
        }
    }
}

/// Handle for controlling a SamplerActor
#[derive(Clone)]
pub struct SamplerHandle {
    sender: mpsc::Sender<SamplerCommand>,
}

impl SamplerHandle {
    pub fn spawn(
        runtime: Arc<dyn RuntimeClient>,
        storage: Arc<dyn StorageBackend>,
        broadcaster: BroadcastHandle,
        settings: SamplerSettings,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let actor = SamplerActor::new(runtime, storage, broadcaster, settings, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Run a tick immediately and report what it did
    pub async fn sample_now(&self) -> Result<SampleReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SamplerCommand::SampleNow { respond_to: tx })
            .await
            .context("failed to send SampleNow command")?;

        rx.await.context("failed to receive SampleNow response")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(SamplerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")
    }
}

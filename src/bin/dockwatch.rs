use std::sync::Arc;

use clap::Parser;
use dockwatch::{
    actors::{
        alert::AlertHandle,
        broadcaster::BroadcastHandle,
        event_feed::{EventFeedHandle, FeedSettings},
        health::HealthHandle,
        sampler::{SamplerHandle, SamplerSettings},
        swarm_poller::SwarmPollerHandle,
    },
    alerts::AlertFormatter,
    config::{Config, read_config_file},
    notification::build_notifier,
    runtime::{DockerClient, RuntimeClient},
    storage::build_storage,
};
use tracing::{debug, error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(version, about = "Docker container health monitor and metrics sampler")]
struct Args {
    /// JSON config file; environment variables are used when omitted
    #[arg(short, long)]
    file: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn init(level: LevelFilter) {
    let filter = filter::Targets::new().with_targets(vec![
        ("dockwatch", level),
        ("tower_http", LevelFilter::INFO.min(level)),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init(args.log_level);
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(file) => read_config_file(file)?,
        None => Config::from_env(),
    };
    info!(
        "monitoring {:?} (swarm: {})",
        config.monitoring.selection, config.monitoring.swarm
    );

    let runtime: Arc<dyn RuntimeClient> = Arc::new(DockerClient::new(
        config.runtime.endpoint.clone(),
        config.runtime.timeout(),
    )?);

    let storage_config = config.storage.clone().unwrap_or_default();
    let storage = build_storage(&storage_config).await?;
    let notifier = build_notifier(config.notification.as_ref());
    info!("delivering alerts through {}", notifier.name());

    let monitoring = &config.monitoring;
    let selection = monitoring.selection.clone();

    let alerts = AlertHandle::spawn(
        AlertFormatter::new(config.alerts.offset()),
        notifier,
        storage.clone(),
    );
    let health = HealthHandle::spawn(monitoring.cooldown(), alerts.clone());
    let broadcaster = BroadcastHandle::spawn(storage.clone(), config.sampler.throttle());
    let sampler = SamplerHandle::spawn(
        runtime.clone(),
        storage.clone(),
        broadcaster.clone(),
        SamplerSettings {
            selection: selection.clone(),
            interval: config.sampler.interval(),
            fresh_window: config.sampler.fresh_window(),
            batch_size: config.sampler.batch_size,
            retention: storage_config.retention(),
        },
    );

    let mut feed = None;
    let mut poller = None;
    if selection.is_empty() {
        warn!("no containers selected, health monitoring is disabled");
    } else {
        feed = Some(EventFeedHandle::spawn(
            runtime.clone(),
            health.clone(),
            FeedSettings {
                selection: selection.clone(),
                swarm: monitoring.swarm,
                resubscribe_delay: monitoring.resubscribe_delay(),
            },
        ));

        if monitoring.swarm {
            poller = Some(SwarmPollerHandle::spawn(
                runtime.clone(),
                health.clone(),
                selection.clone(),
                monitoring.poll_interval(),
                monitoring.freshness(),
            ));
        }
    }

    #[cfg(feature = "api")]
    {
        if let Some(api) = &config.api {
            let state =
                dockwatch::api::ApiState::new(storage.clone(), broadcaster.clone(), alerts.clone());
            dockwatch::api::spawn_api_server(api, state).await?;
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    if let Some(feed) = feed
        && let Err(e) = feed.shutdown().await
    {
        debug!("event feed already stopped: {e}");
    }
    if let Some(poller) = poller
        && let Err(e) = poller.shutdown().await
    {
        debug!("swarm poller already stopped: {e}");
    }

    for (name, result) in [
        ("sampler", sampler.shutdown().await),
        ("broadcaster", broadcaster.shutdown().await),
        ("health", health.shutdown().await),
        ("alert", alerts.shutdown().await),
    ] {
        if let Err(e) = result {
            debug!("{name} actor already stopped: {e}");
        }
    }

    if let Err(e) = storage.close().await {
        error!("failed to close storage: {e}");
    }

    Ok(())
}

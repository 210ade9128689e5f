//! Integration tests for the metrics sampler and the dashboard coalescer

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dockwatch::actors::{
    broadcaster::{BroadcastHandle, MetricsEnvelope},
    sampler::{SamplerHandle, SamplerSettings},
};
use dockwatch::config::Selection;
use dockwatch::storage::{MemoryBackend, StorageBackend};
use dockwatch::{Entity, MetricSample};

use crate::helpers::*;

fn settings(selection: &str, fresh_window: chrono::Duration) -> SamplerSettings {
    SamplerSettings {
        selection: Selection::parse(selection),
        interval: Duration::from_secs(3600),
        fresh_window,
        batch_size: 5,
        retention: None,
    }
}

async fn aggregated(storage: &MemoryBackend, name: &str) -> Option<MetricSample> {
    storage
        .get_aggregated_metrics()
        .await
        .unwrap()
        .into_iter()
        .find(|s| s.name == name)
}

struct Sampling {
    storage: Arc<MemoryBackend>,
    broadcaster: BroadcastHandle,
    sampler: SamplerHandle,
}

/// Spawn a sampler and wait for the first tick to have stored `first`
async fn spawn_sampling(runtime: FakeRuntime, settings: SamplerSettings, first: &str) -> Sampling {
    let runtime = Arc::new(runtime);
    let storage = Arc::new(MemoryBackend::new());
    let broadcaster = BroadcastHandle::spawn(storage.clone(), Duration::from_millis(50));
    let sampler = SamplerHandle::spawn(runtime, storage.clone(), broadcaster.clone(), settings);

    assert!(wait_for(|| async { aggregated(&storage, first).await.is_some() }).await);

    Sampling {
        storage,
        broadcaster,
        sampler,
    }
}

#[tokio::test]
async fn test_rates_from_successive_snapshots() {
    let t0 = Utc::now();
    let runtime = FakeRuntime::new();
    runtime.add_container("c1", "web-1", "running");
    runtime.push_snapshot("c1", Some(snapshot(t0, 1000, 500, 0, 0)));
    runtime.push_snapshot(
        "c1",
        Some(snapshot(t0 + chrono::Duration::seconds(1), 3000, 1500, 4096, 8192)),
    );

    let s = spawn_sampling(runtime, settings("web-1", chrono::Duration::zero()), "web-1").await;

    let first = aggregated(&s.storage, "web-1").await.unwrap();
    assert_eq!(first.network_rx_speed, 0.0);
    assert_eq!(first.disk_write_speed, 0.0);
    assert_eq!(first.memory_limit, 512 * 1024 * 1024);
    assert_eq!(first.status, "running");

    let report = s.sampler.sample_now().await.unwrap();
    assert_eq!(report.sampled, 1);

    let second = aggregated(&s.storage, "web-1").await.unwrap();
    assert_eq!(second.network_rx_speed, 2000.0);
    assert_eq!(second.network_tx_speed, 1000.0);
    assert_eq!(second.disk_read_speed, 4096.0);
    assert_eq!(second.disk_write_speed, 8192.0);
    assert!((second.cpu_usage - 0.1).abs() < 1e-9);

    s.sampler.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_gone_container_resets_rate_basis() {
    let t0 = Utc::now();
    let runtime = FakeRuntime::new();
    runtime.add_container("c1", "web-1", "running");
    runtime.push_snapshot("c1", Some(snapshot(t0, 1000, 0, 0, 0)));
    runtime.push_snapshot("c1", None);
    runtime.push_snapshot(
        "c1",
        Some(snapshot(t0 + chrono::Duration::seconds(2), 5000, 0, 0, 0)),
    );

    let s = spawn_sampling(runtime, settings("web-1", chrono::Duration::zero()), "web-1").await;

    let report = s.sampler.sample_now().await.unwrap();
    assert_eq!(report.gone, 1);
    assert_eq!(report.sampled, 0);

    let report = s.sampler.sample_now().await.unwrap();
    assert_eq!(report.sampled, 1);

    // no basis after the gap, so this counts as a first sample
    let sample = aggregated(&s.storage, "web-1").await.unwrap();
    assert_eq!(sample.network_rx_speed, 0.0);
}

#[tokio::test]
async fn test_recently_sampled_container_is_skipped() {
    let runtime = FakeRuntime::new();
    runtime.add_container("c1", "web-1", "running");
    runtime.push_snapshot("c1", Some(snapshot(Utc::now(), 0, 0, 0, 0)));

    let s = spawn_sampling(runtime, settings("web-1", chrono::Duration::seconds(5)), "web-1").await;

    let report = s.sampler.sample_now().await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.sampled, 0);
}

#[tokio::test]
async fn test_unmonitored_records_are_pruned() {
    let runtime = FakeRuntime::new();
    runtime.add_container("c1", "web-1", "running");
    runtime.add_container("c2", "db-1", "running");
    runtime.push_snapshot("c1", Some(snapshot(Utc::now(), 0, 0, 0, 0)));
    runtime.push_snapshot("c2", Some(snapshot(Utc::now(), 0, 0, 0, 0)));

    let storage = Arc::new(MemoryBackend::new());
    storage
        .upsert_sample(&MetricSample::empty("old", "legacy-1", "running"))
        .await
        .unwrap();

    let broadcaster = BroadcastHandle::spawn(storage.clone(), Duration::from_millis(50));
    let sampler = SamplerHandle::spawn(
        Arc::new(runtime),
        storage.clone(),
        broadcaster,
        settings("web-1", chrono::Duration::seconds(5)),
    );
    sampler.sample_now().await.unwrap();

    let names: Vec<String> = storage
        .get_aggregated_metrics()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["web-1".to_string()]);
}

#[tokio::test]
async fn test_sampling_keeps_notification_count() {
    let runtime = FakeRuntime::new();
    runtime.add_container("c1", "web-1", "running");
    runtime.push_snapshot("c1", Some(snapshot(Utc::now(), 0, 0, 0, 0)));

    let storage = Arc::new(MemoryBackend::new());
    // an alert before the first sample creates a placeholder record
    storage
        .increment_notification_count(&Entity::container("c1", "web-1"))
        .await
        .unwrap();

    let broadcaster = BroadcastHandle::spawn(storage.clone(), Duration::from_millis(50));
    let sampler = SamplerHandle::spawn(
        Arc::new(runtime),
        storage.clone(),
        broadcaster,
        settings("web-1", chrono::Duration::seconds(5)),
    );

    assert!(
        wait_for(|| async {
            aggregated(&storage, "web-1")
                .await
                .is_some_and(|s| s.status == "running")
        })
        .await
    );
    sampler.sample_now().await.unwrap();

    let sample = aggregated(&storage, "web-1").await.unwrap();
    assert_eq!(sample.notifications_sent, 1);
    assert_eq!(sample.memory_usage, 64 * 1024 * 1024);
}

#[tokio::test]
async fn test_replicas_aggregate_by_base_name() {
    let runtime = FakeRuntime::new();
    runtime.add_container("r1", "app.1.aaa", "exited");
    runtime.add_container("r2", "app.2.bbb", "running");
    runtime.push_snapshot("r1", Some(snapshot(Utc::now(), 0, 0, 0, 0)));
    runtime.push_snapshot("r2", Some(snapshot(Utc::now(), 0, 0, 0, 0)));

    let s = spawn_sampling(runtime, settings("app", chrono::Duration::seconds(5)), "app").await;
    assert!(
        wait_for(|| async { aggregated(&s.storage, "app").await.is_some_and(|s| s.id == "r2") })
            .await
    );
    s.storage
        .increment_notification_count(&Entity::container("r1", "app.1.aaa"))
        .await
        .unwrap();

    let sample = aggregated(&s.storage, "app").await.unwrap();
    assert_eq!(sample.id, "r2");
    assert_eq!(sample.status, "running");
    assert_eq!(sample.notifications_sent, 1);
}

#[tokio::test]
async fn test_tick_pushes_to_subscribers() {
    let runtime = FakeRuntime::new();
    runtime.add_container("c1", "web-1", "running");
    runtime.push_snapshot("c1", Some(snapshot(Utc::now(), 0, 0, 0, 0)));
    runtime.push_snapshot("c1", Some(snapshot(Utc::now(), 0, 0, 0, 0)));

    let s = spawn_sampling(runtime, settings("web-1", chrono::Duration::zero()), "web-1").await;

    let mut subscription = s.broadcaster.subscribe().await.unwrap();
    let MetricsEnvelope::Metrics(initial) = subscription.snapshot.as_ref();
    assert_eq!(initial.len(), 1);

    s.sampler.sample_now().await.unwrap();

    let push = tokio::time::timeout(Duration::from_secs(2), subscription.updates.recv())
        .await
        .expect("no push within the throttle window")
        .unwrap();
    let MetricsEnvelope::Metrics(samples) = push.as_ref();
    assert_eq!(samples[0].name, "web-1");
}

#[tokio::test]
async fn test_empty_selection_samples_nothing() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.add_container("c1", "web-1", "running");

    let storage = Arc::new(MemoryBackend::new());
    let broadcaster = BroadcastHandle::spawn(storage.clone(), Duration::from_millis(50));
    let sampler = SamplerHandle::spawn(
        runtime,
        storage.clone(),
        broadcaster,
        settings("", chrono::Duration::zero()),
    );

    let report = sampler.sample_now().await.unwrap();
    assert_eq!(report, Default::default());
    assert!(storage.get_aggregated_metrics().await.unwrap().is_empty());
}

//! Integration tests for swarm service monitoring
//!
//! Covers the task poller (freshness window, recovery) and failure events
//! of services arriving through the event feed.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::{FixedOffset, Utc};
use dockwatch::EntityKey;
use dockwatch::actors::{
    alert::AlertHandle,
    event_feed::{EventFeedHandle, FeedSettings},
    health::HealthHandle,
    swarm_poller::SwarmPollerHandle,
};
use dockwatch::alerts::AlertFormatter;
use dockwatch::config::Selection;
use dockwatch::storage::MemoryBackend;

use crate::helpers::*;

fn spawn_health(notifier: Arc<RecordingNotifier>) -> HealthHandle {
    let alerts = AlertHandle::spawn(
        AlertFormatter::new(FixedOffset::east_opt(0).unwrap()),
        notifier,
        Arc::new(MemoryBackend::new()),
    );
    HealthHandle::spawn(chrono::Duration::seconds(10), alerts)
}

fn spawn_poller(runtime: Arc<FakeRuntime>, health: HealthHandle) -> SwarmPollerHandle {
    SwarmPollerHandle::spawn(
        runtime,
        health,
        Selection::parse("api"),
        Duration::from_secs(3600),
        chrono::Duration::seconds(10),
    )
}

fn service_key(name: &str) -> EntityKey {
    EntityKey::Service(name.to_string())
}

#[tokio::test]
async fn test_fresh_task_failure_alerts() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.add_service("api");
    runtime.set_tasks(
        "api",
        vec![
            task("t1", "running", Utc::now() - chrono::Duration::seconds(60), None),
            task(
                "t2",
                "failed",
                Utc::now() - chrono::Duration::seconds(5),
                Some("task: non-zero exit (1)"),
            ),
        ],
    );

    let notifier = Arc::new(RecordingNotifier::default());
    let health = spawn_health(notifier.clone());
    health.seed(service_key("api"), "running").await.unwrap();

    let poller = spawn_poller(runtime.clone(), health.clone());
    poller.poll_now().await.unwrap();

    assert!(wait_for(|| async { notifier.count() == 1 }).await);
    let message = &notifier.messages()[0];
    assert!(message.contains("Service Alert"));
    assert!(message.contains("api"));
    assert!(message.contains("non-zero exit"));

    let record = health.get_state(service_key("api")).await.unwrap().unwrap();
    assert_eq!(record.status, "failed");

    // the same failure seen again is not a transition
    poller.poll_now().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(notifier.count(), 1);

    poller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stale_task_failure_is_ignored() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.add_service("api");
    runtime.set_tasks(
        "api",
        vec![task(
            "t1",
            "failed",
            Utc::now() - chrono::Duration::seconds(11),
            None,
        )],
    );

    let notifier = Arc::new(RecordingNotifier::default());
    let health = spawn_health(notifier.clone());
    health.seed(service_key("api"), "running").await.unwrap();

    let poller = spawn_poller(runtime, health.clone());
    poller.poll_now().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(notifier.count(), 0);
    let record = health.get_state(service_key("api")).await.unwrap().unwrap();
    assert_eq!(record.status, "running");
}

#[tokio::test]
async fn test_service_recovers_after_failure() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.add_service("api");
    runtime.set_tasks(
        "api",
        vec![task("t1", "rejected", Utc::now() - chrono::Duration::seconds(2), None)],
    );

    let notifier = Arc::new(RecordingNotifier::default());
    let health = spawn_health(notifier.clone());
    health.seed(service_key("api"), "running").await.unwrap();

    let poller = spawn_poller(runtime.clone(), health.clone());
    poller.poll_now().await.unwrap();
    assert!(wait_for(|| async { notifier.count() == 1 }).await);

    runtime.set_tasks(
        "api",
        vec![task("t2", "running", Utc::now(), None)],
    );
    poller.poll_now().await.unwrap();

    assert!(
        wait_for(|| async {
            health
                .get_state(service_key("api"))
                .await
                .unwrap()
                .is_some_and(|r| r.status == "running")
        })
        .await
    );
}

#[tokio::test]
async fn test_unselected_service_is_not_polled() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.add_service("worker");
    runtime.set_tasks(
        "worker",
        vec![task("t1", "failed", Utc::now(), None)],
    );

    let notifier = Arc::new(RecordingNotifier::default());
    let health = spawn_health(notifier.clone());
    health.seed(service_key("worker"), "running").await.unwrap();

    let poller = spawn_poller(runtime, health);
    poller.poll_now().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(notifier.count(), 0);
}

#[tokio::test]
async fn test_service_remove_event_alerts() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.add_service("api");

    let notifier = Arc::new(RecordingNotifier::default());
    let health = spawn_health(notifier.clone());
    let feed = EventFeedHandle::spawn(
        runtime.clone(),
        health.clone(),
        FeedSettings {
            selection: Selection::parse("api"),
            swarm: true,
            resubscribe_delay: None,
        },
    );

    // update is not a failure action
    runtime.send_event(Ok(event("service", "update", "svc-api", "api"))).await;
    runtime.send_event(Ok(event("service", "remove", "svc-api", "api"))).await;

    assert!(wait_for(|| async { notifier.count() == 1 }).await);
    assert!(notifier.messages()[0].contains("remove"));

    feed.shutdown().await.unwrap();
}

fn spawn_swarm_feed(runtime: Arc<FakeRuntime>, health: HealthHandle, selection: &str) -> EventFeedHandle {
    EventFeedHandle::spawn(
        runtime,
        health,
        FeedSettings {
            selection: Selection::parse(selection),
            swarm: true,
            resubscribe_delay: None,
        },
    )
}

#[tokio::test]
async fn test_task_failure_alerts_once_for_service() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.add_service("api");
    runtime.add_container("c1", "api.1.x7f3k2", "running");

    let notifier = Arc::new(RecordingNotifier::default());
    let health = spawn_health(notifier.clone());
    let feed = spawn_swarm_feed(runtime.clone(), health.clone(), "api");
    let poller = spawn_poller(runtime.clone(), health.clone());

    assert!(
        wait_for(|| async { health.get_state(service_key("api")).await.unwrap().is_some() }).await
    );

    // the task container dies and the poller finds the failed task
    runtime.set_detail("c1", "api.1.x7f3k2", "exited", None);
    runtime
        .send_event(Ok(task_event("die", "c1", "api.1.x7f3k2", "api")))
        .await;
    runtime.set_tasks(
        "api",
        vec![task("t1", "failed", Utc::now() - chrono::Duration::seconds(1), None)],
    );
    poller.poll_now().await.unwrap();

    assert!(wait_for(|| async { notifier.count() == 1 }).await);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(notifier.count(), 1);
    assert!(notifier.messages()[0].contains("Service Alert"));
    assert_eq!(runtime.inspections.load(Ordering::SeqCst), 0);

    feed.shutdown().await.unwrap();
    poller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_task_containers_left_to_poller_when_monitoring_all() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.add_service("api");
    runtime.add_container("c1", "api.1.x7f3k2", "running");
    runtime.add_container("c2", "web-1", "running");

    let notifier = Arc::new(RecordingNotifier::default());
    let health = spawn_health(notifier.clone());
    let feed = spawn_swarm_feed(runtime.clone(), health.clone(), "all");

    runtime.set_detail("c1", "api.1.x7f3k2", "exited", None);
    runtime
        .send_event(Ok(task_event("die", "c1", "api.1.x7f3k2", "api")))
        .await;
    runtime.set_detail("c2", "web-1", "exited", None);
    runtime.send_event(Ok(event("container", "die", "c2", "web-1"))).await;

    assert!(wait_for(|| async { notifier.count() == 1 }).await);
    assert!(notifier.messages()[0].contains("web-1"));
    assert_eq!(runtime.inspections.load(Ordering::SeqCst), 1);

    feed.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_poller_alert_carries_task_time() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.add_service("api");
    let failed_at = Utc::now() - chrono::Duration::seconds(5);
    runtime.set_tasks("api", vec![task("t1", "failed", failed_at, None)]);

    let notifier = Arc::new(RecordingNotifier::default());
    let health = spawn_health(notifier.clone());
    health.seed(service_key("api"), "running").await.unwrap();

    let before_poll = Utc::now();
    let poller = spawn_poller(runtime, health.clone());
    poller.poll_now().await.unwrap();
    assert!(wait_for(|| async { notifier.count() == 1 }).await);

    // debounced on the observation time, not on the task timestamp
    let last = health.last_alert_at(service_key("api")).await.unwrap().unwrap();
    assert!(last >= before_poll);
}

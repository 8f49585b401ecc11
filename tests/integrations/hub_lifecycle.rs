#[path = "../helpers/mod.rs"]
mod helpers;

use anynotify::integration::{Integration, IntegrationError, LogIntegration, TracingIntegration};
use anynotify::{ContextStore, HubError, RateLimiter, Severity, WorkerKind};
use helpers::recording_client::RecordingClient;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;

fn isolated_store() -> Arc<ContextStore> {
    Arc::new(ContextStore::new())
}

#[derive(Debug, thiserror::Error)]
#[error("division by zero")]
struct DivisionByZero;

#[test]
fn test_only_warning_and_above_are_delivered() {
    // Arrange
    let client = Arc::new(RecordingClient::new());
    let capture = Arc::new(TracingIntegration::new());
    let subscriber = tracing_subscriber::registry().with(capture.layer());
    let integrations: Vec<Arc<dyn Integration>> = vec![capture.clone()];
    let hub = anynotify::init(WorkerKind::Immediate, client.clone(), integrations)
        .unwrap()
        .with_context_store(isolated_store());

    // Act / Assert: the immediate worker delivers before the log call returns.
    tracing::subscriber::with_default(subscriber, || {
        let active = hub.enter().unwrap();

        tracing::info!(target: "app", "test");
        assert!(client.attempts().is_empty());

        tracing::warn!(target: "app", "test 1");
        assert_eq!(client.attempts(), vec!["test 1"]);

        tracing::error!(target: "app", "test 2");
        tracing::debug!(target: "app", "test 3");
        tracing::error!(target: "app", severity = "critical", "test 4");
        assert_eq!(client.attempts(), vec!["test 1", "test 2", "test 4"]);

        active.exit_blocking();
        tracing::error!(target: "app", "after exit");
    });

    let events = client.events();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].severity(), Severity::Warning);
    assert_eq!(events[1].severity(), Severity::Error);
    assert_eq!(events[2].severity(), Severity::Critical);
}

#[test]
fn test_error_values_become_exception_text() {
    let client = Arc::new(RecordingClient::new());
    let capture = Arc::new(TracingIntegration::new());
    let subscriber = tracing_subscriber::registry().with(capture.layer());
    let hub = anynotify::init(WorkerKind::Immediate, client.clone(), vec![capture.clone()])
        .unwrap()
        .with_context_store(isolated_store());

    tracing::subscriber::with_default(subscriber, || {
        hub.scope(|_| {
            let err = DivisionByZero;
            tracing::error!(
                target: "app",
                error = &err as &(dyn std::error::Error + 'static),
                "ratio failed"
            );
        })
        .unwrap();
    });

    let events = client.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].message(), "ratio failed");
    assert_eq!(events[0].exception_text(), Some("division by zero"));
}

#[test]
fn test_log_records_are_captured() {
    use log::Log;

    let client = Arc::new(RecordingClient::new());
    let capture = Arc::new(LogIntegration::new());
    let logger = capture.logger();
    let hub = anynotify::init(WorkerKind::Immediate, client.clone(), vec![capture.clone()])
        .unwrap()
        .with_min_severity(Severity::Error)
        .with_context_store(isolated_store());

    hub.scope(|_| {
        for (level, message) in [
            (log::Level::Warn, "not severe enough"),
            (log::Level::Error, "database unreachable"),
        ] {
            logger.log(
                &log::Record::builder()
                    .level(level)
                    .target("app::db")
                    .args(format_args!("{}", message))
                    .build(),
            );
        }
    })
    .unwrap();

    assert_eq!(client.messages(), vec!["database unreachable"]);
}

#[tokio::test(start_paused = true)]
async fn test_cooperative_hub_drains_rate_limited_events_on_exit() {
    // Arrange: the default limiter spaces sends 500ms apart.
    let client = Arc::new(RecordingClient::with_limiter(RateLimiter::default()));
    let capture = Arc::new(TracingIntegration::new());
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.layer()));
    let active = anynotify::init(WorkerKind::Cooperative, client.clone(), vec![capture.clone()])
        .unwrap()
        .with_context_store(isolated_store())
        .enter()
        .unwrap();

    // Act
    let started = tokio::time::Instant::now();
    for n in 1..=4 {
        tracing::warn!(target: "app", "event {}", n);
    }
    active.exit().await;

    // Assert
    assert!(started.elapsed() >= Duration::from_millis(1_500));
    assert_eq!(client.messages(), vec!["event 1", "event 2", "event 3", "event 4"]);
    let times = client.delivery_times();
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(500));
    }
}

#[test]
fn test_integration_serves_one_hub_at_a_time() {
    let capture = Arc::new(TracingIntegration::new());
    let first = anynotify::init(
        WorkerKind::Threaded,
        Arc::new(RecordingClient::new()),
        vec![capture.clone()],
    )
    .unwrap()
    .enter()
    .unwrap();

    let second = anynotify::init(
        WorkerKind::Threaded,
        Arc::new(RecordingClient::new()),
        vec![capture.clone()],
    )
    .unwrap()
    .enter();
    assert!(matches!(
        second,
        Err(HubError::Integration {
            name: "tracing",
            source: IntegrationError::AlreadyInstalled
        })
    ));

    first.exit_blocking();
    let third = anynotify::init(
        WorkerKind::Threaded,
        Arc::new(RecordingClient::new()),
        vec![capture.clone()],
    )
    .unwrap()
    .enter()
    .unwrap();
    third.exit_blocking();
}

#[test]
fn test_scope_returns_value_and_rejects_late_handles() {
    let client = Arc::new(RecordingClient::new());
    let hub = anynotify::init(WorkerKind::Threaded, client.clone(), Vec::new())
        .unwrap()
        .with_context_store(isolated_store());

    let (handle, count) = hub
        .scope(|handle| {
            handle.capture(Severity::Error, "inside").unwrap();
            (handle.clone(), 1)
        })
        .unwrap();

    assert_eq!(count, 1);
    assert_eq!(client.messages(), vec!["inside"]);
    assert!(matches!(
        handle.capture(Severity::Error, "outside"),
        Err(HubError::Worker(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_scope_inside_task_drains_cooperative_worker() {
    let client = Arc::new(RecordingClient::new());
    let delivered = Arc::clone(&client);

    // The consumer is spawned from the same worker thread that then blocks.
    let task = tokio::spawn(async move {
        anynotify::init(WorkerKind::Cooperative, client, Vec::new())
            .unwrap()
            .with_context_store(isolated_store())
            .scope(|handle| handle.capture(Severity::Error, "from task"))
    });
    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("scope exit must not hang")
        .unwrap();

    assert!(result.unwrap().is_ok());
    assert_eq!(delivered.messages(), vec!["from task"]);
}

#[tokio::test]
async fn test_blocking_exit_on_current_thread_runtime_drains_in_background() {
    let client = Arc::new(RecordingClient::new());
    let active = anynotify::init(WorkerKind::Cooperative, client.clone(), Vec::new())
        .unwrap()
        .with_context_store(isolated_store())
        .enter()
        .unwrap();

    active.capture(Severity::Error, "late drain").unwrap();
    active.exit_blocking();

    tokio::time::timeout(Duration::from_secs(5), async {
        while client.messages().is_empty() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("background drain must deliver");
    assert_eq!(client.messages(), vec!["late drain"]);
}

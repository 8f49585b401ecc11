#[path = "../helpers/mod.rs"]
mod helpers;

use anynotify::integration::TracingIntegration;
use anynotify::{ContextStore, Severity, WorkerKind};
use helpers::recording_client::RecordingClient;
use serde_json::{json, Value};
use std::sync::{Arc, Barrier};
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;

fn context_value(client: &RecordingClient, message: &str, key: &str) -> Option<Value> {
    client
        .events()
        .into_iter()
        .find(|event| event.message() == message)
        .and_then(|event| event.context().get(key).cloned())
}

#[test]
fn test_threads_see_only_their_own_context() {
    // Arrange
    let client = Arc::new(RecordingClient::new());
    let hub = anynotify::init(WorkerKind::Threaded, client.clone(), Vec::new())
        .unwrap()
        .with_context_store(Arc::new(ContextStore::new()));
    let barrier = Arc::new(Barrier::new(2));

    // Act: both threads push before either captures.
    hub.scope(|handle| {
        std::thread::scope(|scope| {
            for user in ["alice", "bob"] {
                let handle = handle.clone();
                let barrier = Arc::clone(&barrier);
                scope.spawn(move || {
                    handle.push_context([("user", user)]);
                    barrier.wait();
                    handle.capture(Severity::Error, format!("from {}", user)).unwrap();
                });
            }
        });
    })
    .unwrap();

    // Assert
    assert_eq!(context_value(&client, "from alice", "user"), Some(json!("alice")));
    assert_eq!(context_value(&client, "from bob", "user"), Some(json!("bob")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tasks_see_only_their_own_context() {
    let client = Arc::new(RecordingClient::new());
    let hub = anynotify::init(WorkerKind::Cooperative, client.clone(), Vec::new())
        .unwrap()
        .with_context_store(Arc::new(ContextStore::new()));

    hub.scope_async(|handle| async move {
        let mut tasks = Vec::new();
        for (n, delay) in [(1, 30), (2, 10)] {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                handle.push_context([("request", n)]);
                tokio::time::sleep(Duration::from_millis(delay)).await;
                handle.capture(Severity::Warning, format!("request {}", n)).unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
    })
    .await
    .unwrap();

    assert_eq!(context_value(&client, "request 1", "request"), Some(json!(1)));
    assert_eq!(context_value(&client, "request 2", "request"), Some(json!(2)));
}

#[test]
fn test_ambient_context_flows_into_captured_events() {
    let client = Arc::new(RecordingClient::new());
    let capture = Arc::new(TracingIntegration::new());
    let subscriber = tracing_subscriber::registry().with(capture.layer());
    let hub = anynotify::init(WorkerKind::Immediate, client.clone(), vec![capture.clone()]).unwrap();

    // A fresh thread keeps this unit's entry in the shared store private.
    std::thread::spawn(move || {
        tracing::subscriber::with_default(subscriber, || {
            hub.scope(|_| {
                anynotify::push_context([("job", "nightly"), ("stage", "load")]);
                tracing::error!(target: "etl", stage = "transform", "stage failed");
                anynotify::clear_context();
                tracing::error!(target: "etl", "after clear");
            })
            .unwrap();
        });
    })
    .join()
    .unwrap();

    assert_eq!(context_value(&client, "stage failed", "job"), Some(json!("nightly")));
    // Record fields win over context entries of the same name.
    assert_eq!(context_value(&client, "stage failed", "stage"), Some(json!("transform")));
    assert_eq!(context_value(&client, "after clear", "job"), None);
}

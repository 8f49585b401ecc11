use anynotify::client::DiscordClient;
use anynotify::{ContextStore, RateLimiter, Severity, WorkerKind};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn webhook_url(server: &MockServer) -> String {
    format!("{}/api/webhooks/1/token", server.uri())
}

fn embed(request: &wiremock::Request) -> Value {
    let body: Value = serde_json::from_slice(&request.body).unwrap();
    body["embeds"][0].clone()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_threaded_hub_posts_embeds_to_discord() {
    // Arrange
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/webhooks/1/token"))
        .and(body_partial_json(json!({ "embeds": [{ "title": "[ERROR] disk full" }] })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = Arc::new(DiscordClient::new(webhook_url(&server)));
    let active = anynotify::init(WorkerKind::Threaded, client, Vec::new())
        .unwrap()
        .with_context_store(Arc::new(ContextStore::new()))
        .enter()
        .unwrap();

    // Act
    active.push_context([("host", "db-1")]);
    active.capture(Severity::Info, "routine").unwrap();
    active.capture(Severity::Error, "disk full").unwrap();
    active.exit().await;

    // Assert
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let embed = embed(&requests[0]);
    assert_eq!(embed["description"], "host: db-1");
    assert!(embed["timestamp"].is_string());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_post_does_not_stop_later_events() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = Arc::new(DiscordClient::new(webhook_url(&server)));
    let active = anynotify::init(WorkerKind::Cooperative, client, Vec::new())
        .unwrap()
        .with_context_store(Arc::new(ContextStore::new()))
        .enter()
        .unwrap();

    for message in ["first", "second", "third"] {
        active.capture(Severity::Warning, message).unwrap();
    }
    active.exit().await;

    let titles: Vec<Value> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|request| embed(request)["title"].clone())
        .collect();
    assert_eq!(
        titles,
        vec![json!("[WARNING] first"), json!("[WARNING] second"), json!("[WARNING] third")]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_client_rate_limit_spaces_posts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .expect(3)
        .mount(&server)
        .await;

    let limiter = RateLimiter::new(Duration::from_secs(10), 30)
        .unwrap()
        .with_min_interval(Duration::from_millis(150));
    let client = Arc::new(DiscordClient::new(webhook_url(&server)).with_rate_limiter(limiter));
    let active = anynotify::init(WorkerKind::Cooperative, client, Vec::new())
        .unwrap()
        .with_context_store(Arc::new(ContextStore::new()))
        .enter()
        .unwrap();

    let started = std::time::Instant::now();
    for n in 0..3 {
        active.capture(Severity::Critical, format!("outage {}", n)).unwrap();
    }
    active.exit().await;

    assert!(started.elapsed() >= Duration::from_millis(300));
}

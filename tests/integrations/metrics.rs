#[path = "../helpers/mod.rs"]
mod helpers;

use anynotify::internal_metrics::{
    DELIVERIES_TOTAL, EVENTS_ENQUEUED_TOTAL, RECORDS_DROPPED_TOTAL, RECORDS_FILTERED_TOTAL,
};
use anynotify::{ContextStore, Severity, WorkerKind};
use helpers::recording_client::RecordingClient;
use helpers::test_metrics::TestMetrics;
use std::sync::Arc;

#[test]
fn test_hub_records_counters() {
    // Arrange
    let recorder = TestMetrics::new();
    let client = Arc::new(RecordingClient::new().failing_on("rejected"));

    // Act: the immediate worker delivers on this thread, so the local
    // recorder sees the delivery counters too.
    metrics::with_local_recorder(&recorder, || {
        let active = anynotify::init(WorkerKind::Immediate, client.clone(), Vec::new())
            .unwrap()
            .with_context_store(Arc::new(ContextStore::new()))
            .enter()
            .unwrap();
        active.capture(Severity::Debug, "noise").unwrap();
        active.capture(Severity::Info, "noise").unwrap();
        active.capture(Severity::Warning, "accepted").unwrap();
        active.capture(Severity::Error, "rejected").unwrap();
        active.exit_blocking();
    });

    // Assert
    assert_eq!(recorder.get_counter(RECORDS_FILTERED_TOTAL), 2);
    assert_eq!(recorder.get_counter(EVENTS_ENQUEUED_TOTAL), 2);
    assert_eq!(recorder.get_counter(DELIVERIES_TOTAL), 2);
    assert_eq!(recorder.get_counter(RECORDS_DROPPED_TOTAL), 0);
    assert_eq!(client.messages(), vec!["accepted"]);
}

//! Metric names and descriptions.
//!
//! The library only records through the `metrics` facade. Whether anything is
//! exported is up to the recorder the host installs; without one every call
//! is a no-op.

use metrics::Unit;
use std::sync::Once;

pub const EVENTS_ENQUEUED_TOTAL: &str = "anynotify_events_enqueued_total";
pub const RECORDS_FILTERED_TOTAL: &str = "anynotify_records_filtered_total";
pub const RECORDS_DROPPED_TOTAL: &str = "anynotify_records_dropped_total";
/// Labelled with `outcome` = `success` | `failure`.
pub const DELIVERIES_TOTAL: &str = "anynotify_deliveries_total";

static DESCRIBE: Once = Once::new();

/// Registers descriptions for every metric with the installed recorder.
pub fn describe() {
    DESCRIBE.call_once(|| {
        metrics::describe_counter!(EVENTS_ENQUEUED_TOTAL, Unit::Count, "Total number of events handed to a worker.");
        metrics::describe_counter!(RECORDS_FILTERED_TOTAL, Unit::Count, "Total number of captured records discarded by the severity filter.");
        metrics::describe_counter!(RECORDS_DROPPED_TOTAL, Unit::Count, "Total number of captured records dropped because building or enqueueing the event failed.");
        metrics::describe_counter!(DELIVERIES_TOTAL, Unit::Count, "Total number of delivery attempts, labeled by outcome.");
    });
}

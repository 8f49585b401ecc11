//! anynotify - log-driven notifications without blocking the caller
//!
//! Log records captured from `tracing` or `log` are filtered by severity,
//! turned into events carrying the emitting unit's context, and handed to a
//! worker that delivers them to a webhook client under a rate limit.
pub mod cli;
pub mod client;
pub mod config;
pub mod context;
pub mod core;
pub mod formatting;
pub mod hub;
pub mod integration;
pub mod internal_metrics;
pub mod rate_limit;
pub mod worker;

// Re-export core types for convenience
pub use crate::core::*;
pub use context::ContextStore;
pub use hub::{init, init_from_config, ActiveHub, Hub, HubError, HubHandle};
pub use rate_limit::RateLimiter;
pub use worker::WorkerKind;

/// Adds entries to the calling unit's context in the process-wide store.
///
/// Hubs built with [`init`] read from this store unless given their own.
pub fn push_context<I, K, V>(pairs: I)
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<serde_json::Value>,
{
    ContextStore::shared().push_context(pairs);
}

/// Drops the calling unit's entry from the process-wide store.
pub fn clear_context() {
    ContextStore::shared().clear();
}

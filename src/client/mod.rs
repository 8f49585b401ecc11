//! Delivery clients for notification providers.
//!
//! A client renders an [`Event`](crate::core::Event) into a provider payload,
//! waits on its own [`Throttle`] until the rate limiter permits a send, posts
//! the payload and classifies the response. Clients never retry.
pub mod discord;
pub mod slack;

pub use discord::DiscordClient;
pub use slack::SlackClient;

use crate::core::Pause;
use crate::rate_limit::RateLimiter;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

/// Why a single delivery attempt failed.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("provider rejected the event: status {status}, body: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("client panicked during send: {0}")]
    Panicked(String),
}

/// The rate-limit gate owned by a client.
///
/// The limiter is behind a mutex so that a client shared by several workers
/// still records every grant exactly once.
#[derive(Debug)]
pub struct Throttle {
    limiter: Mutex<RateLimiter>,
}

impl Throttle {
    pub fn new(limiter: RateLimiter) -> Self {
        Self {
            limiter: Mutex::new(limiter),
        }
    }

    /// Waits until a send is permitted, then records the grant.
    ///
    /// Permission is re-checked after every pause, since another worker
    /// sharing this client may have taken the slot in the meantime.
    pub async fn acquire(&self, pause: &dyn Pause) {
        loop {
            let wait = {
                let mut limiter = self.limiter.lock().unwrap_or_else(PoisonError::into_inner);
                let now = Instant::now();
                match limiter.get_wait_duration(now) {
                    None => {
                        limiter.inc(now);
                        None
                    }
                    Some(wait) => Some(wait),
                }
            };
            match wait {
                None => return,
                Some(wait) => {
                    debug!(wait_ms = wait.as_millis() as u64, "Rate limited, pausing before send");
                    pause.pause(wait).await;
                }
            }
        }
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(RateLimiter::default())
    }
}

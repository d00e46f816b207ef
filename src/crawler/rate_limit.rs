//! Minimum-interval request gate
//!
//! Every outbound request acquires the limiter first. The limiter is a
//! `governor` quota of one request per interval with a burst of one, so no
//! two requests of the same scope start closer together than the interval,
//! however many workers are waiting. A zero interval disables the gate.

use std::fmt;
use std::time::{Duration, Instant};

use governor::{DefaultDirectRateLimiter, DefaultKeyedRateLimiter, Quota, RateLimiter as Governor};
use tracing::{Instrument, debug_span};
use url::Url;

use crate::crawler::config::RateLimitScope;

enum Gate {
    Open,
    Global(DefaultDirectRateLimiter),
    PerOrigin(DefaultKeyedRateLimiter<String>),
}

/// Enforces a minimum interval between request starts
pub struct RateLimiter {
    gate: Gate,
}

impl RateLimiter {
    /// Create a limiter granting at most one request per `interval` per scope
    pub fn new(interval: Duration, scope: RateLimitScope) -> Self {
        let gate = match Quota::with_period(interval) {
            None => Gate::Open,
            Some(quota) => match scope {
                RateLimitScope::Global => Gate::Global(Governor::direct(quota)),
                RateLimitScope::PerOrigin => Gate::PerOrigin(Governor::keyed(quota)),
            },
        };
        Self { gate }
    }

    /// Wait until a request to `url` may start and return the grant time
    ///
    /// Dropping the returned future gives up the wait without using a grant.
    pub async fn acquire(&self, url: &Url) -> Instant {
        match &self.gate {
            Gate::Open => {}
            Gate::Global(limiter) => {
                limiter
                    .until_ready()
                    .instrument(debug_span!("rate_limiter", url = %url))
                    .await
            }
            Gate::PerOrigin(limiter) => {
                let origin = url.origin().ascii_serialization();
                limiter
                    .until_key_ready(&origin)
                    .instrument(debug_span!("rate_limiter", %origin))
                    .await
            }
        }
        Instant::now()
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gate = match self.gate {
            Gate::Open => "open",
            Gate::Global(_) => "global",
            Gate::PerOrigin(_) => "per_origin",
        };
        f.debug_struct("RateLimiter").field("gate", &gate).finish()
    }
}

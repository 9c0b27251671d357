//! Bounded polling with exponential backoff for destinations whose writes
//! become visible only after a propagation delay.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::{DestinationAdapter, DestinationRecord, Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the second lookup
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound for a single delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Multiplier applied per attempt
    #[serde(default = "default_factor")]
    pub factor: f64,
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8000
}

fn default_factor() -> f64 {
    2.0
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            factor: default_factor(),
        }
    }
}

impl BackoffPolicy {
    pub fn constant(delay: Duration) -> Self {
        let ms = delay.as_millis() as u64;
        Self {
            initial_delay_ms: ms,
            max_delay_ms: ms,
            factor: 1.0,
        }
    }

    /// Delay to wait after the given attempt (0-indexed)
    pub fn delay(&self, attempt: u32) -> Duration {
        let multiplier = self.factor.max(1.0).powi(attempt.min(64) as i32);
        let delay_ms = (self.initial_delay_ms as f64 * multiplier).min(self.max_delay_ms as f64);
        Duration::from_millis(delay_ms as u64)
    }
}

/// Re-run `lookup` until it yields a value or `timeout` elapses.
///
/// `Ok(None)` and `Error::TransientLookup` mean "not yet"; any other error
/// is returned immediately.
pub async fn wait_until<T, F, Fut>(
    what: &str,
    timeout: Duration,
    policy: &BackoffPolicy,
    mut lookup: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let started = Instant::now();
    let deadline = started + timeout;
    let mut attempt = 0u32;

    loop {
        match lookup().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => debug!("{} not there yet (attempt {})", what, attempt + 1),
            Err(e) if e.is_transient() => {
                debug!("{} not converged (attempt {}): {}", what, attempt + 1, e)
            }
            Err(e) => return Err(e),
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(Error::NotConverged {
                what: what.to_string(),
                waited: now - started,
            });
        }

        sleep(policy.delay(attempt).min(deadline - now)).await;
        attempt = attempt.saturating_add(1);
    }
}

/// Wait for a record to become visible downstream
pub async fn find_converged(
    adapter: &dyn DestinationAdapter,
    key: &str,
    timeout: Duration,
    policy: &BackoffPolicy,
) -> Result<DestinationRecord> {
    let what = format!("'{}' in {}", key, adapter.name());
    wait_until(&what, timeout, policy, move || adapter.find_by_key(key)).await
}

/// Wait for a record to be gone downstream
pub async fn await_absent(
    adapter: &dyn DestinationAdapter,
    key: &str,
    timeout: Duration,
    policy: &BackoffPolicy,
) -> Result<()> {
    let what = format!("removal of '{}' from {}", key, adapter.name());
    wait_until(&what, timeout, policy, move || async move {
        match adapter.find_by_key(key).await? {
            Some(_) => Ok(None),
            None => Ok(Some(())),
        }
    })
    .await
}

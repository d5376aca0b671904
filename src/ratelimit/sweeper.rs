//! Background sweep of stale attempt records.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::limiter::{RateLimiter, DEFAULT_SWEEP_INTERVAL_SECS};

/// Polls per sweep interval. `SweepSchedule` decides when a sweep is due.
const POLLS_PER_INTERVAL: u32 = 4;

/// Spawn a task that sweeps stale records once per sweep interval.
///
/// The task only bounds memory; `check` never waits on it. Abort the
/// returned handle to stop it.
pub fn spawn_sweeper(limiter: Arc<RateLimiter>) -> JoinHandle<()> {
    let interval = limiter
        .sweep_interval()
        .to_std()
        .unwrap_or(std::time::Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS));
    let poll = (interval / POLLS_PER_INTERVAL).max(std::time::Duration::from_millis(1));

    info!(interval_secs = interval.as_secs(), "Starting rate limit sweeper");

    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + poll, poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Some(swept) = limiter.sweep_if_due(Utc::now()).await {
                let tracked = limiter.tracked_clients().await;
                debug!(swept = swept, tracked = tracked, "Sweeper pass finished");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{ClientId, InMemoryAttemptStore, LimitPolicy, SweepSchedule};
    use chrono::Duration;

    #[tokio::test]
    async fn test_sweeper_removes_stale_records() {
        let started = Utc::now() - Duration::hours(1);
        let limiter = Arc::new(RateLimiter::new(
            Arc::new(InMemoryAttemptStore::new()),
            LimitPolicy::new(5, 1).unwrap(),
            SweepSchedule::new(std::time::Duration::from_millis(20), started).unwrap(),
        ));
        limiter.check_at(&ClientId::new("1.2.3.4"), started).await;
        assert_eq!(limiter.tracked_clients().await, 1);

        let handle = spawn_sweeper(limiter.clone());
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        handle.abort();

        assert_eq!(limiter.tracked_clients().await, 0);
    }
}

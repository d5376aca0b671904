//! Core fixed-window rate limiter implementation.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace};

use super::backend::AttemptStore;
use super::client::ClientId;
use crate::error::{PassgateError, Result};

/// Default attempts admitted per window.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default window length (15 minutes).
pub const DEFAULT_WINDOW_MS: u64 = 15 * 60 * 1000;
/// Default minimum spacing between sweeps of stale records (5 minutes).
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
/// Longest accepted window (one year).
pub const MAX_WINDOW_MS: u64 = 365 * 24 * 60 * 60 * 1000;

/// How many attempts a client gets per fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitPolicy {
    max_attempts: u32,
    window: Duration,
}

impl LimitPolicy {
    /// Create a policy admitting `max_attempts` per `window_ms` milliseconds.
    pub fn new(max_attempts: u32, window_ms: u64) -> Result<Self> {
        if max_attempts == 0 {
            return Err(PassgateError::RateLimit(
                "max_attempts must be greater than 0".to_string(),
            ));
        }

        let window = Some(window_ms)
            .filter(|ms| (1..=MAX_WINDOW_MS).contains(ms))
            .and_then(|ms| Duration::try_milliseconds(ms as i64))
            .ok_or_else(|| {
                PassgateError::RateLimit(format!("window_ms {} is out of range", window_ms))
            })?;

        Ok(Self {
            max_attempts,
            window,
        })
    }

    /// Attempts admitted per window.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Length of a window.
    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for LimitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            window: Duration::milliseconds(DEFAULT_WINDOW_MS as i64),
        }
    }
}

/// Outcome of a single `check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    /// Whether the attempt is admitted
    pub allowed: bool,
    /// Attempts left in the current window
    pub remaining: u32,
    /// Attempts admitted per window
    pub limit: u32,
    /// Seconds to wait before retrying, only set when denied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    /// When the current window expires
    pub window_reset_at: DateTime<Utc>,
}

/// Limits how often the stale-record sweep may run.
#[derive(Debug)]
pub struct SweepSchedule {
    interval: Duration,
    last_sweep: Mutex<DateTime<Utc>>,
}

impl SweepSchedule {
    /// Create a schedule whose first sweep is due `interval` after `now`.
    pub fn new(interval: std::time::Duration, now: DateTime<Utc>) -> Result<Self> {
        let interval = Duration::from_std(interval)
            .ok()
            .filter(|interval| *interval > Duration::zero())
            .ok_or_else(|| {
                PassgateError::RateLimit("sweep interval must be positive".to_string())
            })?;

        Ok(Self {
            interval,
            last_sweep: Mutex::new(now),
        })
    }

    /// Claim the sweep slot if at least one interval has passed since the
    /// last claimed sweep.
    ///
    /// Returns `false` without waiting when another caller holds the slot.
    pub fn try_claim(&self, now: DateTime<Utc>) -> bool {
        let Some(mut last_sweep) = self.last_sweep.try_lock() else {
            return false;
        };

        if now - *last_sweep < self.interval {
            return false;
        }

        *last_sweep = now;
        true
    }

    /// Minimum spacing between sweeps.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// The fixed-window rate limiter.
///
/// Counts attempts per `ClientId` in the injected `AttemptStore`. The store
/// decides whether limits are per instance or shared across instances.
pub struct RateLimiter {
    /// Attempt table
    store: Arc<dyn AttemptStore>,
    /// Attempts per window
    policy: LimitPolicy,
    /// Spacing for the stale-record sweep
    sweep: SweepSchedule,
}

impl RateLimiter {
    /// Create a new rate limiter over `store`.
    pub fn new(store: Arc<dyn AttemptStore>, policy: LimitPolicy, sweep: SweepSchedule) -> Self {
        Self {
            store,
            policy,
            sweep,
        }
    }

    /// Check and count an attempt for `client` at the current time.
    pub async fn check(&self, client: &ClientId) -> RateLimitDecision {
        self.check_at(client, Utc::now()).await
    }

    /// Check and count an attempt for `client` at `now`.
    ///
    /// Attempts beyond the limit are still counted, so a client stays denied
    /// until its window resets.
    pub async fn check_at(&self, client: &ClientId, now: DateTime<Utc>) -> RateLimitDecision {
        let record = self
            .store
            .increment_or_init(client, self.policy.window, now)
            .await;

        let limit = self.policy.max_attempts;

        trace!(
            client = %client,
            count = record.count,
            limit = limit,
            "Checked rate limit"
        );

        if record.count > limit {
            let retry_after_secs = record.retry_after_secs(now);
            debug!(
                client = %client,
                count = record.count,
                retry_after_secs = retry_after_secs,
                "Rate limit exceeded"
            );

            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                limit,
                retry_after_secs: Some(retry_after_secs),
                window_reset_at: record.window_reset_at,
            };
        }

        RateLimitDecision {
            allowed: true,
            remaining: record.remaining(limit),
            limit,
            retry_after_secs: None,
            window_reset_at: record.window_reset_at,
        }
    }

    /// Forget every attempt recorded for `client`.
    pub async fn clear(&self, client: &ClientId) {
        if self.store.delete(client).await {
            debug!(client = %client, "Cleared rate limit record");
        }
    }

    /// Remove stale records if the sweep interval has elapsed.
    ///
    /// Returns the number of removed records, or `None` when the sweep was
    /// not due.
    pub async fn sweep_if_due(&self, now: DateTime<Utc>) -> Option<usize> {
        if !self.sweep.try_claim(now) {
            return None;
        }

        let swept = self.store.sweep_expired(now).await;
        debug!(swept = swept, "Swept stale rate limit records");
        Some(swept)
    }

    /// Attempts per window.
    pub fn policy(&self) -> LimitPolicy {
        self.policy
    }

    /// Minimum spacing between sweeps.
    pub fn sweep_interval(&self) -> Duration {
        self.sweep.interval()
    }

    /// Get the number of tracked clients.
    pub async fn tracked_clients(&self) -> usize {
        self.store.len().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::InMemoryAttemptStore;
    use tokio_test::{assert_err, assert_ok};

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn limiter(max_attempts: u32, window_ms: u64) -> RateLimiter {
        RateLimiter::new(
            Arc::new(InMemoryAttemptStore::new()),
            LimitPolicy::new(max_attempts, window_ms).unwrap(),
            SweepSchedule::new(std::time::Duration::from_secs(300), t0()).unwrap(),
        )
    }

    fn client() -> ClientId {
        ClientId::new("1.2.3.4")
    }

    #[test]
    fn test_policy_validation() {
        assert_ok!(LimitPolicy::new(5, 900_000));
        assert_err!(LimitPolicy::new(0, 900_000));
        assert_err!(LimitPolicy::new(5, 0));
        assert_err!(LimitPolicy::new(5, u64::MAX));
    }

    #[test]
    fn test_sweep_schedule_validation() {
        assert_err!(SweepSchedule::new(std::time::Duration::ZERO, t0()));
    }

    #[tokio::test]
    async fn test_remaining_decreases_until_limit() {
        let limiter = limiter(5, 900_000);

        for expected in [4, 3, 2, 1, 0] {
            let decision = limiter.check_at(&client(), t0()).await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected);
            assert_eq!(decision.retry_after_secs, None);
        }
    }

    #[tokio::test]
    async fn test_denied_after_limit_with_retry_after() {
        let limiter = limiter(5, 900_000);
        for _ in 0..5 {
            limiter.check_at(&client(), t0()).await;
        }

        let decision = limiter
            .check_at(&client(), t0() + Duration::milliseconds(1000))
            .await;

        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.retry_after_secs, Some(899));
        assert_eq!(decision.window_reset_at, t0() + Duration::minutes(15));
    }

    #[tokio::test]
    async fn test_stays_denied_and_retry_after_tracks_now() {
        let limiter = limiter(2, 60_000);
        for _ in 0..3 {
            limiter.check_at(&client(), t0()).await;
        }

        let decision = limiter
            .check_at(&client(), t0() + Duration::seconds(50))
            .await;

        assert!(!decision.allowed);
        assert_eq!(decision.retry_after_secs, Some(10));
    }

    #[tokio::test]
    async fn test_retry_after_bounded_by_window() {
        let limiter = limiter(1, 30_000);
        limiter.check_at(&client(), t0()).await;

        let decision = limiter.check_at(&client(), t0()).await;
        let retry_after = decision.retry_after_secs.unwrap();

        assert!(retry_after > 0);
        assert!(retry_after <= 30);
    }

    #[tokio::test]
    async fn test_window_reset_starts_fresh() {
        let limiter = limiter(3, 10_000);
        for _ in 0..10 {
            limiter.check_at(&client(), t0()).await;
        }

        let decision = limiter
            .check_at(&client(), t0() + Duration::milliseconds(10_001))
            .await;

        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
        assert_eq!(
            decision.window_reset_at,
            t0() + Duration::milliseconds(20_001)
        );
    }

    #[tokio::test]
    async fn test_clear_behaves_like_first_call() {
        let limiter = limiter(5, 900_000);
        for _ in 0..7 {
            limiter.check_at(&client(), t0()).await;
        }

        limiter.clear(&client()).await;
        let later = t0() + Duration::seconds(30);
        let decision = limiter.check_at(&client(), later).await;

        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
        assert_eq!(decision.window_reset_at, later + Duration::minutes(15));
    }

    #[tokio::test]
    async fn test_clients_limited_independently() {
        let limiter = limiter(1, 60_000);
        limiter.check_at(&client(), t0()).await;
        assert!(!limiter.check_at(&client(), t0()).await.allowed);

        let other = limiter.check_at(&ClientId::new("5.6.7.8"), t0()).await;
        assert!(other.allowed);
    }

    #[tokio::test]
    async fn test_sweep_respects_interval() {
        let limiter = limiter(5, 1_000);
        limiter.check_at(&client(), t0()).await;

        assert_eq!(limiter.sweep_if_due(t0() + Duration::seconds(10)).await, None);
        assert_eq!(limiter.tracked_clients().await, 1);

        let first = t0() + Duration::seconds(300);
        assert_eq!(limiter.sweep_if_due(first).await, Some(1));
        assert_eq!(limiter.tracked_clients().await, 0);

        assert_eq!(limiter.sweep_if_due(first + Duration::seconds(299)).await, None);
        assert_eq!(
            limiter.sweep_if_due(first + Duration::seconds(300)).await,
            Some(0)
        );
    }

    #[tokio::test]
    async fn test_sweep_keeps_live_windows() {
        let limiter = limiter(5, 3_600_000);
        limiter.check_at(&client(), t0()).await;

        let swept = limiter.sweep_if_due(t0() + Duration::seconds(300)).await;

        assert_eq!(swept, Some(0));
        assert_eq!(limiter.tracked_clients().await, 1);
    }
}

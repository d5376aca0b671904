//! Per-client attempt record and fixed-window arithmetic.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Attempts observed for one client within its current fixed window.
///
/// A record whose window has passed is stale. It is not removed eagerly;
/// the next attempt from the same client starts a fresh window in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientAttemptRecord {
    /// Attempts in the current window, always at least 1
    pub count: u32,
    /// When the current window expires
    pub window_reset_at: DateTime<Utc>,
    /// First attempt of the current window
    pub first_attempt_at: DateTime<Utc>,
}

impl ClientAttemptRecord {
    /// Start a new window with a single attempt at `now`.
    pub fn fresh(now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            count: 1,
            window_reset_at: now + window,
            first_attempt_at: now,
        }
    }

    /// Whether the window has passed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.window_reset_at
    }

    /// Count one more attempt, restarting the window if it has expired.
    pub fn register_attempt(&mut self, now: DateTime<Utc>, window: Duration) {
        if self.is_expired(now) {
            *self = Self::fresh(now, window);
        } else {
            self.count = self.count.saturating_add(1);
        }
    }

    /// Attempts still available under `max_attempts`.
    pub fn remaining(&self, max_attempts: u32) -> u32 {
        max_attempts.saturating_sub(self.count)
    }

    /// Whole seconds until the window resets, rounded up and never below 1.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.window_reset_at - now).num_milliseconds().max(0) as u64;
        millis.div_ceil(1000).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_fresh_record() {
        let record = ClientAttemptRecord::fresh(t0(), Duration::minutes(15));

        assert_eq!(record.count, 1);
        assert_eq!(record.first_attempt_at, t0());
        assert_eq!(record.window_reset_at, t0() + Duration::minutes(15));
    }

    #[test]
    fn test_expiry_is_strictly_after_reset() {
        let record = ClientAttemptRecord::fresh(t0(), Duration::seconds(10));

        assert!(!record.is_expired(t0() + Duration::seconds(10)));
        assert!(record.is_expired(t0() + Duration::milliseconds(10_001)));
    }

    #[test]
    fn test_register_attempt_increments_within_window() {
        let mut record = ClientAttemptRecord::fresh(t0(), Duration::seconds(10));

        record.register_attempt(t0() + Duration::seconds(1), Duration::seconds(10));
        record.register_attempt(t0() + Duration::seconds(2), Duration::seconds(10));

        assert_eq!(record.count, 3);
        assert_eq!(record.first_attempt_at, t0());
    }

    #[test]
    fn test_register_attempt_restarts_expired_window() {
        let mut record = ClientAttemptRecord::fresh(t0(), Duration::seconds(10));
        record.count = 42;

        let later = t0() + Duration::seconds(11);
        record.register_attempt(later, Duration::seconds(10));

        assert_eq!(record, ClientAttemptRecord::fresh(later, Duration::seconds(10)));
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let record = ClientAttemptRecord::fresh(t0(), Duration::minutes(15));

        assert_eq!(record.retry_after_secs(t0() + Duration::seconds(1)), 899);
        assert_eq!(record.retry_after_secs(t0() + Duration::milliseconds(1_500)), 899);
        assert_eq!(record.retry_after_secs(t0() + Duration::milliseconds(899_001)), 1);
        assert_eq!(record.retry_after_secs(t0() + Duration::minutes(15)), 1);
    }

    #[test]
    fn test_remaining_saturates() {
        let mut record = ClientAttemptRecord::fresh(t0(), Duration::seconds(10));
        assert_eq!(record.remaining(5), 4);

        record.count = 7;
        assert_eq!(record.remaining(5), 0);
    }
}

//! Fixed-window rate limiting logic and state management.

mod backend;
mod client;
mod counter;
mod limiter;
mod memory;
mod sweeper;

pub use backend::AttemptStore;
pub use client::{ClientId, UNKNOWN_CLIENT};
pub use counter::ClientAttemptRecord;
pub use limiter::{
    LimitPolicy, RateLimitDecision, RateLimiter, SweepSchedule, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_SWEEP_INTERVAL_SECS, DEFAULT_WINDOW_MS,
};
pub use memory::InMemoryAttemptStore;
pub use sweeper::spawn_sweeper;

//! Storage trait for abstracting local and shared attempt tables.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::client::ClientId;
use super::counter::ClientAttemptRecord;

/// Trait for attempt table implementations.
///
/// The in-process `InMemoryAttemptStore` only enforces limits for requests
/// served by the same instance. Horizontally scaled deployments plug in an
/// implementation backed by a shared cache with atomic increment and TTL.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Count one attempt for `client` and return the updated record.
    ///
    /// Starts a fresh window when there is no record or the stored window has
    /// passed. The read-modify-write must be atomic per client.
    async fn increment_or_init(
        &self,
        client: &ClientId,
        window: Duration,
        now: DateTime<Utc>,
    ) -> ClientAttemptRecord;

    /// Current record for `client`, stale or not.
    async fn get(&self, client: &ClientId) -> Option<ClientAttemptRecord>;

    /// Remove the record for `client`. Returns whether one existed.
    async fn delete(&self, client: &ClientId) -> bool;

    /// Remove every record whose window has passed at `now`.
    ///
    /// Returns the number of records removed.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> usize;

    /// Number of tracked clients.
    async fn len(&self) -> usize;
}

//! In-process attempt table.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::trace;

use super::backend::AttemptStore;
use super::client::ClientId;
use super::counter::ClientAttemptRecord;

/// Attempt table held in process memory.
///
/// Each `DashMap` entry is updated under its shard lock, so concurrent
/// attempts from one client cannot both observe room under the limit.
/// Limits are per instance only.
#[derive(Debug, Default)]
pub struct InMemoryAttemptStore {
    records: DashMap<ClientId, ClientAttemptRecord>,
}

impl InMemoryAttemptStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttemptStore for InMemoryAttemptStore {
    async fn increment_or_init(
        &self,
        client: &ClientId,
        window: Duration,
        now: DateTime<Utc>,
    ) -> ClientAttemptRecord {
        let entry = self
            .records
            .entry(client.clone())
            .and_modify(|record| record.register_attempt(now, window))
            .or_insert_with(|| {
                trace!(client = %client, "Tracking new client");
                ClientAttemptRecord::fresh(now, window)
            });

        entry.value().clone()
    }

    async fn get(&self, client: &ClientId) -> Option<ClientAttemptRecord> {
        self.records.get(client).map(|record| record.value().clone())
    }

    async fn delete(&self, client: &ClientId) -> bool {
        self.records.remove(client).is_some()
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut swept = 0;
        self.records.retain(|_, record| {
            let keep = !record.is_expired(now);
            if !keep {
                swept += 1;
            }
            keep
        });
        swept
    }

    async fn len(&self) -> usize {
        self.records.len()
    }
}

//! In-Process Repository Implementation
//!
//! Counter records live in a sharded concurrent map. The caller's closure runs
//! while the entry's shard lock is held, which makes each read-modify-write
//! atomic per (identifier, endpoint). State is lost on restart.

use crate::domain::entities::CounterRecord;
use crate::domain::repository::{
    CounterFilter, CounterRepository, CounterStats, Mutation, Page,
};
use crate::domain::value_objects::BlockStatus;
use crate::error::ThrottleResult;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use kernel::id::CounterRecordId;
use std::sync::Arc;

type CounterKey = (String, String);

/// In-memory counter repository; clones share the same store
#[derive(Clone, Default)]
pub struct InMemoryCounterRepository {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    records: DashMap<CounterKey, CounterRecord>,
    ids: DashMap<CounterRecordId, CounterKey>,
}

impl InMemoryCounterRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.records.is_empty()
    }

    // Never hold an `ids` guard while locking `records`: `modify` takes them
    // in the opposite order.
    fn key_of(&self, id: CounterRecordId) -> Option<CounterKey> {
        self.inner.ids.get(&id).map(|key| key.value().clone())
    }
}

impl CounterRepository for InMemoryCounterRepository {
    async fn modify<F, T>(&self, identifier: &str, endpoint: &str, f: F) -> ThrottleResult<T>
    where
        F: FnOnce(Option<CounterRecord>) -> Mutation<T> + Send,
        T: Send,
    {
        let key = (identifier.to_string(), endpoint.to_string());
        let output = match self.inner.records.entry(key) {
            Entry::Occupied(mut entry) => {
                let Mutation { write, output } = f(Some(entry.get().clone()));
                if let Some(record) = write {
                    *entry.get_mut() = record;
                }
                output
            }
            Entry::Vacant(entry) => {
                let Mutation { write, output } = f(None);
                if let Some(record) = write {
                    self.inner.ids.insert(record.id, entry.key().clone());
                    entry.insert(record);
                }
                output
            }
        };
        Ok(output)
    }

    async fn find_by_id(&self, id: CounterRecordId) -> ThrottleResult<Option<CounterRecord>> {
        let Some(key) = self.key_of(id) else {
            return Ok(None);
        };
        Ok(self
            .inner
            .records
            .get(&key)
            .map(|record| record.value().clone()))
    }

    async fn modify_by_id<F>(
        &self,
        id: CounterRecordId,
        f: F,
    ) -> ThrottleResult<Option<CounterRecord>>
    where
        F: FnOnce(&mut CounterRecord) + Send,
    {
        let Some(key) = self.key_of(id) else {
            return Ok(None);
        };
        Ok(self.inner.records.get_mut(&key).map(|mut record| {
            f(record.value_mut());
            record.value().clone()
        }))
    }

    async fn list(
        &self,
        filter: &CounterFilter,
        page: Page,
    ) -> ThrottleResult<(Vec<CounterRecord>, u64)> {
        let mut matches: Vec<CounterRecord> = self
            .inner
            .records
            .iter()
            .filter(|record| filter.matches(record.value()))
            .map(|record| record.value().clone())
            .collect();
        matches.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.id.as_uuid().cmp(b.id.as_uuid()))
        });

        let total = matches.len() as u64;
        let records = matches
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .collect();
        Ok((records, total))
    }

    async fn stats(&self, now: DateTime<Utc>) -> ThrottleResult<CounterStats> {
        let mut stats = CounterStats::default();
        for record in self.inner.records.iter() {
            stats.total += 1;
            match record.block_status {
                BlockStatus::Permanent => stats.permanently_blocked += 1,
                status if status.is_active_at(now) => stats.temporarily_blocked += 1,
                _ => {}
            }
        }
        Ok(stats)
    }
}

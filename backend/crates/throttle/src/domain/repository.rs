//! Repository Traits
//!
//! Interfaces for counter persistence. Implementations live in the infra layer.
//!
//! Every mutating method hands the caller's closure exclusive access to one
//! record for the duration of a single read-modify-write, so concurrent
//! evaluations of the same (identifier, endpoint) are serialized.

use chrono::{DateTime, Utc};
use kernel::id::CounterRecordId;

use crate::domain::entities::CounterRecord;
use crate::domain::value_objects::BlockStatusCode;
use crate::error::ThrottleResult;

/// Result of a locked read-modify-write: the record to persist (if any) and
/// a value handed back to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation<T> {
    pub write: Option<CounterRecord>,
    pub output: T,
}

impl<T> Mutation<T> {
    pub fn write(record: CounterRecord, output: T) -> Self {
        Self {
            write: Some(record),
            output,
        }
    }

    pub fn read_only(output: T) -> Self {
        Self {
            write: None,
            output,
        }
    }
}

/// Admin listing filter; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterFilter {
    /// Case-insensitive substring of the identifier
    pub identifier: Option<String>,
    /// Exact endpoint name
    pub endpoint: Option<String>,
    pub status: Option<BlockStatusCode>,
}

impl CounterFilter {
    pub fn matches(&self, record: &CounterRecord) -> bool {
        let identifier = self.identifier.as_ref().is_none_or(|needle| {
            record
                .identifier
                .to_lowercase()
                .contains(&needle.to_lowercase())
        });
        let endpoint = self
            .endpoint
            .as_ref()
            .is_none_or(|endpoint| &record.endpoint == endpoint);
        let status = self
            .status
            .is_none_or(|status| record.block_status.code() == status);
        identifier && endpoint && status
    }
}

/// 1-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

/// Aggregate counts over all counter records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterStats {
    pub total: u64,
    /// Temporary blocks that have not expired yet
    pub temporarily_blocked: u64,
    pub permanently_blocked: u64,
}

impl CounterStats {
    pub fn active_blocked(&self) -> u64 {
        self.temporarily_blocked + self.permanently_blocked
    }
}

/// Counter record repository trait
#[trait_variant::make(CounterRepository: Send)]
pub trait LocalCounterRepository {
    /// Locked read-modify-write of the record for (identifier, endpoint)
    ///
    /// `f` sees the current record (or `None`) and decides what to persist.
    async fn modify<F, T>(&self, identifier: &str, endpoint: &str, f: F) -> ThrottleResult<T>
    where
        F: FnOnce(Option<CounterRecord>) -> Mutation<T> + Send,
        T: Send;

    /// Get a record by ID
    async fn find_by_id(&self, id: CounterRecordId) -> ThrottleResult<Option<CounterRecord>>;

    /// Locked in-place update of an existing record
    ///
    /// Returns the updated record, or `None` if no record has this ID.
    async fn modify_by_id<F>(
        &self,
        id: CounterRecordId,
        f: F,
    ) -> ThrottleResult<Option<CounterRecord>>
    where
        F: FnOnce(&mut CounterRecord) + Send;

    /// Page of matching records ordered by `updated_at` descending, plus the
    /// total number of matches
    async fn list(
        &self,
        filter: &CounterFilter,
        page: Page,
    ) -> ThrottleResult<(Vec<CounterRecord>, u64)>;

    /// Aggregate counts as of `now`
    async fn stats(&self, now: DateTime<Utc>) -> ThrottleResult<CounterStats>;
}

//! Admin Use Case
//!
//! Manual overrides and inspection of counter records.

use crate::application::clock::Clock;
use crate::application::config::ThrottleConfig;
use crate::domain::entities::CounterRecord;
use crate::domain::repository::{CounterFilter, CounterRepository, CounterStats, Page};
use crate::error::{ThrottleError, ThrottleResult};
use kernel::id::CounterRecordId;
use std::sync::Arc;

/// One page of counter records
#[derive(Debug, Clone)]
pub struct RecordPage {
    pub records: Vec<CounterRecord>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

/// Admin Use Case
pub struct AdminUseCase<R>
where
    R: CounterRepository,
{
    counter_repo: Arc<R>,
    config: Arc<ThrottleConfig>,
    clock: Arc<dyn Clock>,
}

impl<R> AdminUseCase<R>
where
    R: CounterRepository,
{
    pub fn new(counter_repo: Arc<R>, config: Arc<ThrottleConfig>, clock: Arc<dyn Clock>) -> Self {
        Self {
            counter_repo,
            config,
            clock,
        }
    }

    /// List records; `page` defaults to 1 and `limit` to the configured size
    pub async fn list(
        &self,
        filter: CounterFilter,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> ThrottleResult<RecordPage> {
        let page = Page {
            page: page.unwrap_or(1),
            limit: limit.unwrap_or(self.config.admin_default_page_size),
        };
        if page.page == 0 {
            return Err(ThrottleError::InvalidRequest(
                "page must be at least 1".to_string(),
            ));
        }
        if page.limit == 0 || page.limit > self.config.admin_max_page_size {
            return Err(ThrottleError::InvalidRequest(format!(
                "limit must be between 1 and {}",
                self.config.admin_max_page_size
            )));
        }

        let (records, total) = self.counter_repo.list(&filter, page).await?;
        Ok(RecordPage {
            records,
            total,
            page: page.page,
            limit: page.limit,
        })
    }

    pub async fn get(&self, id: CounterRecordId) -> ThrottleResult<CounterRecord> {
        self.counter_repo
            .find_by_id(id)
            .await?
            .ok_or(ThrottleError::RecordNotFound)
    }

    /// Block a record manually (1 day, or permanently)
    pub async fn block(&self, id: CounterRecordId, permanent: bool) -> ThrottleResult<CounterRecord> {
        let now = self.clock.now();
        let record = self
            .counter_repo
            .modify_by_id(id, |record| record.block_manually(permanent, now))
            .await?
            .ok_or(ThrottleError::RecordNotFound)?;

        tracing::info!(
            counter_id = %id,
            identifier = %record.identifier,
            endpoint = %record.endpoint,
            permanent,
            violation_count = record.violation_count,
            "Counter record blocked manually"
        );
        Ok(record)
    }

    /// Lift any block; violation history is kept
    pub async fn unblock(&self, id: CounterRecordId) -> ThrottleResult<CounterRecord> {
        let now = self.clock.now();
        let record = self
            .counter_repo
            .modify_by_id(id, |record| record.unblock(now))
            .await?
            .ok_or(ThrottleError::RecordNotFound)?;

        tracing::info!(
            counter_id = %id,
            identifier = %record.identifier,
            endpoint = %record.endpoint,
            "Counter record unblocked manually"
        );
        Ok(record)
    }

    /// Clear window, violation and block state
    pub async fn reset(&self, id: CounterRecordId) -> ThrottleResult<CounterRecord> {
        let now = self.clock.now();
        let record = self
            .counter_repo
            .modify_by_id(id, |record| record.reset(now))
            .await?
            .ok_or(ThrottleError::RecordNotFound)?;

        tracing::info!(
            counter_id = %id,
            identifier = %record.identifier,
            endpoint = %record.endpoint,
            "Counter record reset"
        );
        Ok(record)
    }

    pub async fn stats(&self) -> ThrottleResult<CounterStats> {
        self.counter_repo.stats(self.clock.now()).await
    }
}

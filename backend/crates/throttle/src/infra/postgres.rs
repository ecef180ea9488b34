//! PostgreSQL Repository Implementation
//!
//! Each evaluation runs in one transaction: an advisory lock on the
//! (identifier, endpoint) key serializes first inserts, `FOR UPDATE` serializes
//! against admin mutations, and the upsert is committed with the decision.

use crate::domain::entities::CounterRecord;
use crate::domain::repository::{
    CounterFilter, CounterRepository, CounterStats, Mutation, Page,
};
use crate::domain::value_objects::BlockStatus;
use crate::error::{ThrottleError, ThrottleResult};
use chrono::{DateTime, Utc};
use kernel::id::CounterRecordId;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

macro_rules! counter_columns {
    () => {
        r#"
            counter_id,
            identifier,
            endpoint,
            host(client_ip) AS client_ip,
            requests_in_window,
            window_start_at,
            violation_count,
            violation_count_reset_at,
            block_status,
            block_expires_at,
            created_at,
            updated_at
        "#
    };
}

macro_rules! list_filter {
    () => {
        r#"
            WHERE ($1::TEXT IS NULL OR identifier ILIKE '%' || $1 || '%' ESCAPE '\')
              AND ($2::TEXT IS NULL OR endpoint = $2)
              AND ($3::SMALLINT IS NULL OR block_status = $3)
        "#
    };
}

/// PostgreSQL-backed counter repository
#[derive(Clone)]
pub struct PgCounterRepository {
    pool: PgPool,
}

impl PgCounterRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl CounterRepository for PgCounterRepository {
    async fn modify<F, T>(&self, identifier: &str, endpoint: &str, f: F) -> ThrottleResult<T>
    where
        F: FnOnce(Option<CounterRecord>) -> Mutation<T> + Send,
        T: Send,
    {
        // Rolled back on drop if anything below fails
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(format!("rate_limit:{endpoint}:{identifier}"))
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, CounterRow>(concat!(
            "SELECT",
            counter_columns!(),
            "FROM rate_limit_counters WHERE identifier = $1 AND endpoint = $2 FOR UPDATE"
        ))
        .bind(identifier)
        .bind(endpoint)
        .fetch_optional(&mut *tx)
        .await?;
        let existing = row.map(CounterRow::into_record).transpose()?;

        let Mutation { write, output } = f(existing);
        if let Some(record) = write {
            upsert(&mut *tx, &record).await?;
        }

        tx.commit().await?;
        Ok(output)
    }

    async fn find_by_id(&self, id: CounterRecordId) -> ThrottleResult<Option<CounterRecord>> {
        let row = sqlx::query_as::<_, CounterRow>(concat!(
            "SELECT",
            counter_columns!(),
            "FROM rate_limit_counters WHERE counter_id = $1"
        ))
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(CounterRow::into_record).transpose()
    }

    async fn modify_by_id<F>(
        &self,
        id: CounterRecordId,
        f: F,
    ) -> ThrottleResult<Option<CounterRecord>>
    where
        F: FnOnce(&mut CounterRecord) + Send,
    {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, CounterRow>(concat!(
            "SELECT",
            counter_columns!(),
            "FROM rate_limit_counters WHERE counter_id = $1 FOR UPDATE"
        ))
        .bind(id.into_uuid())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut record = row.into_record()?;
        f(&mut record);

        upsert(&mut *tx, &record).await?;
        tx.commit().await?;

        Ok(Some(record))
    }

    async fn list(
        &self,
        filter: &CounterFilter,
        page: Page,
    ) -> ThrottleResult<(Vec<CounterRecord>, u64)> {
        let identifier = filter.identifier.as_deref().map(escape_like);
        let status = filter.status.map(|status| status.id());

        let total = sqlx::query_scalar::<_, i64>(concat!(
            "SELECT COUNT(*) FROM rate_limit_counters",
            list_filter!()
        ))
        .bind(identifier.as_deref())
        .bind(filter.endpoint.as_deref())
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, CounterRow>(concat!(
            "SELECT",
            counter_columns!(),
            "FROM rate_limit_counters",
            list_filter!(),
            "ORDER BY updated_at DESC, counter_id LIMIT $4 OFFSET $5"
        ))
        .bind(identifier.as_deref())
        .bind(filter.endpoint.as_deref())
        .bind(status)
        .bind(i64::from(page.limit))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let records = rows
            .into_iter()
            .map(CounterRow::into_record)
            .collect::<ThrottleResult<Vec<_>>>()?;

        Ok((records, total.max(0) as u64))
    }

    async fn stats(&self, now: DateTime<Utc>) -> ThrottleResult<CounterStats> {
        let (total, temporarily_blocked, permanently_blocked) =
            sqlx::query_as::<_, (i64, i64, i64)>(
                r#"
                SELECT
                    COUNT(*),
                    COUNT(*) FILTER (WHERE block_status = 1 AND block_expires_at > $1),
                    COUNT(*) FILTER (WHERE block_status = 2)
                FROM rate_limit_counters
                "#,
            )
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        Ok(CounterStats {
            total: total.max(0) as u64,
            temporarily_blocked: temporarily_blocked.max(0) as u64,
            permanently_blocked: permanently_blocked.max(0) as u64,
        })
    }
}

/// Insert the record, or overwrite the mutable columns of the existing row
async fn upsert(conn: &mut PgConnection, record: &CounterRecord) -> ThrottleResult<()> {
    sqlx::query(
        r#"
        INSERT INTO rate_limit_counters (
            counter_id,
            identifier,
            endpoint,
            client_ip,
            requests_in_window,
            window_start_at,
            violation_count,
            violation_count_reset_at,
            block_status,
            block_expires_at,
            created_at,
            updated_at
        ) VALUES ($1, $2, $3, $4::inet, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (identifier, endpoint) DO UPDATE SET
            client_ip = EXCLUDED.client_ip,
            requests_in_window = EXCLUDED.requests_in_window,
            window_start_at = EXCLUDED.window_start_at,
            violation_count = EXCLUDED.violation_count,
            violation_count_reset_at = EXCLUDED.violation_count_reset_at,
            block_status = EXCLUDED.block_status,
            block_expires_at = EXCLUDED.block_expires_at,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(record.id.into_uuid())
    .bind(&record.identifier)
    .bind(&record.endpoint)
    .bind(record.ip.to_string())
    .bind(to_db_count(record.requests_in_window))
    .bind(record.window_start_at)
    .bind(to_db_count(record.violation_count))
    .bind(record.violation_count_reset_at)
    .bind(record.block_status.code().id())
    .bind(record.block_status.expires_at())
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(conn)
    .await?;

    Ok(())
}

fn to_db_count(count: u32) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

/// Escape LIKE metacharacters so the filter is a plain substring match
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// Internal row type for sqlx mapping
#[derive(sqlx::FromRow)]
struct CounterRow {
    counter_id: Uuid,
    identifier: String,
    endpoint: String,
    client_ip: String,
    requests_in_window: i32,
    window_start_at: DateTime<Utc>,
    violation_count: i32,
    violation_count_reset_at: Option<DateTime<Utc>>,
    block_status: i16,
    block_expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CounterRow {
    fn into_record(self) -> ThrottleResult<CounterRecord> {
        let ip = self.client_ip.parse().map_err(|_| {
            ThrottleError::Internal(format!(
                "counter {} has unparseable client_ip {:?}",
                self.counter_id, self.client_ip
            ))
        })?;
        let block_status = BlockStatus::from_parts(self.block_status, self.block_expires_at)
            .ok_or_else(|| {
                ThrottleError::Internal(format!(
                    "counter {} has inconsistent block state ({}, {:?})",
                    self.counter_id, self.block_status, self.block_expires_at
                ))
            })?;

        Ok(CounterRecord {
            id: CounterRecordId::from_uuid(self.counter_id),
            identifier: self.identifier,
            endpoint: self.endpoint,
            ip,
            requests_in_window: self.requests_in_window.max(0) as u32,
            window_start_at: self.window_start_at,
            violation_count: self.violation_count.max(0) as u32,
            violation_count_reset_at: self.violation_count_reset_at,
            block_status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

//! API DTOs (Data Transfer Objects)

use crate::application::admin::RecordPage;
use crate::domain::entities::CounterRecord;
use crate::domain::repository::CounterStats;
use crate::domain::value_objects::{BlockKind, BlockStatusCode, Denial};
use chrono::{DateTime, Utc};
use kernel::id::CounterRecordId;
use serde::{Deserialize, Serialize};

/// Body of a 429 response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitedResponse {
    pub block_kind: BlockKind,
    pub message: String,
}

impl From<Denial> for RateLimitedResponse {
    fn from(denial: Denial) -> Self {
        Self {
            block_kind: denial.kind,
            message: denial.message,
        }
    }
}

/// A counter record as shown to administrators
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterRecordResponse {
    pub id: CounterRecordId,
    pub identifier: String,
    pub endpoint: String,
    pub ip: String,
    pub requests_in_window: u32,
    pub window_start_at: DateTime<Utc>,
    pub violation_count: u32,
    pub violation_count_reset_at: Option<DateTime<Utc>>,
    pub block_status: BlockStatusCode,
    pub block_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CounterRecord> for CounterRecordResponse {
    fn from(record: CounterRecord) -> Self {
        Self {
            id: record.id,
            identifier: record.identifier,
            endpoint: record.endpoint,
            ip: record.ip.to_string(),
            requests_in_window: record.requests_in_window,
            window_start_at: record.window_start_at,
            violation_count: record.violation_count,
            violation_count_reset_at: record.violation_count_reset_at,
            block_status: record.block_status.code(),
            block_expires_at: record.block_status.expires_at(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Response for GET /
#[derive(Debug, Clone, Serialize)]
pub struct RecordListResponse {
    pub records: Vec<CounterRecordResponse>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl From<RecordPage> for RecordListResponse {
    fn from(page: RecordPage) -> Self {
        Self {
            records: page.records.into_iter().map(Into::into).collect(),
            total: page.total,
            page: page.page,
            limit: page.limit,
        }
    }
}

/// Query for GET /
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListRecordsQuery {
    pub identifier: Option<String>,
    pub endpoint: Option<String>,
    /// `none`, `temporary` or `permanent`
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Request for POST /{id}/block
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockRequest {
    #[serde(default)]
    pub permanent: bool,
}

/// Response for GET /stats
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total: u64,
    pub temporarily_blocked: u64,
    pub permanently_blocked: u64,
    pub active_blocked: u64,
}

impl From<CounterStats> for StatsResponse {
    fn from(stats: CounterStats) -> Self {
        Self {
            total: stats.total,
            temporarily_blocked: stats.temporarily_blocked,
            permanently_blocked: stats.permanently_blocked,
            active_blocked: stats.active_blocked(),
        }
    }
}

//! HTTP Handlers for the admin control surface

use crate::application::admin::AdminUseCase;
use crate::application::clock::Clock;
use crate::application::config::ThrottleConfig;
use crate::domain::repository::{CounterFilter, CounterRepository};
use crate::domain::value_objects::BlockStatusCode;
use crate::error::{ThrottleError, ThrottleResult};
use crate::presentation::dto::{
    BlockRequest, CounterRecordResponse, ListRecordsQuery, RecordListResponse, StatsResponse,
};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use kernel::id::CounterRecordId;
use std::sync::Arc;

/// Shared state for admin handlers
#[derive(Clone)]
pub struct AdminAppState<R>
where
    R: CounterRepository + Clone + Send + Sync + 'static,
{
    pub repo: Arc<R>,
    pub config: Arc<ThrottleConfig>,
    pub clock: Arc<dyn Clock>,
}

impl<R> AdminAppState<R>
where
    R: CounterRepository + Clone + Send + Sync + 'static,
{
    fn use_case(&self) -> AdminUseCase<R> {
        AdminUseCase::new(self.repo.clone(), self.config.clone(), self.clock.clone())
    }
}

fn parse_id(raw: &str) -> ThrottleResult<CounterRecordId> {
    raw.parse()
        .map_err(|_| ThrottleError::InvalidRequest(format!("invalid record id: {raw}")))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// GET /
pub async fn list_records<R>(
    State(state): State<AdminAppState<R>>,
    Query(query): Query<ListRecordsQuery>,
) -> ThrottleResult<Json<RecordListResponse>>
where
    R: CounterRepository + Clone + Send + Sync + 'static,
{
    let status = match non_empty(query.status) {
        Some(code) => Some(BlockStatusCode::from_code(&code).ok_or_else(|| {
            ThrottleError::InvalidRequest(format!("unknown block status: {code}"))
        })?),
        None => None,
    };
    let filter = CounterFilter {
        identifier: non_empty(query.identifier),
        endpoint: non_empty(query.endpoint),
        status,
    };

    let page = state
        .use_case()
        .list(filter, query.page, query.limit)
        .await?;
    Ok(Json(page.into()))
}

/// GET /stats
pub async fn get_stats<R>(
    State(state): State<AdminAppState<R>>,
) -> ThrottleResult<Json<StatsResponse>>
where
    R: CounterRepository + Clone + Send + Sync + 'static,
{
    let stats = state.use_case().stats().await?;
    Ok(Json(stats.into()))
}

/// GET /{id}
pub async fn get_record<R>(
    State(state): State<AdminAppState<R>>,
    Path(id): Path<String>,
) -> ThrottleResult<Json<CounterRecordResponse>>
where
    R: CounterRepository + Clone + Send + Sync + 'static,
{
    let record = state.use_case().get(parse_id(&id)?).await?;
    Ok(Json(record.into()))
}

/// POST /{id}/block
pub async fn block_record<R>(
    State(state): State<AdminAppState<R>>,
    Path(id): Path<String>,
    Json(req): Json<BlockRequest>,
) -> ThrottleResult<Json<CounterRecordResponse>>
where
    R: CounterRepository + Clone + Send + Sync + 'static,
{
    let record = state
        .use_case()
        .block(parse_id(&id)?, req.permanent)
        .await?;
    Ok(Json(record.into()))
}

/// POST /{id}/unblock
pub async fn unblock_record<R>(
    State(state): State<AdminAppState<R>>,
    Path(id): Path<String>,
) -> ThrottleResult<Json<CounterRecordResponse>>
where
    R: CounterRepository + Clone + Send + Sync + 'static,
{
    let record = state.use_case().unblock(parse_id(&id)?).await?;
    Ok(Json(record.into()))
}

/// POST /{id}/reset
pub async fn reset_record<R>(
    State(state): State<AdminAppState<R>>,
    Path(id): Path<String>,
) -> ThrottleResult<StatusCode>
where
    R: CounterRepository + Clone + Send + Sync + 'static,
{
    state.use_case().reset(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

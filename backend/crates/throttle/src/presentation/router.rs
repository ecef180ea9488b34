//! Admin Router

use crate::application::clock::{Clock, SystemClock};
use crate::application::config::ThrottleConfig;
use crate::domain::repository::CounterRepository;
use crate::infra::postgres::PgCounterRepository;
use crate::presentation::handlers::{self, AdminAppState};
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

/// Create the admin router with PostgreSQL repository
pub fn admin_router(repo: PgCounterRepository, config: ThrottleConfig) -> Router {
    admin_router_generic(repo, config, Arc::new(SystemClock))
}

/// Create a generic admin router for any repository implementation
pub fn admin_router_generic<R>(repo: R, config: ThrottleConfig, clock: Arc<dyn Clock>) -> Router
where
    R: CounterRepository + Clone + Send + Sync + 'static,
{
    let state = AdminAppState {
        repo: Arc::new(repo),
        config: Arc::new(config),
        clock,
    };

    Router::new()
        .route("/", get(handlers::list_records::<R>))
        .route("/stats", get(handlers::get_stats::<R>))
        .route("/{id}", get(handlers::get_record::<R>))
        .route("/{id}/block", post(handlers::block_record::<R>))
        .route("/{id}/unblock", post(handlers::unblock_record::<R>))
        .route("/{id}/reset", post(handlers::reset_record::<R>))
        .with_state(state)
}

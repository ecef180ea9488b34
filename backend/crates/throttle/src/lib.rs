//! Abuse-Prevention Rate Limiting
//!
//! Clean Architecture structure:
//! - `domain/` - Counter records, block escalation, repository traits
//! - `application/` - Use cases (evaluate, guest identity, admin)
//! - `infra/` - PostgreSQL and in-memory counter stores
//! - `presentation/` - Guard middleware and admin HTTP handlers
//!
//! ## Model
//! - One counter record per (identifier, endpoint), counted in fixed windows
//! - Exceeding the quota is a violation; blocks escalate from 10 minutes up to
//!   permanent on the fifth violation
//! - Violations decay 7 days after the last one; state only changes when a
//!   record is accessed
//! - Each evaluation is one locked read-modify-write on its record

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

// Re-exports for convenience
pub use application::admin::AdminUseCase;
pub use application::clock::{Clock, ManualClock, SystemClock};
pub use application::config::ThrottleConfig;
pub use application::evaluate::EvaluateUseCase;
pub use application::guest_identity::{GuestIdentifierResolver, GuestIdentity};
pub use domain::repository::CounterRepository;
pub use domain::value_objects::{BlockKind, Decision, Quota};
pub use error::{ThrottleError, ThrottleResult};
pub use infra::memory::InMemoryCounterRepository;
pub use infra::postgres::PgCounterRepository;
pub use presentation::middleware::{
    AuthenticatedCaller, RateLimitGuardState, enforce_rate_limit, governed,
};
pub use presentation::router::{admin_router, admin_router_generic};

#[cfg(test)]
mod tests;

//! Evaluate Use Case
//!
//! Runs the window & escalation algorithm for one governed request inside a
//! single locked read-modify-write of the caller's counter record.

use crate::application::clock::Clock;
use crate::domain::repository::CounterRepository;
use crate::domain::services;
use crate::domain::value_objects::{Decision, Quota};
use crate::error::ThrottleResult;
use std::net::IpAddr;
use std::sync::Arc;

/// Evaluate Use Case
pub struct EvaluateUseCase<R>
where
    R: CounterRepository,
{
    counter_repo: Arc<R>,
    clock: Arc<dyn Clock>,
}

impl<R> EvaluateUseCase<R>
where
    R: CounterRepository,
{
    pub fn new(counter_repo: Arc<R>, clock: Arc<dyn Clock>) -> Self {
        Self {
            counter_repo,
            clock,
        }
    }

    /// Decide whether `identifier` may call `endpoint` now
    ///
    /// A denial is an `Ok(Decision::Deny)`; `Err` only signals a storage failure.
    pub async fn execute(
        &self,
        identifier: &str,
        ip: IpAddr,
        endpoint: &str,
        quota: &Quota,
    ) -> ThrottleResult<Decision> {
        let now = self.clock.now();
        let quota = *quota;

        let decision = self
            .counter_repo
            .modify(identifier, endpoint, move |existing| {
                services::evaluate(existing, identifier, endpoint, ip, &quota, now)
            })
            .await?;

        match &decision {
            Decision::Allow(allowance) => {
                tracing::debug!(
                    identifier,
                    endpoint,
                    remaining = allowance.remaining,
                    "Rate limit check passed"
                );
            }
            Decision::Deny(denial) => {
                tracing::warn!(
                    identifier,
                    endpoint,
                    %ip,
                    block_kind = %denial.kind,
                    violation_count = denial.violation_count,
                    "Rate limit denied request"
                );
            }
        }

        Ok(decision)
    }
}

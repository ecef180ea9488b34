//! Domain Services
//!
//! The window & escalation algorithm. Pure: callers supply the current record
//! and the time, and persist whatever the returned mutation says to write.

use chrono::{DateTime, Utc};
use std::net::IpAddr;

use crate::domain::entities::CounterRecord;
use crate::domain::repository::Mutation;
use crate::domain::value_objects::{Allowance, BlockStatus, Decision, Denial, Quota};

/// Evaluate one governed request
///
/// `existing` is the record for (identifier, endpoint), if any. The caller must
/// hold exclusive access to that record until the returned write is persisted.
pub fn evaluate(
    existing: Option<CounterRecord>,
    identifier: &str,
    endpoint: &str,
    ip: IpAddr,
    quota: &Quota,
    now: DateTime<Utc>,
) -> Mutation<Decision> {
    let Some(mut record) = existing else {
        let record = CounterRecord::new(identifier, endpoint, ip, now);
        let decision = allow(&record, quota);
        return Mutation::write(record, decision);
    };

    // Permanent blocks are final until an administrator steps in
    if record.block_status == BlockStatus::Permanent {
        let denial = Denial::permanent(record.violation_count);
        return Mutation::read_only(Decision::Deny(denial));
    }

    let mut changed = record.decay_violations(now);
    if record.ip != ip {
        record.ip = ip;
        changed = true;
    }

    if let BlockStatus::Temporary { expires_at } = record.block_status {
        if expires_at > now {
            let denial = Denial::temporary(expires_at, record.violation_count, now);
            let decision = Decision::Deny(denial);
            return if changed {
                Mutation::write(record, decision)
            } else {
                Mutation::read_only(decision)
            };
        }
        record.clear_expired_block(now);
    }

    if now > record.window_end(quota.window()) {
        record.start_window(now);
        let decision = allow(&record, quota);
        return Mutation::write(record, decision);
    }

    if record.requests_in_window < quota.max_requests() {
        record.count_request(now);
        let decision = allow(&record, quota);
        return Mutation::write(record, decision);
    }

    record.record_violation(now);
    let denial = match record.block_status {
        BlockStatus::Temporary { expires_at } => {
            Denial::temporary(expires_at, record.violation_count, now)
        }
        _ => Denial::permanent(record.violation_count),
    };
    Mutation::write(record, Decision::Deny(denial))
}

fn allow(record: &CounterRecord, quota: &Quota) -> Decision {
    Decision::Allow(Allowance {
        limit: quota.max_requests(),
        remaining: quota.max_requests().saturating_sub(record.requests_in_window),
        window_resets_at: record.window_end(quota.window()),
    })
}

//! Domain Entities
//!
//! The counter record is the only persisted entity of the rate-limit domain:
//! one per (identifier, endpoint) pair.

use chrono::{DateTime, Duration, Utc};
use kernel::id::CounterRecordId;
use std::net::IpAddr;

use crate::domain::value_objects::{
    BlockStatus, escalate, manual_temporary_block, violation_decay,
};

/// Rate-limit state of one caller against one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterRecord {
    pub id: CounterRecordId,
    /// `user-<id>` or a resolved guest key
    pub identifier: String,
    pub endpoint: String,
    /// Last-seen client address (audit only)
    pub ip: IpAddr,
    pub requests_in_window: u32,
    pub window_start_at: DateTime<Utc>,
    pub violation_count: u32,
    /// When passed, `violation_count` decays to zero on next access
    pub violation_count_reset_at: Option<DateTime<Utc>>,
    pub block_status: BlockStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CounterRecord {
    /// Record for the first request of a never-seen caller
    pub fn new(
        identifier: impl Into<String>,
        endpoint: impl Into<String>,
        ip: IpAddr,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CounterRecordId::new(),
            identifier: identifier.into(),
            endpoint: endpoint.into(),
            ip,
            requests_in_window: 1,
            window_start_at: now,
            violation_count: 0,
            violation_count_reset_at: None,
            block_status: BlockStatus::None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn window_end(&self, window: Duration) -> DateTime<Utc> {
        self.window_start_at + window
    }

    /// Forget violations whose decay time has passed
    ///
    /// Returns `true` if anything changed.
    pub fn decay_violations(&mut self, now: DateTime<Utc>) -> bool {
        match self.violation_count_reset_at {
            Some(reset_at) if reset_at <= now => {
                self.violation_count = 0;
                self.violation_count_reset_at = None;
                self.touch(now);
                true
            }
            _ => false,
        }
    }

    /// Drop a temporary block that has run out
    ///
    /// Returns `true` if anything changed.
    pub fn clear_expired_block(&mut self, now: DateTime<Utc>) -> bool {
        match self.block_status {
            BlockStatus::Temporary { expires_at } if expires_at <= now => {
                self.block_status = BlockStatus::None;
                self.touch(now);
                true
            }
            _ => false,
        }
    }

    /// Open a fresh window that already contains the current request
    pub fn start_window(&mut self, now: DateTime<Utc>) {
        self.requests_in_window = 1;
        self.window_start_at = now;
        self.block_status = BlockStatus::None;
        self.touch(now);
    }

    pub fn count_request(&mut self, now: DateTime<Utc>) {
        self.requests_in_window = self.requests_in_window.saturating_add(1);
        self.touch(now);
    }

    /// Register a quota violation and escalate the block accordingly
    pub fn record_violation(&mut self, now: DateTime<Utc>) {
        self.violation_count = self.violation_count.saturating_add(1);
        self.requests_in_window = 0;
        self.violation_count_reset_at = Some(now + violation_decay());
        self.block_status = escalate(self.violation_count, now);
        self.touch(now);
    }

    /// Administrative block
    ///
    /// Counts as a violation so later automatic escalation continues from it.
    pub fn block_manually(&mut self, permanent: bool, now: DateTime<Utc>) {
        self.violation_count = self.violation_count.saturating_add(1);
        self.requests_in_window = 0;
        self.violation_count_reset_at = Some(now + violation_decay());
        self.block_status = if permanent {
            BlockStatus::Permanent
        } else {
            BlockStatus::Temporary {
                expires_at: now + manual_temporary_block(),
            }
        };
        self.touch(now);
    }

    /// Administrative unblock; violation history is kept
    pub fn unblock(&mut self, now: DateTime<Utc>) {
        self.block_status = BlockStatus::None;
        self.requests_in_window = 0;
        self.window_start_at = now;
        self.touch(now);
    }

    /// Administrative reset of all window, violation and block state
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.violation_count = 0;
        self.violation_count_reset_at = None;
        self.unblock(now);
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

//! Domain Value Objects
//!
//! Immutable value types for the rate-limit domain.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How long a violation is remembered before it decays
pub fn violation_decay() -> Duration {
    Duration::days(7)
}

/// Duration of a temporary block placed by an administrator
pub fn manual_temporary_block() -> Duration {
    Duration::days(1)
}

/// Identifier of an authenticated caller
pub fn user_identifier(user_id: &str) -> String {
    format!("user-{user_id}")
}

/// Per-route request quota: at most `max_requests` per fixed window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    max_requests: u32,
    window: Duration,
}

impl Quota {
    /// `None` unless `max_requests >= 1` and the window is positive
    pub fn new(max_requests: u32, window: Duration) -> Option<Self> {
        if max_requests == 0 || window <= Duration::zero() {
            return None;
        }
        Some(Self {
            max_requests,
            window,
        })
    }

    pub fn per_minutes(max_requests: u32, window_minutes: u32) -> Option<Self> {
        Self::new(max_requests, Duration::minutes(i64::from(window_minutes)))
    }

    pub const fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub const fn window(&self) -> Duration {
        self.window
    }
}

/// The kind of block a denied caller is under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Temporary,
    Permanent,
}

impl BlockKind {
    pub const fn code(&self) -> &'static str {
        match self {
            BlockKind::Temporary => "temporary",
            BlockKind::Permanent => "permanent",
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Block state of a counter record
///
/// The expiry only exists for temporary blocks, so a permanent block or an
/// unblocked record can never carry a stale expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockStatus {
    #[default]
    None,
    Temporary {
        expires_at: DateTime<Utc>,
    },
    Permanent,
}

impl BlockStatus {
    pub const fn code(&self) -> BlockStatusCode {
        match self {
            BlockStatus::None => BlockStatusCode::None,
            BlockStatus::Temporary { .. } => BlockStatusCode::Temporary,
            BlockStatus::Permanent => BlockStatusCode::Permanent,
        }
    }

    pub const fn kind(&self) -> Option<BlockKind> {
        match self {
            BlockStatus::None => None,
            BlockStatus::Temporary { .. } => Some(BlockKind::Temporary),
            BlockStatus::Permanent => Some(BlockKind::Permanent),
        }
    }

    pub const fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            BlockStatus::Temporary { expires_at } => Some(*expires_at),
            _ => None,
        }
    }

    /// Whether requests are denied at `now`
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        match self {
            BlockStatus::None => false,
            BlockStatus::Temporary { expires_at } => *expires_at > now,
            BlockStatus::Permanent => true,
        }
    }

    /// Rebuild from the persisted (status id, expiry) pair
    ///
    /// Returns `None` when the pair violates the expiry invariant.
    pub fn from_parts(id: i16, expires_at: Option<DateTime<Utc>>) -> Option<Self> {
        match (BlockStatusCode::from_id(id)?, expires_at) {
            (BlockStatusCode::None, None) => Some(BlockStatus::None),
            (BlockStatusCode::Temporary, Some(expires_at)) => {
                Some(BlockStatus::Temporary { expires_at })
            }
            (BlockStatusCode::Permanent, None) => Some(BlockStatus::Permanent),
            _ => None,
        }
    }
}

/// Discriminant of [`BlockStatus`], used for storage and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum BlockStatusCode {
    None = 0,
    Temporary = 1,
    Permanent = 2,
}

impl BlockStatusCode {
    #[inline]
    pub const fn id(&self) -> i16 {
        *self as i16
    }

    #[inline]
    pub const fn code(&self) -> &'static str {
        match self {
            BlockStatusCode::None => "none",
            BlockStatusCode::Temporary => "temporary",
            BlockStatusCode::Permanent => "permanent",
        }
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(BlockStatusCode::None),
            1 => Some(BlockStatusCode::Temporary),
            2 => Some(BlockStatusCode::Permanent),
            _ => None,
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "none" => Some(BlockStatusCode::None),
            "temporary" => Some(BlockStatusCode::Temporary),
            "permanent" => Some(BlockStatusCode::Permanent),
            _ => None,
        }
    }
}

impl fmt::Display for BlockStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Block duration for the n-th violation; `None` means permanent
pub fn escalation_duration(violation_count: u32) -> Option<Duration> {
    match violation_count {
        0 | 1 => Some(Duration::minutes(10)),
        2 => Some(Duration::hours(1)),
        3 => Some(Duration::hours(6)),
        4 => Some(Duration::days(1)),
        _ => None,
    }
}

/// Block status to apply after the n-th violation at `now`
pub fn escalate(violation_count: u32, now: DateTime<Utc>) -> BlockStatus {
    match escalation_duration(violation_count) {
        Some(duration) => BlockStatus::Temporary {
            expires_at: now + duration,
        },
        None => BlockStatus::Permanent,
    }
}

/// Outcome of a rate-limit evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow(Allowance),
    Deny(Denial),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }

    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Decision::Deny(denial) => Some(denial),
            Decision::Allow(_) => None,
        }
    }
}

/// Window accounting for an allowed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allowance {
    pub limit: u32,
    pub remaining: u32,
    pub window_resets_at: DateTime<Utc>,
}

/// A denied request, with enough detail for the client to back off
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub kind: BlockKind,
    pub message: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub retry_after_secs: Option<u64>,
    pub violation_count: u32,
}

impl Denial {
    pub fn temporary(expires_at: DateTime<Utc>, violation_count: u32, now: DateTime<Utc>) -> Self {
        let retry_after = (expires_at - now).num_seconds().max(1);
        Self {
            kind: BlockKind::Temporary,
            message: format!(
                "Too many requests. You are temporarily blocked until {}.",
                expires_at.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            expires_at: Some(expires_at),
            retry_after_secs: Some(retry_after as u64),
            violation_count,
        }
    }

    pub fn permanent(violation_count: u32) -> Self {
        Self {
            kind: BlockKind::Permanent,
            message: "You have been permanently blocked due to repeated rate limit \
                      violations. Contact support to restore access."
                .to_string(),
            expires_at: None,
            retry_after_secs: None,
            violation_count,
        }
    }
}

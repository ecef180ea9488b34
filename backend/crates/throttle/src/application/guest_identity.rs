//! Guest Identifier Resolver
//!
//! Anonymous callers are tracked through a signed, long-lived token kept in a
//! cookie: `<uuid>:<issued_at>.<base64url HMAC-SHA256(secret, uuid:issued_at)>`
//! where `issued_at` is Unix seconds. Tokens older than the configured TTL are
//! treated like missing ones.

use crate::application::clock::Clock;
use crate::application::config::ThrottleConfig;
use chrono::{DateTime, Duration, Utc};
use kernel::id::GuestId;
use std::net::IpAddr;
use std::sync::Arc;

/// Identity of an anonymous caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestIdentity {
    pub guest_id: GuestId,
    /// `guest-<uuid>`
    pub identifier: String,
    /// Set when the token was freshly minted and must be sent to the client
    pub minted_token: Option<String>,
    pub ip: IpAddr,
}

impl GuestIdentity {
    /// Key to count this request under
    ///
    /// A freshly minted token has not reached the client yet, so the request
    /// is counted against its address. Clients that drop the cookie every time
    /// still share one counter per address.
    pub fn rate_limit_key(&self) -> String {
        match self.minted_token {
            Some(_) => format!("ip-{}", self.ip),
            None => self.identifier.clone(),
        }
    }

    pub fn is_new(&self) -> bool {
        self.minted_token.is_some()
    }
}

/// Resolves (and mints) guest identities
#[derive(Clone)]
pub struct GuestIdentifierResolver {
    secret: [u8; 32],
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl GuestIdentifierResolver {
    pub fn new(secret: [u8; 32], ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { secret, ttl, clock }
    }

    /// Resolver using the configured guest secret and token TTL
    pub fn from_config(config: &ThrottleConfig, clock: Arc<dyn Clock>) -> Self {
        let ttl = Duration::from_std(config.guest_token_ttl).unwrap_or(Duration::MAX);
        Self::new(config.guest_secret, ttl, clock)
    }

    /// Resolve the guest behind `token`, minting a new one if it is missing,
    /// does not verify or has expired
    pub fn resolve(&self, ip: IpAddr, token: Option<&str>) -> GuestIdentity {
        let now = self.clock.now();
        if let Some(guest_id) = token.and_then(|token| self.verify(token, now)) {
            return GuestIdentity {
                guest_id,
                identifier: guest_identifier(guest_id),
                minted_token: None,
                ip,
            };
        }

        let guest_id = GuestId::new();
        if token.is_some() {
            tracing::debug!(%ip, "Rejected guest token, minting a new one");
        }
        GuestIdentity {
            guest_id,
            identifier: guest_identifier(guest_id),
            minted_token: Some(self.sign(guest_id, now)),
            ip,
        }
    }

    pub fn sign(&self, guest_id: GuestId, issued_at: DateTime<Utc>) -> String {
        let payload = format!("{guest_id}:{}", issued_at.timestamp());
        platform::crypto::sign_token(&self.secret, &payload)
    }

    fn verify(&self, token: &str, now: DateTime<Utc>) -> Option<GuestId> {
        let payload = platform::crypto::verify_token(&self.secret, token).ok()?;
        let (guest_id, issued_at) = payload.split_once(':')?;
        let issued_at = DateTime::from_timestamp(issued_at.parse().ok()?, 0)?;
        if issued_at > now || now - issued_at >= self.ttl {
            return None;
        }
        guest_id.parse().ok()
    }
}

impl std::fmt::Debug for GuestIdentifierResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestIdentifierResolver")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

fn guest_identifier(guest_id: GuestId) -> String {
    format!("guest-{guest_id}")
}

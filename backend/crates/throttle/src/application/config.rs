//! Application Configuration
//!
//! Configuration for the throttle application layer.

use std::time::Duration;

use platform::cookie::CookieConfig;
/// Re-export SameSite from platform
pub use platform::cookie::SameSite;

/// Throttle application configuration
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Cookie name for the guest identity token
    pub guest_cookie_name: String,
    /// Guest token secret key for HMAC signing (32 bytes)
    pub guest_secret: [u8; 32],
    /// Guest cookie lifetime
    pub guest_token_ttl: Duration,
    /// Whether to require Secure cookie
    pub cookie_secure: bool,
    /// SameSite policy
    pub cookie_same_site: SameSite,
    /// Take the client address from `X-Forwarded-For` / `X-Real-IP`
    ///
    /// Only enable behind a reverse proxy that overwrites these headers.
    pub trust_forwarded_headers: bool,
    /// Admin listing page size when none is requested
    pub admin_default_page_size: u32,
    /// Upper bound for the admin listing page size
    pub admin_max_page_size: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            guest_cookie_name: "guest_id".to_string(),
            guest_secret: [0u8; 32],
            guest_token_ttl: Duration::from_secs(365 * 24 * 60 * 60),
            cookie_secure: true,
            cookie_same_site: SameSite::Lax,
            trust_forwarded_headers: false,
            admin_default_page_size: 20,
            admin_max_page_size: 100,
        }
    }
}

impl ThrottleConfig {
    /// Create config with a random guest secret (for development)
    pub fn with_random_secret() -> Self {
        Self {
            guest_secret: platform::crypto::random_secret(),
            ..Default::default()
        }
    }

    /// Create config for development (insecure cookie)
    pub fn development() -> Self {
        Self {
            cookie_secure: false,
            ..Self::with_random_secret()
        }
    }

    /// Attributes of the guest identity cookie
    pub fn guest_cookie(&self) -> CookieConfig {
        CookieConfig::new(&self.guest_cookie_name)
            .with_max_age(self.guest_token_ttl)
            .with_secure(self.cookie_secure)
            .with_same_site(self.cookie_same_site)
    }
}

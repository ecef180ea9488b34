//! Platform Crate - Technical Infrastructure
//!
//! This crate provides shared technical foundations:
//! - Cryptographic utilities (HMAC-SHA256 signed tokens, Base64, secrets)
//! - Cookie management
//! - Client identification (IP extraction behind reverse proxies)

pub mod client;
pub mod cookie;
pub mod crypto;

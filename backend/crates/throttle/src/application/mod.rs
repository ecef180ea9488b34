//! Application Layer - Use Cases
//!
//! This layer orchestrates domain logic and infrastructure.
//! Contains use case implementations.

pub mod admin;
pub mod clock;
pub mod config;
pub mod evaluate;
pub mod guest_identity;

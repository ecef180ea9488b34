//! Shared Kernel - Domain-crossing minimal core
//!
//! This crate contains the vocabulary every backend crate agrees on:
//! - The HTTP-facing error type ([`error::app_error::AppError`]) and its kinds
//! - Typed ID wrappers for persisted entities
//!
//! Anything that changes often or only matters to one crate does not belong here.

pub mod error {
    pub mod app_error;
    pub mod conversions;
    pub mod kind;
}
pub mod id;

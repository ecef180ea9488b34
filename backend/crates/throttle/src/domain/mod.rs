//! Domain Layer - Business logic and entities
//!
//! This layer contains:
//! - Domain entities (CounterRecord)
//! - Domain value objects (Quota, BlockStatus, Decision)
//! - Domain services (window & escalation algorithm)
//! - Repository traits (interfaces)

pub mod entities;
pub mod repository;
pub mod services;
pub mod value_objects;

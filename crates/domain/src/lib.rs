//! Domain layer for the race registration backend.
//!
//! This crate contains:
//! - Domain models (registrations, distances, groups, batches, invites, billing)
//! - Pure business logic services (holds, capacity, pricing, discounts,
//!   entitlements, feature gating)
//! - Domain error codes

pub mod error;
pub mod models;
pub mod services;

pub use error::{DomainError, ErrorCode};

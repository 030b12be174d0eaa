//! Shared utilities and common types for the race registration backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Token hashing and secure token generation
//! - Session token (JWT) claims and validation
//! - CSV reading and writing for bulk uploads
//! - Common validation logic

pub mod crypto;
pub mod csv;
pub mod jwt;
pub mod validation;

//! HTTP route handlers.
//!
//! Handlers only extract, delegate to a service and serialize; every rule
//! lives in the service layer.

pub mod admin;
pub mod billing;
pub mod group_batches;
pub mod groups;
pub mod health;
pub mod invites;
pub mod registrations;

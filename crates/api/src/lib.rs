//! HTTP service for race registration: configuration, the command layer,
//! routes and background jobs.

pub mod app;
pub mod config;
pub mod error;
pub mod extractors;
pub mod jobs;
pub mod middleware;
pub mod routes;
pub mod services;

//! Background jobs.

mod cleanup_unverified_users;
mod pool_metrics;
mod scheduler;

pub use cleanup_unverified_users::CleanupUnverifiedUsersJob;
pub use pool_metrics::PoolMetricsJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};

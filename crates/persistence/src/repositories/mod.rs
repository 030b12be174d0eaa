//! Repository implementations.
//!
//! Repositories own every SQL statement. Methods on `&self` run on the pool;
//! associated functions taking a connection run inside the caller's
//! transaction.

pub mod audit_log;
pub mod billing;
pub mod event;
pub mod group;
pub mod group_batch;
pub mod invite;
pub mod registration;
pub mod user;

pub use audit_log::AuditLogRepository;
pub use billing::BillingRepository;
pub use event::EventRepository;
pub use group::GroupRepository;
pub use group_batch::GroupBatchRepository;
pub use invite::InviteRepository;
pub use registration::{NewRegistration, RegistrationRepository};
pub use user::{PurgeCounts, UserRepository};

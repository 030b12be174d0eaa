//! Pure business rules for race registration.
//!
//! Nothing here performs I/O; the persistence and API layers feed these
//! functions with rows and apply their decisions with guarded writes.

pub mod audit;
pub mod batch_rows;
pub mod capacity;
pub mod entitlement;
pub mod group_discount;
pub mod hold_policy;
pub mod lifecycle;
pub mod notification;
pub mod pricing;
pub mod pro_feature;

pub use audit::AuditLogBuilder;
pub use capacity::{CapacityKey, CapacityShortfall};
pub use entitlement::evaluate_pro_entitlement;
pub use hold_policy::{is_expired_hold, HoldPolicy};
pub use lifecycle::{LifecycleAction, TransitionPlan};
pub use notification::{
    MockNotifier, NotificationKind, NotificationMessage, NotificationResult, Notifier,
};
pub use pricing::PriceBreakdown;
pub use pro_feature::{evaluate_pro_feature, ProFeatureConfig, ProFeatureDecision};

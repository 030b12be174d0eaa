//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod audit_log;
pub mod billing;
pub mod event;
pub mod group;
pub mod group_batch;
pub mod invite;
pub mod registration;
pub mod user;

pub use audit_log::AuditLogEntity;
pub use billing::{
    BillingPromotionEntity, BillingSubscriptionEntity, EntitlementOverrideEntity,
    PendingGrantEntity, PromotionRedemptionEntity, TrialUseEntity,
};
pub use event::{AddOnEntity, DistanceEntity, EventEditionEntity, PricingTierEntity};
pub use group::{GroupDiscountRuleEntity, GroupMemberEntity, RegistrationGroupEntity};
pub use group_batch::{GroupBatchEntity, GroupBatchRowEntity};
pub use invite::RegistrationInviteEntity;
pub use registration::{RegistrantEntity, RegistrationEntity};
pub use user::UserEntity;

//! Domain models for race registration.

pub mod audit_log;
pub mod auth;
pub mod billing;
pub mod event;
pub mod group;
pub mod group_batch;
pub mod invite;
pub mod registration;
pub mod user;

pub use audit_log::{ActorType, AuditAction, CreateAuditLogInput};
pub use auth::{
    AuthContext, PERMISSION_BILLING_ADMIN, PERMISSION_MANAGE_REGISTRATIONS, PERMISSION_MANAGE_USERS,
};
pub use billing::{
    BillingPromotion, BillingSubscription, ClaimGrantsResult, CreatePendingGrantRequest,
    CreatePromotionRequest, EntitlementInterval, EntitlementOverride, EntitlementSource,
    OverrideSourceType, PendingEntitlementGrant, ProEntitlement, RedeemPromotionRequest,
    RedeemPromotionResult, ResumeSubscriptionResult, ScheduleCancelResult, StartTrialResult,
    SubscriptionStatus,
};
pub use event::{AddOn, CapacityScope, Distance, DistanceAvailability, EventEdition, PricingTier};
pub use group::{
    CreateGroupRequest, GroupDiscount, GroupDiscountRule, GroupDiscountStatus, GroupMember,
    RegistrationGroup,
};
pub use group_batch::{
    BatchRowInput, BatchRowSummary, BatchStatus, CreateGroupBatchRequest, GroupBatchSummary,
    GroupRegistrationBatch, GroupRegistrationBatchRow, ParsedBatchRow, ProcessGroupBatchResult,
};
pub use invite::{
    ClaimInviteRequest, ClaimInviteResult, InviteStatus, IssueInvitesResult, RegistrationInvite,
};
pub use registration::{
    DemoPaymentResult, PaymentResponsibility, RegistrantInput, Registration, RegistrationStatus,
    StartRegistrationRequest,
};
pub use user::{EmailVerificationResult, UnverifiedCleanupReport};

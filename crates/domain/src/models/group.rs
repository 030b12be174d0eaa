//! Registration group and discount rule models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A shareable cohort whose verified size unlocks discount tiers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationGroup {
    pub id: Uuid,
    pub edition_id: Uuid,
    pub name: String,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Membership of a user in a registration group.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub id: Uuid,
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
    /// Set when the member left; left members never count toward discounts.
    pub left_at: Option<DateTime<Utc>>,
}

impl GroupMember {
    pub fn is_active(&self) -> bool {
        self.left_at.is_none()
    }
}

/// One step of an edition's group discount step function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDiscountRule {
    pub id: Uuid,
    pub edition_id: Uuid,
    pub min_participants: i32,
    pub percent_off: i32,
    pub is_active: bool,
}

/// The discount tier a group currently qualifies for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDiscount {
    pub rule_id: Uuid,
    pub min_participants: i32,
    pub percent_off: i32,
}

/// Request payload for creating a registration group.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub edition_id: Uuid,

    #[validate(length(min = 1, max = 120, message = "name must be 1-120 characters"))]
    pub name: String,
}

/// Discount state reported for a group.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDiscountStatus {
    pub group_id: Uuid,
    pub verified_members: i64,
    pub discount: Option<GroupDiscount>,
}

//! Registration group entities.

use chrono::{DateTime, Utc};
use domain::models::{GroupDiscountRule, GroupMember, RegistrationGroup};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct RegistrationGroupEntity {
    pub id: Uuid,
    pub edition_id: Uuid,
    pub name: String,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<RegistrationGroupEntity> for RegistrationGroup {
    fn from(entity: RegistrationGroupEntity) -> Self {
        Self {
            id: entity.id,
            edition_id: entity.edition_id,
            name: entity.name,
            created_by: entity.created_by,
            created_at: entity.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct GroupMemberEntity {
    pub id: Uuid,
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

impl From<GroupMemberEntity> for GroupMember {
    fn from(entity: GroupMemberEntity) -> Self {
        Self {
            id: entity.id,
            group_id: entity.group_id,
            user_id: entity.user_id,
            joined_at: entity.joined_at,
            left_at: entity.left_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct GroupDiscountRuleEntity {
    pub id: Uuid,
    pub edition_id: Uuid,
    pub min_participants: i32,
    pub percent_off: i32,
    pub is_active: bool,
}

impl From<GroupDiscountRuleEntity> for GroupDiscountRule {
    fn from(entity: GroupDiscountRuleEntity) -> Self {
        Self {
            id: entity.id,
            edition_id: entity.edition_id,
            min_participants: entity.min_participants,
            percent_off: entity.percent_off,
            is_active: entity.is_active,
        }
    }
}

//! Group discount tier selection.

use crate::models::{GroupDiscount, GroupDiscountRule};

/// Selects the highest tier the verified member count satisfies.
///
/// Inactive rules are ignored. Among rules with the same threshold the
/// larger percentage wins.
pub fn select_discount_rule(
    rules: &[GroupDiscountRule],
    verified_members: i64,
) -> Option<GroupDiscount> {
    let mut candidates: Vec<&GroupDiscountRule> = rules
        .iter()
        .filter(|r| r.is_active && r.percent_off > 0)
        .collect();
    candidates.sort_by(|a, b| {
        b.min_participants
            .cmp(&a.min_participants)
            .then(b.percent_off.cmp(&a.percent_off))
    });

    candidates
        .into_iter()
        .find(|r| i64::from(r.min_participants) <= verified_members)
        .map(|r| GroupDiscount {
            rule_id: r.id,
            min_participants: r.min_participants,
            percent_off: r.percent_off.min(100),
        })
}

/// Percentage a registration should be moved to, if any.
///
/// Discounts only ever increase: a registration keeps an already applied
/// percentage even when the group later shrinks below its tier.
pub fn discount_upgrade(current: Option<i32>, candidate: Option<&GroupDiscount>) -> Option<i32> {
    let candidate = candidate?.percent_off;
    match current {
        Some(applied) if applied >= candidate => None,
        _ => Some(candidate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn rule(min: i32, pct: i32, active: bool) -> GroupDiscountRule {
        GroupDiscountRule {
            id: Uuid::new_v4(),
            edition_id: Uuid::nil(),
            min_participants: min,
            percent_off: pct,
            is_active: active,
        }
    }

    #[test]
    fn test_highest_qualifying_tier_wins() {
        let rules = vec![rule(2, 5, true), rule(5, 10, true), rule(10, 20, true)];
        assert_eq!(select_discount_rule(&rules, 1), None);
        assert_eq!(select_discount_rule(&rules, 2).unwrap().percent_off, 5);
        assert_eq!(select_discount_rule(&rules, 9).unwrap().percent_off, 10);
        assert_eq!(select_discount_rule(&rules, 10).unwrap().percent_off, 20);
        assert_eq!(select_discount_rule(&rules, 500).unwrap().percent_off, 20);
    }

    #[test]
    fn test_inactive_rules_are_ignored() {
        let rules = vec![rule(2, 5, true), rule(3, 15, false)];
        assert_eq!(select_discount_rule(&rules, 4).unwrap().percent_off, 5);
        assert_eq!(select_discount_rule(&[], 4), None);
    }

    #[test]
    fn test_same_threshold_prefers_larger_percent() {
        let rules = vec![rule(3, 5, true), rule(3, 12, true)];
        assert_eq!(select_discount_rule(&rules, 3).unwrap().percent_off, 12);
    }

    #[test]
    fn test_discount_upgrade_is_monotonic() {
        let ten = GroupDiscount {
            rule_id: Uuid::new_v4(),
            min_participants: 2,
            percent_off: 10,
        };
        assert_eq!(discount_upgrade(None, Some(&ten)), Some(10));
        assert_eq!(discount_upgrade(Some(5), Some(&ten)), Some(10));
        assert_eq!(discount_upgrade(Some(10), Some(&ten)), None);
        assert_eq!(discount_upgrade(Some(20), Some(&ten)), None);
        assert_eq!(discount_upgrade(Some(20), None), None);
        assert_eq!(discount_upgrade(None, None), None);
    }
}

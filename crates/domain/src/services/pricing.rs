//! Registration pricing.
//!
//! The group discount reduces the base price only. The platform fee base is
//! the undiscounted list price plus the add-ons total, so a 10% discount on
//! 10000 with a 5% fee yields base 9000, fee 500, total 9500.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{AddOn, Distance, PricingTier};

pub const DEFAULT_FEE_BASIS_POINTS: i32 = 500;

/// Stored price fields of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    /// Base price after discount.
    pub base_price_cents: i64,
    pub discount_amount_cents: i64,
    pub group_discount_percent_off: Option<i32>,
    pub add_ons_cents: i64,
    pub fees_cents: i64,
    pub total_cents: i64,
}

impl PriceBreakdown {
    pub fn list_price_cents(&self) -> i64 {
        self.base_price_cents + self.discount_amount_cents
    }
}

/// Integer division rounding half away from zero, for non-negative inputs.
fn round_div(numerator: i64, denominator: i64) -> i64 {
    (2 * numerator + denominator) / (2 * denominator)
}

/// Price of a distance at `now`: the active tier with the latest start,
/// or the distance's own price when no tier is active.
pub fn select_base_price(distance: &Distance, tiers: &[PricingTier], now: DateTime<Utc>) -> i64 {
    tiers
        .iter()
        .filter(|t| t.distance_id == distance.id && t.is_active_at(now))
        .max_by_key(|t| t.starts_at)
        .map_or(distance.price_cents, |t| t.price_cents)
}

/// Sum of selected add-on prices.
pub fn add_ons_total(add_ons: &[&AddOn]) -> i64 {
    add_ons.iter().map(|a| a.price_cents).sum()
}

/// Computes the stored price fields.
///
/// `fee_basis_points` applies to `list_price_cents + add_ons_cents`, before
/// any discount. `percent_off` values outside 1..=100 are ignored.
pub fn compute_price(
    list_price_cents: i64,
    add_ons_cents: i64,
    percent_off: Option<i32>,
    fee_basis_points: i32,
) -> PriceBreakdown {
    let list = list_price_cents.max(0);
    let add_ons = add_ons_cents.max(0);
    let percent_off = percent_off.filter(|p| (1..=100).contains(p));

    let discount = percent_off.map_or(0, |p| round_div(list * i64::from(p), 100));
    let base = list - discount;
    let fees = round_div(
        (list + add_ons) * i64::from(fee_basis_points.max(0)),
        10_000,
    );

    PriceBreakdown {
        base_price_cents: base,
        discount_amount_cents: discount,
        group_discount_percent_off: percent_off,
        add_ons_cents: add_ons,
        fees_cents: fees,
        total_cents: base + add_ons + fees,
    }
}

/// Re-applies a new discount percentage to an existing breakdown.
///
/// Fees do not depend on the discount and are carried over unchanged.
pub fn reprice_with_discount(current: &PriceBreakdown, percent_off: i32) -> PriceBreakdown {
    let list = current.list_price_cents();
    let discount = round_div(list * i64::from(percent_off.clamp(0, 100)), 100);
    let base = list - discount;

    PriceBreakdown {
        base_price_cents: base,
        discount_amount_cents: discount,
        group_discount_percent_off: Some(percent_off),
        add_ons_cents: current.add_ons_cents,
        fees_cents: current.fees_cents,
        total_cents: base + current.add_ons_cents + current.fees_cents,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    #[test]
    fn test_discount_then_fee() {
        let price = compute_price(10_000, 0, Some(10), DEFAULT_FEE_BASIS_POINTS);
        assert_eq!(price.base_price_cents, 9_000);
        assert_eq!(price.discount_amount_cents, 1_000);
        assert_eq!(price.fees_cents, 500);
        assert_eq!(price.total_cents, 9_500);
        assert_eq!(price.list_price_cents(), 10_000);
    }

    #[test]
    fn test_fee_base_is_list_price_plus_add_ons() {
        let price = compute_price(10_000, 2_000, Some(10), 500);
        assert_eq!(price.base_price_cents, 9_000);
        assert_eq!(price.add_ons_cents, 2_000);
        // 5% of 12000, the discount does not lower the fee.
        assert_eq!(price.fees_cents, 600);
        assert_eq!(price.total_cents, 11_600);
    }

    #[test]
    fn test_no_discount() {
        let price = compute_price(4_000, 1_500, None, 500);
        assert_eq!(price.base_price_cents, 4_000);
        assert_eq!(price.discount_amount_cents, 0);
        assert_eq!(price.add_ons_cents, 1_500);
        assert_eq!(price.fees_cents, 275);
        assert_eq!(price.total_cents, 5_775);
        assert_eq!(price.group_discount_percent_off, None);
    }

    #[test]
    fn test_rounding_half_up() {
        // 15% of 3333 = 499.95
        let price = compute_price(3_333, 0, Some(15), 0);
        assert_eq!(price.discount_amount_cents, 500);
        // 5% of 1010 = 50.5
        let price = compute_price(1_010, 0, None, 500);
        assert_eq!(price.fees_cents, 51);
    }

    #[test]
    fn test_out_of_range_percent_is_ignored() {
        assert_eq!(compute_price(1_000, 0, Some(0), 0).discount_amount_cents, 0);
        assert_eq!(compute_price(1_000, 0, Some(150), 0).group_discount_percent_off, None);
    }

    #[test]
    fn test_reprice_keeps_fees() {
        let original = compute_price(10_000, 2_000, None, 500);
        let repriced = reprice_with_discount(&original, 20);
        assert_eq!(repriced.base_price_cents, 8_000);
        assert_eq!(repriced.fees_cents, original.fees_cents);
        assert_eq!(repriced.total_cents, 8_000 + 2_000 + 600);

        let again = reprice_with_discount(&repriced, 10);
        assert_eq!(again.base_price_cents, 9_000);
    }

    #[test]
    fn test_select_base_price_prefers_latest_active_tier() {
        let now = Utc::now();
        let distance = Distance {
            id: Uuid::new_v4(),
            edition_id: Uuid::new_v4(),
            name: "Half".into(),
            capacity: None,
            capacity_scope: crate::models::CapacityScope::PerDistance,
            price_cents: 7_000,
        };
        let tier = |price, starts: Option<DateTime<Utc>>, ends: Option<DateTime<Utc>>| PricingTier {
            id: Uuid::new_v4(),
            distance_id: distance.id,
            label: "tier".into(),
            price_cents: price,
            starts_at: starts,
            ends_at: ends,
        };

        assert_eq!(select_base_price(&distance, &[], now), 7_000);

        let tiers = vec![
            tier(5_000, None, Some(now - Duration::days(1))),
            tier(6_000, Some(now - Duration::days(30)), None),
            tier(6_500, Some(now - Duration::days(2)), None),
            tier(9_000, Some(now + Duration::days(1)), None),
        ];
        assert_eq!(select_base_price(&distance, &tiers, now), 6_500);
    }
}

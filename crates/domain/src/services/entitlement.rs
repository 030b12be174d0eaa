//! Billing entitlement evaluation.
//!
//! Intervals from every source are merged with a sort and a single sweep.
//! Intervals are half-open: one ending exactly at `now` is not active.

use chrono::{DateTime, Utc};

use crate::models::{EntitlementInterval, EntitlementSource, ProEntitlement};

/// A maximal run of overlapping or touching intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergedRun {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    /// Source of the interval that pushed `ends_at` furthest. On ties the
    /// interval met first in start order keeps it.
    pub effective_source: EntitlementSource,
}

impl MergedRun {
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now < self.ends_at
    }
}

/// Merges intervals still active or upcoming at `now` into disjoint runs.
pub fn merge_intervals(intervals: &[EntitlementInterval], now: DateTime<Utc>) -> Vec<MergedRun> {
    let mut live: Vec<&EntitlementInterval> = intervals
        .iter()
        .filter(|i| i.ends_at > now && i.ends_at > i.starts_at)
        .collect();
    // Stable: equal starts keep input order.
    live.sort_by_key(|i| i.starts_at);

    let mut runs: Vec<MergedRun> = Vec::new();
    for interval in live {
        match runs.last_mut() {
            Some(run) if interval.starts_at <= run.ends_at => {
                if interval.ends_at > run.ends_at {
                    run.ends_at = interval.ends_at;
                    run.effective_source = interval.source;
                }
            }
            _ => runs.push(MergedRun {
                starts_at: interval.starts_at,
                ends_at: interval.ends_at,
                effective_source: interval.source,
            }),
        }
    }
    runs
}

/// Decides whether a user is Pro at `now`.
///
/// Internal users short-circuit to `internal_bypass` with no expiry.
pub fn evaluate_pro_entitlement(
    now: DateTime<Utc>,
    is_internal: bool,
    intervals: &[EntitlementInterval],
) -> ProEntitlement {
    if is_internal {
        return ProEntitlement {
            is_pro: true,
            pro_until: None,
            effective_source: Some(EntitlementSource::InternalBypass),
        };
    }

    merge_intervals(intervals, now)
        .into_iter()
        .filter(|run| run.contains(now))
        .max_by_key(|run| run.ends_at)
        .map_or_else(ProEntitlement::none, |run| ProEntitlement {
            is_pro: true,
            pro_until: Some(run.ends_at),
            effective_source: Some(run.effective_source),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::models::EntitlementSource::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn iv(source: EntitlementSource, start: Duration, end: Duration) -> EntitlementInterval {
        EntitlementInterval::new(source, t0() + start, t0() + end)
    }

    #[test]
    fn test_contiguous_intervals_merge() {
        let intervals = [
            iv(Subscription, Duration::zero(), Duration::hours(6)),
            iv(Promotion, Duration::hours(6), Duration::days(2)),
        ];
        let result = evaluate_pro_entitlement(t0() + Duration::hours(1), false, &intervals);
        assert!(result.is_pro);
        assert_eq!(result.pro_until, Some(t0() + Duration::days(2)));
        assert_eq!(result.effective_source, Some(Promotion));
    }

    #[test]
    fn test_furthest_end_wins_not_first_start() {
        let intervals = [
            iv(Subscription, Duration::zero(), Duration::days(10)),
            iv(Promotion, Duration::days(1), Duration::days(40)),
            iv(Override, Duration::days(2), Duration::days(5)),
        ];
        let result = evaluate_pro_entitlement(t0() + Duration::days(3), false, &intervals);
        assert_eq!(result.pro_until, Some(t0() + Duration::days(40)));
        assert_eq!(result.effective_source, Some(Promotion));
    }

    #[test]
    fn test_tie_keeps_first_encountered() {
        let intervals = [
            iv(Override, Duration::hours(1), Duration::days(3)),
            iv(Trial, Duration::zero(), Duration::days(3)),
        ];
        let result = evaluate_pro_entitlement(t0() + Duration::hours(2), false, &intervals);
        assert_eq!(result.effective_source, Some(Trial));

        let same_start = [
            iv(Promotion, Duration::zero(), Duration::days(3)),
            iv(Subscription, Duration::zero(), Duration::days(3)),
        ];
        let result = evaluate_pro_entitlement(t0() + Duration::hours(2), false, &same_start);
        assert_eq!(result.effective_source, Some(Promotion));
    }

    #[test]
    fn test_end_boundary_is_exclusive() {
        let intervals = [iv(Trial, Duration::zero(), Duration::days(14))];
        let at_end = evaluate_pro_entitlement(t0() + Duration::days(14), false, &intervals);
        assert_eq!(at_end, ProEntitlement::none());

        let just_before = evaluate_pro_entitlement(
            t0() + Duration::days(14) - Duration::seconds(1),
            false,
            &intervals,
        );
        assert!(just_before.is_pro);
    }

    #[test]
    fn test_start_boundary_is_inclusive() {
        let intervals = [iv(Override, Duration::days(1), Duration::days(2))];
        assert!(evaluate_pro_entitlement(t0() + Duration::days(1), false, &intervals).is_pro);
        assert!(!evaluate_pro_entitlement(t0(), false, &intervals).is_pro);
    }

    #[test]
    fn test_gap_splits_runs() {
        let intervals = [
            iv(Trial, Duration::zero(), Duration::days(1)),
            iv(Promotion, Duration::days(2), Duration::days(3)),
        ];
        let runs = merge_intervals(&intervals, t0());
        assert_eq!(runs.len(), 2);

        let in_gap = evaluate_pro_entitlement(t0() + Duration::hours(36), false, &intervals);
        assert!(!in_gap.is_pro);
        assert_eq!(in_gap.pro_until, None);
    }

    #[test]
    fn test_future_interval_only_is_not_pro() {
        let intervals = [iv(Promotion, Duration::days(5), Duration::days(6))];
        let result = evaluate_pro_entitlement(t0(), false, &intervals);
        assert!(!result.is_pro);
        assert_eq!(result.effective_source, None);
    }

    #[test]
    fn test_expired_intervals_do_not_bridge() {
        // Lapsed intervals are dropped before merging.
        let intervals = [
            iv(Subscription, -Duration::days(10), Duration::days(1)),
            iv(Override, Duration::days(1), Duration::days(4)),
        ];
        let now = t0() + Duration::days(2);
        let result = evaluate_pro_entitlement(now, false, &intervals);
        assert_eq!(result.effective_source, Some(Override));
        assert_eq!(result.pro_until, Some(t0() + Duration::days(4)));
    }

    #[test]
    fn test_internal_bypass() {
        for intervals in [vec![], vec![iv(Trial, Duration::zero(), Duration::days(1))]] {
            let result = evaluate_pro_entitlement(t0(), true, &intervals);
            assert!(result.is_pro);
            assert_eq!(result.pro_until, None);
            assert_eq!(result.effective_source, Some(InternalBypass));
        }
    }

    #[test]
    fn test_no_intervals() {
        assert_eq!(evaluate_pro_entitlement(t0(), false, &[]), ProEntitlement::none());
    }
}

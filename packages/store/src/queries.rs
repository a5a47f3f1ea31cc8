//! Read-only projections over the store state.
//!
//! Nothing in here mutates. Time-dependent fields (running durations,
//! grace expiry, rolling windows) are computed from the caller's `now`.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike as _, Duration, Timelike as _, Utc};
use parking_watch_lot_models::{
    ActiveViolationSummary, AggregateStats, ChronicOffender, ComplianceStatus, HeatmapCell,
    LotStatus, Violation, ViolationFilter,
};
use parking_watch_rules as rules;

use crate::state::StoreState;

/// Projects lot `idx` at `now`.
pub(crate) fn lot_status(state: &StoreState, idx: usize, now: DateTime<Utc>) -> LotStatus {
    let entry = &state.lots[idx];
    let lot = &entry.lot;

    let active_violation = entry.active.map(|v| {
        let violation = &state.violations[v];
        ActiveViolationSummary {
            id: violation.id.clone(),
            started_at: violation.started_at,
            max_excess: violation.max_excess,
            current_excess: lot.excess(),
            duration_minutes: rules::elapsed_minutes(violation.started_at, now),
        }
    });

    LotStatus {
        lot: lot.clone(),
        utilization: lot.utilization(),
        status: state.status(idx, now),
        breach_started_at: state.phase(idx).started_at(),
        active_violation,
        count_history: entry.history.iter().copied().collect(),
    }
}

/// Orders violations most recent first, ties broken by id.
fn most_recent_first(a: &Violation, b: &Violation) -> Ordering {
    b.started_at
        .cmp(&a.started_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Violations passing `filter`, most recent first.
pub(crate) fn list_violations(state: &StoreState, filter: &ViolationFilter) -> Vec<Violation> {
    let mut violations: Vec<Violation> = state
        .violations
        .iter()
        .filter(|v| filter.matches(v))
        .cloned()
        .collect();
    violations.sort_by(most_recent_first);
    violations
}

/// Minutes a violation counts for at `now`: the final duration once
/// resolved, the running duration while active.
fn counted_minutes(violation: &Violation, now: DateTime<Utc>) -> i64 {
    if violation.is_active() {
        rules::elapsed_minutes(violation.started_at, now)
    } else {
        violation.duration_minutes
    }
}

/// Per-contractor totals, sorted by violation hours descending.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn chronic_offenders(state: &StoreState, now: DateTime<Utc>) -> Vec<ChronicOffender> {
    struct Totals {
        violations: u64,
        minutes: i64,
        penalties: u64,
        lots: BTreeSet<String>,
    }

    let mut by_contractor: BTreeMap<&str, Totals> = BTreeMap::new();

    for violation in &state.violations {
        let totals = by_contractor
            .entry(violation.contractor.as_str())
            .or_insert_with(|| Totals {
                violations: 0,
                minutes: 0,
                penalties: 0,
                lots: BTreeSet::new(),
            });
        totals.violations += 1;
        totals.minutes += counted_minutes(violation, now);
        if !violation.is_active() {
            totals.penalties += violation.penalty_amount;
        }
        totals.lots.insert(violation.lot_name.clone());
    }

    let mut offenders: Vec<ChronicOffender> = by_contractor
        .into_iter()
        .map(|(contractor, totals)| ChronicOffender {
            contractor: contractor.to_string(),
            total_violations: totals.violations,
            total_violation_hours: totals.minutes as f64 / 60.0,
            total_penalties: totals.penalties,
            lots: totals.lots.into_iter().collect(),
        })
        .collect();

    offenders.sort_by(|a, b| {
        b.total_violation_hours
            .total_cmp(&a.total_violation_hours)
            .then_with(|| a.contractor.cmp(&b.contractor))
    });
    offenders
}

/// Headline counts at `now`.
///
/// The "today", "this week", and "this month" windows are rolling 24
/// hours, 7 days, and 30 days ending at `now`.
pub(crate) fn aggregate_stats(state: &StoreState, now: DateTime<Utc>) -> AggregateStats {
    let started_within = |window: Duration| -> u64 {
        let since = now - window;
        state
            .violations
            .iter()
            .filter(|v| v.started_at > since && v.started_at <= now)
            .count() as u64
    };

    let mut stats = AggregateStats {
        violations_today: started_within(Duration::hours(24)),
        violations_this_week: started_within(Duration::days(7)),
        violations_this_month: started_within(Duration::days(30)),
        total_penalties_assessed: state
            .violations
            .iter()
            .filter(|v| !v.is_active())
            .map(|v| v.penalty_amount)
            .sum(),
        active_violations: state.violations.iter().filter(|v| v.is_active()).count() as u64,
        lots_in_compliance: 0,
        lots_in_grace_period: 0,
        lots_violating: 0,
    };

    for idx in 0..state.lots.len() {
        match state.status(idx, now) {
            ComplianceStatus::Compliant => stats.lots_in_compliance += 1,
            ComplianceStatus::GracePeriod => stats.lots_in_grace_period += 1,
            ComplianceStatus::Violating => stats.lots_violating += 1,
        }
    }

    stats
}

/// Violation starts bucketed by UTC weekday (0 = Sunday) and hour.
///
/// Always returns all 168 cells, Sunday midnight first.
pub(crate) fn violation_heatmap(state: &StoreState) -> Vec<HeatmapCell> {
    let mut counts = [[0u64; 24]; 7];
    for violation in &state.violations {
        let day = violation.started_at.weekday().num_days_from_sunday() as usize;
        let hour = violation.started_at.hour() as usize;
        counts[day][hour] += 1;
    }

    let mut cells = Vec::with_capacity(7 * 24);
    for (day, hours) in (0u8..).zip(counts.iter()) {
        for (hour, &count) in (0u8..).zip(hours.iter()) {
            cells.push(HeatmapCell {
                day_of_week: day,
                hour,
                count,
            });
        }
    }
    cells
}

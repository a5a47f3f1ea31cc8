//! Plain-text tables for terminal output.

use chrono::{DateTime, Utc};
use parking_watch_lot_models::{AggregateStats, ChronicOffender, LotStatus, Violation};
use parking_watch_simulation::RunSummary;

pub fn print_lots(lots: &[LotStatus]) {
    println!(
        "{:<9} {:<42} {:>9} {:>6}  {:<12} ACTIVE",
        "ID", "NAME", "COUNT", "UTIL", "STATUS"
    );
    println!("{}", "-".repeat(100));
    for status in lots {
        let lot = &status.lot;
        let active = status.active_violation.as_ref().map_or_else(
            || "-".to_string(),
            |v| format!("{} (+{}, {} min)", v.id, v.max_excess, v.duration_minutes),
        );
        println!(
            "{:<9} {:<42} {:>9} {:>5.0}%  {:<12} {active}",
            lot.id,
            lot.name,
            format!("{}/{}", lot.current_count, lot.allowed_capacity),
            status.utilization * 100.0,
            status.status.as_ref(),
        );
    }
}

pub fn print_violations(violations: &[Violation]) {
    println!(
        "{:<10} {:<9} {:<17} {:>6} {:>8} {:>9}  STATUS",
        "ID", "LOT", "STARTED", "EXCESS", "MINUTES", "PENALTY"
    );
    println!("{}", "-".repeat(72));
    for v in violations {
        println!(
            "{:<10} {:<9} {:<17} {:>6} {:>8} {:>9}  {}",
            v.id,
            v.lot_id,
            v.started_at.format("%Y-%m-%d %H:%M"),
            v.max_excess,
            v.duration_minutes,
            v.penalty_amount,
            v.status.as_ref(),
        );
    }
}

pub fn print_offenders(offenders: &[ChronicOffender]) {
    println!(
        "{:<24} {:>10} {:>8} {:>10}  LOTS",
        "CONTRACTOR", "VIOLATIONS", "HOURS", "PENALTIES"
    );
    println!("{}", "-".repeat(72));
    for o in offenders {
        println!(
            "{:<24} {:>10} {:>8.1} {:>10}  {}",
            o.contractor,
            o.total_violations,
            o.total_violation_hours,
            o.total_penalties,
            o.lots.join(", ")
        );
    }
}

pub fn print_stats(stats: &AggregateStats, at: DateTime<Utc>) {
    println!("As of {}", at.format("%Y-%m-%d %H:%M UTC"));
    println!(
        "  Violations (24h / 7d / 30d): {} / {} / {}",
        stats.violations_today, stats.violations_this_week, stats.violations_this_month
    );
    println!("  Active violations:           {}", stats.active_violations);
    println!("  Penalties assessed:          {}", stats.total_penalties_assessed);
    println!(
        "  Lots compliant / grace / violating: {} / {} / {}",
        stats.lots_in_compliance, stats.lots_in_grace_period, stats.lots_violating
    );
}

pub fn print_run_summary(summary: &RunSummary) {
    println!(
        "Ran {} ticks: {} observations applied, {} rejected, {} violations opened, {} closed",
        summary.ticks, summary.applied, summary.rejected, summary.opened, summary.closed
    );
}

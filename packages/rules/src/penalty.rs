//! Penalty formula applied when a violation closes.
//!
//! ```text
//! duration_hours = duration_minutes / 60
//! penalty_amount = round(max_excess * duration_hours * penalty_rate_per_hour)
//! ```
//!
//! Rounding is half away from zero to the nearest whole currency unit.

use chrono::{DateTime, Utc};

/// Final values written onto a violation when it resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Closure {
    /// Close instant.
    pub ended_at: DateTime<Utc>,
    /// Whole minutes from start to close.
    pub duration_minutes: i64,
    /// Assessed penalty.
    pub penalty_amount: u64,
}

/// Whole wall-clock minutes between two instants, floored, never negative.
#[must_use]
pub fn elapsed_minutes(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_minutes().max(0)
}

/// Rounds to the nearest integer with ties going away from zero.
#[must_use]
pub fn round_half_away_from_zero(value: f64) -> f64 {
    // `f64::round` already breaks ties away from zero.
    value.round()
}

/// Computes the penalty for a violation with the given peak excess and
/// duration.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn penalty_amount(max_excess: u32, duration_minutes: i64, penalty_rate_per_hour: f64) -> u64 {
    // Divide last so whole-number inputs stay exact until the final step.
    let excess_minutes = f64::from(max_excess) * duration_minutes.max(0) as f64;
    let raw = excess_minutes * penalty_rate_per_hour.max(0.0) / 60.0;
    round_half_away_from_zero(raw) as u64
}

/// Computes the closing values for a violation that started at
/// `started_at` and ends at `ended_at`.
#[must_use]
pub fn close(
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    max_excess: u32,
    penalty_rate_per_hour: f64,
) -> Closure {
    let duration_minutes = elapsed_minutes(started_at, ended_at);
    Closure {
        ended_at,
        duration_minutes,
        penalty_amount: penalty_amount(max_excess, duration_minutes, penalty_rate_per_hour),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn ninety_minutes_at_twenty_two_over() {
        let closure = close(t0(), t0() + Duration::minutes(90), 22, 50.0);
        assert_eq!(closure.duration_minutes, 90);
        assert_eq!(closure.penalty_amount, 1650);
    }

    #[test]
    fn partial_minutes_are_floored() {
        let end = t0() + Duration::minutes(44) + Duration::seconds(59);
        assert_eq!(elapsed_minutes(t0(), end), 44);
        assert_eq!(elapsed_minutes(end, t0()), 0);
    }

    #[test]
    fn ties_round_away_from_zero() {
        // 1 vehicle * 1 minute * 30/h = 0.5
        assert_eq!(penalty_amount(1, 1, 30.0), 1);
        // 1 vehicle * 3 minutes * 50/h = 2.5
        assert_eq!(penalty_amount(1, 3, 50.0), 3);
        // 1 vehicle * 1 minute * 20/h = 0.333..
        assert_eq!(penalty_amount(1, 1, 20.0), 0);
        assert!((round_half_away_from_zero(-2.5) - -3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_duration_or_rate_costs_nothing() {
        assert_eq!(penalty_amount(40, 0, 500.0), 0);
        assert_eq!(penalty_amount(40, 120, 0.0), 0);
    }
}

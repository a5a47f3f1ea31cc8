#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Violation lifecycle and penalty rules for parking lot compliance.
//!
//! Everything in this crate is a pure function of its inputs and the
//! caller-supplied clock. The occupancy store owns all state and asks these
//! rules what to do on every observation; nothing here schedules work or
//! keeps a timer.
//!
//! # Lifecycle
//!
//! ```text
//!              over, grace > 0            grace expired, still over
//!  Compliant ───────────────────▶ GracePeriod ─────────────────────▶ Violating
//!      │  ▲                            │                                │
//!      │  └──────── dip (discard) ─────┘                                │
//!      │  ▲                                                             │
//!      │  └──────────────────── count <= capacity (close) ──────────────┘
//!      └──────────────── over, grace == 0 ─────────────────────────────▶
//! ```
//!
//! A violation's clock always starts at the initial breach. The grace
//! period only delays when the violation becomes visible.

pub mod penalty;

use chrono::{DateTime, Duration, Utc};
use parking_watch_lot_models::ComplianceStatus;

pub use penalty::{Closure, close, elapsed_minutes, penalty_amount, round_half_away_from_zero};

/// Enforcement phase of a single lot as tracked by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No overflow in progress.
    Compliant,
    /// Over capacity since `started_at`; no violation record exists yet.
    GracePeriod {
        /// Initial breach instant.
        started_at: DateTime<Utc>,
    },
    /// A violation record is active.
    Violating {
        /// Initial breach instant (the violation's `started_at`).
        started_at: DateTime<Utc>,
    },
}

impl Phase {
    /// The initial breach instant, if an overflow is in progress.
    #[must_use]
    pub fn started_at(self) -> Option<DateTime<Utc>> {
        match self {
            Self::Compliant => None,
            Self::GracePeriod { started_at } | Self::Violating { started_at } => Some(started_at),
        }
    }
}

/// What the store must do in response to an observation or poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Compliant and still within capacity.
    Unchanged,
    /// First breach on a lot with a grace period. No record yet.
    EnterGrace {
        /// Breach instant to remember.
        started_at: DateTime<Utc>,
    },
    /// Still over capacity inside an unexpired grace period.
    HoldGrace,
    /// Count fell back before the grace period expired. Nothing is recorded.
    Discard,
    /// First breach on a lot without a grace period. Create the record.
    Open {
        /// The violation's `started_at`.
        started_at: DateTime<Utc>,
    },
    /// Grace period expired while over capacity. Create the record.
    Escalate {
        /// The original breach instant, not the expiry instant.
        started_at: DateTime<Utc>,
    },
    /// Grace period expired before this in-capacity reading arrived. The
    /// violation existed between expiry and now, so it must be created from
    /// the last over-capacity count and then closed immediately.
    EscalateAndClose {
        /// The original breach instant.
        started_at: DateTime<Utc>,
    },
    /// Active violation, still over capacity. Ratchet peak and duration.
    Refresh,
    /// Active violation, count back within capacity. Close it.
    Close,
}

/// Returns `true` once `grace` has fully elapsed since `started_at`.
#[must_use]
pub fn grace_expired(started_at: DateTime<Utc>, grace: Duration, now: DateTime<Utc>) -> bool {
    now >= started_at + grace
}

/// Derives the visible compliance status of a lot at `now`.
#[must_use]
pub fn derive_status(phase: Phase, grace: Duration, now: DateTime<Utc>) -> ComplianceStatus {
    match phase {
        Phase::Compliant => ComplianceStatus::Compliant,
        Phase::GracePeriod { started_at } => {
            if grace_expired(started_at, grace, now) {
                ComplianceStatus::Violating
            } else {
                ComplianceStatus::GracePeriod
            }
        }
        Phase::Violating { .. } => ComplianceStatus::Violating,
    }
}

/// Decides the lifecycle transition for a new count observed at
/// `observed_at`.
///
/// There is no hysteresis: any count at or below `allowed_capacity` closes
/// an active violation.
#[must_use]
pub fn evaluate(
    phase: Phase,
    allowed_capacity: u32,
    grace: Duration,
    count: u32,
    observed_at: DateTime<Utc>,
) -> Transition {
    let over = count > allowed_capacity;

    match phase {
        Phase::Compliant if !over => Transition::Unchanged,
        Phase::Compliant if grace > Duration::zero() => Transition::EnterGrace {
            started_at: observed_at,
        },
        Phase::Compliant => Transition::Open {
            started_at: observed_at,
        },
        Phase::GracePeriod { started_at } => {
            match (over, grace_expired(started_at, grace, observed_at)) {
                (true, false) => Transition::HoldGrace,
                (false, false) => Transition::Discard,
                (true, true) => Transition::Escalate { started_at },
                (false, true) => Transition::EscalateAndClose { started_at },
            }
        }
        Phase::Violating { .. } if over => Transition::Refresh,
        Phase::Violating { .. } => Transition::Close,
    }
}

/// Decides whether a lot must escalate at `now` without a new observation.
///
/// Returns [`Transition::Escalate`] for an expired grace period and
/// [`Transition::Unchanged`] otherwise.
#[must_use]
pub fn poll(phase: Phase, grace: Duration, now: DateTime<Utc>) -> Transition {
    match phase {
        Phase::GracePeriod { started_at } if grace_expired(started_at, grace, now) => {
            Transition::Escalate { started_at }
        }
        _ => Transition::Unchanged,
    }
}

/// Vehicles above capacity, or zero.
#[must_use]
pub const fn excess(count: u32, allowed_capacity: u32) -> u32 {
    count.saturating_sub(allowed_capacity)
}

/// Peak counts only ratchet upward while a violation is active.
#[must_use]
pub const fn ratchet_peak(peak_count: u32, count: u32) -> u32 {
    if count > peak_count { count } else { peak_count }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn mins(m: i64) -> DateTime<Utc> {
        t0() + Duration::minutes(m)
    }

    fn grace() -> Duration {
        Duration::minutes(15)
    }

    #[test]
    fn compliant_within_capacity_is_unchanged() {
        let t = evaluate(Phase::Compliant, 100, grace(), 100, t0());
        assert_eq!(t, Transition::Unchanged);
    }

    #[test]
    fn breach_without_grace_opens_immediately() {
        let t = evaluate(Phase::Compliant, 100, Duration::zero(), 101, t0());
        assert_eq!(t, Transition::Open { started_at: t0() });
    }

    #[test]
    fn breach_with_grace_enters_grace() {
        let t = evaluate(Phase::Compliant, 100, grace(), 130, t0());
        assert_eq!(t, Transition::EnterGrace { started_at: t0() });
    }

    #[test]
    fn dip_inside_grace_is_discarded() {
        let phase = Phase::GracePeriod { started_at: t0() };
        assert_eq!(evaluate(phase, 100, grace(), 120, mins(5)), Transition::HoldGrace);
        assert_eq!(evaluate(phase, 100, grace(), 90, mins(10)), Transition::Discard);
    }

    #[test]
    fn grace_expiry_keeps_original_start() {
        let phase = Phase::GracePeriod { started_at: t0() };
        assert_eq!(
            evaluate(phase, 100, grace(), 120, mins(15)),
            Transition::Escalate { started_at: t0() }
        );
        assert_eq!(
            evaluate(phase, 100, grace(), 90, mins(40)),
            Transition::EscalateAndClose { started_at: t0() }
        );
    }

    #[test]
    fn active_violation_refreshes_or_closes() {
        let phase = Phase::Violating { started_at: t0() };
        assert_eq!(evaluate(phase, 100, grace(), 101, mins(1)), Transition::Refresh);
        assert_eq!(evaluate(phase, 100, grace(), 100, mins(2)), Transition::Close);
        assert_eq!(evaluate(phase, 100, grace(), 0, mins(3)), Transition::Close);
    }

    #[test]
    fn status_switches_exactly_at_grace_expiry() {
        let phase = Phase::GracePeriod { started_at: t0() };
        assert_eq!(
            derive_status(phase, grace(), mins(14)),
            ComplianceStatus::GracePeriod
        );
        assert_eq!(
            derive_status(phase, grace(), mins(15)),
            ComplianceStatus::Violating
        );
        assert_eq!(
            derive_status(Phase::Compliant, grace(), mins(15)),
            ComplianceStatus::Compliant
        );
    }

    #[test]
    fn poll_only_escalates_expired_grace() {
        let phase = Phase::GracePeriod { started_at: t0() };
        assert_eq!(poll(phase, grace(), mins(10)), Transition::Unchanged);
        assert_eq!(
            poll(phase, grace(), mins(16)),
            Transition::Escalate { started_at: t0() }
        );
        assert_eq!(
            poll(Phase::Violating { started_at: t0() }, grace(), mins(16)),
            Transition::Unchanged
        );
    }

    #[test]
    fn peak_never_decreases() {
        assert_eq!(ratchet_peak(120, 110), 120);
        assert_eq!(ratchet_peak(120, 125), 125);
        assert_eq!(excess(125, 100), 25);
        assert_eq!(excess(80, 100), 0);
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Parking lot, violation, and compliance status types.
//!
//! This crate defines the canonical domain model shared by the rule engine,
//! the occupancy store, the simulator, and the API layer. Types here carry
//! no behavior beyond trivial derived values; lifecycle rules live in
//! `parking_watch_rules`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Number of recent observations kept per lot for sparkline rendering.
pub const COUNT_HISTORY_LEN: usize = 25;

/// Derived compliance status of a lot. Never persisted.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ComplianceStatus {
    /// Occupancy is at or below the allowed capacity.
    Compliant,
    /// Over capacity, but the lot's grace period has not yet expired.
    GracePeriod,
    /// Over capacity with enforcement in effect.
    Violating,
}

/// Lifecycle status of a violation record.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ViolationStatus {
    /// Still open; penalty not yet assessed.
    Active,
    /// Closed; `ended_at` and `penalty_amount` are final.
    Resolved,
}

/// Where a vehicle count came from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CountSource {
    /// Automated counting hardware.
    Sensor,
    /// Entered by an operator.
    Manual,
    /// Generated by the traffic simulator.
    Simulation,
}

/// A managed parking facility with a contractual vehicle-count limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkingLot {
    /// Unique lot identifier (e.g., `"lot-001"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Operator or contractor responsible for the lot.
    pub contractor: String,
    /// Contractual vehicle limit. Always positive.
    pub allowed_capacity: u32,
    /// Latest observed vehicle count. May exceed capacity.
    pub current_count: u32,
    /// Penalty charged per excess vehicle per hour.
    pub penalty_rate_per_hour: f64,
    /// Minutes of tolerated overflow before enforcement. `None` means zero.
    pub grace_period_minutes: Option<u32>,
    /// Contract rule version stamped onto violations opened for this lot.
    pub rule_version: String,
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// When the lot was provisioned.
    pub created_at: DateTime<Utc>,
    /// When the count was last changed (or the provisioning instant).
    pub updated_at: DateTime<Utc>,
}

impl ParkingLot {
    /// Ratio of current count to allowed capacity (`1.0` = full).
    #[must_use]
    pub fn utilization(&self) -> f64 {
        f64::from(self.current_count) / f64::from(self.allowed_capacity)
    }

    /// Vehicles above the allowed capacity, or zero.
    #[must_use]
    pub const fn excess(&self) -> u32 {
        self.current_count.saturating_sub(self.allowed_capacity)
    }

    /// Whether the current count exceeds the allowed capacity.
    #[must_use]
    pub const fn is_over_capacity(&self) -> bool {
        self.current_count > self.allowed_capacity
    }

    /// The configured grace period, zero when absent.
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        Duration::minutes(i64::from(self.grace_period_minutes.unwrap_or(0)))
    }
}

/// Camera metadata attached to an observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureMetadata {
    /// Camera identifier (e.g., `"CAM-QUL-3"`).
    pub camera_id: String,
    /// Section of the lot the camera covers.
    pub lot_section: String,
}

/// A single vehicle-count reading for one lot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    /// Lot the reading belongs to.
    pub lot_id: String,
    /// Observed vehicle count. Negative values are rejected by the store.
    pub vehicle_count: i64,
    /// When the reading was taken.
    pub observed_at: DateTime<Utc>,
    /// Origin of the reading.
    pub source: CountSource,
    /// Optional camera metadata recorded as evidence.
    pub capture: Option<CaptureMetadata>,
}

impl Observation {
    /// Creates an observation without capture metadata.
    #[must_use]
    pub fn new(
        lot_id: impl Into<String>,
        vehicle_count: i64,
        observed_at: DateTime<Utc>,
        source: CountSource,
    ) -> Self {
        Self {
            lot_id: lot_id.into(),
            vehicle_count,
            observed_at,
            source,
            capture: None,
        }
    }
}

/// A captured count attached to a violation. Purely descriptive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    /// Evidence identifier, unique within the store.
    pub id: String,
    /// Owning violation.
    pub violation_id: String,
    /// Capture timestamp.
    pub captured_at: DateTime<Utc>,
    /// Vehicle count at capture time.
    pub vehicle_count: u32,
    /// Hex-encoded SHA-256 of the captured reading.
    pub content_hash: String,
    /// Camera that produced the reading.
    pub camera_id: String,
    /// Lot section covered by the camera.
    pub lot_section: String,
}

/// A time-bounded interval during which a lot exceeded its capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// Unique violation identifier.
    pub id: String,
    /// Lot the violation belongs to.
    pub lot_id: String,
    /// Lot name at the time the violation opened.
    pub lot_name: String,
    /// Contractor responsible for the lot.
    pub contractor: String,
    /// Initial breach instant. Grace periods do not move this.
    pub started_at: DateTime<Utc>,
    /// Close instant; `None` while active.
    pub ended_at: Option<DateTime<Utc>>,
    /// Allowed capacity in effect when the violation opened.
    pub allowed_capacity: u32,
    /// Highest count observed while violating.
    pub peak_count: u32,
    /// `peak_count - allowed_capacity`.
    pub max_excess: u32,
    /// Minutes from `started_at` to the last refresh (or `ended_at`).
    pub duration_minutes: i64,
    /// Assessed penalty. Zero until resolved.
    pub penalty_amount: u64,
    /// Formula version in effect.
    pub rule_version: String,
    /// Lifecycle status.
    pub status: ViolationStatus,
    /// Append-only captured readings.
    pub evidence: Vec<Evidence>,
}

impl Violation {
    /// Whether the violation is still open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ViolationStatus::Active
    }
}

/// Filter for violation listings. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationFilter {
    /// Only violations with this status.
    pub status: Option<ViolationStatus>,
    /// Only violations for this lot.
    pub lot_id: Option<String>,
}

impl ViolationFilter {
    /// Returns `true` if the violation passes every populated field.
    #[must_use]
    pub fn matches(&self, violation: &Violation) -> bool {
        self.status.is_none_or(|s| s == violation.status)
            && self
                .lot_id
                .as_deref()
                .is_none_or(|id| id == violation.lot_id)
    }
}

/// One point of a lot's recent count history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountHistoryPoint {
    /// When the count was observed.
    pub timestamp: DateTime<Utc>,
    /// The observed count.
    pub count: u32,
}

/// Summary of a lot's currently active violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveViolationSummary {
    /// Violation identifier.
    pub id: String,
    /// Initial breach instant.
    pub started_at: DateTime<Utc>,
    /// Highest excess observed so far.
    pub max_excess: u32,
    /// Excess at the current count.
    pub current_excess: u32,
    /// Minutes elapsed since `started_at`, measured at query time.
    pub duration_minutes: i64,
}

/// Read-only projection of a lot at a given instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotStatus {
    /// The lot itself.
    pub lot: ParkingLot,
    /// `current_count / allowed_capacity`.
    pub utilization: f64,
    /// Derived status at query time.
    pub status: ComplianceStatus,
    /// When the current overflow began, if the lot is over capacity.
    pub breach_started_at: Option<DateTime<Utc>>,
    /// The active violation, if one has materialized.
    pub active_violation: Option<ActiveViolationSummary>,
    /// Most recent observations, oldest first.
    pub count_history: Vec<CountHistoryPoint>,
}

/// Violation totals for one contractor across all of its lots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChronicOffender {
    /// Contractor name.
    pub contractor: String,
    /// Active plus resolved violations.
    pub total_violations: u64,
    /// Sum of violation durations in hours, including in-progress time.
    pub total_violation_hours: f64,
    /// Sum of resolved penalties.
    pub total_penalties: u64,
    /// Names of the contractor's lots that have violations, sorted.
    pub lots: Vec<String>,
}

/// Dashboard headline numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    /// Violations started in the last 24 hours.
    pub violations_today: u64,
    /// Violations started in the last 7 days.
    pub violations_this_week: u64,
    /// Violations started in the last 30 days.
    pub violations_this_month: u64,
    /// Sum of all resolved penalties.
    pub total_penalties_assessed: u64,
    /// Violations currently open.
    pub active_violations: u64,
    /// Lots currently compliant.
    pub lots_in_compliance: u64,
    /// Lots currently inside a grace period.
    pub lots_in_grace_period: u64,
    /// Lots currently violating.
    pub lots_violating: u64,
}

/// Number of violations that started in one weekday/hour bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapCell {
    /// Day of week, 0 = Sunday (UTC).
    pub day_of_week: u8,
    /// Hour of day, 0-23 (UTC).
    pub hour: u8,
    /// Violations started in this bucket.
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lot(capacity: u32, count: u32) -> ParkingLot {
        let at = DateTime::parse_from_rfc3339("2024-03-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        ParkingLot {
            id: "lot-001".to_string(),
            name: "North".to_string(),
            contractor: "Acme".to_string(),
            allowed_capacity: capacity,
            current_count: count,
            penalty_rate_per_hour: 50.0,
            grace_period_minutes: None,
            rule_version: "v1".to_string(),
            latitude: 0.0,
            longitude: 0.0,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn utilization_is_a_ratio() {
        assert!((lot(80, 92).utilization() - 1.15).abs() < 1e-9);
        assert!(lot(80, 0).utilization().abs() < f64::EPSILON);
    }

    #[test]
    fn excess_saturates_at_zero() {
        assert_eq!(lot(100, 112).excess(), 12);
        assert_eq!(lot(100, 100).excess(), 0);
        assert_eq!(lot(100, 40).excess(), 0);
        assert!(!lot(100, 100).is_over_capacity());
    }

    #[test]
    fn absent_grace_period_is_zero() {
        let mut l = lot(10, 0);
        assert_eq!(l.grace_period(), Duration::zero());
        l.grace_period_minutes = Some(15);
        assert_eq!(l.grace_period(), Duration::minutes(15));
    }

    #[test]
    fn statuses_use_snake_case_names() {
        assert_eq!(ComplianceStatus::GracePeriod.to_string(), "grace_period");
        assert_eq!(
            serde_json::to_string(&ComplianceStatus::GracePeriod).unwrap(),
            "\"grace_period\""
        );
        assert_eq!(
            "resolved".parse::<ViolationStatus>().unwrap(),
            ViolationStatus::Resolved
        );
        assert!("closed".parse::<ViolationStatus>().is_err());
    }

    #[test]
    fn empty_filter_matches_everything() {
        let at = lot(1, 1).created_at;
        let violation = Violation {
            id: "viol-001".to_string(),
            lot_id: "lot-002".to_string(),
            lot_name: "South".to_string(),
            contractor: "Acme".to_string(),
            started_at: at,
            ended_at: None,
            allowed_capacity: 80,
            peak_count: 92,
            max_excess: 12,
            duration_minutes: 0,
            penalty_amount: 0,
            rule_version: "v1".to_string(),
            status: ViolationStatus::Active,
            evidence: Vec::new(),
        };

        assert!(ViolationFilter::default().matches(&violation));
        assert!(
            ViolationFilter {
                status: Some(ViolationStatus::Active),
                lot_id: Some("lot-002".to_string()),
            }
            .matches(&violation)
        );
        assert!(
            !ViolationFilter {
                status: Some(ViolationStatus::Resolved),
                lot_id: None,
            }
            .matches(&violation)
        );
        assert!(
            !ViolationFilter {
                status: None,
                lot_id: Some("lot-001".to_string()),
            }
            .matches(&violation)
        );
    }
}

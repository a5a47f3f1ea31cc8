#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the parking watch server.
//!
//! Read projections (`LotStatus`, `Violation`, `ChronicOffender`, ...) are
//! already shaped for the wire and are returned as-is. This crate holds the
//! request types, which need validation before they reach the store, and
//! the few responses that combine several domain values.

use chrono::{DateTime, Utc};
use parking_watch_lot_models::{
    CaptureMetadata, CountSource, LotStatus, Observation, ViolationFilter, ViolationStatus,
};
use parking_watch_simulation::{SimulationScenario, SimulationState};
use parking_watch_store::ObservationOutcome;
use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Service version.
    pub version: String,
}

/// Query parameters for the violations endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationQueryParams {
    /// `active` or `resolved`.
    pub status: Option<String>,
    /// Restrict to one lot.
    pub lot_id: Option<String>,
}

impl TryFrom<ViolationQueryParams> for ViolationFilter {
    type Error = String;

    fn try_from(params: ViolationQueryParams) -> Result<Self, Self::Error> {
        let status = params
            .status
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<ViolationStatus>()
                    .map_err(|_| format!("unknown violation status '{s}'"))
            })
            .transpose()?;

        Ok(Self {
            status,
            lot_id: params.lot_id.filter(|id| !id.is_empty()),
        })
    }
}

/// A vehicle-count reading submitted over HTTP.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationRequest {
    /// Lot the reading is for.
    pub lot_id: String,
    /// Vehicles counted. Signed so that negative counts reach validation
    /// instead of failing deserialization.
    pub vehicle_count: i64,
    /// RFC 3339 capture time. Defaults to the time of receipt.
    pub timestamp: Option<String>,
    /// Where the count came from. Defaults to `manual`.
    pub source: Option<CountSource>,
    /// Capturing camera.
    pub camera_id: Option<String>,
    /// Section of the lot the camera covers.
    pub lot_section: Option<String>,
}

impl ObservationRequest {
    /// Converts into a domain [`Observation`], stamping `now` when no
    /// timestamp was given.
    ///
    /// # Errors
    ///
    /// Returns a message if the timestamp is not valid RFC 3339.
    pub fn into_observation(self, now: DateTime<Utc>) -> Result<Observation, String> {
        let observed_at = match self.timestamp.as_deref() {
            None => now,
            Some(ts) => DateTime::parse_from_rfc3339(ts.trim())
                .map_err(|e| format!("malformed timestamp '{ts}': {e}"))?
                .with_timezone(&Utc),
        };

        let capture = self.camera_id.map(|camera_id| CaptureMetadata {
            camera_id,
            lot_section: self.lot_section.unwrap_or_else(|| "A".to_string()),
        });

        Ok(Observation {
            lot_id: self.lot_id,
            vehicle_count: self.vehicle_count,
            observed_at,
            source: self.source.unwrap_or(CountSource::Manual),
            capture,
        })
    }
}

/// Result of an accepted observation: the lifecycle outcome plus the lot's
/// refreshed status.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiObservationResponse {
    /// What the observation did.
    #[serde(flatten)]
    pub outcome: ObservationOutcome,
    /// The lot after the observation.
    pub lot: LotStatus,
}

/// Body of `POST /api/simulation/start`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSimulationRequest {
    /// Scenario to run. Defaults to rush hour.
    pub scenario: Option<SimulationScenario>,
}

/// Simulation control state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSimulationState {
    /// Whether the simulator is ticking.
    pub is_running: bool,
    /// Active scenario.
    pub scenario: Option<SimulationScenario>,
    /// When the current run started.
    pub started_at: Option<DateTime<Utc>>,
    /// Ticks applied in the current run.
    pub events_generated: u64,
}

impl From<SimulationState> for ApiSimulationState {
    fn from(state: SimulationState) -> Self {
        Self {
            is_running: state.is_running,
            scenario: state.scenario,
            started_at: state.started_at,
            events_generated: state.events_generated,
        }
    }
}

/// Response to `POST /api/reset`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiReset {
    /// Lots after the reset.
    pub lots: usize,
    /// Violations after the reset.
    pub violations: usize,
}

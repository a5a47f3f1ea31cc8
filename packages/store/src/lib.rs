#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory occupancy state store for parking lot compliance.
//!
//! [`OccupancyStore`] is the single source of truth for the lot roster and
//! the violation set. Every write goes through it, one observation at a
//! time, under a single write lock, so readers always see a lot and its
//! violation in a consistent state. Compliance rules come from
//! `parking_watch_rules`; the store only carries out the transitions they
//! decide.

pub mod evidence;
mod queries;
pub mod seed;
mod state;

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use parking_watch_lot_models::{
    AggregateStats, ChronicOffender, ComplianceStatus, CountSource, HeatmapCell, LotStatus,
    Observation, ParkingLot, Violation, ViolationFilter,
};
use serde::Serialize;

use crate::seed::{SeedDefinition, SeedError};
use crate::state::StoreState;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Unknown lot or violation id.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was being looked up (`"lot"` or `"violation"`).
        kind: &'static str,
        /// The id that did not match.
        id: String,
    },

    /// Rejected input (negative count, out-of-order or malformed timestamp).
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Description of what went wrong.
        message: String,
    },

    /// The seed roster could not be provisioned.
    #[error(transparent)]
    Seed(#[from] SeedError),
}

impl StoreError {
    fn lot_not_found(id: &str) -> Self {
        Self::NotFound {
            kind: "lot",
            id: id.to_string(),
        }
    }

    /// Builds an [`StoreError::InvalidInput`].
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

/// A lifecycle change caused by an observation or poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// A lot with a grace period went over capacity.
    #[serde(rename_all = "camelCase")]
    GraceStarted {
        /// Lot id.
        lot_id: String,
        /// Initial breach instant.
        started_at: DateTime<Utc>,
    },
    /// A lot dropped back within capacity before its grace period expired.
    #[serde(rename_all = "camelCase")]
    GraceDiscarded {
        /// Lot id.
        lot_id: String,
        /// Breach instant that was discarded.
        started_at: DateTime<Utc>,
    },
    /// A violation record was created.
    #[serde(rename_all = "camelCase")]
    Opened {
        /// Lot id.
        lot_id: String,
        /// New violation id.
        violation_id: String,
        /// Initial breach instant.
        started_at: DateTime<Utc>,
    },
    /// A violation was resolved and its penalty assessed.
    #[serde(rename_all = "camelCase")]
    Closed {
        /// Lot id.
        lot_id: String,
        /// Resolved violation id.
        violation_id: String,
        /// Assessed penalty.
        penalty_amount: u64,
    },
}

/// Result of applying one observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationOutcome {
    /// Lot the observation applied to.
    pub lot_id: String,
    /// Derived status immediately after the observation.
    pub status: ComplianceStatus,
    /// The lot's active violation after the observation, if any.
    pub active_violation_id: Option<String>,
    /// Lifecycle changes the observation caused, in order.
    pub events: Vec<LifecycleEvent>,
}

/// Single source of truth for lots and violations.
///
/// All mutation is serialized behind one write lock. Reads take the read
/// lock and may run concurrently with each other.
pub struct OccupancyStore {
    initial: StoreState,
    state: RwLock<StoreState>,
}

impl std::fmt::Debug for OccupancyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("OccupancyStore")
            .field("lots", &state.lots.len())
            .field("violations", &state.violations.len())
            .finish()
    }
}

impl OccupancyStore {
    /// Provisions a store from a seed roster at `provisioned_at`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Seed`] if the roster violates a constraint
    /// (duplicate ids, zero capacity, more than one active violation per
    /// lot, ...).
    pub fn from_seed(
        seed: &SeedDefinition,
        provisioned_at: DateTime<Utc>,
    ) -> Result<Self, StoreError> {
        let initial = StoreState::provision(seed, provisioned_at)?;
        log::info!(
            "Provisioned {} lots and {} violations",
            initial.lots.len(),
            initial.violations.len()
        );
        Ok(Self {
            state: RwLock::new(initial.clone()),
            initial,
        })
    }

    /// Provisions a store from the seed named by `PARKING_WATCH_SEED`, or
    /// the embedded default roster.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Seed`] if the seed cannot be loaded or
    /// provisioned.
    pub fn from_env(provisioned_at: DateTime<Utc>) -> Result<Self, StoreError> {
        let seed = seed::load_seed_from_env()?;
        Self::from_seed(&seed, provisioned_at)
    }

    // Every write completes its mutation before releasing the lock, so a
    // poisoned lock still guards a consistent state.
    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies a vehicle-count observation and any lifecycle transition it
    /// triggers.
    ///
    /// # Errors
    ///
    /// * [`StoreError::NotFound`] if the lot is unknown.
    /// * [`StoreError::InvalidInput`] if the count is negative or the
    ///   observation is older than the lot's last update (its provisioning
    ///   instant if it has not been observed since).
    ///
    /// On error the store is unchanged.
    pub fn submit(&self, observation: &Observation) -> Result<ObservationOutcome, StoreError> {
        let result = self.write().apply(observation);
        if let Err(e) = &result {
            log::warn!("Rejected observation for lot {}: {e}", observation.lot_id);
        }
        result
    }

    /// Convenience form of [`Self::submit`] for a manual count.
    ///
    /// # Errors
    ///
    /// See [`Self::submit`].
    pub fn apply_observation(
        &self,
        lot_id: &str,
        vehicle_count: i64,
        observed_at: DateTime<Utc>,
    ) -> Result<ObservationOutcome, StoreError> {
        self.submit(&Observation::new(
            lot_id,
            vehicle_count,
            observed_at,
            CountSource::Manual,
        ))
    }

    /// Re-evaluates every lot at `now` without a new observation,
    /// materializing violations whose grace period has expired.
    pub fn refresh(&self, now: DateTime<Utc>) -> Vec<LifecycleEvent> {
        self.write().poll(now)
    }

    /// Projects one lot at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the lot is unknown.
    pub fn get_lot_status(&self, lot_id: &str, now: DateTime<Utc>) -> Result<LotStatus, StoreError> {
        let state = self.read();
        let idx = state.lot_index(lot_id)?;
        Ok(queries::lot_status(&state, idx, now))
    }

    /// Projects every lot at `now`, in roster order.
    #[must_use]
    pub fn query_lots(&self, now: DateTime<Utc>) -> Vec<LotStatus> {
        let state = self.read();
        (0..state.lots.len())
            .map(|idx| queries::lot_status(&state, idx, now))
            .collect()
    }

    /// Snapshot of the lot roster.
    #[must_use]
    pub fn lots(&self) -> Vec<ParkingLot> {
        self.read().lots.iter().map(|e| e.lot.clone()).collect()
    }

    /// Violations matching `filter`, most recent first (ties by id).
    #[must_use]
    pub fn list_violations(&self, filter: &ViolationFilter) -> Vec<Violation> {
        queries::list_violations(&self.read(), filter)
    }

    /// Looks up a single violation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no violation has this id.
    pub fn get_violation(&self, id: &str) -> Result<Violation, StoreError> {
        self.read()
            .violations
            .iter()
            .find(|v| v.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "violation",
                id: id.to_string(),
            })
    }

    /// Contractors ranked by total violation hours at `now`.
    #[must_use]
    pub fn chronic_offenders(&self, now: DateTime<Utc>) -> Vec<ChronicOffender> {
        queries::chronic_offenders(&self.read(), now)
    }

    /// Dashboard headline numbers at `now`.
    #[must_use]
    pub fn aggregate_stats(&self, now: DateTime<Utc>) -> AggregateStats {
        queries::aggregate_stats(&self.read(), now)
    }

    /// Violation starts by weekday and hour.
    #[must_use]
    pub fn violation_heatmap(&self) -> Vec<HeatmapCell> {
        queries::violation_heatmap(&self.read())
    }

    /// Restores the lots and violations provisioned at construction.
    pub fn reset_to_seed(&self) {
        *self.write() = self.initial.clone();
        log::info!("Store reset to seed roster");
    }
}

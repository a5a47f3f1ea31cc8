//! Pluggable producers of vehicle-count observations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_watch_lot_models::{Observation, ParkingLot};

use crate::SimulationError;

/// Anything that can feed vehicle counts into the store: the rush-hour
/// random walk, a CSV replay, or a real sensor feed.
///
/// Sources only produce observations. Applying them, and every lifecycle
/// decision that follows, is the store's job.
#[async_trait]
pub trait ObservationSource: Send {
    /// Short name used in log lines.
    fn name(&self) -> &str;

    /// Produces the next batch of observations given the current roster.
    ///
    /// Returns `Ok(None)` once the source is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError`] if the underlying feed fails.
    async fn next_batch(
        &mut self,
        lots: &[ParkingLot],
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<Observation>>, SimulationError>;
}

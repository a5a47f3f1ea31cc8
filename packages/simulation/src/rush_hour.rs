//! Rush-hour traffic as a per-lot random walk.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_watch_lot_models::{CountSource, Observation, ParkingLot};
use rand::{Rng as _, SeedableRng as _};
use rand_chacha::ChaCha8Rng;

use crate::SimulationError;
use crate::source::ObservationSource;

/// Smallest per-tick change in a lot's count.
pub const MIN_DELTA: i64 = -4;

/// Largest per-tick change in a lot's count. Twice the magnitude of
/// [`MIN_DELTA`], so lots drift toward filling up.
pub const MAX_DELTA: i64 = 8;

/// Each tick, every lot's count moves by a delta drawn uniformly from
/// `[MIN_DELTA, MAX_DELTA]`, clamped at zero.
///
/// Seeded with `ChaCha8Rng` so a given seed always replays the same
/// traffic.
#[derive(Debug, Clone)]
pub struct RushHourSource {
    rng: ChaCha8Rng,
}

impl RushHourSource {
    /// Creates a source with a fixed seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    fn step(&mut self, current: u32) -> i64 {
        (i64::from(current) + self.rng.gen_range(MIN_DELTA..=MAX_DELTA)).max(0)
    }
}

#[async_trait]
impl ObservationSource for RushHourSource {
    fn name(&self) -> &'static str {
        "rush_hour"
    }

    async fn next_batch(
        &mut self,
        lots: &[ParkingLot],
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<Observation>>, SimulationError> {
        let batch = lots
            .iter()
            .map(|lot| {
                let count = self.step(lot.current_count);
                Observation::new(lot.id.clone(), count, now, CountSource::Simulation)
            })
            .collect();
        Ok(Some(batch))
    }
}

//! Replays recorded vehicle counts from CSV.
//!
//! The file has a header row and three columns:
//!
//! ```text
//! lot_id,vehicle_count,observed_at
//! lot-001,118,2024-03-01T08:00:00Z
//! ```
//!
//! Rows are handed out in file order, a fixed number per tick.

use std::collections::VecDeque;
use std::io::Read;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_watch_lot_models::{CountSource, Observation, ParkingLot};
use serde::Deserialize;

use crate::SimulationError;
use crate::source::ObservationSource;

/// Rows applied per tick when no batch size is given.
pub const DEFAULT_BATCH_SIZE: usize = 10;

#[derive(Debug, Deserialize)]
struct ReplayRecord {
    lot_id: String,
    vehicle_count: i64,
    observed_at: String,
}

/// An [`ObservationSource`] backed by a recorded CSV feed.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    pending: VecDeque<Observation>,
    batch_size: usize,
}

impl ReplaySource {
    /// Reads every row from `reader` up front.
    ///
    /// Counts are not validated here; negative counts reach the store and
    /// are rejected there like any other bad reading.
    ///
    /// # Errors
    ///
    /// * [`SimulationError::Csv`] if a row cannot be decoded.
    /// * [`SimulationError::InvalidRecord`] if a timestamp is not RFC 3339.
    pub fn from_reader<R: Read>(reader: R, batch_size: usize) -> Result<Self, SimulationError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut pending = VecDeque::new();
        for (i, record) in csv_reader.deserialize::<ReplayRecord>().enumerate() {
            let record = record?;
            // Header is line 1.
            let line = i + 2;
            let observed_at = DateTime::parse_from_rfc3339(&record.observed_at)
                .map_err(|e| SimulationError::InvalidRecord {
                    line,
                    message: format!("bad observed_at '{}': {e}", record.observed_at),
                })?
                .with_timezone(&Utc);
            pending.push_back(Observation::new(
                record.lot_id,
                record.vehicle_count,
                observed_at,
                CountSource::Sensor,
            ));
        }

        log::info!("Loaded {} replay observations", pending.len());

        Ok(Self {
            pending,
            batch_size: batch_size.max(1),
        })
    }

    /// Opens and reads a CSV file.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::Io`] if the file cannot be opened, or any
    /// error from [`Self::from_reader`].
    pub fn from_path(path: &Path, batch_size: usize) -> Result<Self, SimulationError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, batch_size)
    }

    /// Rows not yet handed out.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Earliest and latest readings among the rows not yet handed out.
    #[must_use]
    pub fn span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = self.pending.iter().map(|o| o.observed_at).min()?;
        let last = self.pending.iter().map(|o| o.observed_at).max()?;
        Some((first, last))
    }

    /// Rows handed out per tick.
    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }
}

#[async_trait]
impl ObservationSource for ReplaySource {
    fn name(&self) -> &'static str {
        "replay"
    }

    async fn next_batch(
        &mut self,
        _lots: &[ParkingLot],
        _now: DateTime<Utc>,
    ) -> Result<Option<Vec<Observation>>, SimulationError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        let n = self.batch_size.min(self.pending.len());
        Ok(Some(self.pending.drain(..n).collect()))
    }
}

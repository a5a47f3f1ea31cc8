//! Offline simulation and replay runs.
//!
//! Both provision a fresh store from the seed roster, drive it through a
//! [`Simulator`], and print the resulting compliance picture. Nothing is
//! persisted.

use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, Utc};
use parking_watch_cli_utils::{IndicatifProgress, MultiProgress};
use parking_watch_lot_models::ViolationFilter;
use parking_watch_simulation::replay::ReplaySource;
use parking_watch_simulation::rush_hour::RushHourSource;
use parking_watch_simulation::{SimulationScenario, Simulator};
use parking_watch_store::OccupancyStore;

use crate::report;

/// Prints the seed roster as provisioned right now.
///
/// # Errors
///
/// Returns an error if the seed cannot be loaded or provisioned.
pub fn status() -> Result<(), Box<dyn std::error::Error>> {
    let now = Utc::now();
    let store = OccupancyStore::from_env(now)?;
    report::print_lots(&store.query_lots(now));
    println!();
    report::print_stats(&store.aggregate_stats(now), now);
    Ok(())
}

/// Runs `ticks` rush-hour ticks on a virtual clock advancing
/// `minutes_per_tick` per tick.
///
/// # Errors
///
/// Returns an error if the seed cannot be provisioned or the simulation
/// fails.
pub async fn simulate(
    multi: &MultiProgress,
    ticks: u64,
    rng_seed: Option<u64>,
    minutes_per_tick: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let now = Utc::now();
    let seed = rng_seed.unwrap_or_else(|| now.timestamp_micros().unsigned_abs());
    log::info!("Simulating {ticks} rush-hour ticks with seed {seed}");

    let store = Arc::new(OccupancyStore::from_env(now)?);
    let simulator = Simulator::new(store.clone(), seed);
    simulator.start(SimulationScenario::RushHour, now).await?;

    let step = Duration::minutes(i64::from(minutes_per_tick.max(1)));
    let mut source = RushHourSource::new(seed);
    let progress = IndicatifProgress::ticks_bar(multi, "Simulating rush hour");
    let summary = simulator
        .run_ticks(&mut source, ticks, now + step, step, progress.as_ref())
        .await?;

    let end = summary.last_tick_at.unwrap_or(now);
    println!();
    report::print_run_summary(&summary);
    println!();
    report::print_lots(&store.query_lots(end));
    println!();
    report::print_offenders(&store.chronic_offenders(end));
    println!();
    report::print_stats(&store.aggregate_stats(end), end);
    Ok(())
}

/// Replays a recorded CSV feed against the seed roster.
///
/// # Errors
///
/// Returns an error if the seed cannot be provisioned or the file cannot
/// be read.
pub async fn replay(
    multi: &MultiProgress,
    path: &Path,
    batch_size: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut source = ReplaySource::from_path(path, batch_size)?;
    let ticks = source.remaining().div_ceil(source.batch_size());

    // The roster is provisioned at the feed's first reading so that the
    // feed's own timestamps drive the lifecycle.
    let (start, end) = source.span().unwrap_or_else(|| {
        let now = Utc::now();
        (now, now)
    });
    let store = Arc::new(OccupancyStore::from_env(start)?);
    let simulator = Simulator::new(store.clone(), 0);
    simulator.start(SimulationScenario::Replay, start).await?;

    let progress = IndicatifProgress::ticks_bar(multi, &format!("Replaying {}", path.display()));
    let summary = simulator
        .run_ticks(
            &mut source,
            u64::try_from(ticks)?,
            start,
            Duration::zero(),
            progress.as_ref(),
        )
        .await?;

    println!();
    report::print_run_summary(&summary);
    println!();
    report::print_violations(&store.list_violations(&ViolationFilter::default()));
    println!();
    report::print_offenders(&store.chronic_offenders(end));
    Ok(())
}

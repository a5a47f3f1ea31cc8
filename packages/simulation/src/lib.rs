#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Traffic simulation driver.
//!
//! A [`Simulator`] pulls batches from an [`ObservationSource`] and pushes
//! them through the store like any other reading. It never touches lots or
//! violations directly, so simulated traffic goes through exactly the same
//! lifecycle rules as a live sensor feed.

pub mod progress;
pub mod replay;
pub mod rush_hour;
pub mod source;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_watch_lot_models::{CountSource, Observation};
use parking_watch_store::{LifecycleEvent, OccupancyStore, StoreError};
use rand::{Rng as _, SeedableRng as _};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use tokio::sync::Mutex;

use crate::progress::ProgressCallback;
use crate::source::ObservationSource;

/// Lower bound of the occupancy a rush-hour start pushes each lot to, as a
/// fraction of capacity.
pub const RUSH_HOUR_MIN_LOAD: f64 = 0.95;

/// Upper bound of the occupancy a rush-hour start pushes each lot to.
pub const RUSH_HOUR_MAX_LOAD: f64 = 1.20;

/// Errors that can occur while driving a simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// Replay file could not be opened.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Replay row could not be decoded.
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// Replay row decoded but holds an unusable value.
    #[error("Invalid record on line {line}: {message}")]
    InvalidRecord {
        /// 1-based line number in the source file.
        line: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// The store refused a scenario setup observation.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Traffic pattern a simulation run follows.
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
pub enum SimulationScenario {
    /// Lots start near capacity and fill further each tick.
    RushHour,
    /// Recorded counts are replayed from a file.
    Replay,
}

/// Whether a simulation is running and what it has done so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationState {
    /// Whether ticks currently apply observations.
    pub is_running: bool,
    /// Active scenario, if running.
    pub scenario: Option<SimulationScenario>,
    /// When the current run started.
    pub started_at: Option<DateTime<Utc>>,
    /// Ticks applied since the run started.
    pub events_generated: u64,
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Observations the store accepted.
    pub applied: usize,
    /// Observations the store rejected.
    pub rejected: usize,
    /// Lifecycle changes caused by the batch and the follow-up refresh.
    pub events: Vec<LifecycleEvent>,
    /// The source has no more observations.
    pub exhausted: bool,
}

/// Totals for an offline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Ticks executed.
    pub ticks: u64,
    /// Observations accepted.
    pub applied: usize,
    /// Observations rejected.
    pub rejected: usize,
    /// Violations opened.
    pub opened: usize,
    /// Violations closed.
    pub closed: usize,
    /// Virtual time of the last tick that ran.
    pub last_tick_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    fn absorb(&mut self, report: &TickReport) {
        self.ticks += 1;
        self.applied += report.applied;
        self.rejected += report.rejected;
        for event in &report.events {
            match event {
                LifecycleEvent::Opened { .. } => self.opened += 1,
                LifecycleEvent::Closed { .. } => self.closed += 1,
                LifecycleEvent::GraceStarted { .. } | LifecycleEvent::GraceDiscarded { .. } => {}
            }
        }
    }
}

struct Inner {
    state: SimulationState,
    rng: ChaCha8Rng,
}

/// Drives observation sources against an [`OccupancyStore`].
///
/// Start, stop, and tick are serialized behind one async mutex, so a tick
/// never straddles a reset.
pub struct Simulator {
    store: Arc<OccupancyStore>,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator").finish_non_exhaustive()
    }
}

impl Simulator {
    /// Creates a stopped simulator. `seed` drives the rush-hour starting
    /// loads.
    #[must_use]
    pub fn new(store: Arc<OccupancyStore>, seed: u64) -> Self {
        Self {
            store,
            inner: Mutex::new(Inner {
                state: SimulationState::default(),
                rng: ChaCha8Rng::seed_from_u64(seed),
            }),
        }
    }

    /// The store this simulator feeds.
    #[must_use]
    pub const fn store(&self) -> &Arc<OccupancyStore> {
        &self.store
    }

    /// Snapshot of the current simulation state.
    pub async fn state(&self) -> SimulationState {
        self.inner.lock().await.state.clone()
    }

    /// Resets the store to its seed roster and starts `scenario` at `now`.
    ///
    /// For [`SimulationScenario::RushHour`] every lot is then pushed to
    /// between 95% and 120% of capacity through ordinary observations, so
    /// lots that land over capacity go through the usual grace and
    /// violation rules.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::Store`] if the store rejects a setup
    /// observation.
    pub async fn start(
        &self,
        scenario: SimulationScenario,
        now: DateTime<Utc>,
    ) -> Result<SimulationState, SimulationError> {
        let mut inner = self.inner.lock().await;
        self.store.reset_to_seed();

        if scenario == SimulationScenario::RushHour {
            for lot in self.store.lots() {
                let load = inner.rng.gen_range(RUSH_HOUR_MIN_LOAD..=RUSH_HOUR_MAX_LOAD);
                #[allow(clippy::cast_possible_truncation)]
                let count = (f64::from(lot.allowed_capacity) * load).round() as i64;
                self.store.submit(&Observation::new(
                    lot.id,
                    count,
                    now,
                    CountSource::Simulation,
                ))?;
            }
        }

        inner.state = SimulationState {
            is_running: true,
            scenario: Some(scenario),
            started_at: Some(now),
            events_generated: 0,
        };
        log::info!("Simulation started: {scenario}");
        Ok(inner.state.clone())
    }

    /// Stops any running scenario and resets the store to its seed roster.
    pub async fn stop(&self) -> SimulationState {
        let mut inner = self.inner.lock().await;
        self.store.reset_to_seed();
        if inner.state.is_running {
            log::info!(
                "Simulation stopped after {} ticks",
                inner.state.events_generated
            );
        }
        inner.state = SimulationState::default();
        inner.state.clone()
    }

    /// Applies one batch from `source` at `now`, then refreshes the store
    /// at the batch's latest reading so expired grace periods materialize.
    ///
    /// Does nothing while stopped. Rejected observations are logged and
    /// counted, never fatal.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError`] if the source itself fails.
    pub async fn tick(
        &self,
        source: &mut dyn ObservationSource,
        now: DateTime<Utc>,
    ) -> Result<TickReport, SimulationError> {
        let mut inner = self.inner.lock().await;
        if !inner.state.is_running {
            return Ok(TickReport::default());
        }

        let lots = self.store.lots();
        let Some(batch) = source.next_batch(&lots, now).await? else {
            log::debug!("{} source exhausted", source.name());
            return Ok(TickReport {
                exhausted: true,
                ..TickReport::default()
            });
        };

        // Recorded feeds carry their own timestamps; grace expiry follows
        // the feed's clock, not the caller's.
        let clock = batch.iter().map(|o| o.observed_at).max().unwrap_or(now);

        let mut report = TickReport::default();
        for observation in &batch {
            match self.store.submit(observation) {
                Ok(outcome) => {
                    report.applied += 1;
                    report.events.extend(outcome.events);
                }
                Err(_) => report.rejected += 1,
            }
        }
        report.events.extend(self.store.refresh(clock));

        inner.state.events_generated += 1;
        log::debug!(
            "{} tick {}: {} applied, {} rejected, {} lifecycle events",
            source.name(),
            inner.state.events_generated,
            report.applied,
            report.rejected,
            report.events.len()
        );
        Ok(report)
    }

    /// Runs up to `ticks` ticks on a virtual clock starting at `start` and
    /// advancing by `step`, stopping early if the source runs dry.
    ///
    /// # Errors
    ///
    /// Returns the first [`SimulationError`] raised by the source.
    pub async fn run_ticks(
        &self,
        source: &mut dyn ObservationSource,
        ticks: u64,
        start: DateTime<Utc>,
        step: Duration,
        progress: &dyn ProgressCallback,
    ) -> Result<RunSummary, SimulationError> {
        progress.set_total(ticks);
        let mut summary = RunSummary::default();
        let mut now = start;

        for _ in 0..ticks {
            let report = self.tick(source, now).await?;
            if report.exhausted {
                break;
            }
            summary.absorb(&report);
            summary.last_tick_at = Some(now);
            progress.inc(1);
            progress.set_message(format!(
                "{} open / {} closed",
                summary.opened, summary.closed
            ));
            now += step;
        }

        progress.finish(format!("{} ticks simulated", summary.ticks));
        Ok(summary)
    }
}

/// Ticks `simulator` with `source` every `period` until `shutdown`
/// resolves.
///
/// Uses wall-clock time. Ticks while the simulator is stopped are no-ops,
/// so this can run for the life of the process. The store is refreshed on
/// every interval regardless, so grace periods opened by live readings
/// still escalate.
pub async fn run_polling<S, F>(
    simulator: Arc<Simulator>,
    mut source: S,
    period: std::time::Duration,
    shutdown: F,
) where
    S: ObservationSource,
    F: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    log::info!(
        "Polling {} source every {}ms",
        source.name(),
        period.as_millis()
    );

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            _ = interval.tick() => {
                if let Err(e) = simulator.tick(&mut source, Utc::now()).await {
                    log::error!("Simulation tick failed: {e}");
                }
                for event in simulator.store().refresh(Utc::now()) {
                    log::debug!("Poll: {event:?}");
                }
            }
        }
    }

    log::info!("Simulation polling stopped");
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_watch_lot_models::{ComplianceStatus, ParkingLot, ViolationFilter};
    use parking_watch_store::seed;

    use super::*;
    use crate::progress::NullProgress;
    use crate::replay::ReplaySource;
    use crate::rush_hour::RushHourSource;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn simulator() -> Simulator {
        let store = OccupancyStore::from_seed(&seed::default_seed().unwrap(), t0()).unwrap();
        Simulator::new(Arc::new(store), 42)
    }

    /// Emits one fixed count for a single lot every tick.
    struct Fixed {
        lot_id: &'static str,
        count: i64,
    }

    #[async_trait]
    impl ObservationSource for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn next_batch(
            &mut self,
            _lots: &[ParkingLot],
            now: DateTime<Utc>,
        ) -> Result<Option<Vec<Observation>>, SimulationError> {
            Ok(Some(vec![Observation::new(
                self.lot_id,
                self.count,
                now,
                CountSource::Simulation,
            )]))
        }
    }

    #[tokio::test]
    async fn tick_is_noop_while_stopped() {
        let sim = simulator();
        let before = sim.store().lots();
        let mut source = Fixed {
            lot_id: "lot-001",
            count: 500,
        };

        let report = sim.tick(&mut source, t0()).await.unwrap();
        assert_eq!(report, TickReport::default());
        assert_eq!(sim.store().lots(), before);
    }

    #[tokio::test]
    async fn rush_hour_start_loads_every_lot() {
        let sim = simulator();
        let state = sim
            .start(SimulationScenario::RushHour, t0() + Duration::minutes(1))
            .await
            .unwrap();
        assert!(state.is_running);
        assert_eq!(state.scenario, Some(SimulationScenario::RushHour));
        assert_eq!(state.events_generated, 0);

        for lot in sim.store().lots() {
            let load = f64::from(lot.current_count) / f64::from(lot.allowed_capacity);
            assert!((0.94..=1.21).contains(&load), "{} at {load}", lot.id);
        }
    }

    #[tokio::test]
    async fn ticks_go_through_lifecycle_rules() {
        let sim = simulator();
        sim.start(SimulationScenario::Replay, t0()).await.unwrap();

        let mut source = Fixed {
            lot_id: "lot-005",
            count: 130,
        };
        let report = sim
            .tick(&mut source, t0() + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(report.applied, 1);
        assert!(matches!(
            report.events.as_slice(),
            [LifecycleEvent::Opened { lot_id, .. }] if lot_id == "lot-005"
        ));

        let status = sim
            .store()
            .get_lot_status("lot-005", t0() + Duration::minutes(1))
            .unwrap();
        assert_eq!(status.status, ComplianceStatus::Violating);
        assert_eq!(sim.state().await.events_generated, 1);
    }

    #[tokio::test]
    async fn rejections_are_counted_not_fatal() {
        let sim = simulator();
        sim.start(SimulationScenario::Replay, t0()).await.unwrap();

        let mut source = Fixed {
            lot_id: "lot-404",
            count: 10,
        };
        let report = sim.tick(&mut source, t0()).await.unwrap();
        assert_eq!((report.applied, report.rejected), (0, 1));
    }

    #[tokio::test]
    async fn tick_refresh_escalates_expired_grace() {
        let sim = simulator();
        sim.start(SimulationScenario::Replay, t0()).await.unwrap();

        // lot-003 has a 10 minute grace period.
        let mut over = Fixed {
            lot_id: "lot-003",
            count: 230,
        };
        sim.tick(&mut over, t0()).await.unwrap();

        let mut idle = Fixed {
            lot_id: "lot-001",
            count: 10,
        };
        let report = sim
            .tick(&mut idle, t0() + Duration::minutes(11))
            .await
            .unwrap();
        assert!(report.events.iter().any(|e| matches!(
            e,
            LifecycleEvent::Opened { lot_id, started_at, .. }
                if lot_id == "lot-003" && *started_at == t0()
        )));
    }

    #[tokio::test]
    async fn stop_resets_store_and_state() {
        let sim = simulator();
        let seeded = sim.store().list_violations(&ViolationFilter::default());

        sim.start(SimulationScenario::RushHour, t0()).await.unwrap();
        let mut source = RushHourSource::new(3);
        for m in 1..=30 {
            sim.tick(&mut source, t0() + Duration::minutes(m))
                .await
                .unwrap();
        }

        let state = sim.stop().await;
        assert_eq!(state, SimulationState::default());
        assert_eq!(
            sim.store().list_violations(&ViolationFilter::default()),
            seeded
        );
    }

    #[tokio::test]
    async fn offline_run_stops_when_replay_runs_dry() {
        let feed = "\
lot_id,vehicle_count,observed_at
lot-005,120,2024-03-01T09:00:00Z
lot-005,125,2024-03-01T09:30:00Z
lot-005,90,2024-03-01T10:00:00Z
";
        let sim = simulator();
        sim.start(SimulationScenario::Replay, t0()).await.unwrap();
        let mut source = ReplaySource::from_reader(feed.as_bytes(), 1).unwrap();

        let summary = sim
            .run_ticks(
                &mut source,
                10,
                t0() + Duration::hours(2),
                Duration::minutes(1),
                &NullProgress,
            )
            .await
            .unwrap();
        assert_eq!(summary.ticks, 3);
        assert_eq!(
            summary.last_tick_at,
            Some(t0() + Duration::hours(2) + Duration::minutes(2))
        );
        assert_eq!((summary.opened, summary.closed), (1, 1));

        let violations = sim.store().list_violations(&ViolationFilter {
            status: None,
            lot_id: Some("lot-005".to_string()),
        });
        // 25 over for an hour at 350/h.
        assert_eq!(violations[0].penalty_amount, 8750);
    }

    #[tokio::test]
    async fn replay_follows_feed_clock_for_grace() {
        // lot-003 has a 10 minute grace period.
        let feed = "\
lot_id,vehicle_count,observed_at
lot-003,230,2024-03-01T08:00:00Z
lot-003,150,2024-03-01T08:05:00Z
lot-003,230,2024-03-01T08:10:00Z
lot-003,150,2024-03-01T08:40:00Z
";
        let sim = simulator();
        sim.start(SimulationScenario::Replay, t0()).await.unwrap();
        let mut source = ReplaySource::from_reader(feed.as_bytes(), 1).unwrap();

        let summary = sim
            .run_ticks(
                &mut source,
                10,
                t0() + Duration::days(3),
                Duration::minutes(1),
                &NullProgress,
            )
            .await
            .unwrap();
        assert_eq!(summary.ticks, 4);
        assert_eq!(summary.applied, 4);

        // The first breach dips inside its grace period and is discarded.
        // The second outlasts it, so it opens and closes in one reading.
        assert_eq!((summary.opened, summary.closed), (1, 1));
        let violations = sim.store().list_violations(&ViolationFilter {
            status: None,
            lot_id: Some("lot-003".to_string()),
        });
        let new: Vec<_> = violations.iter().filter(|v| v.id != "viol-005").collect();
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].started_at, t0() + Duration::minutes(10));
        assert_eq!(new[0].duration_minutes, 30);
        // 30 over for half an hour at 300/h.
        assert_eq!(new[0].penalty_amount, 4500);
    }

    #[tokio::test]
    async fn polling_escalates_live_grace_while_stopped() {
        let provisioned = Utc::now() - Duration::minutes(30);
        let store = OccupancyStore::from_seed(&seed::default_seed().unwrap(), provisioned).unwrap();
        let sim = Arc::new(Simulator::new(Arc::new(store), 1));

        let breach = Utc::now() - Duration::minutes(20);
        sim.store().apply_observation("lot-003", 230, breach).unwrap();
        let status = sim.store().get_lot_status("lot-003", Utc::now()).unwrap();
        assert_eq!(status.status, ComplianceStatus::Violating);
        assert!(status.active_violation.is_none());

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(run_polling(
            sim.clone(),
            RushHourSource::new(9),
            std::time::Duration::from_millis(5),
            async move {
                let _ = rx.await;
            },
        ));
        tokio::time::sleep(std::time::Duration::from_millis(40)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        assert!(!sim.state().await.is_running);
        let status = sim.store().get_lot_status("lot-003", Utc::now()).unwrap();
        let active = status.active_violation.unwrap();
        assert_eq!(
            sim.store().get_violation(&active.id).unwrap().started_at,
            breach
        );
        let stats = sim.store().aggregate_stats(Utc::now());
        assert_eq!(stats.active_violations, 3);
        assert_eq!(stats.lots_violating, 3);
    }

    #[tokio::test]
    async fn polling_stops_on_shutdown() {
        let sim = Arc::new(simulator());
        sim.start(SimulationScenario::RushHour, t0()).await.unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(run_polling(
            sim.clone(),
            RushHourSource::new(9),
            std::time::Duration::from_millis(5),
            async move {
                let _ = rx.await;
            },
        ));

        tokio::time::sleep(std::time::Duration::from_millis(40)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        assert!(sim.state().await.events_generated >= 1);
    }
}

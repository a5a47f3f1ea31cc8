//! Mutable store state and the observation-apply path.
//!
//! Every write goes through [`StoreState::apply`] or [`StoreState::poll`],
//! which ask the rule engine for a [`Transition`] and then carry it out.
//! Together they uphold the "at most one active violation per lot"
//! invariant: a lot's `active` slot is the only way a violation is
//! considered open, and it is cleared in the same step that resolves it.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use parking_watch_lot_models::{
    COUNT_HISTORY_LEN, CaptureMetadata, ComplianceStatus, CountHistoryPoint, Observation,
    ParkingLot, Violation, ViolationStatus,
};
use parking_watch_rules::{self as rules, Phase, Transition};

use crate::evidence;
use crate::seed::{SeedDefinition, SeedError};
use crate::{LifecycleEvent, ObservationOutcome, StoreError};

/// Minutes between generated seed evidence captures.
const SEED_EVIDENCE_INTERVAL_MINUTES: i64 = 15;

/// A lot plus the bookkeeping the store needs to run its lifecycle.
#[derive(Debug, Clone)]
pub(crate) struct LotEntry {
    pub lot: ParkingLot,
    /// Breach instant of an unexpired (or not yet escalated) grace period.
    pub grace_started_at: Option<DateTime<Utc>>,
    /// Index into [`StoreState::violations`] of the active violation.
    pub active: Option<usize>,
    pub history: VecDeque<CountHistoryPoint>,
    /// Camera credited on evidence when a reading has no metadata.
    pub camera_id: String,
}

/// The complete lot roster and violation set.
#[derive(Debug, Clone)]
pub(crate) struct StoreState {
    pub lots: Vec<LotEntry>,
    pub violations: Vec<Violation>,
    index: HashMap<String, usize>,
    next_violation_seq: usize,
}

impl LotEntry {
    fn new(lot: ParkingLot, camera_id: String) -> Self {
        let mut history = VecDeque::with_capacity(COUNT_HISTORY_LEN);
        history.push_back(CountHistoryPoint {
            timestamp: lot.updated_at,
            count: lot.current_count,
        });
        Self {
            lot,
            grace_started_at: None,
            active: None,
            history,
            camera_id,
        }
    }

    fn record_count(&mut self, count: u32, at: DateTime<Utc>) {
        self.lot.current_count = count;
        self.lot.updated_at = at;
        self.history.push_back(CountHistoryPoint {
            timestamp: at,
            count,
        });
        while self.history.len() > COUNT_HISTORY_LEN {
            self.history.pop_front();
        }
    }
}

impl StoreState {
    /// Builds the initial state from a seed roster.
    ///
    /// Lots that are over capacity at provisioning time without a seeded
    /// active violation go through the ordinary breach transition at
    /// `provisioned_at`.
    pub fn provision(
        seed: &SeedDefinition,
        provisioned_at: DateTime<Utc>,
    ) -> Result<Self, SeedError> {
        let mut state = Self {
            lots: Vec::with_capacity(seed.lots.len()),
            violations: Vec::with_capacity(seed.violations.len()),
            index: HashMap::new(),
            next_violation_seq: 1,
        };

        for lot_seed in &seed.lots {
            if state.index.contains_key(&lot_seed.id) {
                return Err(invalid(format!("duplicate lot id '{}'", lot_seed.id)));
            }
            if lot_seed.allowed_capacity == 0 {
                return Err(invalid(format!(
                    "lot '{}' must have a positive allowed_capacity",
                    lot_seed.id
                )));
            }
            if !lot_seed.penalty_rate_per_hour.is_finite() || lot_seed.penalty_rate_per_hour < 0.0
            {
                return Err(invalid(format!(
                    "lot '{}' must have a non-negative penalty_rate_per_hour",
                    lot_seed.id
                )));
            }

            let lot = ParkingLot {
                id: lot_seed.id.clone(),
                name: lot_seed.name.clone(),
                contractor: lot_seed.contractor.clone(),
                allowed_capacity: lot_seed.allowed_capacity,
                current_count: lot_seed.current_count,
                penalty_rate_per_hour: lot_seed.penalty_rate_per_hour,
                grace_period_minutes: lot_seed.grace_period_minutes,
                rule_version: lot_seed.rule_version.clone(),
                latitude: lot_seed.latitude,
                longitude: lot_seed.longitude,
                created_at: provisioned_at
                    - Duration::days(i64::from(lot_seed.provisioned_days_ago)),
                updated_at: provisioned_at,
            };
            let camera_id = lot_seed
                .camera_id
                .clone()
                .unwrap_or_else(|| format!("CAM-{}", lot_seed.id.to_uppercase()));

            state.index.insert(lot.id.clone(), state.lots.len());
            state.lots.push(LotEntry::new(lot, camera_id));
        }

        for violation_seed in &seed.violations {
            state.provision_violation(violation_seed, provisioned_at)?;
        }

        for idx in 0..state.lots.len() {
            let entry = &state.lots[idx];
            if entry.active.is_some() || !entry.lot.is_over_capacity() {
                continue;
            }
            let count = entry.lot.current_count;
            let transition = rules::evaluate(
                Phase::Compliant,
                entry.lot.allowed_capacity,
                entry.lot.grace_period(),
                count,
                provisioned_at,
            );
            state.carry_out(idx, transition, count, provisioned_at, None);
        }

        state.next_violation_seq = state.violations.len() + 1;
        Ok(state)
    }

    fn provision_violation(
        &mut self,
        seed: &crate::seed::ViolationSeed,
        provisioned_at: DateTime<Utc>,
    ) -> Result<(), SeedError> {
        if self.violations.iter().any(|v| v.id == seed.id) {
            return Err(invalid(format!("duplicate violation id '{}'", seed.id)));
        }
        let Some(&idx) = self.index.get(&seed.lot_id) else {
            return Err(invalid(format!(
                "violation '{}' references unknown lot '{}'",
                seed.id, seed.lot_id
            )));
        };

        let entry = &self.lots[idx];
        let lot = &entry.lot;
        if seed.peak_count <= lot.allowed_capacity {
            return Err(invalid(format!(
                "violation '{}' peak_count {} does not exceed capacity {}",
                seed.id, seed.peak_count, lot.allowed_capacity
            )));
        }

        let started_at = provisioned_at - Duration::minutes(i64::from(seed.started_minutes_ago));
        let rule_version = seed
            .rule_version
            .clone()
            .unwrap_or_else(|| lot.rule_version.clone());

        let mut violation = Violation {
            id: seed.id.clone(),
            lot_id: lot.id.clone(),
            lot_name: lot.name.clone(),
            contractor: lot.contractor.clone(),
            started_at,
            ended_at: None,
            allowed_capacity: lot.allowed_capacity,
            peak_count: seed.peak_count,
            max_excess: rules::excess(seed.peak_count, lot.allowed_capacity),
            duration_minutes: 0,
            penalty_amount: 0,
            rule_version,
            status: ViolationStatus::Active,
            evidence: Vec::new(),
        };

        for i in 0..seed.evidence_count as usize {
            #[allow(clippy::cast_possible_wrap)]
            let captured_at =
                started_at + Duration::minutes(i as i64 * SEED_EVIDENCE_INTERVAL_MINUTES);
            let metadata = evidence::fallback_metadata(&entry.camera_id, i);
            violation.evidence.push(evidence::capture(
                &lot.id,
                &violation.id,
                i,
                captured_at,
                seed.peak_count,
                &metadata,
            ));
        }

        if let Some(duration) = seed.duration_minutes {
            if duration > seed.started_minutes_ago {
                return Err(invalid(format!(
                    "resolved violation '{}' ends after the provisioning instant",
                    seed.id
                )));
            }
            let closure = rules::close(
                started_at,
                started_at + Duration::minutes(i64::from(duration)),
                violation.max_excess,
                lot.penalty_rate_per_hour,
            );
            violation.ended_at = Some(closure.ended_at);
            violation.duration_minutes = closure.duration_minutes;
            violation.penalty_amount = closure.penalty_amount;
            violation.status = ViolationStatus::Resolved;
        } else {
            if entry.active.is_some() {
                return Err(invalid(format!(
                    "lot '{}' has more than one active violation",
                    lot.id
                )));
            }
            if !lot.is_over_capacity() {
                return Err(invalid(format!(
                    "active violation '{}' on lot '{}' which is within capacity",
                    seed.id, lot.id
                )));
            }
            violation.peak_count = rules::ratchet_peak(violation.peak_count, lot.current_count);
            violation.max_excess = rules::excess(violation.peak_count, lot.allowed_capacity);
            violation.duration_minutes = rules::elapsed_minutes(started_at, provisioned_at);
            self.lots[idx].active = Some(self.violations.len());
        }

        self.violations.push(violation);
        Ok(())
    }

    /// Looks up a lot's index by id.
    pub fn lot_index(&self, lot_id: &str) -> Result<usize, StoreError> {
        self.index
            .get(lot_id)
            .copied()
            .ok_or_else(|| StoreError::lot_not_found(lot_id))
    }

    /// The rule engine's view of a lot.
    pub fn phase(&self, idx: usize) -> Phase {
        let entry = &self.lots[idx];
        if let Some(v) = entry.active {
            Phase::Violating {
                started_at: self.violations[v].started_at,
            }
        } else if let Some(started_at) = entry.grace_started_at {
            Phase::GracePeriod { started_at }
        } else {
            Phase::Compliant
        }
    }

    /// Derived status of a lot at `now`.
    pub fn status(&self, idx: usize, now: DateTime<Utc>) -> ComplianceStatus {
        rules::derive_status(self.phase(idx), self.lots[idx].lot.grace_period(), now)
    }

    /// Applies one observation atomically.
    ///
    /// Validation happens before any mutation, so a rejected observation
    /// leaves the state untouched.
    pub fn apply(&mut self, observation: &Observation) -> Result<ObservationOutcome, StoreError> {
        let count = u32::try_from(observation.vehicle_count).map_err(|_| {
            StoreError::invalid(format!(
                "vehicle count {} for lot '{}' must be a non-negative integer",
                observation.vehicle_count, observation.lot_id
            ))
        })?;
        let idx = self.lot_index(&observation.lot_id)?;
        let observed_at = observation.observed_at;

        // `updated_at` starts at the provisioning instant and never precedes
        // the lot's breach, so this also rejects readings from before the
        // roster existed or before an open grace period or violation began.
        let last = self.lots[idx].lot.updated_at;
        if observed_at < last {
            return Err(StoreError::invalid(format!(
                "observation for lot '{}' at {observed_at} is older than the lot's last update \
                 at {last}",
                observation.lot_id
            )));
        }

        let entry = &self.lots[idx];
        let transition = rules::evaluate(
            self.phase(idx),
            entry.lot.allowed_capacity,
            entry.lot.grace_period(),
            count,
            observed_at,
        );

        let capture = Some(observation.capture.clone().unwrap_or_else(|| {
            let sequence = entry.active.map_or(0, |v| self.violations[v].evidence.len());
            evidence::fallback_metadata(&entry.camera_id, sequence)
        }));

        let events = self.carry_out(idx, transition, count, observed_at, capture);
        self.lots[idx].record_count(count, observed_at);

        let status = self.status(idx, observed_at);
        log::debug!(
            "lot {} observed {count} at {observed_at} ({:?}): {status}",
            observation.lot_id,
            observation.source
        );

        Ok(ObservationOutcome {
            lot_id: observation.lot_id.clone(),
            status,
            active_violation_id: self.lots[idx].active.map(|v| self.violations[v].id.clone()),
            events,
        })
    }

    /// Escalates every lot whose grace period has expired by `now` and
    /// refreshes the running duration of active violations.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();

        for idx in 0..self.lots.len() {
            let entry = &self.lots[idx];
            let transition = rules::poll(self.phase(idx), entry.lot.grace_period(), now);
            let count = entry.lot.current_count;
            events.extend(self.carry_out(idx, transition, count, now, None));

            if let Some(v) = self.lots[idx].active {
                let violation = &mut self.violations[v];
                let minutes = rules::elapsed_minutes(violation.started_at, now);
                violation.duration_minutes = violation.duration_minutes.max(minutes);
            }
        }

        events
    }

    /// Carries out a rule-engine transition for lot `idx`.
    ///
    /// `count` is the count that triggered the transition and `at` the
    /// instant it applies. `capture` is present only for real readings;
    /// escalation by poll records no evidence.
    fn carry_out(
        &mut self,
        idx: usize,
        transition: Transition,
        count: u32,
        at: DateTime<Utc>,
        capture: Option<CaptureMetadata>,
    ) -> Vec<LifecycleEvent> {
        match transition {
            Transition::Unchanged | Transition::HoldGrace => vec![],
            Transition::EnterGrace { started_at } => {
                let entry = &mut self.lots[idx];
                entry.grace_started_at = Some(started_at);
                log::info!(
                    "lot {} over capacity ({count}/{}), grace period of {} min started",
                    entry.lot.id,
                    entry.lot.allowed_capacity,
                    entry.lot.grace_period().num_minutes()
                );
                vec![LifecycleEvent::GraceStarted {
                    lot_id: entry.lot.id.clone(),
                    started_at,
                }]
            }
            Transition::Discard => {
                let entry = &mut self.lots[idx];
                let Some(started_at) = entry.grace_started_at.take() else {
                    return vec![];
                };
                log::info!(
                    "lot {} back within capacity during grace period, breach discarded",
                    entry.lot.id
                );
                vec![LifecycleEvent::GraceDiscarded {
                    lot_id: entry.lot.id.clone(),
                    started_at,
                }]
            }
            Transition::Open { started_at } | Transition::Escalate { started_at } => {
                vec![self.open(idx, started_at, count, at, capture.as_ref())]
            }
            Transition::EscalateAndClose { started_at } => {
                let entry = &self.lots[idx];
                let last_over = entry.lot.current_count;
                let expired_at = started_at + entry.lot.grace_period();
                let opened = self.open(idx, started_at, last_over, expired_at, None);
                std::iter::once(opened).chain(self.close(idx, at)).collect()
            }
            Transition::Refresh => {
                self.refresh(idx, count, at, capture.as_ref());
                vec![]
            }
            Transition::Close => self.close(idx, at).into_iter().collect(),
        }
    }

    fn open(
        &mut self,
        idx: usize,
        started_at: DateTime<Utc>,
        count: u32,
        at: DateTime<Utc>,
        capture: Option<&CaptureMetadata>,
    ) -> LifecycleEvent {
        let violation_id = self.next_violation_id();
        let entry = &self.lots[idx];
        let lot = &entry.lot;
        let max_excess = rules::excess(count, lot.allowed_capacity);

        let mut violation = Violation {
            id: violation_id.clone(),
            lot_id: lot.id.clone(),
            lot_name: lot.name.clone(),
            contractor: lot.contractor.clone(),
            started_at,
            ended_at: None,
            allowed_capacity: lot.allowed_capacity,
            peak_count: count,
            max_excess,
            duration_minutes: rules::elapsed_minutes(started_at, at),
            penalty_amount: 0,
            rule_version: lot.rule_version.clone(),
            status: ViolationStatus::Active,
            evidence: Vec::new(),
        };
        if let Some(metadata) = capture {
            violation.evidence.push(evidence::capture(
                &lot.id,
                &violation_id,
                0,
                at,
                count,
                metadata,
            ));
        }

        log::info!(
            "violation {violation_id} opened for lot {} (started {started_at}, excess {max_excess})",
            lot.id
        );

        let v = self.violations.len();
        self.violations.push(violation);
        let entry = &mut self.lots[idx];
        entry.grace_started_at = None;
        entry.active = Some(v);

        LifecycleEvent::Opened {
            lot_id: entry.lot.id.clone(),
            violation_id,
            started_at,
        }
    }

    fn refresh(
        &mut self,
        idx: usize,
        count: u32,
        at: DateTime<Utc>,
        capture: Option<&CaptureMetadata>,
    ) {
        let entry = &self.lots[idx];
        let Some(v) = entry.active else {
            return;
        };
        let violation = &mut self.violations[v];

        violation.peak_count = rules::ratchet_peak(violation.peak_count, count);
        violation.max_excess = violation
            .max_excess
            .max(rules::excess(count, violation.allowed_capacity));
        violation.duration_minutes = violation
            .duration_minutes
            .max(rules::elapsed_minutes(violation.started_at, at));

        if let Some(metadata) = capture {
            let sequence = violation.evidence.len();
            violation.evidence.push(evidence::capture(
                &entry.lot.id,
                &violation.id,
                sequence,
                at,
                count,
                metadata,
            ));
        }
    }

    fn close(&mut self, idx: usize, ended_at: DateTime<Utc>) -> Option<LifecycleEvent> {
        let entry = &mut self.lots[idx];
        let v = entry.active.take()?;
        let rate = entry.lot.penalty_rate_per_hour;
        let violation = &mut self.violations[v];

        let closure = rules::close(violation.started_at, ended_at, violation.max_excess, rate);
        violation.ended_at = Some(closure.ended_at);
        violation.duration_minutes = closure.duration_minutes;
        violation.penalty_amount = closure.penalty_amount;
        violation.status = ViolationStatus::Resolved;

        log::info!(
            "violation {} resolved for lot {} after {} min, penalty {}",
            violation.id,
            violation.lot_id,
            closure.duration_minutes,
            closure.penalty_amount
        );

        Some(LifecycleEvent::Closed {
            lot_id: violation.lot_id.clone(),
            violation_id: violation.id.clone(),
            penalty_amount: closure.penalty_amount,
        })
    }

    fn next_violation_id(&mut self) -> String {
        loop {
            let id = format!("viol-{:03}", self.next_violation_seq);
            self.next_violation_seq += 1;
            if !self.violations.iter().any(|v| v.id == id) {
                return id;
            }
        }
    }
}

fn invalid(message: String) -> SeedError {
    SeedError::Invalid { message }
}

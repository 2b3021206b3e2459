//! The filter pipeline.
//!
//! Filters are registered once at startup and run every tick in three
//! phases: per-aircraft `preprocess` (ascending priority, so later filters
//! can read earlier filters' `calculated` results), per-aircraft `evaluate`,
//! then cross-aircraft `postprocess`. The set of triggered aircraft is
//! diffed against the previous tick to produce alert insertions and
//! removals; the active-alert table is owned exclusively by the pipeline.
//!
//! Fault policy: a filter method returning an error is logged with
//! `(filter id, hex)` and treated as neutral for that aircraft and tick. A
//! tick that exceeds its budget truncates the remaining filters; their
//! previous-tick triggers are carried forward untouched so removals can only
//! happen on a tick where the filter actually ran.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::aircraft::Aircraft;
use crate::airports::AirportIndex;
use crate::alerts::{Alert, AlertBody, AlertEvent, AlertSub, FilterStatus, StatusReport};
use crate::config::{Config, Observer};
use crate::squawks::SquawkTable;
use crate::trajectory::TrajectoryStore;

/// All aircraft other than the one currently being preprocessed.
pub struct Peers<'a> {
    before: &'a [Aircraft],
    after: &'a [Aircraft],
}

impl<'a> Peers<'a> {
    /// Build a peer view from the slices either side of the current
    /// aircraft; mainly useful to drive a filter outside the pipeline.
    pub fn from_slices(before: &'a [Aircraft], after: &'a [Aircraft]) -> Self {
        Self { before, after }
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Aircraft> + '_ {
        self.before.iter().chain(self.after.iter())
    }

    pub fn len(&self) -> usize {
        self.before.len() + self.after.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything a filter may read during one tick besides the aircraft
/// themselves. Detectors take the tick time from here, never from the wall
/// clock, so recorded feeds replay deterministically.
pub struct TickContext<'a> {
    pub now: DateTime<Utc>,
    pub observer: Observer,
    pub airports: &'a AirportIndex,
    pub squawks: &'a SquawkTable,
    trajectories: &'a HashMap<String, TrajectoryStore>,
}

impl<'a> TickContext<'a> {
    pub fn new(
        now: DateTime<Utc>,
        observer: Observer,
        airports: &'a AirportIndex,
        squawks: &'a SquawkTable,
        trajectories: &'a HashMap<String, TrajectoryStore>,
    ) -> Self {
        Self {
            now,
            observer,
            airports,
            squawks,
            trajectories,
        }
    }

    /// The trajectory store for an aircraft.
    pub fn aircraft_data(&self, hex: &str) -> Option<&'a TrajectoryStore> {
        self.trajectories.get(hex)
    }
}

/// One analytical filter. See the module docs for the phase contract.
pub trait Filter: Send {
    /// Alert-type identity.
    fn id(&self) -> &'static str;

    /// Human-readable name for status snapshots.
    fn name(&self) -> &'static str {
        self.id()
    }

    /// Lower priorities preprocess first.
    fn priority(&self) -> i32;

    /// Called once at startup with the full configuration and reference
    /// stores. A filter missing its reference data should log once here and
    /// produce empty results thereafter, not error.
    fn configure(
        &mut self,
        config: &Config,
        airports: &AirportIndex,
        squawks: &SquawkTable,
    ) -> Result<()>;

    /// Derive this filter's result for one aircraft, storing it in the
    /// aircraft's `calculated` slot. Implementations must store their
    /// sentinel ("not detected") value before any conditional enrichment.
    fn preprocess(
        &mut self,
        aircraft: &mut Aircraft,
        peers: &Peers<'_>,
        ctx: &TickContext<'_>,
    ) -> Result<()>;

    /// Pure read of the aircraft's `calculated` slot.
    fn evaluate(&self, aircraft: &Aircraft) -> bool;

    /// Cross-aircraft aggregation after all evaluations.
    fn postprocess(&mut self, _aircraft: &[Aircraft], _ctx: &TickContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Presentation order among this filter's triggered aircraft.
    fn sort(&self, _a: &Aircraft, _b: &Aircraft) -> Ordering {
        Ordering::Equal
    }

    /// Structured counts for the status snapshot.
    fn stats(&self, _all: &[Aircraft], _triggered: &[&Aircraft]) -> serde_json::Value {
        serde_json::json!({})
    }

    /// Alert body for an insertion.
    fn format(&self, aircraft: &Aircraft) -> AlertBody;

    /// Optional trace output used when debugging sorting or scoring.
    fn debug(&self, _kind: &str, _aircraft: &Aircraft) -> Option<String> {
        None
    }
}

/// Outcome of one pipeline tick.
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// Alert events in delivery order (filter priority, then id).
    pub events: Vec<AlertEvent>,
    pub status: StatusReport,
    pub inserted: usize,
    pub removed: usize,
}

/// The registered filter set plus the active-alert table.
pub struct FilterPipeline {
    filters: Vec<Box<dyn Filter>>,
    /// `(filter id, hex)` of every alert active after the previous tick.
    active: BTreeMap<(String, String), Alert>,
    budget_ms: u64,
    tick: u64,
}

impl FilterPipeline {
    pub fn new(budget_ms: u64) -> Self {
        Self {
            filters: Vec::new(),
            active: BTreeMap::new(),
            budget_ms,
            tick: 0,
        }
    }

    /// Register a filter, kept ordered by (priority, id).
    pub fn register(&mut self, filter: Box<dyn Filter>) {
        self.filters.push(filter);
        self.filters
            .sort_by_key(|f| (f.priority(), f.id().to_string()));
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    /// Number of currently active alerts across all filters.
    pub fn active_alerts(&self) -> usize {
        self.active.len()
    }

    /// Configure every filter once at startup.
    pub fn configure_all(
        &mut self,
        config: &Config,
        airports: &AirportIndex,
        squawks: &SquawkTable,
    ) -> Result<()> {
        for filter in &mut self.filters {
            filter.configure(config, airports, squawks)?;
        }
        Ok(())
    }

    /// Run one tick over the aircraft set. The caller has already refreshed
    /// the table, appended trajectories, and derived the shared fields.
    pub fn run_tick(&mut self, aircraft: &mut [Aircraft], ctx: &TickContext<'_>) -> TickOutcome {
        self.tick += 1;
        let started = Instant::now();
        let mut durations = vec![0.0f64; self.filters.len()];
        let mut truncated = vec![false; self.filters.len()];

        // Phase 1: preprocess in priority order.
        for (fi, filter) in self.filters.iter_mut().enumerate() {
            if started.elapsed().as_millis() as u64 >= self.budget_ms {
                warn!(
                    "tick budget {} ms exceeded before filter {}; truncating",
                    self.budget_ms,
                    filter.id()
                );
                for t in truncated.iter_mut().skip(fi) {
                    *t = true;
                }
                metrics::counter!("skywatch.pipeline.truncated_ticks_total").increment(1);
                break;
            }
            let filter_started = Instant::now();
            for i in 0..aircraft.len() {
                let (before, rest) = aircraft.split_at_mut(i);
                let (current, after) = rest.split_first_mut().expect("index in bounds");
                let peers = Peers { before, after };
                if let Err(error) = filter.preprocess(current, &peers, ctx) {
                    warn!(
                        "filter {} preprocess failed for {}: {:#}",
                        filter.id(),
                        current.hex,
                        error
                    );
                }
            }
            durations[fi] = filter_started.elapsed().as_secs_f64() * 1000.0;
        }

        // Phase 2: evaluate.
        let mut triggered_indices: Vec<Vec<usize>> = Vec::with_capacity(self.filters.len());
        for (fi, filter) in self.filters.iter().enumerate() {
            if truncated[fi] {
                triggered_indices.push(Vec::new());
                continue;
            }
            let mut hits: Vec<usize> = (0..aircraft.len())
                .filter(|&i| filter.evaluate(&aircraft[i]))
                .collect();
            hits.sort_by(|&a, &b| {
                filter
                    .sort(&aircraft[a], &aircraft[b])
                    .then_with(|| aircraft[a].hex.cmp(&aircraft[b].hex))
            });
            triggered_indices.push(hits);
        }

        // Phase 3: diff against the previous tick's active table.
        let mut next_active: BTreeMap<(String, String), Alert> = BTreeMap::new();
        let mut events = Vec::new();
        let mut outcome_inserted = 0;
        let mut outcome_removed = 0;
        let time_formatted = ctx.now.format("%H:%M:%S").to_string();

        for (fi, filter) in self.filters.iter().enumerate() {
            let id = filter.id();
            if truncated[fi] {
                // Carry the filter's previous triggers forward untouched;
                // removals may only come from a tick where the filter ran.
                for ((fid, hex), alert) in &self.active {
                    if fid == id {
                        next_active.insert((fid.clone(), hex.clone()), alert.clone());
                    }
                }
                continue;
            }

            let mut inserted = Vec::new();
            for &i in &triggered_indices[fi] {
                let a = &aircraft[i];
                let body = filter.format(a);
                let alert = Alert {
                    alert_type: id.to_string(),
                    hex: a.hex.clone(),
                    flight: a.snapshot.callsign().map(str::to_string),
                    text: body.text,
                    warn: body.warn,
                    time_formatted: time_formatted.clone(),
                    payload: body.payload,
                };
                let key = (id.to_string(), a.hex.clone());
                if !self.active.contains_key(&key) {
                    inserted.push(alert.clone());
                }
                next_active.insert(key, alert);
            }

            let removed: Vec<Alert> = self
                .active
                .iter()
                .filter(|((fid, hex), _)| {
                    fid == id && !next_active.contains_key(&(fid.clone(), hex.clone()))
                })
                .map(|(_, alert)| alert.clone())
                .collect();

            outcome_inserted += inserted.len();
            outcome_removed += removed.len();
            if !inserted.is_empty() {
                events.push(AlertEvent::Alerts {
                    filter_id: id.to_string(),
                    sub: AlertSub::Insert,
                    items: inserted,
                });
            }
            if !removed.is_empty() {
                events.push(AlertEvent::Alerts {
                    filter_id: id.to_string(),
                    sub: AlertSub::Remove,
                    items: removed,
                });
            }
        }

        // Phase 4: postprocess.
        for (fi, filter) in self.filters.iter_mut().enumerate() {
            if truncated[fi] {
                continue;
            }
            let post_started = Instant::now();
            if let Err(error) = filter.postprocess(aircraft, ctx) {
                warn!("filter {} postprocess failed: {:#}", filter.id(), error);
            }
            durations[fi] += post_started.elapsed().as_secs_f64() * 1000.0;
        }

        // Phase 5: status snapshot.
        let mut status = StatusReport {
            tick: self.tick,
            aircraft_count: aircraft.len(),
            filters: BTreeMap::new(),
        };
        for (fi, filter) in self.filters.iter().enumerate() {
            let triggered: Vec<&Aircraft> =
                triggered_indices[fi].iter().map(|&i| &aircraft[i]).collect();
            let stats = if truncated[fi] {
                serde_json::json!({})
            } else {
                filter.stats(aircraft, &triggered)
            };
            status.filters.insert(
                filter.id().to_string(),
                FilterStatus {
                    name: filter.name().to_string(),
                    count: triggered.len(),
                    stats,
                    duration_ms: durations[fi],
                    truncated: truncated[fi],
                },
            );
        }

        self.active = next_active;
        debug!(
            "tick {} complete: {} aircraft, {} inserted, {} removed, {} active",
            self.tick,
            aircraft.len(),
            outcome_inserted,
            outcome_removed,
            self.active.len()
        );
        metrics::counter!("skywatch.alerts.inserted_total").increment(outcome_inserted as u64);
        metrics::counter!("skywatch.alerts.removed_total").increment(outcome_removed as u64);
        metrics::gauge!("skywatch.alerts.active").set(self.active.len() as f64);

        TickOutcome {
            events,
            status,
            inserted: outcome_inserted,
            removed: outcome_removed,
        }
    }
}

//! Tracked aircraft and the per-tick aircraft table.
//!
//! An [`Aircraft`] is the aggregate the filters work on: the latest snapshot
//! plus the `calculated` side-pocket of per-filter results. The side-pocket
//! is a typed struct with one slot per filter, reset at the start of every
//! tick so no filter ever reads a stale result from a previous tick.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::config::Observer;
use crate::filters::airport::AirportsAssessment;
use crate::filters::airprox::AirproxAssessment;
use crate::filters::loitering::LoiteringAssessment;
use crate::filters::overhead::OverheadAssessment;
use crate::filters::performance::PerformanceAssessment;
use crate::filters::squawk::SquawkAssessment;
use crate::geometry;
use crate::snapshot::AircraftSnapshot;
use crate::trajectory::TrajectoryStore;

/// Per-filter results derived during the current tick.
///
/// Each slot starts the tick as `None`; a filter's preprocess stores its
/// sentinel ("not detected") result before any conditional enrichment, so
/// later filters always observe a stable shape.
#[derive(Debug, Clone, Default)]
pub struct Calculated {
    /// Preferred altitude for this tick (baro, geometric fallback), ft.
    pub altitude_ft: Option<i32>,
    /// Great-circle distance from the observer, km.
    pub distance_km: Option<f64>,

    pub overhead: Option<OverheadAssessment>,
    pub airports: Option<AirportsAssessment>,
    pub airprox: Option<AirproxAssessment>,
    pub loitering: Option<LoiteringAssessment>,
    pub squawk: Option<SquawkAssessment>,
    pub performance: Option<PerformanceAssessment>,
}

impl Calculated {
    fn reset(&mut self) {
        *self = Calculated::default();
    }
}

/// One tracked aircraft, keyed by ICAO hex address.
#[derive(Debug, Clone)]
pub struct Aircraft {
    pub hex: String,
    pub snapshot: AircraftSnapshot,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Consecutive ticks the aircraft has been absent from the feed.
    pub missed_ticks: u32,
    pub calculated: Calculated,
}

impl Aircraft {
    fn new(snapshot: AircraftSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            hex: snapshot.hex.clone(),
            snapshot,
            first_seen: now,
            last_seen: now,
            missed_ticks: 0,
            calculated: Calculated::default(),
        }
    }

    /// Whether an earlier filter flagged this aircraft as near an airport
    /// this tick. Read by airprox to suppress terminal-area pairs.
    pub fn near_airport(&self) -> bool {
        self.calculated
            .airports
            .as_ref()
            .map(|a| a.airports_nearby)
            .unwrap_or(false)
    }
}

/// Ingest counters for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickIngest {
    pub inserted: usize,
    pub updated: usize,
    pub retired: usize,
}

/// The set of currently-tracked aircraft and their trajectory stores.
///
/// Mutated only by the ingest stage; the filters read it for the remainder
/// of the tick. An aircraft absent from `retire_after_ticks` consecutive
/// feed snapshots is retired together with its trajectory.
pub struct AircraftTable {
    entries: Vec<Aircraft>,
    index: HashMap<String, usize>,
    trajectories: HashMap<String, TrajectoryStore>,
    retire_after_ticks: u32,
    trajectory_retention: chrono::Duration,
    trajectory_max_entries: usize,
}

impl AircraftTable {
    pub fn new(retire_after_ticks: u32) -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            trajectories: HashMap::new(),
            retire_after_ticks: retire_after_ticks.max(1),
            trajectory_retention: chrono::Duration::minutes(
                crate::trajectory::DEFAULT_RETENTION_MINUTES,
            ),
            trajectory_max_entries: crate::trajectory::DEFAULT_MAX_ENTRIES,
        }
    }

    /// Override the trajectory retention bounds applied to new stores.
    pub fn with_trajectory_limits(
        mut self,
        retention: chrono::Duration,
        max_entries: usize,
    ) -> Self {
        self.trajectory_retention = retention;
        self.trajectory_max_entries = max_entries;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn aircraft(&self) -> &[Aircraft] {
        &self.entries
    }

    pub fn aircraft_mut(&mut self) -> &mut [Aircraft] {
        &mut self.entries
    }

    pub fn get(&self, hex: &str) -> Option<&Aircraft> {
        self.index.get(hex).map(|&i| &self.entries[i])
    }

    pub fn trajectories(&self) -> &HashMap<String, TrajectoryStore> {
        &self.trajectories
    }

    /// Disjoint borrows for the pipeline: mutable aircraft, shared
    /// trajectories.
    pub fn split_for_tick(&mut self) -> (&mut [Aircraft], &HashMap<String, TrajectoryStore>) {
        (&mut self.entries, &self.trajectories)
    }

    pub fn trajectory(&self, hex: &str) -> Option<&TrajectoryStore> {
        self.trajectories.get(hex)
    }

    /// Apply one feed snapshot batch: update or insert every reported
    /// aircraft, append trajectory entries, retire the long-absent, and
    /// reset every `calculated` pocket for the new tick.
    pub fn apply(&mut self, now: DateTime<Utc>, snapshots: Vec<AircraftSnapshot>) -> TickIngest {
        let mut ingest = TickIngest::default();

        for aircraft in &mut self.entries {
            aircraft.missed_ticks += 1;
            aircraft.calculated.reset();
        }

        for snapshot in snapshots {
            if !snapshot.is_valid() {
                trace!("Dropping out-of-domain snapshot for {}", snapshot.hex);
                continue;
            }
            self.trajectories
                .entry(snapshot.hex.clone())
                .or_insert_with(|| {
                    TrajectoryStore::new(self.trajectory_retention, self.trajectory_max_entries)
                })
                .append(now, snapshot.clone());

            match self.index.get(&snapshot.hex) {
                Some(&i) => {
                    let aircraft = &mut self.entries[i];
                    aircraft.snapshot = snapshot;
                    aircraft.last_seen = now;
                    aircraft.missed_ticks = 0;
                    ingest.updated += 1;
                }
                None => {
                    let hex = snapshot.hex.clone();
                    self.entries.push(Aircraft::new(snapshot, now));
                    self.index.insert(hex, self.entries.len() - 1);
                    ingest.inserted += 1;
                }
            }
        }

        let retire_after = self.retire_after_ticks;
        let before = self.entries.len();
        self.entries.retain(|a| a.missed_ticks < retire_after);
        ingest.retired = before - self.entries.len();
        if ingest.retired > 0 {
            self.index.clear();
            for (i, aircraft) in self.entries.iter().enumerate() {
                self.index.insert(aircraft.hex.clone(), i);
            }
            self.trajectories
                .retain(|hex, _| self.index.contains_key(hex));
            debug!("Retired {} aircraft absent from the feed", ingest.retired);
        }

        ingest
    }

    /// Derive the shared `calculated` fields every filter relies on.
    pub fn derive_shared(&mut self, observer: &Observer) {
        for aircraft in &mut self.entries {
            aircraft.calculated.altitude_ft = aircraft.snapshot.altitude_ft();
            aircraft.calculated.distance_km = geometry::distance_km(
                observer.lat,
                observer.lon,
                aircraft.snapshot.lat,
                aircraft.snapshot.lon,
            )
            .ok();
        }
    }
}

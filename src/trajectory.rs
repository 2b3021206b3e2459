//! Per-aircraft rolling trajectory store.
//!
//! One store per tracked aircraft, appended once per tick with the fresh
//! snapshot and read by every filter during that tick. Retention is both
//! time-bounded and count-bounded. Field projections are memoised per
//! (field, query) key; the memo is invalidated on append, so within one tick
//! repeated queries from different filters are free.
//!
//! Instead of free-form dotted-path lookup, scalar access goes through the
//! [`TrackField`] enum of well-known fields, keeping projections statically
//! checked.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::snapshot::AircraftSnapshot;

/// Default retention window for trajectory entries.
pub const DEFAULT_RETENTION_MINUTES: i64 = 10;

/// Default cap on entries per aircraft (at one snapshot per second this is
/// comfortably above the retention window).
pub const DEFAULT_MAX_ENTRIES: usize = 1200;

/// The scalar fields a trajectory can be projected onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackField {
    Latitude,
    Longitude,
    Track,
    GroundSpeed,
    BaroRate,
    TrackRate,
    Roll,
    AltitudeBaro,
    AltitudeGeom,
    /// Preferred altitude: barometric, geometric as fallback.
    Altitude,
}

impl TrackField {
    fn extract(&self, snapshot: &AircraftSnapshot) -> Option<f64> {
        match self {
            TrackField::Latitude => Some(snapshot.lat),
            TrackField::Longitude => Some(snapshot.lon),
            TrackField::Track => snapshot.track,
            TrackField::GroundSpeed => snapshot.gs,
            TrackField::BaroRate => snapshot.baro_rate,
            TrackField::TrackRate => snapshot.track_rate,
            TrackField::Roll => snapshot.roll,
            TrackField::AltitudeBaro => snapshot.alt_baro.map(f64::from),
            TrackField::AltitudeGeom => snapshot.alt_geom.map(f64::from),
            TrackField::Altitude => snapshot.altitude_ft().map(f64::from),
        }
    }
}

/// Options for a field projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldQuery {
    /// Drop entries older than the newest entry minus this window.
    pub time_window_ms: Option<i64>,
    /// Empty result unless at least this many valid samples survive.
    pub min_data_points: Option<usize>,
    /// Keep only the most recent N valid samples.
    pub max_data_points: Option<usize>,
}

impl FieldQuery {
    pub fn window(duration: Duration) -> Self {
        FieldQuery {
            time_window_ms: Some(duration.num_milliseconds()),
            ..Default::default()
        }
    }

    pub fn with_min(mut self, min: usize) -> Self {
        self.min_data_points = Some(min);
        self
    }

    pub fn with_max(mut self, max: usize) -> Self {
        self.max_data_points = Some(max);
        self
    }
}

/// A projected field series. `values` and `timestamps` are parallel arrays.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldSeries {
    pub values: Vec<f64>,
    pub timestamps: Vec<DateTime<Utc>>,
}

impl FieldSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Summary statistics over a field projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub first: f64,
    pub last: f64,
    pub variance: f64,
    pub std_dev: f64,
    /// (last − first) / elapsed seconds; absent when count < 2 or the
    /// samples share a timestamp.
    pub rate_of_change: Option<f64>,
}

/// A position sample from the trajectory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub lat: f64,
    pub lon: f64,
    pub timestamp: DateTime<Utc>,
    pub altitude: Option<i32>,
    pub alt_baro: Option<i32>,
    pub track: Option<f64>,
    pub gs: Option<f64>,
    pub baro_rate: Option<f64>,
}

/// Options for [`TrajectoryStore::positions`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionsQuery {
    pub time_window: Option<Duration>,
    /// Drop samples missing altitude or track.
    pub require_complete_data: bool,
}

/// Stability test options for [`TrajectoryStore::is_field_stable`].
#[derive(Debug, Clone, Copy)]
pub struct StabilityQuery {
    pub std_dev_threshold: f64,
    pub min_data_points: usize,
    pub time_window: Option<Duration>,
}

/// One retained entry: the tick timestamp plus the snapshot captured then.
#[derive(Debug, Clone)]
pub struct TrajectoryEntry {
    pub timestamp: DateTime<Utc>,
    pub snapshot: AircraftSnapshot,
}

/// Rolling snapshot history for one aircraft.
#[derive(Debug)]
pub struct TrajectoryStore {
    entries: VecDeque<TrajectoryEntry>,
    retention: Duration,
    max_entries: usize,
    memo: DashMap<(TrackField, FieldQuery), FieldSeries>,
}

impl Default for TrajectoryStore {
    fn default() -> Self {
        Self::new(
            Duration::minutes(DEFAULT_RETENTION_MINUTES),
            DEFAULT_MAX_ENTRIES,
        )
    }
}

impl TrajectoryStore {
    pub fn new(retention: Duration, max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            retention,
            max_entries: max_entries.max(2),
            memo: DashMap::new(),
        }
    }

    /// Append the snapshot captured at `timestamp` and evict entries outside
    /// retention. Entries must arrive in timestamp order; an out-of-order
    /// append is dropped to keep the sequence non-decreasing.
    pub fn append(&mut self, timestamp: DateTime<Utc>, snapshot: AircraftSnapshot) {
        if let Some(last) = self.entries.back()
            && timestamp < last.timestamp
        {
            return;
        }
        self.entries.push_back(TrajectoryEntry {
            timestamp,
            snapshot,
        });
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
        let cutoff = timestamp - self.retention;
        while self
            .entries
            .front()
            .map(|e| e.timestamp < cutoff)
            .unwrap_or(false)
        {
            self.entries.pop_front();
        }
        self.memo.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_entry(&self) -> Option<&TrajectoryEntry> {
        self.entries.back()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.entries.back().map(|e| e.timestamp)
    }

    /// Whether the store holds at least `min_points` entries, optionally all
    /// within `time_window` of the newest entry. Filters use this to gate
    /// expensive analyses.
    pub fn has_minimum_data(&self, min_points: usize, time_window: Option<Duration>) -> bool {
        match time_window {
            None => self.entries.len() >= min_points,
            Some(window) => {
                let Some(newest) = self.last_timestamp() else {
                    return false;
                };
                let cutoff = newest - window;
                self.entries
                    .iter()
                    .rev()
                    .take_while(|e| e.timestamp >= cutoff)
                    .count()
                    >= min_points
            }
        }
    }

    /// Project a scalar field over the retained entries. Entries where the
    /// field is missing are skipped, so the returned arrays stay parallel.
    pub fn field(&self, field: TrackField, query: FieldQuery) -> FieldSeries {
        if let Some(memoised) = self.memo.get(&(field, query)) {
            return memoised.clone();
        }
        let series = self.project(field, query);
        self.memo.insert((field, query), series.clone());
        series
    }

    fn project(&self, field: TrackField, query: FieldQuery) -> FieldSeries {
        let mut series = FieldSeries::default();
        for entry in &self.entries {
            if let Some(value) = field.extract(&entry.snapshot) {
                series.values.push(value);
                series.timestamps.push(entry.timestamp);
            }
        }

        if let Some(window_ms) = query.time_window_ms
            && let Some(newest) = self.last_timestamp()
        {
            let (values, timestamps) = crate::statistics::filter_time_window(
                &series.values,
                &series.timestamps,
                newest,
                Duration::milliseconds(window_ms),
            );
            series = FieldSeries { values, timestamps };
        }

        if let Some(max) = query.max_data_points
            && series.values.len() > max
        {
            let excess = series.values.len() - max;
            series.values.drain(..excess);
            series.timestamps.drain(..excess);
        }

        if let Some(min) = query.min_data_points
            && series.values.len() < min
        {
            return FieldSeries::default();
        }
        series
    }

    /// Position samples, oldest first.
    pub fn positions(&self, query: PositionsQuery) -> Vec<PositionSample> {
        let cutoff = query
            .time_window
            .and_then(|window| self.last_timestamp().map(|newest| newest - window));

        self.entries
            .iter()
            .filter(|entry| cutoff.map(|c| entry.timestamp >= c).unwrap_or(true))
            .filter_map(|entry| {
                let s = &entry.snapshot;
                if query.require_complete_data && (s.altitude_ft().is_none() || s.track.is_none())
                {
                    return None;
                }
                Some(PositionSample {
                    lat: s.lat,
                    lon: s.lon,
                    timestamp: entry.timestamp,
                    altitude: s.altitude_ft(),
                    alt_baro: s.alt_baro,
                    track: s.track,
                    gs: s.gs,
                    baro_rate: s.baro_rate,
                })
            })
            .collect()
    }

    /// Summary statistics for a field projection; `None` when no samples
    /// survive the query.
    pub fn stats(&self, field: TrackField, query: FieldQuery) -> Option<FieldStats> {
        let series = self.field(field, query);
        if series.is_empty() {
            return None;
        }
        let count = series.len();
        let first = series.values[0];
        let last = series.values[count - 1];
        let sum: f64 = series.values.iter().sum();
        let avg = sum / count as f64;
        let min = series.values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = series
            .values
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let variance =
            series.values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / count as f64;

        let rate_of_change = if count >= 2 {
            let elapsed =
                (series.timestamps[count - 1] - series.timestamps[0]).num_milliseconds() as f64
                    / 1000.0;
            (elapsed > 0.0).then(|| (last - first) / elapsed)
        } else {
            None
        };

        Some(FieldStats {
            count,
            min,
            max,
            avg,
            first,
            last,
            variance,
            std_dev: variance.sqrt(),
            rate_of_change,
        })
    }

    /// Instantaneous rate of change between each consecutive sample pair,
    /// per second. Pairs sharing a timestamp are skipped.
    pub fn rate_of_change(&self, field: TrackField, query: FieldQuery) -> Vec<f64> {
        let series = self.field(field, query);
        series
            .values
            .windows(2)
            .zip(series.timestamps.windows(2))
            .filter_map(|(values, timestamps)| {
                let elapsed = (timestamps[1] - timestamps[0]).num_milliseconds() as f64 / 1000.0;
                (elapsed > 0.0).then(|| (values[1] - values[0]) / elapsed)
            })
            .collect()
    }

    /// Whether the field's spread is below a threshold over enough samples.
    pub fn is_field_stable(&self, field: TrackField, query: StabilityQuery) -> bool {
        let field_query = FieldQuery {
            time_window_ms: query.time_window.map(|w| w.num_milliseconds()),
            min_data_points: Some(query.min_data_points),
            max_data_points: None,
        };
        self.stats(field, field_query)
            .map(|stats| stats.std_dev < query.std_dev_threshold)
            .unwrap_or(false)
    }

    /// Linear interpolation of the field at `target`, clamped to the first /
    /// last sample outside the covered range.
    pub fn interpolated_value(&self, field: TrackField, target: DateTime<Utc>) -> Option<f64> {
        let series = self.field(field, FieldQuery::default());
        if series.is_empty() {
            return None;
        }
        if target <= series.timestamps[0] {
            return Some(series.values[0]);
        }
        let last = series.len() - 1;
        if target >= series.timestamps[last] {
            return Some(series.values[last]);
        }
        let upper = series.timestamps.partition_point(|ts| *ts <= target);
        let lower = upper - 1;
        let span =
            (series.timestamps[upper] - series.timestamps[lower]).num_milliseconds() as f64;
        if span <= 0.0 {
            return Some(series.values[lower]);
        }
        let fraction = (target - series.timestamps[lower]).num_milliseconds() as f64 / span;
        Some(series.values[lower] + (series.values[upper] - series.values[lower]) * fraction)
    }

    /// The sample nearest to `seconds_ago` before the newest entry, if one
    /// lies within `tolerance_s` of that instant.
    pub fn value_at(
        &self,
        field: TrackField,
        seconds_ago: f64,
        tolerance_s: f64,
    ) -> Option<f64> {
        let newest = self.last_timestamp()?;
        let target = newest - Duration::milliseconds((seconds_ago * 1000.0) as i64);
        let series = self.field(field, FieldQuery::default());

        let mut best: Option<(f64, f64)> = None;
        for (value, ts) in series.values.iter().zip(series.timestamps.iter()) {
            let offset = ((*ts - target).num_milliseconds() as f64 / 1000.0).abs();
            if offset <= tolerance_s && best.map(|(o, _)| offset < o).unwrap_or(true) {
                best = Some((offset, *value));
            }
        }
        best.map(|(_, value)| value)
    }
}

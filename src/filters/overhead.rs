//! Overhead-intercept detector.
//!
//! Predicts whether an aircraft's ground track will carry it over (or close
//! to) the observer, how long until the closest approach, and what altitude
//! it will have when it gets there.

use std::cmp::Ordering;

use anyhow::Result;
use chrono::Duration;
use serde::Serialize;
use tracing::debug;

use crate::aircraft::Aircraft;
use crate::airports::AirportIndex;
use crate::alerts::AlertBody;
use crate::config::{Config, Observer, OverheadConfig};
use crate::geometry;
use crate::pipeline::{Filter, Peers, TickContext};
use crate::snapshot::AircraftSnapshot;
use crate::squawks::SquawkTable;
use crate::trajectory::{
    FieldQuery, PositionsQuery, StabilityQuery, TrackField, TrajectoryStore,
};

/// Confidence multipliers applied when the trajectory disagrees with a
/// straight-line intercept assumption.
const UNSTABLE_TRACK_FACTOR: f64 = 0.7;
const DIVERGING_CROSS_TRACK_FACTOR: f64 = 0.6;
const INCONSISTENT_ALTITUDE_FACTOR: f64 = 0.8;

/// Result slot written by [`OverheadFilter::preprocess`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverheadAssessment {
    /// Sentinel: false until the gate passes.
    pub will_intersect: bool,
    /// Signed perpendicular miss distance, km (observer right of track
    /// positive).
    pub cross_track_km: f64,
    /// Along-track distance to the closest-approach point, km.
    pub along_track_km: f64,
    /// Seconds to the closest approach; positive when it lies ahead.
    pub overhead_seconds: f64,
    /// Whether the closest approach is in the future. By construction this
    /// always matches the cross-track `is_approaching` predicate.
    pub overhead_future: bool,
    /// Altitude projected at the closest approach, ft (>= 0).
    pub projected_altitude_ft: f64,
    /// Bearing from the observer to where the aircraft currently is, i.e.
    /// the direction it approaches from.
    pub approach_bearing_deg: f64,
    pub approach_cardinal: &'static str,
    /// Bearing from the observer to the closest-approach point
    /// (track ± 90° by the side the observer is on).
    pub closest_approach_bearing_deg: f64,
    pub slant_range_km: f64,
    pub vertical_angle_deg: f64,
    pub confidence: f64,
}

/// Pure intercept computation for one aircraft; `None` when the snapshot
/// lacks track/speed/altitude or an input is out of domain.
pub fn assess(
    observer: &Observer,
    snapshot: &AircraftSnapshot,
    distance_km: f64,
    config: &OverheadConfig,
) -> Option<OverheadAssessment> {
    let track = snapshot.track?;
    let gs = snapshot.gs?;
    let altitude_ft = snapshot.altitude_ft()?;
    if gs <= 0.0 {
        return None;
    }

    let ct = geometry::cross_track(
        observer.lat,
        observer.lon,
        snapshot.lat,
        snapshot.lon,
        track,
    )
    .ok()?;

    let speed_km_s = geometry::knots_to_km_per_min(gs).value / 60.0;
    let magnitude_s = ct.along_km / speed_km_s;
    let overhead_seconds = if ct.is_approaching {
        magnitude_s
    } else {
        -magnitude_s
    };

    // Project altitude to the closest-approach point; only meaningful when
    // the aircraft is actually coming this way.
    let baro_rate = snapshot.baro_rate.unwrap_or(0.0);
    let projected_altitude_ft = if ct.is_approaching {
        (f64::from(altitude_ft) + baro_rate / 60.0 * overhead_seconds).max(0.0)
    } else {
        f64::from(altitude_ft)
    };

    let approach_bearing_deg =
        geometry::bearing_deg(observer.lat, observer.lon, snapshot.lat, snapshot.lon).ok()?;
    let closest_approach_bearing_deg = if ct.cross_km > 0.0 {
        geometry::normalize_360(track - 90.0)
    } else {
        geometry::normalize_360(track + 90.0)
    };

    let relative_altitude_ft =
        f64::from(altitude_ft) - geometry::meters_to_feet(observer.alt_m).value;
    let slant_range_km = geometry::slant_range_km(distance_km, relative_altitude_ft);
    let vertical_angle_deg =
        geometry::vertical_angle(distance_km, relative_altitude_ft, observer.lat).ok()?;

    let will_intersect = ct.cross_km.abs() < config.radius_km
        && overhead_seconds.abs() < config.time_limit_s
        && projected_altitude_ft < config.altitude_limit_ft
        && distance_km < config.distance_limit_km;

    Some(OverheadAssessment {
        will_intersect,
        cross_track_km: ct.cross_km,
        along_track_km: ct.along_km,
        overhead_seconds,
        overhead_future: ct.is_approaching,
        projected_altitude_ft,
        approach_bearing_deg,
        approach_cardinal: geometry::bearing_to_cardinal(approach_bearing_deg),
        closest_approach_bearing_deg,
        slant_range_km,
        vertical_angle_deg,
        confidence: 1.0,
    })
}

/// Downgrade confidence using the trajectory: an intercept prediction is
/// only as good as the straight-line assumption behind it.
pub fn refine_confidence(
    assessment: &mut OverheadAssessment,
    observer: &Observer,
    trajectory: &TrajectoryStore,
) {
    if !trajectory.has_minimum_data(5, Some(Duration::minutes(3))) {
        return;
    }

    let track_stable = trajectory.is_field_stable(TrackField::Track, StabilityQuery {
        std_dev_threshold: 5.0,
        min_data_points: 5,
        time_window: Some(Duration::minutes(3)),
    });
    if !track_stable {
        assessment.confidence *= UNSTABLE_TRACK_FACTOR;
    }

    // Converging when the miss distance has been shrinking over the last
    // few positions, each re-evaluated against the current track.
    let positions = trajectory.positions(PositionsQuery {
        time_window: Some(Duration::minutes(3)),
        require_complete_data: true,
    });
    if positions.len() >= 5 {
        let recent = &positions[positions.len() - 5..];
        let misses: Vec<f64> = recent
            .iter()
            .filter_map(|p| {
                let track = p.track?;
                geometry::cross_track(observer.lat, observer.lon, p.lat, p.lon, track)
                    .ok()
                    .map(|ct| ct.cross_km.abs())
            })
            .collect();
        let converging = misses.len() >= 2 && misses.last() <= misses.first();
        if !converging {
            assessment.confidence *= DIVERGING_CROSS_TRACK_FACTOR;
        }
    }

    // An altitude trend that contradicts the reported vertical rate makes
    // the projected altitude suspect.
    if let Some(stats) = trajectory.stats(
        TrackField::Altitude,
        FieldQuery::window(Duration::minutes(3)).with_min(5),
    ) && let Some(observed_fpm) = stats.rate_of_change.map(|per_s| per_s * 60.0)
    {
        let last = trajectory.last_entry();
        let reported_fpm = last.and_then(|e| e.snapshot.baro_rate).unwrap_or(0.0);
        if reported_fpm.abs() > 100.0 && observed_fpm.signum() != reported_fpm.signum() {
            assessment.confidence *= INCONSISTENT_ALTITUDE_FACTOR;
        }
    }
}

/// Flags aircraft whose track will take them over the observer.
#[derive(Default)]
pub struct OverheadFilter {
    config: OverheadConfig,
    observer: Observer,
}

impl Filter for OverheadFilter {
    fn id(&self) -> &'static str {
        "overhead"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn configure(
        &mut self,
        config: &Config,
        _airports: &AirportIndex,
        _squawks: &SquawkTable,
    ) -> Result<()> {
        self.config = config.filters.overhead.clone();
        self.observer = config.observer;
        debug!(
            "overhead filter configured: radius {} km, altitude limit {} ft",
            self.config.radius_km, self.config.altitude_limit_ft
        );
        Ok(())
    }

    fn preprocess(
        &mut self,
        aircraft: &mut Aircraft,
        _peers: &Peers<'_>,
        ctx: &TickContext<'_>,
    ) -> Result<()> {
        aircraft.calculated.overhead = Some(OverheadAssessment::default());

        let Some(distance_km) = aircraft.calculated.distance_km else {
            return Ok(());
        };
        let Some(mut assessment) =
            assess(&self.observer, &aircraft.snapshot, distance_km, &self.config)
        else {
            return Ok(());
        };
        if self.config.refine_confidence
            && let Some(trajectory) = ctx.aircraft_data(&aircraft.hex)
        {
            refine_confidence(&mut assessment, &self.observer, trajectory);
        }
        aircraft.calculated.overhead = Some(assessment);
        Ok(())
    }

    fn evaluate(&self, aircraft: &Aircraft) -> bool {
        aircraft
            .calculated
            .overhead
            .as_ref()
            .map(|o| o.will_intersect)
            .unwrap_or(false)
    }

    fn sort(&self, a: &Aircraft, b: &Aircraft) -> Ordering {
        // Soonest intercept first.
        let seconds = |aircraft: &Aircraft| {
            aircraft
                .calculated
                .overhead
                .as_ref()
                .map(|o| o.overhead_seconds.abs())
                .unwrap_or(f64::MAX)
        };
        seconds(a)
            .partial_cmp(&seconds(b))
            .unwrap_or(Ordering::Equal)
    }

    fn stats(&self, _all: &[Aircraft], triggered: &[&Aircraft]) -> serde_json::Value {
        let future = triggered
            .iter()
            .filter(|a| {
                a.calculated
                    .overhead
                    .as_ref()
                    .map(|o| o.overhead_future)
                    .unwrap_or(false)
            })
            .count();
        serde_json::json!({
            "intercepting": triggered.len(),
            "approaching": future,
        })
    }

    fn format(&self, aircraft: &Aircraft) -> AlertBody {
        let assessment = aircraft
            .calculated
            .overhead
            .clone()
            .unwrap_or_default();
        let text = format!(
            "overhead in {:.0}s from {} at {:.0} ft (elev {:.0}°)",
            assessment.overhead_seconds,
            assessment.approach_cardinal,
            assessment.projected_altitude_ft,
            assessment.vertical_angle_deg,
        );
        AlertBody {
            text,
            warn: false,
            payload: serde_json::to_value(&assessment).unwrap_or(serde_json::Value::Null),
        }
    }

    fn debug(&self, kind: &str, aircraft: &Aircraft) -> Option<String> {
        if kind != "sort" {
            return None;
        }
        aircraft.calculated.overhead.as_ref().map(|o| {
            format!(
                "{}: cross {:.2} km, {:.0}s, conf {:.2}",
                aircraft.hex, o.cross_track_km, o.overhead_seconds, o.confidence
            )
        })
    }
}

//! Loitering detector.
//!
//! A four-stage pipeline: cheap gates first (altitude, speed, history
//! depth, category), then a bounding-box check over the last few minutes of
//! positions, then pattern detection (circling, course reversals, hovering),
//! and finally a weighted score that has to clear a threshold before the
//! aircraft is reported as loitering.

use std::cmp::Ordering;

use anyhow::Result;
use chrono::Duration;
use serde::Serialize;
use tracing::debug;

use crate::aircraft::Aircraft;
use crate::airports::AirportIndex;
use crate::alerts::AlertBody;
use crate::config::{Config, LoiteringConfig};
use crate::geometry::{self, BoundingBox};
use crate::pipeline::{Filter, Peers, TickContext};
use crate::squawks::SquawkTable;
use crate::trajectory::{PositionSample, PositionsQuery, TrajectoryStore};

/// Categories that never loiter in a way worth reporting (airliners,
/// heavies, space vehicles, surface service trucks).
const EXCLUDED_CATEGORIES: &[&str] = &["A4", "A5", "B7", "C2"];

/// Categories whose loitering is especially notable (rotorcraft, gliders,
/// UAVs, surface emergency vehicles).
const BONUS_CATEGORIES: &[&str] = &["A7", "B1", "B6", "C1"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoiterPattern {
    Circling,
    Reversing,
    Hovering,
}

impl std::fmt::Display for LoiterPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoiterPattern::Circling => write!(f, "circling"),
            LoiterPattern::Reversing => write!(f, "reversing"),
            LoiterPattern::Hovering => write!(f, "hovering"),
        }
    }
}

/// The weighted components behind a loitering score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub bbox: f64,
    pub pattern: f64,
    pub altitude_consistency: f64,
    pub category_bonus: f64,
}

/// Result slot written by [`LoiteringFilter::preprocess`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoiteringAssessment {
    /// Sentinel: false until the score clears the threshold.
    pub is_loitering: bool,
    pub pattern: Option<LoiterPattern>,
    pub center: Option<(f64, f64)>,
    pub radius_km: f64,
    pub duration_min: f64,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

/// Total great-circle length of the position polyline, km.
fn polyline_km(positions: &[PositionSample]) -> f64 {
    positions
        .windows(2)
        .filter_map(|w| {
            geometry::distance_km(w[0].lat, w[0].lon, w[1].lat, w[1].lon).ok()
        })
        .sum()
}

/// Signed heading changes between consecutive samples, degrees.
fn heading_changes(positions: &[PositionSample]) -> Vec<f64> {
    positions
        .windows(2)
        .filter_map(|w| {
            let (a, b) = (w[0].track?, w[1].track?);
            Some(geometry::wrap_180(b - a))
        })
        .collect()
}

/// Detect the strongest loiter pattern in the window, if any.
fn detect_pattern(
    positions: &[PositionSample],
    is_rotorcraft: bool,
    footprint_km: f64,
) -> Option<(LoiterPattern, f64)> {
    let changes = heading_changes(positions);
    let mut best: Option<(LoiterPattern, f64)> = None;
    let mut consider = |pattern: LoiterPattern, confidence: f64| {
        if best.map(|(_, c)| confidence > c).unwrap_or(true) {
            best = Some((pattern, confidence));
        }
    };

    // Circling: repeated significant turns accumulating past 1.5 circles.
    let significant = changes.iter().filter(|c| c.abs() > 30.0).count();
    let total_turn: f64 = changes.iter().sum::<f64>().abs();
    if significant >= 3 && total_turn >= 540.0 {
        consider(LoiterPattern::Circling, (total_turn / 720.0).min(1.0));
    }

    // Reversing: at least two near-about-turns.
    let reversals = changes.iter().filter(|c| c.abs() > 150.0).count();
    if reversals >= 2 {
        consider(LoiterPattern::Reversing, (reversals as f64 / 3.0).min(1.0));
    }

    // Hovering is a rotorcraft-only call: tight footprint, low and steady
    // speed.
    if is_rotorcraft {
        let speeds: Vec<f64> = positions.iter().filter_map(|p| p.gs).collect();
        if !speeds.is_empty() {
            let min = speeds.iter().copied().fold(f64::INFINITY, f64::min);
            let max = speeds.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let avg = speeds.iter().sum::<f64>() / speeds.len() as f64;
            if max - min <= 30.0 && footprint_km <= 0.5 && avg < 50.0 {
                consider(LoiterPattern::Hovering, 0.9);
            }
        }
    }
    best
}

/// Run the full loitering pipeline for one aircraft.
pub fn assess(
    aircraft: &Aircraft,
    trajectory: &TrajectoryStore,
    config: &LoiteringConfig,
) -> LoiteringAssessment {
    let not_detected = LoiteringAssessment::default();

    // Stage 1: quick gates.
    let Some(altitude) = aircraft.calculated.altitude_ft else {
        return not_detected;
    };
    if altitude > config.max_altitude_ft {
        return not_detected;
    }
    let Some(gs) = aircraft.snapshot.gs else {
        return not_detected;
    };
    if !(config.min_gs_kt..=config.max_gs_kt).contains(&gs) {
        return not_detected;
    }
    let category = aircraft.snapshot.category.map(|c| c.as_str());
    if category.map(|c| EXCLUDED_CATEGORIES.contains(&c)).unwrap_or(false) {
        return not_detected;
    }
    if trajectory.len() < config.min_entries {
        return not_detected;
    }

    // Stage 2: bounding box over the analysis window.
    let positions = trajectory.positions(PositionsQuery {
        time_window: Some(Duration::minutes(config.window_min)),
        require_complete_data: false,
    });
    if positions.len() < config.min_entries {
        return not_detected;
    }
    let points: Vec<(f64, f64)> = positions.iter().map(|p| (p.lat, p.lon)).collect();
    let Some(bbox) = BoundingBox::from_points(points.iter()) else {
        return not_detected;
    };
    let diagonal_km = bbox.diagonal_km();
    if !(config.min_diagonal_km..=config.max_diagonal_km).contains(&diagonal_km) {
        return not_detected;
    }
    if polyline_km(&positions) < config.min_path_km {
        return not_detected;
    }

    let center = bbox.center();
    let radius_km = points
        .iter()
        .filter_map(|(lat, lon)| geometry::distance_km(center.0, center.1, *lat, *lon).ok())
        .sum::<f64>()
        / points.len() as f64;

    let duration_min = (positions.last().unwrap().timestamp
        - positions.first().unwrap().timestamp)
        .num_seconds() as f64
        / 60.0;

    // Stage 3: pattern detection.
    let is_rotorcraft = aircraft
        .snapshot
        .category
        .map(|c| c.is_rotorcraft())
        .unwrap_or(false);
    let pattern = detect_pattern(&positions, is_rotorcraft, diagonal_km);

    // Stage 4: weighted score.
    let expected_km = duration_min.max(1.0) * config.expected_travel_km_per_min;
    let bbox_score = (1.0 - diagonal_km / expected_km).max(0.0);

    let altitudes: Vec<f64> = positions
        .iter()
        .filter_map(|p| p.altitude.map(f64::from))
        .collect();
    let altitude_consistency = if altitudes.is_empty() {
        0.0
    } else {
        let min = altitudes.iter().copied().fold(f64::INFINITY, f64::min);
        let max = altitudes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (1.0 - (max - min) / config.altitude_spread_ft).max(0.0)
    };

    let category_bonus = if category.map(|c| BONUS_CATEGORIES.contains(&c)).unwrap_or(false) {
        1.0
    } else {
        0.0
    };
    let pattern_confidence = pattern.map(|(_, c)| c).unwrap_or(0.0);

    let breakdown = ScoreBreakdown {
        bbox: bbox_score,
        pattern: pattern_confidence,
        altitude_consistency,
        category_bonus,
    };
    let score = bbox_score * 0.3
        + pattern_confidence * 0.4
        + altitude_consistency * 0.2
        + category_bonus * 0.1;

    LoiteringAssessment {
        is_loitering: score >= config.score_threshold,
        pattern: pattern.map(|(p, _)| p),
        center: Some(center),
        radius_km,
        duration_min,
        score,
        breakdown,
    }
}

/// Flags aircraft orbiting, reversing, or hovering over one spot.
#[derive(Default)]
pub struct LoiteringFilter {
    config: LoiteringConfig,
}

impl Filter for LoiteringFilter {
    fn id(&self) -> &'static str {
        "loitering"
    }

    fn priority(&self) -> i32 {
        50
    }

    fn configure(
        &mut self,
        config: &Config,
        _airports: &AirportIndex,
        _squawks: &SquawkTable,
    ) -> Result<()> {
        self.config = config.filters.loitering.clone();
        debug!(
            "loitering filter configured: window {} min, threshold {}",
            self.config.window_min, self.config.score_threshold
        );
        Ok(())
    }

    fn preprocess(
        &mut self,
        aircraft: &mut Aircraft,
        _peers: &Peers<'_>,
        ctx: &TickContext<'_>,
    ) -> Result<()> {
        aircraft.calculated.loitering = Some(LoiteringAssessment::default());
        if let Some(trajectory) = ctx.aircraft_data(&aircraft.hex) {
            aircraft.calculated.loitering = Some(assess(aircraft, trajectory, &self.config));
        }
        Ok(())
    }

    fn evaluate(&self, aircraft: &Aircraft) -> bool {
        aircraft
            .calculated
            .loitering
            .as_ref()
            .map(|l| l.is_loitering)
            .unwrap_or(false)
    }

    fn sort(&self, a: &Aircraft, b: &Aircraft) -> Ordering {
        let score = |x: &Aircraft| {
            x.calculated
                .loitering
                .as_ref()
                .map(|l| l.score)
                .unwrap_or(0.0)
        };
        score(b).partial_cmp(&score(a)).unwrap_or(Ordering::Equal)
    }

    fn stats(&self, _all: &[Aircraft], triggered: &[&Aircraft]) -> serde_json::Value {
        let mut circling = 0usize;
        let mut reversing = 0usize;
        let mut hovering = 0usize;
        for aircraft in triggered {
            match aircraft.calculated.loitering.as_ref().and_then(|l| l.pattern) {
                Some(LoiterPattern::Circling) => circling += 1,
                Some(LoiterPattern::Reversing) => reversing += 1,
                Some(LoiterPattern::Hovering) => hovering += 1,
                None => {}
            }
        }
        serde_json::json!({
            "loitering": triggered.len(),
            "circling": circling,
            "reversing": reversing,
            "hovering": hovering,
        })
    }

    fn format(&self, aircraft: &Aircraft) -> AlertBody {
        let assessment = aircraft.calculated.loitering.clone().unwrap_or_default();
        let pattern = assessment
            .pattern
            .map(|p| p.to_string())
            .unwrap_or_else(|| "unpatterned".to_string());
        let text = format!(
            "loitering ({}) for {:.0} min within {:.1} km, score {:.2}",
            pattern, assessment.duration_min, assessment.radius_km, assessment.score
        );
        AlertBody {
            text,
            warn: false,
            payload: serde_json::to_value(&assessment).unwrap_or(serde_json::Value::Null),
        }
    }
}

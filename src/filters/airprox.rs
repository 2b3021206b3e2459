//! Airprox detector.
//!
//! For each airborne aircraft, finds the closest credible traffic inside a
//! bounding box, computes the pair's separation and closure geometry, and
//! scores the encounter into an ICAO-inspired risk category. Aircraft
//! already flagged near an airport are skipped (deliberate terminal-area
//! compression is not an airprox) unless a TCAS alert overrides that.

use std::cmp::Ordering;

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use crate::aircraft::Aircraft;
use crate::airports::AirportIndex;
use crate::alerts::AlertBody;
use crate::config::{AirproxConfig, Config};
use crate::geometry::{self, BoundingBox, EncounterClass};
use crate::pipeline::{Filter, Peers, TickContext};
use crate::snapshot::AircraftSnapshot;
use crate::squawks::SquawkTable;

/// Base risk thresholds: (horizontal nm, vertical ft) per category.
const CATEGORY_THRESHOLDS: [(RiskCategory, f64, f64); 4] = [
    (RiskCategory::A, 0.25, 500.0),
    (RiskCategory::B, 0.50, 500.0),
    (RiskCategory::C, 1.00, 1000.0),
    (RiskCategory::D, 5.00, 2000.0),
];

/// Horizontal reach of the candidate search, nm. Matches the widest
/// category threshold so category assignment always has the data it needs.
const SEARCH_RADIUS_NM: f64 = 5.0;

/// ICAO-style airprox risk category, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RiskCategory {
    A,
    B,
    C,
    D,
}

impl RiskCategory {
    fn base_score(&self) -> f64 {
        match self {
            RiskCategory::A => 4.0,
            RiskCategory::B => 3.0,
            RiskCategory::C => 2.0,
            RiskCategory::D => 1.0,
        }
    }
}

impl std::fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskCategory::A => write!(f, "A"),
            RiskCategory::B => write!(f, "B"),
            RiskCategory::C => write!(f, "C"),
            RiskCategory::D => write!(f, "D"),
        }
    }
}

/// Result slot written by [`AirproxFilter::preprocess`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AirproxAssessment {
    /// Sentinel: false until a pair inside the alert thresholds is found.
    pub is_airprox: bool,
    pub other_hex: Option<String>,
    pub other_flight: Option<String>,
    pub horizontal_nm: f64,
    pub vertical_ft: f64,
    /// Positive when the pair is closing.
    pub closure_kt: f64,
    pub time_to_cpa_s: Option<f64>,
    pub is_converging: bool,
    pub category: Option<RiskCategory>,
    pub risk_score: f64,
    pub confidence: f64,
    pub classification: Option<EncounterClass>,
}

/// Assign the base category from raw separation, if within any threshold.
pub fn base_category(horizontal_nm: f64, vertical_ft: f64) -> Option<RiskCategory> {
    CATEGORY_THRESHOLDS
        .iter()
        .find(|(_, h, v)| horizontal_nm <= *h && vertical_ft <= *v)
        .map(|(category, _, _)| *category)
}

/// Map a modified risk score back onto a category.
fn score_category(score: f64) -> RiskCategory {
    if score >= 3.5 {
        RiskCategory::A
    } else if score >= 2.5 {
        RiskCategory::B
    } else if score >= 1.5 {
        RiskCategory::C
    } else {
        RiskCategory::D
    }
}

/// Likely formation flight: matched track, altitude, and speed. Formations
/// are deliberate and suppressed unless TCAS disagrees.
fn likely_formation(a: &AircraftSnapshot, b: &AircraftSnapshot, config: &AirproxConfig) -> bool {
    let tracks_match = match (a.track, b.track) {
        (Some(ta), Some(tb)) => {
            geometry::angular_difference(ta, tb) <= config.formation_track_deg
        }
        _ => false,
    };
    let altitudes_match = match (a.altitude_ft(), b.altitude_ft()) {
        (Some(aa), Some(ab)) => (aa - ab).abs() as f64 <= config.formation_alt_ft,
        _ => false,
    };
    let speeds_match = match (a.gs, b.gs) {
        (Some(ga), Some(gb)) => (ga - gb).abs() <= config.formation_gs_kt,
        _ => false,
    };
    tracks_match && altitudes_match && speeds_match
}

/// Position/altitude reliability of one snapshot, in (0, 1].
fn data_reliability(snapshot: &AircraftSnapshot) -> f64 {
    let mut reliability = 1.0;
    if snapshot.seen_pos.map(|age| age > 5.0).unwrap_or(true) {
        reliability *= 0.85;
    }
    if snapshot.alt_baro.is_none() {
        reliability *= 0.9;
    }
    reliability
}

/// Score one candidate pair. Returns `None` when geometry cannot be
/// computed (missing kinematics on either side).
pub fn assess_pair(
    subject: &Aircraft,
    candidate: &AircraftSnapshot,
    config: &AirproxConfig,
) -> Option<AirproxAssessment> {
    let s = &subject.snapshot;
    let subject_alt = s.altitude_ft()?;
    let candidate_alt = candidate.altitude_ft()?;

    let distance_km =
        geometry::distance_km(s.lat, s.lon, candidate.lat, candidate.lon).ok()?;
    let horizontal_nm = geometry::km_to_nm(distance_km).value;
    let vertical_ft = f64::from((subject_alt - candidate_alt).abs());

    let bearing = geometry::bearing_deg(s.lat, s.lon, candidate.lat, candidate.lon).ok()?;
    let closure = geometry::closure_geometry(
        s.track?,
        s.gs?,
        candidate.track?,
        candidate.gs?,
        bearing,
        distance_km,
    )
    .ok()?;

    let base = base_category(horizontal_nm, vertical_ft);
    let mut risk_score = base.map(|c| c.base_score()).unwrap_or(0.0);
    if base.is_some() {
        if closure.closure_velocity_kt > config.high_closure_kt {
            risk_score *= 1.5;
        }
        if subject_alt < 2000 || candidate_alt < 2000 {
            risk_score *= 1.3;
        }
        let subject_heavy = s.category.map(|c| c.is_heavy()).unwrap_or(false);
        let candidate_heavy = candidate.category.map(|c| c.is_heavy()).unwrap_or(false);
        let subject_light = s.category.map(|c| c.is_light()).unwrap_or(false);
        let candidate_light = candidate.category.map(|c| c.is_light()).unwrap_or(false);
        // Wake concern: a light aircraft running up behind a heavy.
        let wake_pair = (candidate_heavy
            && subject_light
            && s.track
                .map(|t| geometry::angular_difference(bearing, t) < 45.0)
                .unwrap_or(false))
            || (subject_heavy && candidate_light);
        if wake_pair {
            risk_score *= 1.4;
        }
        let maneuvering = s.track_rate.map(|r| r.abs() > 3.0).unwrap_or(false)
            || candidate.track_rate.map(|r| r.abs() > 3.0).unwrap_or(false);
        if maneuvering {
            risk_score *= 1.2;
        }
        let tcas = s.alert.max(candidate.alert);
        match tcas {
            crate::snapshot::TcasAlert::Advisory => risk_score *= 1.2,
            crate::snapshot::TcasAlert::Resolution => risk_score *= 1.5,
            crate::snapshot::TcasAlert::None => {}
        }
    }

    let category = base.map(|_| score_category(risk_score));
    let confidence = data_reliability(s) * data_reliability(candidate);

    let is_airprox =
        horizontal_nm <= config.horizontal_nm && vertical_ft <= config.vertical_ft;

    Some(AirproxAssessment {
        is_airprox,
        other_hex: Some(candidate.hex.clone()),
        other_flight: candidate.callsign().map(str::to_string),
        horizontal_nm,
        vertical_ft,
        closure_kt: closure.closure_velocity_kt,
        time_to_cpa_s: closure.time_to_closest_approach_s,
        is_converging: closure
            .time_to_closest_approach_s
            .map(|t| t > 0.0 && closure.closure_velocity_kt > 0.0)
            .unwrap_or(false),
        category,
        risk_score,
        confidence,
        classification: Some(closure.classification),
    })
}

/// Flags pairs of aircraft below separation minima.
#[derive(Default)]
pub struct AirproxFilter {
    config: AirproxConfig,
}

impl AirproxFilter {
    /// Whether a peer is a credible conflict candidate for `subject`.
    fn candidate_ok(
        &self,
        subject: &Aircraft,
        peer: &Aircraft,
        bbox: &BoundingBox,
        tcas_override: bool,
    ) -> bool {
        let p = &peer.snapshot;
        if !bbox.contains(p.lat, p.lon) {
            return false;
        }
        if p.altitude_ft().is_none() {
            return false;
        }
        if p.position_stale(self.config.stale_position_s) && !tcas_override {
            return false;
        }
        if self.config.formation_filter
            && !tcas_override
            && likely_formation(&subject.snapshot, p, &self.config)
        {
            return false;
        }
        true
    }
}

impl Filter for AirproxFilter {
    fn id(&self) -> &'static str {
        "airprox"
    }

    fn priority(&self) -> i32 {
        // After the airport filter: terminal-area traffic is exempt.
        40
    }

    fn configure(
        &mut self,
        config: &Config,
        _airports: &AirportIndex,
        _squawks: &SquawkTable,
    ) -> Result<()> {
        self.config = config.filters.airprox.clone();
        debug!(
            "airprox filter configured: {} nm / {} ft, high closure {} kt",
            self.config.horizontal_nm, self.config.vertical_ft, self.config.high_closure_kt
        );
        Ok(())
    }

    fn preprocess(
        &mut self,
        aircraft: &mut Aircraft,
        peers: &Peers<'_>,
        _ctx: &TickContext<'_>,
    ) -> Result<()> {
        aircraft.calculated.airprox = Some(AirproxAssessment::default());

        let tcas_override = aircraft.snapshot.alert.is_active();
        if aircraft.near_airport() && !tcas_override {
            return Ok(());
        }
        if aircraft.snapshot.altitude_ft().is_none() {
            return Ok(());
        }
        if aircraft.snapshot.position_stale(self.config.stale_position_s) && !tcas_override {
            return Ok(());
        }

        let s = &aircraft.snapshot;
        let bbox = BoundingBox::around(
            s.lat,
            s.lon,
            geometry::nm_to_km(SEARCH_RADIUS_NM).value,
        );

        // Closest credible candidate by horizontal distance.
        let mut closest: Option<(f64, &Aircraft)> = None;
        for peer in peers.iter() {
            if peer.hex == aircraft.hex
                || !self.candidate_ok(aircraft, peer, &bbox, tcas_override)
            {
                continue;
            }
            let Ok(distance) = geometry::distance_km(
                s.lat,
                s.lon,
                peer.snapshot.lat,
                peer.snapshot.lon,
            ) else {
                continue;
            };
            if closest.map(|(d, _)| distance < d).unwrap_or(true) {
                closest = Some((distance, peer));
            }
        }

        if let Some((_, peer)) = closest
            && let Some(assessment) = assess_pair(aircraft, &peer.snapshot, &self.config)
        {
            aircraft.calculated.airprox = Some(assessment);
        }
        Ok(())
    }

    fn evaluate(&self, aircraft: &Aircraft) -> bool {
        aircraft
            .calculated
            .airprox
            .as_ref()
            .map(|a| a.is_airprox)
            .unwrap_or(false)
    }

    fn sort(&self, a: &Aircraft, b: &Aircraft) -> Ordering {
        let key = |x: &Aircraft| {
            x.calculated
                .airprox
                .clone()
                .unwrap_or_default()
        };
        let (ka, kb) = (key(a), key(b));
        let category = |k: &AirproxAssessment| k.category.unwrap_or(RiskCategory::D);
        category(&ka)
            .cmp(&category(&kb))
            .then_with(|| {
                kb.risk_score
                    .partial_cmp(&ka.risk_score)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| {
                ka.horizontal_nm
                    .partial_cmp(&kb.horizontal_nm)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| {
                ka.vertical_ft
                    .partial_cmp(&kb.vertical_ft)
                    .unwrap_or(Ordering::Equal)
            })
    }

    fn stats(&self, _all: &[Aircraft], triggered: &[&Aircraft]) -> serde_json::Value {
        let mut by_category = [0usize; 4];
        for aircraft in triggered {
            if let Some(category) =
                aircraft.calculated.airprox.as_ref().and_then(|a| a.category)
            {
                by_category[category as usize] += 1;
            }
        }
        serde_json::json!({
            "airprox": triggered.len(),
            "category": {
                "A": by_category[0],
                "B": by_category[1],
                "C": by_category[2],
                "D": by_category[3],
            },
        })
    }

    fn format(&self, aircraft: &Aircraft) -> AlertBody {
        let assessment = aircraft.calculated.airprox.clone().unwrap_or_default();
        let other = assessment
            .other_flight
            .clone()
            .or_else(|| assessment.other_hex.clone())
            .unwrap_or_else(|| "unknown".to_string());
        let category = assessment
            .category
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        let text = format!(
            "airprox cat {} with {}: {:.2} nm / {:.0} ft, closing {:.0} kt",
            category, other, assessment.horizontal_nm, assessment.vertical_ft,
            assessment.closure_kt
        );
        AlertBody {
            text,
            warn: matches!(assessment.category, Some(RiskCategory::A | RiskCategory::B)),
            payload: serde_json::to_value(&assessment).unwrap_or(serde_json::Value::Null),
        }
    }
}

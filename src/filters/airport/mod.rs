//! Airport-proximity and runway-phase filter.
//!
//! For each aircraft, queries the airport index twice (an ATZ-sized radius
//! for plain "near an airport" detection, then a wider category-dependent
//! radius for runway alignment work) and builds an enhanced record per
//! candidate airport: alignment, flight phase (with the specific detectors
//! taking precedence over the base rules), wake separation, and a combined
//! relevance score. Postprocess runs the per-airport traffic analysis for
//! the configured priority airports.

pub mod alignment;
pub mod analysis;
pub mod phases;

use std::cmp::Ordering;
use std::collections::HashMap;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use crate::aircraft::Aircraft;
use crate::airports::{Airport, AirportIndex, AirportType, NearbyQuery};
use crate::alerts::AlertBody;
use crate::config::{AirportsConfig, Config};
use crate::geometry;
use crate::pipeline::{Filter, Peers, TickContext};
use crate::snapshot::{AircraftSnapshot, Category};
use crate::squawks::{SquawkKind, SquawkTable};

pub use alignment::RunwayAlignment;
pub use analysis::{AirportAnalysis, AnalysisHistory, Insight};
pub use phases::{ApproachType, FlightPhase};

/// Distance at which the distance component of relevance reaches zero, km.
const RELEVANCE_DISTANCE_KM: f64 = 10.0;

/// Minimum relevance for an out-of-ATZ airport to still trigger the filter.
const RELEVANCE_TRIGGER: f64 = 0.6;

/// Wake-separation check for an aircraft trailing another on approach.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WakeSeparationCheck {
    pub leader_hex: String,
    pub separation_nm: f64,
    pub required_nm: f64,
    pub adequate: bool,
}

/// One candidate airport enriched with everything the filter derived.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnhancedAirport {
    pub icao: String,
    pub name: String,
    pub distance_km: f64,
    pub phase: Option<FlightPhase>,
    pub phase_confidence: f64,
    pub aligned_runway: Option<RunwayAlignment>,
    pub go_around: Option<phases::GoAroundDetection>,
    pub missed_approach: Option<phases::MissedApproachDetection>,
    pub holding: Option<phases::HoldingDetection>,
    pub pattern: Option<phases::PatternDetection>,
    pub overhead_join: Option<phases::OverheadJoinDetection>,
    pub touch_and_go: Option<phases::TouchAndGoDetection>,
    pub weather_avoidance: Option<phases::WeatherAvoidanceDetection>,
    pub wake_separation: Option<WakeSeparationCheck>,
    pub approach_type: Option<ApproachType>,
    /// Combined relevance of this airport to this aircraft, [0, 1].
    pub relevance_score: f64,
}

/// Result slot written by [`AirportFilter::preprocess`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AirportsAssessment {
    /// Sentinel: true when any airport lies within the ATZ radius.
    pub airports_nearby: bool,
    /// Candidate airports, most relevant first.
    pub nearby: Vec<EnhancedAirport>,
}

/// How suitable an airport type is for an aircraft category, [0, 1];
/// `None` means incompatible and the airport is discarded.
fn size_compatibility(
    category: Option<Category>,
    airport_type: AirportType,
    dense_area: bool,
) -> Option<f64> {
    use AirportType::*;
    let Some(category) = category else {
        return match airport_type {
            Closed => None,
            _ => Some(0.7),
        };
    };
    if category.is_surface_vehicle() {
        return None;
    }
    let score = match (category.as_str(), airport_type) {
        (_, Closed) => return None,
        ("A7", Heliport) => 1.0,
        ("A7", SmallAirport) => 0.8,
        ("A7", MediumAirport) => 0.6,
        ("A7", LargeAirport) => 0.5,
        (_, Heliport) => return None,
        ("A1", SmallAirport) => 1.0,
        ("A1", MediumAirport) => 0.8,
        ("A1", LargeAirport) => {
            if dense_area {
                return None;
            }
            0.4
        }
        ("A2", SmallAirport) => 0.9,
        ("A2", MediumAirport) => 1.0,
        ("A2", LargeAirport) => 0.8,
        ("A3" | "A4", SmallAirport) => 0.3,
        ("A3" | "A4", _) => 1.0,
        ("A5", SmallAirport) => return None,
        ("A5", MediumAirport) => 0.7,
        ("A5", LargeAirport) => 1.0,
        ("B1", SmallAirport) => 1.0,
        ("B1", MediumAirport) => 0.5,
        ("B1", LargeAirport) => return None,
        ("B6", _) => 0.5,
        _ => 0.7,
    };
    Some(score)
}

/// Whether the squawk carries an airport-service allocation (approach,
/// tower, radar), which slightly boosts relevance.
fn airport_associated_squawk(aircraft: &Aircraft) -> bool {
    aircraft
        .calculated
        .squawk
        .as_ref()
        .map(|s| {
            s.matches.iter().any(|m| {
                matches!(
                    m.kind,
                    SquawkKind::Approach | SquawkKind::Tower | SquawkKind::Radar
                )
            })
        })
        .unwrap_or(false)
}

/// Relevance of one airport to one aircraft: distance, alignment, phase
/// confidence and size compatibility, with small situational bonuses.
fn relevance_score(
    distance_km: f64,
    alignment: Option<&RunwayAlignment>,
    phase_confidence: f64,
    size_compat: f64,
    snapshot: &AircraftSnapshot,
    altitude_ft: Option<i32>,
    squawk_bonus: bool,
) -> f64 {
    let distance_factor = (1.0 - distance_km / RELEVANCE_DISTANCE_KM).max(0.0);
    let alignment_factor = alignment.map(|a| a.alignment_score).unwrap_or(0.0);

    let mut score = distance_factor * 0.30
        + alignment_factor * 0.30
        + phase_confidence * 0.20
        + size_compat * 0.20;

    if snapshot.gs.map(|gs| (40.0..250.0).contains(&gs)).unwrap_or(false) {
        score += 0.05;
    }
    if altitude_ft.map(|alt| alt < 3000).unwrap_or(false) {
        score += 0.05;
    }
    if squawk_bonus {
        score += 0.10;
    }
    score.min(1.0)
}

/// Required in-trail wake separation behind a leader of the given
/// category, nm.
fn required_wake_separation_nm(leader: Option<Category>) -> f64 {
    match leader.map(|c| c.as_str()) {
        Some("A5") => 5.0,
        Some("A4") => 4.0,
        _ => 3.0,
    }
}

/// Flags aircraft operating at or around airports and classifies their
/// phase of flight.
pub struct AirportFilter {
    config: AirportsConfig,
    history: AnalysisHistory,
    latest_analyses: HashMap<String, AirportAnalysis>,
}

impl Default for AirportFilter {
    fn default() -> Self {
        Self {
            config: AirportsConfig::default(),
            history: AnalysisHistory::new(20),
            latest_analyses: HashMap::new(),
        }
    }
}

impl AirportFilter {
    /// The most recent analysis for a priority airport, if any.
    pub fn analysis(&self, icao: &str) -> Option<&AirportAnalysis> {
        self.latest_analyses.get(icao)
    }

    /// Wake-separation check against peers converging on the same runway.
    fn check_wake_separation(
        &self,
        aircraft: &Aircraft,
        airport: &Airport,
        runway: &str,
        distance_to_airport_km: f64,
        peers: &Peers<'_>,
    ) -> Option<WakeSeparationCheck> {
        let s = &aircraft.snapshot;
        let mut nearest: Option<(f64, &Aircraft)> = None;
        for peer in peers.iter() {
            let p = &peer.snapshot;
            if p.altitude_ft().map(|a| a > 4000).unwrap_or(true) {
                continue;
            }
            if p.baro_rate.map(|r| r > -200.0).unwrap_or(true) {
                continue;
            }
            let Ok(peer_to_airport) = geometry::distance_km(
                p.lat,
                p.lon,
                airport.latitude_deg,
                airport.longitude_deg,
            ) else {
                continue;
            };
            // The leader is the one closer in.
            if peer_to_airport >= distance_to_airport_km {
                continue;
            }
            let aligned = alignment::score_alignment(p, airport, None)
                .map(|a| a.runway_name == runway)
                .unwrap_or(false);
            if !aligned {
                continue;
            }
            let Ok(separation_km) = geometry::distance_km(s.lat, s.lon, p.lat, p.lon) else {
                continue;
            };
            if nearest.map(|(d, _)| separation_km < d).unwrap_or(true) {
                nearest = Some((separation_km, peer));
            }
        }

        let (separation_km, leader) = nearest?;
        let separation_nm = geometry::km_to_nm(separation_km).value;
        let required_nm = required_wake_separation_nm(leader.snapshot.category);
        Some(WakeSeparationCheck {
            leader_hex: leader.hex.clone(),
            separation_nm,
            required_nm,
            adequate: separation_nm >= required_nm,
        })
    }

    /// Build the enhanced record for one candidate airport.
    fn enhance(
        &self,
        aircraft: &Aircraft,
        airport: &Airport,
        distance_km: f64,
        size_compat: f64,
        peers: &Peers<'_>,
        ctx: &TickContext<'_>,
    ) -> EnhancedAirport {
        let snapshot = &aircraft.snapshot;
        let altitude_ft = aircraft.calculated.altitude_ft;
        let trajectory = ctx.aircraft_data(&aircraft.hex);

        let aligned_runway = alignment::score_alignment(snapshot, airport, trajectory);

        let mut go_around = None;
        let mut missed_approach = None;
        let mut holding = None;
        let mut pattern = None;
        let mut overhead_join = None;
        let mut touch_and_go = None;
        let mut weather_avoidance = None;

        if let Some(trajectory) = trajectory {
            let low = altitude_ft.map(|a| a < 3000).unwrap_or(false);
            if distance_km < 10.0 && low {
                go_around = phases::detect_go_around(snapshot, trajectory);
            }
            missed_approach =
                phases::detect_missed_approach(snapshot, airport, distance_km, trajectory);
            touch_and_go =
                phases::detect_touch_and_go(snapshot, airport, distance_km, trajectory);
            holding = phases::detect_holding(trajectory);
            if airport.airport_type != AirportType::LargeAirport {
                pattern = phases::detect_pattern(airport, distance_km, trajectory);
                overhead_join =
                    phases::detect_overhead_join(snapshot, airport, distance_km);
            }
            weather_avoidance =
                phases::detect_weather_avoidance(snapshot, distance_km, trajectory);
        }

        // Specific detectors outrank the base rules.
        let (phase, phase_confidence) = if let Some(d) = &go_around {
            (Some(FlightPhase::GoAround), d.confidence)
        } else if let Some(d) = &missed_approach {
            (Some(FlightPhase::MissedApproach), d.confidence)
        } else if let Some(d) = &touch_and_go {
            (Some(FlightPhase::TouchAndGo), d.confidence)
        } else if let Some(d) = &holding {
            (Some(FlightPhase::Holding), d.confidence)
        } else if let Some(d) = &pattern {
            (Some(FlightPhase::Pattern), d.confidence)
        } else if let Some(d) = &overhead_join {
            (Some(FlightPhase::OverheadJoin), d.confidence)
        } else if let Some(d) = &weather_avoidance {
            (Some(FlightPhase::WeatherAvoidance), d.confidence)
        } else {
            match phases::base_phase(snapshot, altitude_ft) {
                Some((phase, confidence)) => (Some(phase), confidence),
                None => (None, 0.0),
            }
        };

        let approach_type = (phase == Some(FlightPhase::Approaching)).then(|| {
            phases::classify_approach(
                snapshot,
                aligned_runway.as_ref().map(|a| a.alignment_score),
            )
        });

        let wake_separation = match (&phase, &aligned_runway) {
            (Some(FlightPhase::Approaching), Some(alignment)) => self.check_wake_separation(
                aircraft,
                airport,
                &alignment.runway_name,
                distance_km,
                peers,
            ),
            _ => None,
        };

        let relevance = relevance_score(
            distance_km,
            aligned_runway.as_ref(),
            phase_confidence,
            size_compat,
            snapshot,
            altitude_ft,
            airport_associated_squawk(aircraft),
        );

        EnhancedAirport {
            icao: airport.icao_code.clone(),
            name: airport.name.clone(),
            distance_km,
            phase,
            phase_confidence,
            aligned_runway,
            go_around,
            missed_approach,
            holding,
            pattern,
            overhead_join,
            touch_and_go,
            weather_avoidance,
            wake_separation,
            approach_type,
            relevance_score: relevance,
        }
    }
}

impl Filter for AirportFilter {
    fn id(&self) -> &'static str {
        "airports"
    }

    fn name(&self) -> &'static str {
        "airports nearby"
    }

    fn priority(&self) -> i32 {
        // After squawk (its matches feed the relevance bonus), before
        // airprox (which exempts terminal-area traffic).
        30
    }

    fn configure(
        &mut self,
        config: &Config,
        airports: &AirportIndex,
        _squawks: &SquawkTable,
    ) -> Result<()> {
        self.config = config.filters.airports.clone();
        self.history = AnalysisHistory::new(self.config.analysis_history);
        if airports.is_empty() {
            info!("airport filter configured without airport data; producing no results");
        } else {
            debug!(
                "airport filter configured: {} airports, {} priority",
                airports.len(),
                self.config.priority_airports.len()
            );
        }
        Ok(())
    }

    fn preprocess(
        &mut self,
        aircraft: &mut Aircraft,
        peers: &Peers<'_>,
        ctx: &TickContext<'_>,
    ) -> Result<()> {
        aircraft.calculated.airports = Some(AirportsAssessment::default());
        if ctx.airports.is_empty() {
            return Ok(());
        }
        // Surface vehicles have no airport relevance worth alerting on.
        if aircraft
            .snapshot
            .category
            .map(|c| c.is_surface_vehicle())
            .unwrap_or(false)
        {
            return Ok(());
        }

        let snapshot = aircraft.snapshot.clone();
        let altitude_ft = aircraft.calculated.altitude_ft;

        let near = ctx.airports.find_nearby(snapshot.lat, snapshot.lon, NearbyQuery {
            distance_km: Some(self.config.atz_radius_km),
            altitude_ft,
        });
        let airports_nearby = !near.is_empty();

        let search_km = {
            let category = snapshot.category.map(|c| c.as_str().to_string());
            self.config
                .alignment_distance_by_category
                .get(category.as_deref().unwrap_or(""))
                .copied()
                .unwrap_or(self.config.alignment_distance_km)
        };
        let candidates = ctx.airports.find_nearby(snapshot.lat, snapshot.lon, NearbyQuery {
            distance_km: Some(search_km),
            altitude_ft,
        });

        let mut nearby: Vec<EnhancedAirport> = candidates
            .iter()
            .filter_map(|hit| {
                let size_compat = size_compatibility(
                    snapshot.category,
                    hit.airport.airport_type,
                    self.config.dense_area,
                )?;
                Some(self.enhance(
                    aircraft,
                    hit.airport,
                    hit.distance_km,
                    size_compat,
                    peers,
                    ctx,
                ))
            })
            .collect();
        nearby.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(Ordering::Equal)
        });

        aircraft.calculated.airports = Some(AirportsAssessment {
            airports_nearby,
            nearby,
        });
        Ok(())
    }

    fn evaluate(&self, aircraft: &Aircraft) -> bool {
        let Some(assessment) = aircraft.calculated.airports.as_ref() else {
            return false;
        };
        if assessment.airports_nearby {
            return true;
        }
        assessment.nearby.iter().any(|airport| {
            airport.relevance_score >= RELEVANCE_TRIGGER
                || matches!(
                    airport.phase,
                    Some(FlightPhase::GoAround)
                        | Some(FlightPhase::MissedApproach)
                        | Some(FlightPhase::TouchAndGo)
                        | Some(FlightPhase::Holding)
                        | Some(FlightPhase::Pattern)
                        | Some(FlightPhase::OverheadJoin)
                )
        })
    }

    fn postprocess(&mut self, aircraft: &[Aircraft], ctx: &TickContext<'_>) -> Result<()> {
        self.latest_analyses.clear();
        let priority = self.config.priority_airports.clone();
        for icao in &priority {
            let previous = self.history.latest(icao).cloned();
            let analysis =
                analysis::analyse_airport(icao, aircraft, ctx.now, previous.as_ref());
            for insight in &analysis.insights {
                debug!("airport insight: {}", insight.message);
            }
            self.latest_analyses.insert(icao.clone(), analysis.clone());
            self.history.push(analysis);
        }
        Ok(())
    }

    fn sort(&self, a: &Aircraft, b: &Aircraft) -> Ordering {
        let nearest = |x: &Aircraft| {
            x.calculated
                .airports
                .as_ref()
                .and_then(|assessment| {
                    assessment
                        .nearby
                        .iter()
                        .map(|airport| airport.distance_km)
                        .min_by(|p, q| p.partial_cmp(q).unwrap_or(Ordering::Equal))
                })
                .unwrap_or(f64::MAX)
        };
        nearest(a)
            .partial_cmp(&nearest(b))
            .unwrap_or(Ordering::Equal)
    }

    fn stats(&self, _all: &[Aircraft], triggered: &[&Aircraft]) -> serde_json::Value {
        let mut by_phase: HashMap<String, usize> = HashMap::new();
        for aircraft in triggered {
            if let Some(phase) = aircraft
                .calculated
                .airports
                .as_ref()
                .and_then(|a| a.nearby.first())
                .and_then(|a| a.phase)
            {
                *by_phase.entry(phase.to_string()).or_default() += 1;
            }
        }
        let insights: Vec<&Insight> = self
            .latest_analyses
            .values()
            .flat_map(|a| a.insights.iter())
            .collect();
        serde_json::json!({
            "near_airports": triggered.len(),
            "phases": by_phase,
            "insights": insights,
            "analysed_airports": self.latest_analyses.len(),
        })
    }

    fn format(&self, aircraft: &Aircraft) -> AlertBody {
        let assessment = aircraft.calculated.airports.clone().unwrap_or_default();
        let text = match assessment.nearby.first() {
            Some(airport) => {
                let phase = airport
                    .phase
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "in the area".to_string());
                match &airport.aligned_runway {
                    Some(alignment) => format!(
                        "{} {} {:.1} km, runway {}",
                        phase, airport.icao, airport.distance_km, alignment.runway_name
                    ),
                    None => {
                        format!("{} {} {:.1} km", phase, airport.icao, airport.distance_km)
                    }
                }
            }
            None => "near an airport".to_string(),
        };
        let warn = assessment.nearby.iter().any(|airport| {
            matches!(
                airport.phase,
                Some(FlightPhase::GoAround) | Some(FlightPhase::MissedApproach)
            ) || airport
                .wake_separation
                .as_ref()
                .map(|w| !w.adequate)
                .unwrap_or(false)
        });
        AlertBody {
            text,
            warn,
            payload: serde_json::to_value(&assessment).unwrap_or(serde_json::Value::Null),
        }
    }
}

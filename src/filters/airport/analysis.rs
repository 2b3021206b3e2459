//! Per-airport traffic analysis.
//!
//! Runs in the airport filter's postprocess for the configured priority
//! airports: aggregates the tick's aircraft per runway, derives which
//! runways are in use, compares against the airport's recent history to
//! catch runway changes, and emits operational insights.

use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::alignment::is_opposite_direction;
use super::phases::FlightPhase;
use super::{AirportsAssessment, EnhancedAirport};
use crate::aircraft::Aircraft;
use crate::statistics;

/// Aligned-traffic threshold for declaring a runway active.
const ACTIVE_MIN_AIRCRAFT: usize = 2;
/// Average alignment threshold for declaring a runway active.
const ACTIVE_MIN_ALIGNMENT: f64 = 0.6;
/// Aircraft count that reads as unusually high traffic.
const HIGH_TRAFFIC_THRESHOLD: usize = 10;
/// Ground-operations count that reads as congestion.
const GROUND_CONGESTION_THRESHOLD: usize = 5;
/// Touch-and-go count that reads as circuit training in progress.
const TRAINING_ACTIVITY_THRESHOLD: usize = 3;
/// Plausible final-approach speed band, kt.
const APPROACH_SPEED_BAND: (f64, f64) = (100.0, 180.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunwayStatus {
    Active,
    Possible,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveRunway {
    pub runway: String,
    pub status: RunwayStatus,
    pub aircraft: usize,
    pub avg_alignment: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightSeverity {
    Info,
    Warning,
}

/// One operational observation about an airport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    /// Stable insight identifier, e.g. "runway_change".
    pub kind: &'static str,
    pub severity: InsightSeverity,
    pub message: String,
    pub details: serde_json::Value,
}

/// One tick's analysis of one airport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AirportAnalysis {
    pub icao: String,
    pub at: DateTime<Utc>,
    pub aircraft_count: usize,
    pub active_runways: Vec<ActiveRunway>,
    pub insights: Vec<Insight>,
}

impl AirportAnalysis {
    /// The active runway identifiers, alphabetical.
    pub fn active_runway_names(&self) -> Vec<&str> {
        self.active_runways
            .iter()
            .filter(|r| r.status == RunwayStatus::Active)
            .map(|r| r.runway.as_str())
            .collect()
    }
}

#[derive(Default)]
struct RunwayTally {
    aligned: usize,
    alignment_sum: f64,
    approaching: usize,
    departing: usize,
}

/// The airport's view of one aircraft this tick.
fn airport_view<'a>(
    aircraft: &'a Aircraft,
    icao: &str,
) -> Option<(&'a Aircraft, &'a EnhancedAirport)> {
    let assessment: &AirportsAssessment = aircraft.calculated.airports.as_ref()?;
    assessment
        .nearby
        .iter()
        .find(|airport| airport.icao == icao)
        .map(|airport| (aircraft, airport))
}

/// Analyse one airport from the tick's aircraft set.
pub fn analyse_airport(
    icao: &str,
    aircraft: &[Aircraft],
    at: DateTime<Utc>,
    previous: Option<&AirportAnalysis>,
) -> AirportAnalysis {
    let views: Vec<(&Aircraft, &EnhancedAirport)> = aircraft
        .iter()
        .filter_map(|a| airport_view(a, icao))
        .collect();

    // Aggregate per runway.
    let mut tallies: BTreeMap<String, RunwayTally> = BTreeMap::new();
    for (_, view) in &views {
        if let Some(alignment) = &view.aligned_runway {
            let tally = tallies.entry(alignment.runway_name.clone()).or_default();
            tally.aligned += 1;
            tally.alignment_sum += alignment.alignment_score;
            match view.phase {
                Some(FlightPhase::Approaching)
                | Some(FlightPhase::GoAround)
                | Some(FlightPhase::MissedApproach)
                | Some(FlightPhase::TouchAndGo) => tally.approaching += 1,
                Some(FlightPhase::Departing) => tally.departing += 1,
                _ => {}
            }
        }
    }

    let active_runways: Vec<ActiveRunway> = tallies
        .iter()
        .map(|(runway, tally)| {
            let avg_alignment = tally.alignment_sum / tally.aligned.max(1) as f64;
            let movements = tally.approaching + tally.departing;
            let status = if tally.aligned >= ACTIVE_MIN_AIRCRAFT
                && avg_alignment > ACTIVE_MIN_ALIGNMENT
                && movements > 0
            {
                RunwayStatus::Active
            } else if tally.aligned > 0 && avg_alignment > ACTIVE_MIN_ALIGNMENT {
                RunwayStatus::Possible
            } else {
                RunwayStatus::Inactive
            };
            ActiveRunway {
                runway: runway.clone(),
                status,
                aircraft: tally.aligned,
                avg_alignment,
            }
        })
        .collect();

    let mut analysis = AirportAnalysis {
        icao: icao.to_string(),
        at,
        aircraft_count: views.len(),
        active_runways,
        insights: Vec::new(),
    };

    detect_runway_change(&mut analysis, previous);
    derive_insights(&mut analysis, &views);
    analysis
}

/// Compare the currently active runways with the previous analysis and
/// record a change insight, flagging direction reversals specially.
fn detect_runway_change(analysis: &mut AirportAnalysis, previous: Option<&AirportAnalysis>) {
    let Some(previous) = previous else {
        return;
    };
    let current: Vec<String> = analysis
        .active_runway_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let before: Vec<String> = previous
        .active_runway_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    if current.is_empty() || before.is_empty() || current == before {
        return;
    }

    let newly_active: Vec<&String> =
        current.iter().filter(|r| !before.contains(r)).collect();
    if newly_active.is_empty() {
        return;
    }

    let is_reversal = newly_active
        .iter()
        .any(|new| before.iter().any(|old| is_opposite_direction(new, old)));
    let change_type = if is_reversal {
        "direction_reversal"
    } else {
        "configuration_change"
    };

    analysis.insights.push(Insight {
        kind: "runway_change",
        severity: InsightSeverity::Warning,
        message: format!(
            "{}: active runway changed {} -> {}",
            analysis.icao,
            before.join("/"),
            current.join("/")
        ),
        details: serde_json::json!({
            "previous": before,
            "current": current,
            "is_opposite_direction": is_reversal,
            "change_type": change_type,
        }),
    });
}

/// Operational insights from the tick's traffic.
fn derive_insights(analysis: &mut AirportAnalysis, views: &[(&Aircraft, &EnhancedAirport)]) {
    if views.len() >= HIGH_TRAFFIC_THRESHOLD {
        analysis.insights.push(Insight {
            kind: "high_traffic",
            severity: InsightSeverity::Info,
            message: format!("{}: {} aircraft in the area", analysis.icao, views.len()),
            details: serde_json::json!({"aircraft": views.len()}),
        });
    }

    let ground = views
        .iter()
        .filter(|(_, v)| v.phase == Some(FlightPhase::GroundOperations))
        .count();
    if ground >= GROUND_CONGESTION_THRESHOLD {
        analysis.insights.push(Insight {
            kind: "ground_congestion",
            severity: InsightSeverity::Warning,
            message: format!("{}: {} aircraft in ground operations", analysis.icao, ground),
            details: serde_json::json!({"ground": ground}),
        });
    }

    // Parallel operations: two active runways sharing a number with
    // different position suffixes (09L + 09R).
    let active = analysis.active_runway_names();
    let parallel = active.iter().any(|a| {
        active.iter().any(|b| {
            a != b
                && super::alignment::runway_number(a).is_some()
                && super::alignment::runway_number(a) == super::alignment::runway_number(b)
        })
    });
    if parallel {
        analysis.insights.push(Insight {
            kind: "parallel_operations",
            severity: InsightSeverity::Info,
            message: format!("{}: parallel runway operations", analysis.icao),
            details: serde_json::json!({"runways": active}),
        });
    }

    // Mixed operations: one runway serving both arrivals and departures.
    let mixed: Vec<&str> = analysis
        .active_runways
        .iter()
        .filter(|r| r.status == RunwayStatus::Active)
        .map(|r| r.runway.as_str())
        .filter(|runway| {
            let (mut arrivals, mut departures) = (0usize, 0usize);
            for (_, view) in views {
                if view
                    .aligned_runway
                    .as_ref()
                    .map(|a| a.runway_name == *runway)
                    .unwrap_or(false)
                {
                    match view.phase {
                        Some(FlightPhase::Approaching) => arrivals += 1,
                        Some(FlightPhase::Departing) => departures += 1,
                        _ => {}
                    }
                }
            }
            arrivals > 0 && departures > 0
        })
        .collect();
    if !mixed.is_empty() {
        analysis.insights.push(Insight {
            kind: "mixed_operations",
            severity: InsightSeverity::Info,
            message: format!("{}: mixed arrivals and departures", analysis.icao),
            details: serde_json::json!({"runways": mixed}),
        });
    }

    // Unstable approaches: final-approach speed outside the plausible band.
    let approach_speeds: Vec<f64> = views
        .iter()
        .filter(|(_, view)| view.phase == Some(FlightPhase::Approaching))
        .filter_map(|(aircraft, _)| aircraft.snapshot.gs)
        .collect();
    let unstable: Vec<&str> = views
        .iter()
        .filter(|(aircraft, view)| {
            view.phase == Some(FlightPhase::Approaching)
                && aircraft
                    .snapshot
                    .gs
                    .map(|gs| gs < APPROACH_SPEED_BAND.0 || gs > APPROACH_SPEED_BAND.1)
                    .unwrap_or(false)
        })
        .map(|(aircraft, _)| aircraft.hex.as_str())
        .collect();
    if !unstable.is_empty() {
        analysis.insights.push(Insight {
            kind: "unstable_approach",
            severity: InsightSeverity::Warning,
            message: format!(
                "{}: {} approach(es) outside {:.0}-{:.0} kt",
                analysis.icao,
                unstable.len(),
                APPROACH_SPEED_BAND.0,
                APPROACH_SPEED_BAND.1
            ),
            details: serde_json::json!({
                "aircraft": unstable,
                "median_approach_speed_kt": statistics::percentile(&approach_speeds, 50.0),
            }),
        });
    }

    // Wake separation shortfalls flagged during preprocess.
    let wake: Vec<&str> = views
        .iter()
        .filter(|(_, view)| {
            view.wake_separation
                .as_ref()
                .map(|w| !w.adequate)
                .unwrap_or(false)
        })
        .map(|(aircraft, _)| aircraft.hex.as_str())
        .collect();
    if !wake.is_empty() {
        analysis.insights.push(Insight {
            kind: "wake_separation",
            severity: InsightSeverity::Warning,
            message: format!(
                "{}: {} pair(s) below wake separation minima",
                analysis.icao,
                wake.len()
            ),
            details: serde_json::json!({"aircraft": wake}),
        });
    }

    let training = views
        .iter()
        .filter(|(_, view)| view.touch_and_go.is_some())
        .count();
    if training >= TRAINING_ACTIVITY_THRESHOLD {
        analysis.insights.push(Insight {
            kind: "training_activity",
            severity: InsightSeverity::Info,
            message: format!("{}: circuit training in progress", analysis.icao),
            details: serde_json::json!({"aircraft": training}),
        });
    }
}

/// Bounded per-airport history of analyses, newest last.
#[derive(Default)]
pub struct AnalysisHistory {
    capacity: usize,
    by_airport: HashMap<String, VecDeque<AirportAnalysis>>,
}

impl AnalysisHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            by_airport: HashMap::new(),
        }
    }

    pub fn latest(&self, icao: &str) -> Option<&AirportAnalysis> {
        self.by_airport.get(icao).and_then(|h| h.back())
    }

    pub fn push(&mut self, analysis: AirportAnalysis) {
        let history = self.by_airport.entry(analysis.icao.clone()).or_default();
        if history.len() >= self.capacity {
            history.pop_front();
        }
        history.push_back(analysis);
    }

    pub fn len(&self, icao: &str) -> usize {
        self.by_airport.get(icao).map(|h| h.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::super::alignment::RunwayAlignment;
    use super::*;
    use crate::aircraft::AircraftTable;
    use crate::snapshot::{AircraftSnapshot, Emergency, TcasAlert};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 14, 0, 0).unwrap()
    }

    fn snapshot(hex: &str, gs: f64) -> AircraftSnapshot {
        AircraftSnapshot {
            hex: hex.to_string(),
            flight: None,
            lat: 51.47,
            lon: -0.45,
            track: Some(270.0),
            gs: Some(gs),
            baro_rate: Some(-650.0),
            track_rate: None,
            roll: None,
            alt_baro: Some(2000),
            alt_geom: None,
            squawk: None,
            emergency: Emergency::None,
            alert: TcasAlert::None,
            category: None,
            seen_pos: Some(0.2),
        }
    }

    fn aircraft_on_runway(
        hex: &str,
        runway: &str,
        phase: FlightPhase,
        alignment: f64,
        gs: f64,
    ) -> Aircraft {
        let mut table = AircraftTable::new(5);
        table.apply(now(), vec![snapshot(hex, gs)]);
        let mut aircraft = table.aircraft()[0].clone();
        aircraft.calculated.airports = Some(AirportsAssessment {
            airports_nearby: true,
            nearby: vec![EnhancedAirport {
                icao: "EGLL".to_string(),
                name: "Heathrow".to_string(),
                distance_km: 6.0,
                phase: Some(phase),
                phase_confidence: 0.7,
                aligned_runway: Some(RunwayAlignment {
                    runway_name: runway.to_string(),
                    alignment_score: alignment,
                    confidence_score: alignment * 0.9,
                }),
                go_around: None,
                missed_approach: None,
                holding: None,
                pattern: None,
                overhead_join: None,
                touch_and_go: None,
                weather_avoidance: None,
                wake_separation: None,
                approach_type: None,
                relevance_score: 0.8,
            }],
        });
        aircraft
    }

    fn tick_on_runway(runway: &str) -> Vec<Aircraft> {
        vec![
            aircraft_on_runway("AAA001", runway, FlightPhase::Approaching, 0.9, 140.0),
            aircraft_on_runway("BBB002", runway, FlightPhase::Approaching, 0.85, 150.0),
            aircraft_on_runway("CCC003", runway, FlightPhase::Departing, 0.8, 160.0),
        ]
    }

    #[test]
    fn test_runway_declared_active() {
        let aircraft = tick_on_runway("09L");
        let analysis = analyse_airport("EGLL", &aircraft, now(), None);
        assert_eq!(analysis.active_runway_names(), vec!["09L"]);
        assert_eq!(analysis.aircraft_count, 3);
    }

    #[test]
    fn test_single_aircraft_only_possible() {
        let aircraft = vec![aircraft_on_runway(
            "AAA001",
            "09L",
            FlightPhase::Approaching,
            0.9,
            140.0,
        )];
        let analysis = analyse_airport("EGLL", &aircraft, now(), None);
        assert!(analysis.active_runway_names().is_empty());
        assert_eq!(analysis.active_runways[0].status, RunwayStatus::Possible);
    }

    #[test]
    fn test_runway_direction_reversal_insight() {
        // Three ticks on 09L build history; the fourth is on 27L.
        let mut history = AnalysisHistory::new(20);
        let mut at = now();
        for _ in 0..3 {
            let aircraft = tick_on_runway("09L");
            let previous = history.latest("EGLL").cloned();
            let analysis = analyse_airport("EGLL", &aircraft, at, previous.as_ref());
            assert!(
                analysis.insights.iter().all(|i| i.kind != "runway_change"),
                "same-runway ticks must not flag a change"
            );
            history.push(analysis);
            at += chrono::Duration::seconds(5);
        }

        let aircraft = tick_on_runway("27L");
        let previous = history.latest("EGLL").cloned();
        let analysis = analyse_airport("EGLL", &aircraft, at, previous.as_ref());
        let change = analysis
            .insights
            .iter()
            .find(|i| i.kind == "runway_change")
            .expect("runway change must be flagged");
        assert_eq!(change.severity, InsightSeverity::Warning);
        assert_eq!(change.details["is_opposite_direction"], true);
        assert_eq!(change.details["change_type"], "direction_reversal");
    }

    #[test]
    fn test_mixed_operations_insight() {
        let aircraft = tick_on_runway("09L");
        let analysis = analyse_airport("EGLL", &aircraft, now(), None);
        assert!(
            analysis.insights.iter().any(|i| i.kind == "mixed_operations"),
            "arrivals and departures on one runway are mixed operations"
        );
    }

    #[test]
    fn test_unstable_approach_insight() {
        let mut aircraft = tick_on_runway("09L");
        aircraft.push(aircraft_on_runway(
            "DDD004",
            "09L",
            FlightPhase::Approaching,
            0.9,
            210.0,
        ));
        let analysis = analyse_airport("EGLL", &aircraft, now(), None);
        let insight = analysis
            .insights
            .iter()
            .find(|i| i.kind == "unstable_approach")
            .expect("210 kt on final must flag");
        assert_eq!(insight.details["aircraft"][0], "DDD004");
    }

    #[test]
    fn test_history_is_bounded() {
        let mut history = AnalysisHistory::new(3);
        for i in 0..5 {
            let aircraft = tick_on_runway("09L");
            let analysis = analyse_airport(
                "EGLL",
                &aircraft,
                now() + chrono::Duration::seconds(i * 5),
                None,
            );
            history.push(analysis);
        }
        assert_eq!(history.len("EGLL"), 3, "ring buffer keeps the newest 3");
    }
}

//! Flight-phase detection around an airport.
//!
//! Each detector looks at the aircraft's recent trajectory relative to one
//! candidate airport and reports a confidence-scored detection, or nothing.
//! The filter applies them in precedence order; the base rules (approaching
//! / departing / ground operations) only fire when no specific detector
//! does.

use chrono::Duration;
use serde::Serialize;

use crate::airports::Airport;
use crate::geometry;
use crate::snapshot::AircraftSnapshot;
use crate::trajectory::{FieldQuery, PositionsQuery, TrackField, TrajectoryStore};

/// Flight phase relative to one airport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightPhase {
    Approaching,
    Departing,
    GroundOperations,
    Pattern,
    OverheadJoin,
    TouchAndGo,
    Holding,
    GoAround,
    MissedApproach,
    WeatherAvoidance,
}

impl std::fmt::Display for FlightPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| std::fmt::Error)?;
        f.write_str(json.trim_matches('"'))
    }
}

/// Approach classification once an aircraft is established inbound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproachType {
    Ils,
    Visual,
    Circling,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GoAroundDetection {
    pub confidence: f64,
    pub min_altitude_ft: f64,
    pub altitude_gain_ft: f64,
    pub climb_rate_fpm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MissedApproachDetection {
    pub confidence: f64,
    /// Altitude at which the climb-out began, ft.
    pub decision_height_ft: f64,
    pub climb_rate_fpm: f64,
    pub heading_change_deg: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HoldingDetection {
    pub confidence: f64,
    pub center: (f64, f64),
    pub total_turn_deg: f64,
    pub duration_min: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PatternDetection {
    pub confidence: f64,
    pub circuit_altitude_ft: f64,
    pub turn_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OverheadJoinDetection {
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TouchAndGoDetection {
    pub confidence: f64,
    pub touch_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeatherAvoidanceDetection {
    pub confidence: f64,
    pub deviation_deg: f64,
}

/// Altitude series over the recent approach window, oldest first.
fn recent_altitudes(trajectory: &TrajectoryStore) -> (Vec<f64>, Vec<chrono::DateTime<chrono::Utc>>) {
    let series = trajectory.field(
        TrackField::Altitude,
        FieldQuery::window(Duration::minutes(5)),
    );
    (series.values, series.timestamps)
}

/// Go-around: a descent to short final followed by a strong climb-out.
///
/// Pre-gate (checked by the caller): within 10 km of the airport and below
/// 3000 ft. Requires a V-shaped altitude profile bottoming below 1500 ft
/// with at least 300 ft regained. Confidence starts at 0.5, with increments
/// for a clear V (>= 300 ft of prior descent), a gain above 500 ft, a
/// bottom below 1000 ft, and a present climb rate above 1000 fpm.
pub fn detect_go_around(
    snapshot: &AircraftSnapshot,
    trajectory: &TrajectoryStore,
) -> Option<GoAroundDetection> {
    let (altitudes, _) = recent_altitudes(trajectory);
    if altitudes.len() < 5 {
        return None;
    }

    let (min_index, min_altitude) = altitudes
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.partial_cmp(b.1).expect("altitudes are finite"))
        .map(|(i, v)| (i, *v))?;
    if min_altitude >= 1500.0 {
        return None;
    }
    // The bottom of the V must have history on both sides.
    if min_index == 0 || min_index == altitudes.len() - 1 {
        return None;
    }

    let descent_before = altitudes[..min_index]
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max)
        - min_altitude;
    let altitude_gain = altitudes.last().copied()? - min_altitude;
    if descent_before <= 0.0 || altitude_gain <= 300.0 {
        return None;
    }

    let climb_rate = snapshot.baro_rate.unwrap_or(0.0);
    let mut confidence: f64 = 0.5;
    if descent_before >= 300.0 {
        confidence += 0.15;
    }
    if altitude_gain > 500.0 {
        confidence += 0.15;
    }
    if min_altitude < 1000.0 {
        confidence += 0.1;
    }
    if climb_rate > 1000.0 {
        confidence += 0.1;
    }

    Some(GoAroundDetection {
        confidence: confidence.min(1.0),
        min_altitude_ft: min_altitude,
        altitude_gain_ft: altitude_gain,
        climb_rate_fpm: climb_rate,
    })
}

/// Missed approach: a climb-out that began in the decision-height band
/// above the field elevation, with the aircraft still close in.
pub fn detect_missed_approach(
    snapshot: &AircraftSnapshot,
    airport: &Airport,
    distance_km: f64,
    trajectory: &TrajectoryStore,
) -> Option<MissedApproachDetection> {
    if distance_km > 8.0 {
        return None;
    }
    let elevation = f64::from(airport.elevation_ft.unwrap_or(0));
    let climb_rate = snapshot.baro_rate?;
    if climb_rate <= 800.0 {
        return None;
    }

    let (altitudes, _) = recent_altitudes(trajectory);
    if altitudes.len() < 5 {
        return None;
    }
    let (min_index, decision_height) = altitudes
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.partial_cmp(b.1).expect("altitudes are finite"))
        .map(|(i, v)| (i, *v))?;
    let band = (elevation + 200.0)..=(elevation + 800.0);
    if !band.contains(&decision_height) {
        return None;
    }
    let altitude_gain = altitudes.last().copied()? - decision_height;
    if altitude_gain <= 500.0 {
        return None;
    }

    // Heading change since the climb-out began.
    let tracks = trajectory.field(
        TrackField::Track,
        FieldQuery::window(Duration::minutes(5)),
    );
    let heading_change = match (tracks.values.get(min_index), tracks.values.last()) {
        (Some(at_bottom), Some(current)) => {
            geometry::angular_difference(*at_bottom, *current)
        }
        _ => 0.0,
    };

    // Stable prior approach: monotonically descending into the bottom.
    let stable_before = min_index >= 2
        && altitudes[..min_index]
            .windows(2)
            .all(|w| w[1] <= w[0] + 50.0);

    let mut confidence: f64 = 0.5;
    if heading_change > 15.0 {
        confidence += 0.15;
    }
    if stable_before {
        confidence += 0.15;
    }
    if climb_rate > 1200.0 {
        confidence += 0.1;
    }
    if decision_height < elevation + 300.0 {
        confidence += 0.1;
    }

    Some(MissedApproachDetection {
        confidence: confidence.min(1.0),
        decision_height_ft: decision_height,
        climb_rate_fpm: climb_rate,
        heading_change_deg: heading_change,
    })
}

/// Holding: one and a half full circles' worth of cumulative turn across at
/// least twenty recent positions.
pub fn detect_holding(trajectory: &TrajectoryStore) -> Option<HoldingDetection> {
    let positions = trajectory.positions(PositionsQuery {
        time_window: Some(Duration::minutes(10)),
        require_complete_data: false,
    });
    if positions.len() < 20 {
        return None;
    }

    let total_turn: f64 = positions
        .windows(2)
        .filter_map(|w| {
            let (a, b) = (w[0].track?, w[1].track?);
            Some(geometry::wrap_180(b - a).abs())
        })
        .sum();
    if total_turn <= 540.0 {
        return None;
    }

    let count = positions.len() as f64;
    let center = (
        positions.iter().map(|p| p.lat).sum::<f64>() / count,
        positions.iter().map(|p| p.lon).sum::<f64>() / count,
    );
    let duration_min = (positions.last()?.timestamp - positions.first()?.timestamp)
        .num_seconds() as f64
        / 60.0;

    Some(HoldingDetection {
        confidence: (total_turn / 720.0).min(1.0),
        center,
        total_turn_deg: total_turn,
        duration_min,
    })
}

/// Circuit-pattern flying at a non-large airport: circuit-height altitude,
/// repeated right-angle turns, everything tight to the field.
pub fn detect_pattern(
    airport: &Airport,
    distance_km: f64,
    trajectory: &TrajectoryStore,
) -> Option<PatternDetection> {
    if distance_km >= 5.0 {
        return None;
    }
    let elevation = f64::from(airport.elevation_ft.unwrap_or(0));
    let circuit_altitude = elevation + 1000.0;

    let positions = trajectory.positions(PositionsQuery {
        time_window: Some(Duration::minutes(10)),
        require_complete_data: true,
    });
    if positions.len() < 8 {
        return None;
    }

    let altitudes: Vec<f64> = positions
        .iter()
        .filter_map(|p| p.altitude.map(f64::from))
        .collect();
    let current_altitude = *altitudes.last()?;
    if (current_altitude - circuit_altitude).abs() > 200.0 {
        return None;
    }
    let altitude_range = altitudes.iter().copied().fold(f64::NEG_INFINITY, f64::max)
        - altitudes.iter().copied().fold(f64::INFINITY, f64::min);
    if altitude_range >= 300.0 {
        return None;
    }

    // Approximately-90-degree turns between consecutive samples, allowing
    // the turn to spread across a couple of them.
    let mut turn_count = 0usize;
    let mut accumulated = 0.0f64;
    for w in positions.windows(2) {
        let (Some(a), Some(b)) = (w[0].track, w[1].track) else {
            continue;
        };
        let change = geometry::wrap_180(b - a);
        if change.abs() < 5.0 {
            if (70.0..=110.0).contains(&accumulated.abs()) {
                turn_count += 1;
            }
            accumulated = 0.0;
        } else {
            accumulated += change;
        }
    }
    if (70.0..=110.0).contains(&accumulated.abs()) {
        turn_count += 1;
    }
    if turn_count < 2 {
        return None;
    }

    let distances: Vec<f64> = positions
        .iter()
        .filter_map(|p| {
            geometry::distance_km(p.lat, p.lon, airport.latitude_deg, airport.longitude_deg)
                .ok()
        })
        .collect();
    let avg_distance = distances.iter().sum::<f64>() / distances.len() as f64;
    let max_distance = distances.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if avg_distance >= 3.0 || max_distance >= 4.0 {
        return None;
    }

    let mut confidence: f64 = 0.5;
    if turn_count >= 3 {
        confidence += 0.15;
    }
    if altitude_range < 150.0 {
        confidence += 0.15;
    }
    if avg_distance < 2.0 {
        confidence += 0.1;
    }

    Some(PatternDetection {
        confidence: confidence.min(1.0),
        circuit_altitude_ft: current_altitude,
        turn_count,
    })
}

/// Overhead join: crossing above the field at circuit height plus ~1000 ft,
/// descending to join.
pub fn detect_overhead_join(
    snapshot: &AircraftSnapshot,
    airport: &Airport,
    distance_km: f64,
) -> Option<OverheadJoinDetection> {
    if distance_km > 2.0 {
        return None;
    }
    let elevation = f64::from(airport.elevation_ft.unwrap_or(0));
    let altitude = f64::from(snapshot.altitude_ft()?);
    if !((elevation + 1500.0)..=(elevation + 2500.0)).contains(&altitude) {
        return None;
    }
    let descending = snapshot.baro_rate.map(|r| r < -200.0).unwrap_or(false);
    if !descending {
        return None;
    }
    Some(OverheadJoinDetection { confidence: 0.6 })
}

/// Touch-and-go: dips to just above field elevation followed by climbs,
/// still close to the field.
pub fn detect_touch_and_go(
    snapshot: &AircraftSnapshot,
    airport: &Airport,
    distance_km: f64,
    trajectory: &TrajectoryStore,
) -> Option<TouchAndGoDetection> {
    if distance_km > 3.0 {
        return None;
    }
    let elevation = f64::from(airport.elevation_ft.unwrap_or(0));
    let (altitudes, _) = recent_altitudes(trajectory);
    if altitudes.len() < 6 {
        return None;
    }

    let surface_band = elevation + 200.0;
    let mut touch_count = 0usize;
    let mut was_down = false;
    for altitude in &altitudes {
        if *altitude <= surface_band {
            was_down = true;
        } else if was_down && *altitude > surface_band + 200.0 {
            touch_count += 1;
            was_down = false;
        }
    }
    if touch_count == 0 {
        return None;
    }
    let climbing_now = snapshot.baro_rate.map(|r| r > 200.0).unwrap_or(false);

    Some(TouchAndGoDetection {
        confidence: if climbing_now { 0.8 } else { 0.6 },
        touch_count,
    })
}

/// Classify an established approach by how precisely it is flown.
pub fn classify_approach(
    snapshot: &AircraftSnapshot,
    alignment_score: Option<f64>,
) -> ApproachType {
    let descent_rate = snapshot.baro_rate.unwrap_or(0.0).abs();
    match alignment_score {
        Some(score) if score > 0.8 && (500.0..=1000.0).contains(&descent_rate) => {
            ApproachType::Ils
        }
        Some(score) if score > 0.5 => ApproachType::Visual,
        _ => ApproachType::Circling,
    }
}

/// Weather avoidance: a marked track excursion at altitude, away from the
/// immediate airport environment.
pub fn detect_weather_avoidance(
    snapshot: &AircraftSnapshot,
    distance_km: f64,
    trajectory: &TrajectoryStore,
) -> Option<WeatherAvoidanceDetection> {
    if distance_km < 5.0 {
        return None;
    }
    let altitude = f64::from(snapshot.altitude_ft()?);
    if altitude < 4000.0 {
        return None;
    }
    let stats = trajectory.stats(
        TrackField::Track,
        FieldQuery::window(Duration::minutes(5)).with_min(6),
    )?;
    if stats.std_dev <= 25.0 {
        return None;
    }
    Some(WeatherAvoidanceDetection {
        confidence: 0.5,
        deviation_deg: stats.std_dev,
    })
}

/// Base phase rules, applied when no specific detector fires.
pub fn base_phase(
    snapshot: &AircraftSnapshot,
    altitude_ft: Option<i32>,
) -> Option<(FlightPhase, f64)> {
    let altitude = f64::from(altitude_ft?);
    let baro_rate = snapshot.baro_rate.unwrap_or(0.0);

    if altitude < 3000.0 && baro_rate < -200.0 {
        return Some((
            FlightPhase::Approaching,
            (baro_rate.abs() / 1000.0).min(1.0),
        ));
    }
    if altitude < 3000.0 && baro_rate > 200.0 {
        return Some((FlightPhase::Departing, (baro_rate / 1000.0).min(1.0)));
    }
    if altitude < 1500.0 {
        return Some((FlightPhase::GroundOperations, 0.8));
    }
    None
}

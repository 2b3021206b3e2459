//! Runway alignment scoring.
//!
//! Scores how well an aircraft's track lines up with each runway direction
//! of an airport, blending the angular match with the offset from the
//! extended centreline, and derives a confidence from how steady the track
//! has been.

use chrono::Duration;
use serde::Serialize;

use crate::airports::Airport;
use crate::geometry;
use crate::snapshot::AircraftSnapshot;
use crate::trajectory::{StabilityQuery, TrackField, TrajectoryStore};

/// Angular difference at which the heading component reaches zero.
const MAX_HEADING_DIFF_DEG: f64 = 45.0;

/// Centreline offset at which the positional component reaches zero, km.
const MAX_CENTRELINE_OFFSET_KM: f64 = 2.0;

/// Track steadiness threshold for full confidence, degrees std-dev.
const TRACK_STABILITY_DEG: f64 = 5.0;

/// Confidence multiplier when the track has been wandering.
const UNSTEADY_TRACK_FACTOR: f64 = 0.7;

/// Best-matching runway direction for one aircraft at one airport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunwayAlignment {
    /// Direction identifier, e.g. "27L".
    pub runway_name: String,
    /// How well track and centreline agree, [0, 1].
    pub alignment_score: f64,
    /// Alignment tempered by trajectory steadiness, [0, 1].
    pub confidence_score: f64,
}

/// Score the aircraft against every runway direction at the airport and
/// return the best, if any direction scores above zero.
pub fn score_alignment(
    snapshot: &AircraftSnapshot,
    airport: &Airport,
    trajectory: Option<&TrajectoryStore>,
) -> Option<RunwayAlignment> {
    let track = snapshot.track?;

    let mut best: Option<(String, f64)> = None;
    for runway in &airport.runways {
        if runway.closed {
            continue;
        }
        for end in runway.ends() {
            let heading_diff = geometry::angular_difference(track, end.heading_deg);
            let angle_score = (1.0 - heading_diff / MAX_HEADING_DIFF_DEG).max(0.0);
            if angle_score <= 0.0 {
                continue;
            }

            // Offset from the extended centreline, when the threshold is
            // surveyed. The centreline runs through the threshold on the
            // reciprocal of the landing heading.
            let score = match end.threshold {
                Some((lat, lon)) => {
                    let approach_track =
                        geometry::normalize_360(end.heading_deg);
                    match geometry::cross_track(
                        snapshot.lat,
                        snapshot.lon,
                        lat,
                        lon,
                        geometry::normalize_360(approach_track + 180.0),
                    ) {
                        Ok(ct) => {
                            let offset_score =
                                (1.0 - ct.cross_km.abs() / MAX_CENTRELINE_OFFSET_KM).max(0.0);
                            0.6 * angle_score + 0.4 * offset_score
                        }
                        Err(_) => angle_score,
                    }
                }
                None => angle_score,
            };

            if best.as_ref().map(|(_, s)| score > *s).unwrap_or(true) {
                best = Some((end.ident.to_string(), score));
            }
        }
    }

    let (runway_name, alignment_score) = best?;
    if alignment_score <= 0.0 {
        return None;
    }

    let steady = trajectory
        .map(|t| {
            t.is_field_stable(TrackField::Track, StabilityQuery {
                std_dev_threshold: TRACK_STABILITY_DEG,
                min_data_points: 5,
                time_window: Some(Duration::minutes(2)),
            })
        })
        .unwrap_or(false);
    let confidence_score = if steady {
        alignment_score
    } else {
        alignment_score * UNSTEADY_TRACK_FACTOR
    };

    Some(RunwayAlignment {
        runway_name,
        alignment_score,
        confidence_score,
    })
}

/// The runway number (heading tens) in a direction identifier, e.g.
/// "27L" -> 27. `None` when the identifier is not numeric.
pub fn runway_number(ident: &str) -> Option<u8> {
    let digits: String = ident.chars().take_while(|c| c.is_ascii_digit()).collect();
    let number: u8 = digits.parse().ok()?;
    (1..=36).contains(&number).then_some(number)
}

/// Whether two runway identifiers are opposite directions of the same strip
/// (numbers 18 apart).
pub fn is_opposite_direction(a: &str, b: &str) -> bool {
    match (runway_number(a), runway_number(b)) {
        (Some(na), Some(nb)) => {
            let diff = (i16::from(na) - i16::from(nb)).rem_euclid(36);
            diff == 18
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::airports::{AirportType, Runway};
    use crate::snapshot::{Emergency, TcasAlert};

    fn heathrow_like() -> Airport {
        Airport {
            icao_code: "EGLL".to_string(),
            iata_code: Some("LHR".to_string()),
            name: "Heathrow".to_string(),
            airport_type: AirportType::LargeAirport,
            latitude_deg: 51.4706,
            longitude_deg: -0.4619,
            elevation_ft: Some(83),
            runways: vec![Runway {
                le_ident: "09L".to_string(),
                le_heading_deg_t: Some(89.6),
                le_latitude_deg: Some(51.4775),
                le_longitude_deg: Some(-0.4897),
                he_ident: "27R".to_string(),
                he_heading_deg_t: Some(269.6),
                he_latitude_deg: Some(51.4777),
                he_longitude_deg: Some(-0.4337),
                length_ft: Some(12_799),
                width_ft: Some(164),
                surface: Some("ASP".to_string()),
                lighted: true,
                closed: false,
            }],
            frequencies: vec![],
        }
    }

    fn approaching_snapshot(track: f64) -> AircraftSnapshot {
        AircraftSnapshot {
            hex: "4CA2D6".to_string(),
            flight: None,
            // On the 27R approach, east of the airport.
            lat: 51.4777,
            lon: -0.30,
            track: Some(track),
            gs: Some(150.0),
            baro_rate: Some(-700.0),
            track_rate: None,
            roll: None,
            alt_baro: Some(2200),
            alt_geom: None,
            squawk: None,
            emergency: Emergency::None,
            alert: TcasAlert::None,
            category: None,
            seen_pos: Some(0.2),
        }
    }

    #[test]
    fn test_westbound_approach_picks_27r() {
        let airport = heathrow_like();
        let alignment = score_alignment(&approaching_snapshot(270.0), &airport, None).unwrap();
        assert_eq!(alignment.runway_name, "27R");
        assert!(
            alignment.alignment_score > 0.8,
            "on-centreline, on-heading approach must score high, got {}",
            alignment.alignment_score
        );
        assert!(
            alignment.confidence_score < alignment.alignment_score,
            "no trajectory means no steadiness evidence"
        );
    }

    #[test]
    fn test_eastbound_track_picks_09l() {
        let airport = heathrow_like();
        let alignment = score_alignment(&approaching_snapshot(90.0), &airport, None).unwrap();
        assert_eq!(alignment.runway_name, "09L");
    }

    #[test]
    fn test_perpendicular_track_scores_nothing() {
        let airport = heathrow_like();
        assert!(
            score_alignment(&approaching_snapshot(0.0), &airport, None).is_none(),
            "a track 90 degrees off both runway directions cannot align"
        );
    }

    #[test]
    fn test_offset_from_centreline_lowers_score() {
        let airport = heathrow_like();
        let on_centreline =
            score_alignment(&approaching_snapshot(270.0), &airport, None).unwrap();

        let mut offset = approaching_snapshot(270.0);
        offset.lat += 0.012; // ~1.3 km north of the centreline
        let displaced = score_alignment(&offset, &airport, None).unwrap();
        assert!(
            displaced.alignment_score < on_centreline.alignment_score,
            "centreline offset must cost score ({} vs {})",
            displaced.alignment_score,
            on_centreline.alignment_score
        );
    }

    #[test]
    fn test_runway_number_parsing() {
        assert_eq!(runway_number("27L"), Some(27));
        assert_eq!(runway_number("09"), Some(9));
        assert_eq!(runway_number("H1"), None);
    }

    #[test]
    fn test_opposite_direction() {
        assert!(is_opposite_direction("09L", "27L"));
        assert!(is_opposite_direction("27L", "09L"));
        assert!(is_opposite_direction("36", "18"));
        assert!(!is_opposite_direction("09L", "23"));
    }
}

//! Performance-envelope detector.
//!
//! Compares each aircraft's climb, descent, and speed against the expected
//! envelope for its emitter category and flags excursions. The envelope
//! table and all tolerances come from configuration; the defaults model a
//! light single (A1) through a heavy (A5), rotorcraft, gliders, and UAVs.

use std::cmp::Ordering;
use std::collections::HashMap;

use anyhow::Result;
use chrono::Duration;
use serde::Serialize;
use tracing::debug;

use crate::aircraft::Aircraft;
use crate::airports::AirportIndex;
use crate::alerts::{AlertBody, Severity};
use crate::config::{Config, Envelope, PerformanceConfig};
use crate::pipeline::{Filter, Peers, TickContext};
use crate::snapshot::AircraftSnapshot;
use crate::squawks::SquawkTable;
use crate::statistics;
use crate::trajectory::{FieldQuery, TrackField, TrajectoryStore};

/// Broad flight regime used to pick the applicable envelope figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightRegime {
    InitialClimb,
    CruiseClimb,
    Cruise,
    Descent,
    Approach,
    Level,
    GroundOrPattern,
}

/// One envelope excursion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceIssue {
    /// Stable issue identifier, e.g. "poor-climb".
    pub kind: &'static str,
    pub severity: Severity,
    pub description: String,
    pub expected: f64,
    pub actual: f64,
}

/// Result slot written by [`PerformanceFilter::preprocess`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceAssessment {
    /// Sentinel: false until an issue is found.
    pub has_issues: bool,
    pub regime: Option<FlightRegime>,
    pub issues: Vec<PerformanceIssue>,
    pub highest_severity: Option<Severity>,
}

/// Classify the current flight regime from vertical rate, altitude, and
/// speed. `recent_min_alt` is the lowest altitude seen in the last few
/// minutes, used to tell an initial climb from a cruise climb.
pub fn detect_regime(
    snapshot: &AircraftSnapshot,
    altitude_ft: Option<i32>,
    recent_min_alt_ft: Option<f64>,
) -> FlightRegime {
    let baro_rate = snapshot.baro_rate.unwrap_or(0.0);
    let altitude = altitude_ft.map(f64::from);

    if baro_rate > 300.0 {
        let low = altitude.map(|a| a < 5000.0).unwrap_or(false);
        let recently_low = recent_min_alt_ft.map(|a| a < 2000.0).unwrap_or(false);
        return if low || recently_low {
            FlightRegime::InitialClimb
        } else {
            FlightRegime::CruiseClimb
        };
    }
    if baro_rate < -300.0 {
        let low = altitude.map(|a| a < 8000.0).unwrap_or(false);
        let slow = snapshot.gs.map(|g| g < 250.0).unwrap_or(false);
        return if low || slow {
            FlightRegime::Approach
        } else {
            FlightRegime::Descent
        };
    }
    match altitude {
        Some(a) if a >= 10_000.0 => FlightRegime::Cruise,
        Some(a) if a < 2000.0 && snapshot.gs.map(|g| g < 80.0).unwrap_or(false) => {
            FlightRegime::GroundOrPattern
        }
        _ => FlightRegime::Level,
    }
}

fn issue(
    kind: &'static str,
    severity: Severity,
    description: String,
    expected: f64,
    actual: f64,
) -> PerformanceIssue {
    PerformanceIssue {
        kind,
        severity,
        description,
        expected,
        actual,
    }
}

/// Expected cruise speed for the altitude band the aircraft is in.
fn expected_cruise_speed(envelope: &Envelope, altitude_ft: f64) -> f64 {
    let bands = [
        (10_000.0, envelope.cruise_speed_low_kt),
        (25_000.0, envelope.cruise_speed_mid_kt),
        (f64::INFINITY, envelope.cruise_speed_high_kt),
    ];
    *statistics::band_lookup(altitude_ft, &bands).expect("bands are non-empty")
}

/// Check one aircraft against its envelope. Pure; the trajectory store only
/// feeds the sustained/degradation checks.
pub fn check_envelope(
    snapshot: &AircraftSnapshot,
    altitude_ft: Option<i32>,
    envelope: &Envelope,
    config: &PerformanceConfig,
    trajectory: Option<&TrajectoryStore>,
) -> (FlightRegime, Vec<PerformanceIssue>) {
    let recent_min = trajectory.and_then(|t| {
        t.stats(
            TrackField::Altitude,
            FieldQuery::window(Duration::minutes(5)),
        )
        .map(|s| s.min)
    });
    let regime = detect_regime(snapshot, altitude_ft, recent_min);
    let mut issues = Vec::new();
    let baro_rate = snapshot.baro_rate.unwrap_or(0.0);
    let altitude = altitude_ft.map(f64::from);

    match regime {
        FlightRegime::InitialClimb | FlightRegime::CruiseClimb => {
            let expected = if regime == FlightRegime::InitialClimb {
                envelope.initial_climb_fpm
            } else {
                envelope.cruise_climb_fpm
            };
            let floor = expected * (1.0 - config.climb_tolerance);
            if baro_rate < floor {
                let ratio = baro_rate / expected;
                let severity = if ratio < 0.4 {
                    Severity::High
                } else if ratio < 0.55 {
                    Severity::Medium
                } else {
                    Severity::Low
                };
                issues.push(issue(
                    "poor-climb",
                    severity,
                    format!("climbing {:.0} fpm against {:.0} expected", baro_rate, expected),
                    expected,
                    baro_rate,
                ));
            }
            let ceiling = expected * (1.0 + config.excessive_buffer);
            if baro_rate > ceiling {
                let severity = if baro_rate > expected * 2.5 {
                    Severity::High
                } else {
                    Severity::Medium
                };
                issues.push(issue(
                    "excessive-climb",
                    severity,
                    format!("climbing {:.0} fpm against {:.0} expected", baro_rate, expected),
                    expected,
                    baro_rate,
                ));
            }

            // Sustained shortfall over at least 8 samples, with transient
            // spikes removed before averaging.
            if let Some(series) = trajectory.map(|t| {
                t.field(
                    TrackField::BaroRate,
                    FieldQuery::window(Duration::minutes(5)).with_min(8),
                )
            }) && !series.is_empty()
            {
                let outliers = statistics::iqr_outliers(&series.values);
                let clean: Vec<f64> = series
                    .values
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !outliers.contains(i))
                    .map(|(_, v)| *v)
                    .collect();
                if !clean.is_empty() {
                    let avg = clean.iter().sum::<f64>() / clean.len() as f64;
                    if avg > 0.0 && avg < expected * 0.5 {
                        issues.push(issue(
                            "sustained-poor-climb",
                            Severity::High,
                            format!(
                                "average climb {:.0} fpm over {} samples, below half of {:.0}",
                                avg,
                                clean.len(),
                                expected
                            ),
                            expected,
                            avg,
                        ));
                    }
                }
            }
        }
        FlightRegime::Descent | FlightRegime::Approach => {
            let expected = if regime == FlightRegime::Approach {
                envelope.approach_descent_fpm
            } else {
                envelope.descent_fpm
            };
            let floor = expected * (1.0 - config.climb_tolerance);
            if baro_rate.abs() < floor {
                issues.push(issue(
                    "shallow-descent",
                    Severity::Low,
                    format!(
                        "descending {:.0} fpm against {:.0} expected",
                        baro_rate.abs(),
                        expected
                    ),
                    expected,
                    baro_rate.abs(),
                ));
            }
        }
        FlightRegime::Cruise => {
            if let (Some(gs), Some(alt)) = (snapshot.gs, altitude) {
                let expected = expected_cruise_speed(envelope, alt);
                let floor = expected * (1.0 - config.speed_tolerance);
                let ceiling = expected * (1.0 + config.speed_tolerance);
                if gs < floor {
                    let severity = if gs < expected * 0.6 {
                        Severity::High
                    } else if gs < expected * 0.8 {
                        Severity::Medium
                    } else {
                        Severity::Low
                    };
                    issues.push(issue(
                        "low-speed",
                        severity,
                        format!("{:.0} kt in cruise against {:.0} expected", gs, expected),
                        expected,
                        gs,
                    ));
                } else if gs > ceiling {
                    let severity = if gs > expected * 1.3 {
                        Severity::Medium
                    } else {
                        Severity::Low
                    };
                    issues.push(issue(
                        "excessive-speed",
                        severity,
                        format!("{:.0} kt in cruise against {:.0} expected", gs, expected),
                        expected,
                        gs,
                    ));
                }
            }
        }
        FlightRegime::Level | FlightRegime::GroundOrPattern => {}
    }

    if let Some(alt) = altitude {
        if alt > envelope.ceiling_ft {
            let severity = if alt > envelope.ceiling_ft + 2000.0 {
                Severity::High
            } else {
                Severity::Medium
            };
            issues.push(issue(
                "ceiling-exceeded",
                severity,
                format!("{:.0} ft above the {:.0} ft service ceiling", alt, envelope.ceiling_ft),
                envelope.ceiling_ft,
                alt,
            ));
        } else if alt > envelope.ceiling_ft * 0.95 && (0.0..300.0).contains(&baro_rate) {
            issues.push(issue(
                "near-ceiling-struggling",
                Severity::Low,
                format!("{:.0} ft near the ceiling with {:.0} fpm left", alt, baro_rate),
                envelope.ceiling_ft,
                alt,
            ));
        }
    }

    // A simultaneous loss of height and speed reads as a genuine
    // performance problem rather than a normal descent.
    if let Some(trajectory) = trajectory {
        let window = FieldQuery::window(Duration::minutes(3)).with_min(4);
        if let (Some(alt_stats), Some(gs_stats)) = (
            trajectory.stats(TrackField::Altitude, window),
            trajectory.stats(TrackField::GroundSpeed, window),
        ) {
            let altitude_drop = alt_stats.first - alt_stats.last;
            let speed_drop = gs_stats.first - gs_stats.last;
            if altitude_drop > 1000.0 && speed_drop > 50.0 {
                issues.push(issue(
                    "performance-degradation",
                    Severity::High,
                    format!(
                        "lost {:.0} ft and {:.0} kt together",
                        altitude_drop, speed_drop
                    ),
                    0.0,
                    altitude_drop,
                ));
            }
        }
    }

    (regime, issues)
}

/// Flags aircraft flying outside their category's performance envelope.
#[derive(Default)]
pub struct PerformanceFilter {
    config: PerformanceConfig,
    envelopes: HashMap<String, Envelope>,
}

impl Filter for PerformanceFilter {
    fn id(&self) -> &'static str {
        "performance"
    }

    fn priority(&self) -> i32 {
        60
    }

    fn configure(
        &mut self,
        config: &Config,
        _airports: &AirportIndex,
        _squawks: &SquawkTable,
    ) -> Result<()> {
        self.config = config.filters.performance.clone();
        self.envelopes = self.config.envelopes.clone();
        debug!(
            "performance filter configured with {} category envelopes",
            self.envelopes.len()
        );
        Ok(())
    }

    fn preprocess(
        &mut self,
        aircraft: &mut Aircraft,
        _peers: &Peers<'_>,
        ctx: &TickContext<'_>,
    ) -> Result<()> {
        aircraft.calculated.performance = Some(PerformanceAssessment::default());

        let envelope = aircraft
            .snapshot
            .category
            .and_then(|c| self.envelopes.get(c.as_str()))
            .unwrap_or(&self.config.default_envelope);

        let (regime, issues) = check_envelope(
            &aircraft.snapshot,
            aircraft.calculated.altitude_ft,
            envelope,
            &self.config,
            ctx.aircraft_data(&aircraft.hex),
        );
        let highest_severity = issues.iter().map(|i| i.severity).max();
        aircraft.calculated.performance = Some(PerformanceAssessment {
            has_issues: !issues.is_empty(),
            regime: Some(regime),
            issues,
            highest_severity,
        });
        Ok(())
    }

    fn evaluate(&self, aircraft: &Aircraft) -> bool {
        aircraft
            .calculated
            .performance
            .as_ref()
            .map(|p| p.has_issues)
            .unwrap_or(false)
    }

    fn sort(&self, a: &Aircraft, b: &Aircraft) -> Ordering {
        let severity = |x: &Aircraft| {
            x.calculated
                .performance
                .as_ref()
                .and_then(|p| p.highest_severity)
                .map(|s| s.rank())
                .unwrap_or(0)
        };
        severity(b).cmp(&severity(a)).then_with(|| {
            let distance = |x: &Aircraft| x.calculated.distance_km.unwrap_or(f64::MAX);
            distance(a)
                .partial_cmp(&distance(b))
                .unwrap_or(Ordering::Equal)
        })
    }

    fn stats(&self, _all: &[Aircraft], triggered: &[&Aircraft]) -> serde_json::Value {
        let mut by_kind: HashMap<&'static str, usize> = HashMap::new();
        for aircraft in triggered {
            if let Some(assessment) = &aircraft.calculated.performance {
                for i in &assessment.issues {
                    *by_kind.entry(i.kind).or_default() += 1;
                }
            }
        }
        serde_json::json!({
            "flagged": triggered.len(),
            "issues": by_kind,
        })
    }

    fn format(&self, aircraft: &Aircraft) -> AlertBody {
        let assessment = aircraft.calculated.performance.clone().unwrap_or_default();
        let kinds: Vec<&str> = assessment.issues.iter().map(|i| i.kind).collect();
        let text = format!("performance: {}", kinds.join(", "));
        AlertBody {
            text,
            warn: matches!(assessment.highest_severity, Some(Severity::High)),
            payload: serde_json::to_value(&assessment).unwrap_or(serde_json::Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Category, Emergency, TcasAlert};

    fn snapshot(category: Category, gs: f64, baro_rate: f64, alt: i32) -> AircraftSnapshot {
        AircraftSnapshot {
            hex: "4CA2D6".to_string(),
            flight: None,
            lat: 51.5,
            lon: -0.2,
            track: Some(90.0),
            gs: Some(gs),
            baro_rate: Some(baro_rate),
            track_rate: None,
            roll: None,
            alt_baro: Some(alt),
            alt_geom: None,
            squawk: None,
            emergency: Emergency::None,
            alert: TcasAlert::None,
            category: Some(category),
            seen_pos: Some(0.2),
        }
    }

    fn envelope_for(category: &str) -> Envelope {
        crate::config::PerformanceConfig::default()
            .envelopes
            .get(category)
            .copied()
            .unwrap()
    }

    #[test]
    fn test_regime_detection() {
        let climbing = snapshot(Category::A3, 250.0, 2000.0, 3000);
        assert_eq!(detect_regime(&climbing, Some(3000), None), FlightRegime::InitialClimb);

        let high_climb = snapshot(Category::A3, 400.0, 1500.0, 20_000);
        assert_eq!(
            detect_regime(&high_climb, Some(20_000), Some(15_000.0)),
            FlightRegime::CruiseClimb
        );
        assert_eq!(
            detect_regime(&high_climb, Some(20_000), Some(1000.0)),
            FlightRegime::InitialClimb,
            "recently near the ground means still in initial climb"
        );

        let approaching = snapshot(Category::A3, 180.0, -700.0, 4000);
        assert_eq!(detect_regime(&approaching, Some(4000), None), FlightRegime::Approach);

        let descending = snapshot(Category::A3, 320.0, -1800.0, 25_000);
        assert_eq!(detect_regime(&descending, Some(25_000), None), FlightRegime::Descent);

        let cruising = snapshot(Category::A3, 450.0, 0.0, 37_000);
        assert_eq!(detect_regime(&cruising, Some(37_000), None), FlightRegime::Cruise);
    }

    #[test]
    fn test_poor_climb_severity_scales() {
        let config = PerformanceConfig::default();
        let envelope = envelope_for("A3"); // expects 2500 fpm initial climb

        let weak = snapshot(Category::A3, 180.0, 800.0, 2000);
        let (_, issues) = check_envelope(&weak, Some(2000), &envelope, &config, None);
        let poor = issues.iter().find(|i| i.kind == "poor-climb").unwrap();
        assert_eq!(poor.severity, Severity::High, "800/2500 fpm is a severe shortfall");

        let mild = snapshot(Category::A3, 180.0, 1600.0, 2000);
        let (_, issues) = check_envelope(&mild, Some(2000), &envelope, &config, None);
        let poor = issues.iter().find(|i| i.kind == "poor-climb").unwrap();
        assert_eq!(poor.severity, Severity::Low);
    }

    #[test]
    fn test_healthy_climb_is_clean() {
        let config = PerformanceConfig::default();
        let envelope = envelope_for("A3");
        let healthy = snapshot(Category::A3, 200.0, 2400.0, 2500);
        let (regime, issues) = check_envelope(&healthy, Some(2500), &envelope, &config, None);
        assert_eq!(regime, FlightRegime::InitialClimb);
        assert!(issues.is_empty(), "normal climb must not flag: {:?}", issues);
    }

    #[test]
    fn test_excessive_climb_for_light_single() {
        let config = PerformanceConfig::default();
        let envelope = envelope_for("A1"); // expects 800 fpm initial climb
        let rocket = snapshot(Category::A1, 120.0, 2500.0, 2000);
        let (_, issues) = check_envelope(&rocket, Some(2000), &envelope, &config, None);
        let excessive = issues.iter().find(|i| i.kind == "excessive-climb").unwrap();
        assert_eq!(
            excessive.severity,
            Severity::High,
            "2500 fpm from a light single is more than 2.5x the envelope"
        );
    }

    #[test]
    fn test_cruise_speed_bands() {
        let config = PerformanceConfig::default();
        let envelope = envelope_for("A3");

        let slow = snapshot(Category::A3, 200.0, 0.0, 37_000);
        let (_, issues) = check_envelope(&slow, Some(37_000), &envelope, &config, None);
        let low = issues.iter().find(|i| i.kind == "low-speed").unwrap();
        assert_eq!(low.expected, envelope.cruise_speed_high_kt);
        assert_eq!(low.severity, Severity::High, "200/460 kt is far below band");

        let fast = snapshot(Category::A3, 520.0, 0.0, 37_000);
        let (_, issues) = check_envelope(&fast, Some(37_000), &envelope, &config, None);
        assert!(issues.iter().any(|i| i.kind == "excessive-speed"));
    }

    #[test]
    fn test_ceiling_exceeded() {
        let config = PerformanceConfig::default();
        let envelope = envelope_for("A1"); // 14 000 ft ceiling
        let high = snapshot(Category::A1, 130.0, 0.0, 17_500);
        let (_, issues) = check_envelope(&high, Some(17_500), &envelope, &config, None);
        let exceeded = issues.iter().find(|i| i.kind == "ceiling-exceeded").unwrap();
        assert_eq!(exceeded.severity, Severity::High);
    }

    #[test]
    fn test_performance_degradation_from_trajectory() {
        use chrono::{TimeZone, Utc};
        let config = PerformanceConfig::default();
        let envelope = envelope_for("A3");

        let mut trajectory = TrajectoryStore::default();
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        // Losing 1500 ft and 80 kt across two minutes.
        for (i, (alt, gs)) in [
            (9000, 280.0),
            (8600, 260.0),
            (8200, 240.0),
            (7900, 220.0),
            (7500, 200.0),
        ]
        .iter()
        .enumerate()
        {
            trajectory.append(
                base + chrono::Duration::seconds(i as i64 * 30),
                snapshot(Category::A3, *gs, -200.0, *alt),
            );
        }

        let current = snapshot(Category::A3, 200.0, -200.0, 7500);
        let (_, issues) =
            check_envelope(&current, Some(7500), &envelope, &config, Some(&trajectory));
        assert!(
            issues.iter().any(|i| i.kind == "performance-degradation"),
            "combined altitude and speed loss must flag, got {:?}",
            issues
        );
    }
}

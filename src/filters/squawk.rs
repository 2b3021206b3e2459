//! Squawk classification and cross-field anomaly detection.
//!
//! Matches each aircraft's squawk against the allocation table, flags
//! watchlisted codes and watched allocation kinds, and runs a battery of
//! cross-field checks that catch combinations the transponder alone cannot
//! justify (an emergency code in placid level flight, a surface vehicle
//! category doing 300 kt, a helicopter allocation on a fixed-wing aircraft).

use std::cmp::Ordering;
use std::collections::HashSet;

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::aircraft::Aircraft;
use crate::airports::AirportIndex;
use crate::alerts::AlertBody;
use crate::config::{Config, SquawkConfig};
use crate::pipeline::{Filter, Peers, TickContext};
use crate::snapshot::AircraftSnapshot;
use crate::squawks::{Squawk, SquawkKind, SquawkRange, SquawkTable};

/// Callsign prefixes that identify military traffic for the
/// civilian-on-military-squawk check.
const MILITARY_CALLSIGN_PREFIXES: &[&str] = &[
    "RRR", "ASCOT", "RFR", "NAVY", "ARMY", "REACH", "CFC", "KIWI", "AAC", "RCH", "VVAC",
];

/// ICAO hex addresses that cannot belong to a real airframe.
const INVALID_HEXCODES: &[&str] = &["000000", "FFFFFF", "123456", "ABCDEF"];

pub use crate::alerts::Severity;

/// One cross-field inconsistency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    /// Stable anomaly identifier, e.g. "emergency-squawk-no-flag".
    pub kind: &'static str,
    pub severity: Severity,
    pub confidence: f64,
    pub description: String,
    /// The snapshot fields the rule examined.
    pub fields: Vec<&'static str>,
    /// The offending values.
    pub values: serde_json::Value,
}

/// Result slot written by [`SquawkFilter::preprocess`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SquawkAssessment {
    /// Sentinel: false until a watched code or anomaly is found.
    pub interesting: bool,
    pub watchlisted: bool,
    /// Allocation ranges covering the squawk.
    pub matches: Vec<SquawkRange>,
    pub anomalies: Vec<Anomaly>,
    pub highest_severity: Option<Severity>,
}

/// Presentation priority of a literal code; lower sorts first.
fn code_priority(code: Squawk) -> u8 {
    match code.as_str() {
        "7500" | "7600" | "7700" => 1,
        "0020" | "0023" => 2,
        "7001" | "7002" | "7003" | "7004" => 3,
        _ => 9,
    }
}

/// Presentation priority of an allocation kind; lower sorts first.
fn kind_priority(kind: SquawkKind) -> u8 {
    match kind {
        SquawkKind::Emergency => 1,
        SquawkKind::Sar => 2,
        SquawkKind::Hems => 3,
        SquawkKind::Police => 4,
        SquawkKind::Royal => 5,
        SquawkKind::Government => 6,
        SquawkKind::Military => 7,
        SquawkKind::Special => 8,
        SquawkKind::DangerArea => 9,
        SquawkKind::Display => 10,
        SquawkKind::Uas => 11,
        SquawkKind::Helicopter => 12,
        SquawkKind::Monitoring => 13,
        SquawkKind::Conspicuity => 14,
        _ => 20,
    }
}

fn has_military_identity(snapshot: &AircraftSnapshot) -> bool {
    if let Some(callsign) = snapshot.callsign()
        && MILITARY_CALLSIGN_PREFIXES
            .iter()
            .any(|p| callsign.starts_with(p))
    {
        return true;
    }
    // UK military ICAO allocation block.
    snapshot.hex.to_uppercase().starts_with("43C")
}

fn anomaly(
    kind: &'static str,
    severity: Severity,
    confidence: f64,
    description: String,
    fields: Vec<&'static str>,
    values: serde_json::Value,
) -> Anomaly {
    Anomaly {
        kind,
        severity,
        confidence,
        description,
        fields,
        values,
    }
}

/// Run every cross-field anomaly rule for one aircraft.
pub fn detect_anomalies(
    snapshot: &AircraftSnapshot,
    altitude_ft: Option<i32>,
    matches: &[SquawkRange],
) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();
    let code = snapshot.squawk;
    let kinds: HashSet<SquawkKind> = matches.iter().map(|m| m.kind).collect();
    let has_operational_data =
        snapshot.gs.is_some() || snapshot.track.is_some() || snapshot.baro_rate.is_some();

    if let Some(code) = code {
        if code.as_str() == "0002"
            && let Some(alt) = altitude_ft
            && alt > 500
        {
            anomalies.push(anomaly(
                "ground-testing-airborne",
                Severity::High,
                0.9,
                format!("ground-testing code 0002 at {} ft", alt),
                vec!["squawk", "alt_baro"],
                serde_json::json!({"squawk": "0002", "altitude_ft": alt}),
            ));
        }

        if kinds.contains(&SquawkKind::Military) && !has_military_identity(snapshot) {
            anomalies.push(anomaly(
                "military-squawk-civilian",
                Severity::Medium,
                0.6,
                format!("military range code {} without military identity", code),
                vec!["squawk", "flight", "hex"],
                serde_json::json!({"squawk": code, "flight": snapshot.callsign(), "hex": snapshot.hex}),
            ));
        }

        if code.as_str() == "7000"
            && let Some(alt) = altitude_ft
            && alt > 20_000
        {
            anomalies.push(anomaly(
                "vfr-conspicuity-high-altitude",
                Severity::Medium,
                0.7,
                format!("VFR conspicuity 7000 at {} ft", alt),
                vec!["squawk", "alt_baro"],
                serde_json::json!({"squawk": "7000", "altitude_ft": alt}),
            ));
        }

        if code.as_str() == "2000"
            && let Some(alt) = altitude_ft
            && alt < 1000
        {
            anomalies.push(anomaly(
                "ifr-conspicuity-low-altitude",
                Severity::Low,
                0.5,
                format!("IFR conspicuity 2000 at {} ft", alt),
                vec!["squawk", "alt_baro"],
                serde_json::json!({"squawk": "2000", "altitude_ft": alt}),
            ));
        }

        if code.is_emergency_code() && !snapshot.emergency.is_declared() {
            anomalies.push(anomaly(
                "emergency-squawk-no-flag",
                Severity::High,
                0.9,
                format!("emergency code {} without an emergency flag", code),
                vec!["squawk", "emergency"],
                serde_json::json!({"squawk": code, "emergency": snapshot.emergency}),
            ));
        }

        if code.as_str() == "7003"
            && let Some(gs) = snapshot.gs
            && gs < 200.0
        {
            anomalies.push(anomaly(
                "display-code-low-speed",
                Severity::Medium,
                0.6,
                format!("display code 7003 at {:.0} kt", gs),
                vec!["squawk", "gs"],
                serde_json::json!({"squawk": "7003", "gs": gs}),
            ));
        }

        if kinds.contains(&SquawkKind::Royal)
            && let Some(alt) = altitude_ft
            && alt > 30_000
        {
            anomalies.push(anomaly(
                "royal-flight-high-altitude",
                Severity::Low,
                0.4,
                format!("royal allocation {} at {} ft", code, alt),
                vec!["squawk", "alt_baro"],
                serde_json::json!({"squawk": code, "altitude_ft": alt}),
            ));
        }

        if code.as_str() == "7004" {
            if let Some(rate) = snapshot.baro_rate
                && rate.abs() < 300.0
            {
                anomalies.push(anomaly(
                    "aerobatics-level-flight",
                    Severity::Medium,
                    0.6,
                    "aerobatics code 7004 in level flight".to_string(),
                    vec!["squawk", "baro_rate"],
                    serde_json::json!({"squawk": "7004", "baro_rate": rate}),
                ));
            }
            if let Some(alt) = altitude_ft
                && alt > 20_000
            {
                anomalies.push(anomaly(
                    "aerobatics-high-altitude",
                    Severity::High,
                    0.8,
                    format!("aerobatics code 7004 at {} ft", alt),
                    vec!["squawk", "alt_baro"],
                    serde_json::json!({"squawk": "7004", "altitude_ft": alt}),
                ));
            }
        }

        let helicopter_allocation =
            kinds.contains(&SquawkKind::Helicopter) || kinds.contains(&SquawkKind::Hems);
        if helicopter_allocation
            && let Some(category) = snapshot.category
            && !category.is_rotorcraft()
        {
            // HEMS codes legitimately appear on light fixed-wing air
            // ambulances.
            let hems_on_light = kinds.contains(&SquawkKind::Hems)
                && matches!(category.as_str(), "A1" | "A2");
            if !hems_on_light {
                anomalies.push(anomaly(
                    "helicopter-code-fixed-wing",
                    Severity::High,
                    0.8,
                    format!("helicopter allocation {} on category {}", code, category),
                    vec!["squawk", "category"],
                    serde_json::json!({"squawk": code, "category": category}),
                ));
            }
        }

        if code.as_str() == "7000"
            && snapshot.category.map(|c| c.is_uav()).unwrap_or(false)
        {
            anomalies.push(anomaly(
                "uav-vfr-conspicuity",
                Severity::High,
                0.8,
                "UAV squawking VFR conspicuity 7000".to_string(),
                vec!["squawk", "category"],
                serde_json::json!({"squawk": "7000", "category": "B6"}),
            ));
        }

        if code.is_emergency_code() {
            let level = snapshot.baro_rate.map(|r| r.abs() < 500.0).unwrap_or(true);
            let straight = snapshot.track_rate.map(|r| r.abs() < 3.0).unwrap_or(true);
            if level && straight {
                anomalies.push(anomaly(
                    "emergency-squawk-stable-flight",
                    Severity::Medium,
                    0.5,
                    format!("emergency code {} in stable flight", code),
                    vec!["squawk", "baro_rate", "track_rate"],
                    serde_json::json!({
                        "squawk": code,
                        "baro_rate": snapshot.baro_rate,
                        "track_rate": snapshot.track_rate,
                    }),
                ));
            }
        }
    }

    if let Some(category) = snapshot.category
        && category.is_surface_vehicle()
    {
        let airborne = altitude_ft.map(|a| a > 100).unwrap_or(false);
        let fast = snapshot.gs.map(|g| g > 80.0).unwrap_or(false);
        if airborne || fast {
            anomalies.push(anomaly(
                "surface-vehicle-airborne",
                Severity::High,
                0.9,
                format!("surface vehicle category {} with flight data", category),
                vec!["category", "alt_baro", "gs"],
                serde_json::json!({
                    "category": category,
                    "altitude_ft": altitude_ft,
                    "gs": snapshot.gs,
                }),
            ));
        }
    }

    if INVALID_HEXCODES.contains(&snapshot.hex.to_uppercase().as_str()) && has_operational_data {
        anomalies.push(anomaly(
            "invalid-hexcode",
            Severity::High,
            0.9,
            format!("impossible ICAO address {}", snapshot.hex),
            vec!["hex"],
            serde_json::json!({"hex": snapshot.hex}),
        ));
    }

    if let Some(callsign) = snapshot.callsign() {
        let hex_upper = snapshot.hex.to_uppercase();
        if callsign.eq_ignore_ascii_case(&hex_upper)
            || callsign.eq_ignore_ascii_case(&format!("[{}]", hex_upper))
        {
            anomalies.push(anomaly(
                "callsign-matches-hex",
                Severity::Low,
                0.4,
                format!("callsign {} mirrors the hex address", callsign),
                vec!["flight", "hex"],
                serde_json::json!({"flight": callsign, "hex": snapshot.hex}),
            ));
        }
    }

    anomalies
}

/// Flags watched squawks and cross-field anomalies.
#[derive(Default)]
pub struct SquawkFilter {
    config: SquawkConfig,
    table: SquawkTable,
    table_missing: bool,
}

impl Filter for SquawkFilter {
    fn id(&self) -> &'static str {
        "squawk"
    }

    fn priority(&self) -> i32 {
        20
    }

    fn configure(
        &mut self,
        config: &Config,
        _airports: &AirportIndex,
        squawks: &SquawkTable,
    ) -> Result<()> {
        self.config = config.filters.squawk.clone();
        self.table = squawks.clone();
        self.table_missing = squawks.is_empty();
        if self.table_missing {
            warn!("squawk filter configured without a squawk table; anomaly checks only");
        } else {
            info!(
                "squawk filter configured: {} ranges, {} watchlisted codes",
                squawks.len(),
                self.config.watchlist.len()
            );
        }
        Ok(())
    }

    fn preprocess(
        &mut self,
        aircraft: &mut Aircraft,
        _peers: &Peers<'_>,
        _ctx: &TickContext<'_>,
    ) -> Result<()> {
        aircraft.calculated.squawk = Some(SquawkAssessment::default());

        let matches: Vec<SquawkRange> = match aircraft.snapshot.squawk {
            Some(code) if !self.table_missing => self
                .table
                .find_by_code(code)
                .into_iter()
                .cloned()
                .collect(),
            _ => Vec::new(),
        };

        let watchlisted = aircraft
            .snapshot
            .squawk
            .map(|code| self.config.watchlist.contains(&code))
            .unwrap_or(false);
        let watched_kind = matches
            .iter()
            .any(|m| self.config.watched_kinds.contains(&m.kind));

        let anomalies = detect_anomalies(
            &aircraft.snapshot,
            aircraft.calculated.altitude_ft,
            &matches,
        );
        let highest_severity = anomalies.iter().map(|a| a.severity).max();

        aircraft.calculated.squawk = Some(SquawkAssessment {
            interesting: watchlisted || watched_kind || highest_severity.is_some(),
            watchlisted,
            matches,
            anomalies,
            highest_severity,
        });
        Ok(())
    }

    fn evaluate(&self, aircraft: &Aircraft) -> bool {
        aircraft
            .calculated
            .squawk
            .as_ref()
            .map(|s| s.interesting)
            .unwrap_or(false)
    }

    fn sort(&self, a: &Aircraft, b: &Aircraft) -> Ordering {
        let key = |aircraft: &Aircraft| {
            let assessment = aircraft.calculated.squawk.as_ref();
            let severity = assessment
                .and_then(|s| s.highest_severity)
                .map(|s| s.rank())
                .unwrap_or(0);
            let code = aircraft
                .snapshot
                .squawk
                .map(code_priority)
                .unwrap_or(u8::MAX);
            let kind = assessment
                .map(|s| {
                    s.matches
                        .iter()
                        .map(|m| kind_priority(m.kind))
                        .min()
                        .unwrap_or(u8::MAX)
                })
                .unwrap_or(u8::MAX);
            (severity, code, kind)
        };
        let (sev_a, code_a, kind_a) = key(a);
        let (sev_b, code_b, kind_b) = key(b);
        sev_b
            .cmp(&sev_a)
            .then(code_a.cmp(&code_b))
            .then(kind_a.cmp(&kind_b))
            .then_with(|| {
                let distance = |x: &Aircraft| x.calculated.distance_km.unwrap_or(f64::MAX);
                distance(a)
                    .partial_cmp(&distance(b))
                    .unwrap_or(Ordering::Equal)
            })
    }

    fn stats(&self, _all: &[Aircraft], triggered: &[&Aircraft]) -> serde_json::Value {
        let mut high = 0usize;
        let mut medium = 0usize;
        let mut low = 0usize;
        let mut watchlisted = 0usize;
        for aircraft in triggered {
            if let Some(assessment) = &aircraft.calculated.squawk {
                if assessment.watchlisted {
                    watchlisted += 1;
                }
                match assessment.highest_severity {
                    Some(Severity::High) => high += 1,
                    Some(Severity::Medium) => medium += 1,
                    Some(Severity::Low) => low += 1,
                    None => {}
                }
            }
        }
        serde_json::json!({
            "flagged": triggered.len(),
            "watchlisted": watchlisted,
            "anomalies": {"high": high, "medium": medium, "low": low},
        })
    }

    fn format(&self, aircraft: &Aircraft) -> AlertBody {
        let assessment = aircraft.calculated.squawk.clone().unwrap_or_default();
        let code = aircraft
            .snapshot
            .squawk
            .map(|s| s.to_string())
            .unwrap_or_else(|| "----".to_string());
        let kinds: Vec<String> = assessment
            .matches
            .iter()
            .map(|m| m.kind.to_string())
            .collect();
        let mut text = if kinds.is_empty() {
            format!("squawk {}", code)
        } else {
            format!("squawk {} ({})", code, kinds.join(", "))
        };
        if !assessment.anomalies.is_empty() {
            text.push_str(&format!(
                ", {} anomal{}",
                assessment.anomalies.len(),
                if assessment.anomalies.len() == 1 { "y" } else { "ies" }
            ));
        }
        let warn = matches!(assessment.highest_severity, Some(Severity::High))
            || assessment
                .matches
                .iter()
                .any(|m| m.kind == SquawkKind::Emergency);
        AlertBody {
            text,
            warn,
            payload: serde_json::to_value(&assessment).unwrap_or(serde_json::Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Category, Emergency, TcasAlert};

    fn snapshot(hex: &str, squawk: Option<&str>) -> AircraftSnapshot {
        AircraftSnapshot {
            hex: hex.to_string(),
            flight: Some("EZY45X".to_string()),
            lat: 51.5,
            lon: -0.2,
            track: Some(180.0),
            gs: Some(250.0),
            baro_rate: Some(100.0),
            track_rate: Some(1.0),
            roll: None,
            alt_baro: Some(15_000),
            alt_geom: None,
            squawk: squawk.map(|s| Squawk::parse(s).unwrap()),
            emergency: Emergency::None,
            alert: TcasAlert::None,
            category: Some(Category::A3),
            seen_pos: Some(0.2),
        }
    }

    fn emergency_range() -> SquawkRange {
        SquawkRange {
            begin: Squawk::parse("7700").unwrap(),
            end: None,
            kind: SquawkKind::Emergency,
            description: vec!["general emergency".to_string()],
        }
    }

    #[test]
    fn test_emergency_code_without_flag_raises_both_anomalies() {
        let s = snapshot("39AC45", Some("7700"));
        let anomalies = detect_anomalies(&s, Some(15_000), &[emergency_range()]);

        let kinds: Vec<&str> = anomalies.iter().map(|a| a.kind).collect();
        assert!(
            kinds.contains(&"emergency-squawk-no-flag"),
            "missing no-flag anomaly, got {:?}",
            kinds
        );
        assert!(
            kinds.contains(&"emergency-squawk-stable-flight"),
            "missing stable-flight anomaly, got {:?}",
            kinds
        );
        let highest = anomalies.iter().map(|a| a.severity).max().unwrap();
        assert_eq!(highest, Severity::High);
    }

    #[test]
    fn test_declared_emergency_suppresses_no_flag() {
        let mut s = snapshot("39AC45", Some("7700"));
        s.emergency = Emergency::General;
        s.baro_rate = Some(-2500.0);
        s.track_rate = Some(5.0);
        let anomalies = detect_anomalies(&s, Some(15_000), &[emergency_range()]);
        assert!(
            anomalies.iter().all(|a| a.kind != "emergency-squawk-no-flag"),
            "declared emergency must not raise the no-flag anomaly"
        );
        assert!(
            anomalies
                .iter()
                .all(|a| a.kind != "emergency-squawk-stable-flight"),
            "a diving, turning emergency is not stable flight"
        );
    }

    #[test]
    fn test_vfr_conspicuity_high_altitude() {
        let mut s = snapshot("4CA2D6", Some("7000"));
        s.alt_baro = Some(31_000);
        let anomalies = detect_anomalies(&s, Some(31_000), &[]);
        let found = anomalies
            .iter()
            .find(|a| a.kind == "vfr-conspicuity-high-altitude")
            .expect("7000 at FL310 must flag");
        assert_eq!(found.severity, Severity::Medium);
    }

    #[test]
    fn test_surface_vehicle_with_flight_data() {
        let mut s = snapshot("4CA2D6", None);
        s.category = Some(Category::C1);
        s.gs = Some(140.0);
        let anomalies = detect_anomalies(&s, Some(50), &[]);
        assert!(anomalies.iter().any(|a| a.kind == "surface-vehicle-airborne"));
    }

    #[test]
    fn test_uav_on_vfr_conspicuity() {
        let mut s = snapshot("4CA2D6", Some("7000"));
        s.category = Some(Category::B6);
        s.alt_baro = Some(400);
        let anomalies = detect_anomalies(&s, Some(400), &[]);
        assert!(anomalies.iter().any(|a| a.kind == "uav-vfr-conspicuity"));
    }

    #[test]
    fn test_invalid_hex_with_operational_data() {
        let s = snapshot("ABCDEF", None);
        let anomalies = detect_anomalies(&s, Some(15_000), &[]);
        let found = anomalies
            .iter()
            .find(|a| a.kind == "invalid-hexcode")
            .expect("test pattern hex must flag");
        assert_eq!(found.severity, Severity::High);
    }

    #[test]
    fn test_callsign_mirroring_hex() {
        let mut s = snapshot("4CA2D6", None);
        s.flight = Some("4CA2D6".to_string());
        let anomalies = detect_anomalies(&s, Some(15_000), &[]);
        assert!(anomalies.iter().any(|a| a.kind == "callsign-matches-hex"));
    }

    #[test]
    fn test_military_squawk_on_civilian() {
        let military = SquawkRange {
            begin: Squawk::parse("7400").unwrap(),
            end: Some(Squawk::parse("7407").unwrap()),
            kind: SquawkKind::Military,
            description: vec![],
        };
        let s = snapshot("4CA2D6", Some("7402"));
        let anomalies = detect_anomalies(&s, Some(15_000), &[military.clone()]);
        assert!(anomalies.iter().any(|a| a.kind == "military-squawk-civilian"));

        // A military callsign clears it.
        let mut mil = snapshot("4CA2D6", Some("7402"));
        mil.flight = Some("RRR4810".to_string());
        let anomalies = detect_anomalies(&mil, Some(15_000), &[military]);
        assert!(anomalies.iter().all(|a| a.kind != "military-squawk-civilian"));
    }

    #[test]
    fn test_hems_allowed_on_light_fixed_wing() {
        let hems = SquawkRange {
            begin: Squawk::parse("0020").unwrap(),
            end: None,
            kind: SquawkKind::Hems,
            description: vec![],
        };
        let mut s = snapshot("4CA2D6", Some("0020"));
        s.category = Some(Category::A1);
        let anomalies = detect_anomalies(&s, Some(2000), &[hems.clone()]);
        assert!(
            anomalies.iter().all(|a| a.kind != "helicopter-code-fixed-wing"),
            "HEMS on a light fixed-wing is legitimate"
        );

        s.category = Some(Category::A3);
        let anomalies = detect_anomalies(&s, Some(2000), &[hems]);
        assert!(anomalies.iter().any(|a| a.kind == "helicopter-code-fixed-wing"));
    }

    #[test]
    fn test_sort_emergency_ahead_of_conspicuity() {
        use crate::aircraft::AircraftTable;
        use chrono::{TimeZone, Utc};

        let table = SquawkTable::new(vec![
            emergency_range(),
            SquawkRange {
                begin: Squawk::parse("7000").unwrap(),
                end: None,
                kind: SquawkKind::Conspicuity,
                description: vec![],
            },
        ]);

        let mut filter = SquawkFilter::default();
        let config = Config::default();
        filter
            .configure(&config, &AirportIndex::new(vec![]), &table)
            .unwrap();

        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let mut aircraft_table = AircraftTable::new(5);
        aircraft_table.apply(now, vec![
            snapshot("AAAAA1", Some("7000")),
            snapshot("39AC45", Some("7700")),
        ]);

        let airports = AirportIndex::new(vec![]);
        let trajectories = std::collections::HashMap::new();
        let ctx = TickContext::new(
            now,
            crate::config::Observer::default(),
            &airports,
            &table,
            &trajectories,
        );
        for i in 0..aircraft_table.aircraft().len() {
            let list = aircraft_table.aircraft_mut();
            let (before, rest) = list.split_at_mut(i);
            let (current, after) = rest.split_first_mut().unwrap();
            let peers = Peers::from_slices(before, after);
            filter.preprocess(current, &peers, &ctx).unwrap();
        }

        let list = aircraft_table.aircraft();
        let emergency = list.iter().find(|a| a.hex == "39AC45").unwrap();
        let conspicuity = list.iter().find(|a| a.hex == "AAAAA1").unwrap();
        assert_eq!(
            filter.sort(emergency, conspicuity),
            Ordering::Less,
            "the 7700 aircraft must sort ahead of the plain 7000 match"
        );
        assert_eq!(
            emergency
                .calculated
                .squawk
                .as_ref()
                .unwrap()
                .highest_severity,
            Some(Severity::High)
        );
    }
}

//! End-to-end detector scenarios, driven through the engine from feed
//! snapshots to delivered alerts.

mod common;

use common::{RecordingSink, engine_with, feed, snapshot, squawk_table};
use skywatch::airports::{Airport, AirportIndex, AirportType, Runway};
use skywatch::alerts::{AlertEvent, AlertSub};
use skywatch::config::Config;
use skywatch::filters::airport::FlightPhase;
use skywatch::geometry;
use skywatch::snapshot::{AircraftSnapshot, Category};
use skywatch::squawks::Squawk;

fn insert_items<'a>(
    events: &'a [AlertEvent],
    filter: &str,
) -> Vec<&'a skywatch::alerts::Alert> {
    events
        .iter()
        .filter_map(|event| match event {
            AlertEvent::Alerts { filter_id, sub: AlertSub::Insert, items }
                if filter_id == filter =>
            {
                Some(items.iter().collect::<Vec<_>>())
            }
            _ => None,
        })
        .flatten()
        .collect()
}

/// S1: an aircraft west of the observer tracking due east at 300 kt and
/// 8000 ft is reported as an overhead intercept approaching from the
/// west-southwest.
#[test]
fn overhead_intercept_from_the_west() {
    let mut config = Config::default();
    config.filters.overhead.radius_km = 8.0;

    let mut engine = engine_with(config, AirportIndex::new(vec![]), squawk_table());
    let mut aircraft = snapshot("4CA2D6", 51.45, -0.30);
    aircraft.track = Some(90.0);
    aircraft.gs = Some(300.0);
    aircraft.alt_baro = Some(8000);
    aircraft.baro_rate = Some(0.0);

    let report = engine.process_snapshot(feed(0, vec![aircraft])).unwrap();
    let alerts = insert_items(&report.outcome.events, "overhead");
    assert_eq!(alerts.len(), 1, "the eastbound pass must raise an overhead alert");

    let payload = &alerts[0].payload;
    assert_eq!(payload["will_intersect"], true);
    assert_eq!(payload["overhead_future"], true);

    let seconds = payload["overhead_seconds"].as_f64().unwrap();
    let along_km = payload["along_track_km"].as_f64().unwrap();
    let expected = along_km / (300.0 * 1.852 / 3600.0);
    assert!(
        (seconds - expected).abs() < 1.0,
        "overhead in ~{:.0}s, reported {:.0}s",
        expected,
        seconds
    );
    let cardinal = payload["approach_cardinal"].as_str().unwrap();
    assert!(
        cardinal == "W" || cardinal == "WSW",
        "approach from the west expected, got {}",
        cardinal
    );
    assert!(payload["vertical_angle_deg"].as_f64().unwrap() > 0.0);
}

fn lydd() -> Airport {
    Airport {
        icao_code: "EGMD".to_string(),
        iata_code: None,
        name: "Lydd".to_string(),
        airport_type: AirportType::MediumAirport,
        latitude_deg: 50.956,
        longitude_deg: 0.939,
        elevation_ft: Some(13),
        runways: vec![Runway {
            le_ident: "03".to_string(),
            le_heading_deg_t: Some(32.0),
            le_latitude_deg: Some(50.949),
            le_longitude_deg: Some(0.932),
            he_ident: "21".to_string(),
            he_heading_deg_t: Some(212.0),
            he_latitude_deg: Some(50.963),
            he_longitude_deg: Some(0.945),
            length_ft: Some(4921),
            width_ft: Some(121),
            surface: Some("ASP".to_string()),
            lighted: true,
            closed: false,
        }],
        frequencies: vec![],
    }
}

/// S2: a descent to 900 ft by an airport followed by a 1100 fpm climb-out
/// classifies as a high-confidence go-around.
#[test]
fn go_around_detected_with_high_confidence() {
    let mut config = Config::default();
    config.observer.lat = 50.95;
    config.observer.lon = 0.90;
    let mut engine = engine_with(config, AirportIndex::new(vec![lydd()]), squawk_table());

    let profile: [(i32, f64); 8] = [
        (2800, -800.0),
        (2400, -800.0),
        (1700, -900.0),
        (1100, -700.0),
        (900, -200.0),
        (1200, 800.0),
        (1700, 1000.0),
        (2100, 1100.0),
    ];
    let mut last_report = None;
    for (i, (alt, rate)) in profile.iter().enumerate() {
        // Hold position ~4 km from the field on the runway 03 approach.
        let mut s = snapshot("405A4B", 50.93, 0.92);
        s.track = Some(30.0);
        s.gs = Some(130.0);
        s.alt_baro = Some(*alt);
        s.baro_rate = Some(*rate);
        s.category = Some(Category::A1);
        last_report = engine.process_snapshot(feed(i as i64 * 15, vec![s]));
    }
    let report = last_report.expect("at least one tick processed");
    assert!(report.outcome.status.filters["airports"].count >= 1);

    let alerts = insert_items(&report.outcome.events, "airports");
    // The aircraft has been alerting since tick 1 (it is inside the ATZ),
    // so the final tick carries no new insert; read the live assessment.
    assert!(alerts.is_empty());
    let aircraft = &engine.aircraft()[0];
    let airports = aircraft.calculated.airports.as_ref().unwrap();
    let at_lydd = airports.nearby.iter().find(|a| a.icao == "EGMD").unwrap();
    assert_eq!(at_lydd.phase, Some(FlightPhase::GoAround));
    assert!(
        at_lydd.phase_confidence >= 0.9,
        "V-profile with low bottom and strong climb: got {}",
        at_lydd.phase_confidence
    );
}

/// S3: ten minutes of orbiting inside a 4 km circle at 3500 ft scores as
/// loitering with a circling pattern.
#[test]
fn circling_loiter_detected() {
    let mut engine = engine_with(Config::default(), AirportIndex::new(vec![]), squawk_table());
    let center = (51.60, -0.20);

    let mut inserted = Vec::new();
    for i in 0..30 {
        let angle = (i as f64) * 31.0;
        let mut s = snapshot("43BFDD", 0.0, 0.0);
        s.lat = center.0 + (2.0 / 111.0) * angle.to_radians().cos();
        s.lon = center.1
            + (2.0 / (111.0 * center.0.to_radians().cos())) * angle.to_radians().sin();
        s.track = Some(geometry::normalize_360(angle + 90.0));
        s.gs = Some(110.0);
        s.alt_baro = Some(3500);
        s.category = Some(Category::A1);

        let report = engine.process_snapshot(feed(i * 20, vec![s])).unwrap();
        inserted.extend(
            insert_items(&report.outcome.events, "loitering")
                .into_iter()
                .cloned(),
        );
    }

    assert_eq!(inserted.len(), 1, "the orbit must raise exactly one loitering alert");
    let payload = &inserted[0].payload;
    assert_eq!(payload["pattern"], "circling");
    assert!(payload["score"].as_f64().unwrap() >= 0.7);

    // By the final tick the live assessment covers the whole ten minutes.
    let assessment = engine.aircraft()[0].calculated.loitering.as_ref().unwrap();
    assert!(
        (8.5..=10.5).contains(&assessment.duration_min),
        "orbit lasted ~10 minutes, reported {:.1}",
        assessment.duration_min
    );
}

/// S4: a 0.2 nm head-on pair at the same level is category A and sorts
/// ahead of a 0.8 nm crossing pair.
#[test]
fn airprox_category_a_sorts_first() {
    let mut engine = engine_with(Config::default(), AirportIndex::new(vec![]), squawk_table());

    let sep_02 = 0.2 * 1.852 / 111.32;
    let sep_08 = 0.8 * 1.852 / 111.32;
    let mut pair = Vec::new();

    // Head-on pair at FL050, 0.2 nm apart.
    let mut a1 = snapshot("AAA001", 50.0, 0.0);
    a1.track = Some(90.0);
    a1.gs = Some(250.0);
    a1.alt_baro = Some(5000);
    let mut a2 = snapshot("AAA002", 50.0, sep_02 / 50.0_f64.to_radians().cos());
    a2.track = Some(270.0);
    a2.gs = Some(250.0);
    a2.alt_baro = Some(5000);
    pair.push(a1);
    pair.push(a2);

    // Crossing pair at FL050, 0.8 nm apart, far from the first pair.
    let mut b1 = snapshot("BBB001", 52.0, 2.0);
    b1.track = Some(0.0);
    b1.gs = Some(220.0);
    b1.alt_baro = Some(5000);
    let mut b2 = snapshot("BBB002", 52.0, 2.0 + sep_08 / 52.0_f64.to_radians().cos());
    b2.track = Some(270.0);
    b2.gs = Some(220.0);
    b2.alt_baro = Some(5000);
    pair.push(b1);
    pair.push(b2);

    let report = engine.process_snapshot(feed(0, pair)).unwrap();
    let alerts = insert_items(&report.outcome.events, "airprox");
    assert_eq!(alerts.len(), 4, "both aircraft of both pairs alert");

    let first = &alerts[0];
    assert!(
        first.hex.starts_with("AAA"),
        "the category A pair must lead the report, got {}",
        first.hex
    );
    assert_eq!(first.payload["category"], "A");
    assert_eq!(first.payload["is_converging"], true);
    assert!(first.payload["time_to_cpa_s"].as_f64().unwrap() > 0.0);
    assert!(first.warn, "category A is a warning-level alert");

    let last = &alerts[3];
    assert!(last.hex.starts_with("BBB"));
}

/// S5: an emergency squawk without the emergency flag raises both
/// cross-field anomalies and sorts ahead of a plain conspicuity anomaly.
#[test]
fn emergency_squawk_anomalies() {
    let mut engine = engine_with(Config::default(), AirportIndex::new(vec![]), squawk_table());

    let mut silent_emergency = snapshot("39AC45", 51.9, -0.8);
    silent_emergency.track = Some(350.0);
    silent_emergency.squawk = Some(Squawk::parse("7700").unwrap());
    silent_emergency.baro_rate = Some(100.0);
    silent_emergency.track_rate = Some(1.0);

    let mut high_vfr = snapshot("4CA2D6", 52.4, -1.4);
    high_vfr.track = Some(350.0);
    high_vfr.squawk = Some(Squawk::parse("7000").unwrap());
    high_vfr.alt_baro = Some(25_000);

    let report = engine
        .process_snapshot(feed(0, vec![high_vfr, silent_emergency]))
        .unwrap();
    let alerts = insert_items(&report.outcome.events, "squawk");
    assert_eq!(alerts.len(), 2);
    assert_eq!(
        alerts[0].hex, "39AC45",
        "the emergency anomaly must sort ahead of the conspicuity one"
    );
    assert!(alerts[0].warn);

    let payload = &alerts[0].payload;
    assert_eq!(payload["highest_severity"], "high");
    let kinds: Vec<&str> = payload["anomalies"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["kind"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"emergency-squawk-no-flag"));
    assert!(kinds.contains(&"emergency-squawk-stable-flight"));
}

/// Alerts are delivered to every sink in pipeline order.
#[test]
fn delivery_reaches_all_sinks() {
    let mut engine = engine_with(Config::default(), AirportIndex::new(vec![]), squawk_table());
    let sink_a = RecordingSink::default();
    let sink_b = RecordingSink::default();
    engine.add_sink(Box::new(sink_a.clone()));
    engine.add_sink(Box::new(sink_b.clone()));

    let mut s = snapshot("39AC45", 51.9, -0.8);
    s.track = Some(350.0);
    s.squawk = Some(Squawk::parse("7700").unwrap());
    engine.process_snapshot(feed(0, vec![s])).unwrap();

    assert_eq!(sink_a.events.lock().unwrap().len(), 1);
    assert_eq!(
        sink_a.events.lock().unwrap().len(),
        sink_b.events.lock().unwrap().len()
    );
}

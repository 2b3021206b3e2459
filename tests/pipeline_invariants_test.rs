//! Engine-level invariants: idempotent ticks, alert conservation, and
//! strict insert/remove alternation per (filter, aircraft).

mod common;

use std::collections::HashMap;

use common::{engine_with, feed, snapshot, squawk_table};
use skywatch::airports::AirportIndex;
use skywatch::alerts::{AlertEvent, AlertSub};
use skywatch::config::Config;
use skywatch::engine::TickReport;
use skywatch::snapshot::AircraftSnapshot;
use skywatch::squawks::Squawk;

fn emergency(hex: &str) -> AircraftSnapshot {
    let mut s = snapshot(hex, 51.8, -0.6);
    // Track away from the observer so only the squawk filter fires.
    s.track = Some(350.0);
    s.squawk = Some(Squawk::parse("7700").unwrap());
    s
}

/// Flatten a report's alert events into (filter, sub, hex) triples.
fn alert_triples(report: &TickReport) -> Vec<(String, AlertSub, String)> {
    report
        .outcome
        .events
        .iter()
        .filter_map(|event| match event {
            AlertEvent::Alerts { filter_id, sub, items } => Some(
                items
                    .iter()
                    .map(|alert| (filter_id.clone(), *sub, alert.hex.clone()))
                    .collect::<Vec<_>>(),
            ),
            AlertEvent::Status { .. } => None,
        })
        .flatten()
        .collect()
}

#[test]
fn frozen_input_inserts_once_then_stays_silent() {
    let mut engine = engine_with(Config::default(), AirportIndex::new(vec![]), squawk_table());

    let first = engine
        .process_snapshot(feed(0, vec![emergency("39AC45")]))
        .unwrap();
    assert_eq!(first.outcome.inserted, 1, "tick 1 inserts the alert");

    for i in 1..5 {
        let report = engine
            .process_snapshot(feed(i * 5, vec![emergency("39AC45")]))
            .unwrap();
        assert_eq!(report.outcome.inserted, 0, "tick {} must not re-insert", i + 1);
        assert_eq!(report.outcome.removed, 0, "tick {} must not remove", i + 1);
    }
}

#[test]
fn conservation_and_alternation_over_a_noisy_sequence() {
    let mut engine = engine_with(Config::default(), AirportIndex::new(vec![]), squawk_table());

    // The target appears and disappears; a clean bystander is always there.
    let presence = [true, true, false, false, false, false, false, true, true, false];
    let mut inserted_total = 0i64;
    let mut removed_total = 0i64;
    let mut per_key: HashMap<(String, String), Vec<AlertSub>> = HashMap::new();

    for (i, present) in presence.iter().enumerate() {
        let mut aircraft = vec![snapshot("C0FFEE", 52.3, -1.5)];
        if *present {
            aircraft.push(emergency("39AC45"));
        }
        let report = engine
            .process_snapshot(feed(i as i64 * 5, aircraft))
            .unwrap();

        inserted_total += report.outcome.inserted as i64;
        removed_total += report.outcome.removed as i64;
        for (filter, sub, hex) in alert_triples(&report) {
            per_key.entry((filter, hex)).or_default().push(sub);
        }
    }

    // Conservation: what was inserted and not yet removed is what's active.
    // (The last presence=false tick may not have retired the aircraft yet,
    // so active can be 0 or 1; the ledger must balance either way.)
    let active: i64 = inserted_total - removed_total;
    assert!(
        (0..=1).contains(&active),
        "insert/remove ledger out of balance: {} - {}",
        inserted_total,
        removed_total
    );
    assert!(inserted_total >= 2, "the target re-appearance must re-insert");

    // Alternation: per key, the event trace is insert, remove, insert, ...
    for ((filter, hex), subs) in &per_key {
        for (i, sub) in subs.iter().enumerate() {
            let expected = if i % 2 == 0 { AlertSub::Insert } else { AlertSub::Remove };
            assert_eq!(
                *sub, expected,
                "event {} for ({}, {}) breaks alternation: {:?}",
                i, filter, hex, subs
            );
        }
    }
}

#[test]
fn status_cadence_follows_configuration() {
    let mut config = Config::default();
    config.tick.status_interval_ticks = 3;
    let mut engine = engine_with(config, AirportIndex::new(vec![]), squawk_table());

    let mut status_ticks = Vec::new();
    for i in 0..7 {
        let report = engine
            .process_snapshot(feed(i * 5, vec![snapshot("C0FFEE", 52.3, -1.5)]))
            .unwrap();
        if report.status_emitted {
            status_ticks.push(i + 1);
        }
    }
    assert_eq!(status_ticks, vec![3, 6], "status every third tick");
}

//! Shared builders for the integration tests.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};

use skywatch::airports::AirportIndex;
use skywatch::alerts::AlertEvent;
use skywatch::config::Config;
use skywatch::delivery::AlertSink;
use skywatch::engine::Engine;
use skywatch::feed::FeedSnapshot;
use skywatch::snapshot::{AircraftSnapshot, Emergency, TcasAlert};
use skywatch::squawks::{Squawk, SquawkKind, SquawkRange, SquawkTable};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// A minimal valid snapshot; tests override the fields they care about.
pub fn snapshot(hex: &str, lat: f64, lon: f64) -> AircraftSnapshot {
    AircraftSnapshot {
        hex: hex.to_string(),
        flight: None,
        lat,
        lon,
        track: Some(90.0),
        gs: Some(250.0),
        baro_rate: Some(0.0),
        track_rate: Some(0.5),
        roll: None,
        alt_baro: Some(8000),
        alt_geom: None,
        squawk: None,
        emergency: Emergency::None,
        alert: TcasAlert::None,
        category: None,
        seen_pos: Some(0.3),
    }
}

pub fn feed(at_s: i64, aircraft: Vec<AircraftSnapshot>) -> FeedSnapshot {
    FeedSnapshot {
        timestamp: base_time() + chrono::Duration::seconds(at_s),
        aircraft,
    }
}

/// The standard UK squawk ranges the scenarios rely on.
pub fn squawk_table() -> SquawkTable {
    let range = |begin: &str, end: Option<&str>, kind: SquawkKind| SquawkRange {
        begin: Squawk::parse(begin).unwrap(),
        end: end.map(|e| Squawk::parse(e).unwrap()),
        kind,
        description: vec![],
    };
    SquawkTable::new(vec![
        range("7500", None, SquawkKind::Emergency),
        range("7600", None, SquawkKind::Emergency),
        range("7700", None, SquawkKind::Emergency),
        range("7000", None, SquawkKind::Conspicuity),
        range("2000", None, SquawkKind::Conspicuity),
        range("0020", None, SquawkKind::Hems),
    ])
}

pub fn engine_with(
    config: Config,
    airports: AirportIndex,
    squawks: SquawkTable,
) -> Engine {
    Engine::new(config, Arc::new(airports), Arc::new(squawks)).unwrap()
}

/// Sink that records every delivered event for later assertions.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub events: Arc<Mutex<Vec<AlertEvent>>>,
}

impl AlertSink for RecordingSink {
    fn deliver(&mut self, event: &AlertEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

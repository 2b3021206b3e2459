//! The engine: feed polling, tick orchestration, and delivery.
//!
//! One logical tick loop. Each feed snapshot refreshes the aircraft table,
//! runs the filter pipeline, and hands the resulting alert events plus the
//! periodic status snapshot to the delivery sinks. Delivery faults are
//! counted and swallowed; the active-alert table inside the pipeline has
//! already been updated by then, so a failed publish can never cause an
//! alert to be re-emitted.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::aircraft::{AircraftTable, TickIngest};
use crate::airports::AirportIndex;
use crate::alerts::AlertEvent;
use crate::config::Config;
use crate::delivery::AlertSink;
use crate::feed::{Feed, FeedSnapshot};
use crate::filters;
use crate::pipeline::{FilterPipeline, TickContext, TickOutcome};
use crate::squawks::SquawkTable;

/// What one processed snapshot produced.
#[derive(Debug)]
pub struct TickReport {
    pub ingest: TickIngest,
    pub outcome: TickOutcome,
    pub status_emitted: bool,
}

/// Core engine state: the aircraft table, the filter pipeline, the
/// reference stores, and the delivery sinks.
pub struct Engine {
    config: Config,
    table: AircraftTable,
    pipeline: FilterPipeline,
    airports: Arc<AirportIndex>,
    squawks: Arc<SquawkTable>,
    sinks: Vec<Box<dyn AlertSink>>,
    last_timestamp: Option<DateTime<Utc>>,
    tick_count: u64,
    delivery_faults: u64,
}

impl Engine {
    pub fn new(
        config: Config,
        airports: Arc<AirportIndex>,
        squawks: Arc<SquawkTable>,
    ) -> Result<Self> {
        let mut pipeline = FilterPipeline::new(config.tick.budget_ms);
        filters::register_enabled(&mut pipeline, &config);
        pipeline.configure_all(&config, &airports, &squawks)?;
        info!(
            "engine ready: {} filters, {} airports, {} squawk ranges",
            pipeline.filter_count(),
            airports.len(),
            squawks.len()
        );

        Ok(Self {
            table: AircraftTable::new(config.tick.retire_after_ticks).with_trajectory_limits(
                chrono::Duration::minutes(config.tick.trajectory_retention_min),
                config.tick.trajectory_max_entries,
            ),
            pipeline,
            airports,
            squawks,
            sinks: Vec::new(),
            last_timestamp: None,
            tick_count: 0,
            delivery_faults: 0,
            config,
        })
    }

    pub fn add_sink(&mut self, sink: Box<dyn AlertSink>) {
        self.sinks.push(sink);
    }

    pub fn tracked_aircraft(&self) -> usize {
        self.table.len()
    }

    /// The tracked aircraft as of the last processed tick.
    pub fn aircraft(&self) -> &[crate::aircraft::Aircraft] {
        self.table.aircraft()
    }

    pub fn delivery_faults(&self) -> u64 {
        self.delivery_faults
    }

    /// Process one feed snapshot. Returns `None` when the snapshot is a
    /// duplicate (its timestamp is not newer than the previous tick's).
    pub fn process_snapshot(&mut self, snapshot: FeedSnapshot) -> Option<TickReport> {
        if let Some(last) = self.last_timestamp
            && snapshot.timestamp <= last
        {
            debug!(
                "dropping duplicate feed snapshot at {} (last tick {})",
                snapshot.timestamp, last
            );
            metrics::counter!("skywatch.feed.duplicates_total").increment(1);
            return None;
        }
        self.last_timestamp = Some(snapshot.timestamp);
        self.tick_count += 1;
        let started = Instant::now();

        let now = snapshot.timestamp;
        let ingest = self.table.apply(now, snapshot.aircraft);
        self.table.derive_shared(&self.config.observer);
        metrics::gauge!("skywatch.aircraft.tracked").set(self.table.len() as f64);

        let (aircraft, trajectories) = self.table.split_for_tick();
        let ctx = TickContext::new(
            now,
            self.config.observer,
            &self.airports,
            &self.squawks,
            trajectories,
        );
        let mut outcome = self.pipeline.run_tick(aircraft, &ctx);

        let status_emitted = self
            .tick_count
            .is_multiple_of(u64::from(self.config.tick.status_interval_ticks.max(1)));
        let mut events: Vec<AlertEvent> = std::mem::take(&mut outcome.events);
        if status_emitted {
            events.push(AlertEvent::Status {
                report: outcome.status.clone(),
                time_formatted: now.format("%H:%M:%S").to_string(),
            });
        }
        self.deliver(&events);
        outcome.events = events;

        metrics::histogram!("skywatch.tick.duration_ms")
            .record(started.elapsed().as_secs_f64() * 1000.0);
        debug!(
            "tick {}: {} in feed ({} new, {} retired), {} inserted, {} removed",
            self.tick_count,
            ingest.inserted + ingest.updated,
            ingest.inserted,
            ingest.retired,
            outcome.inserted,
            outcome.removed
        );

        Some(TickReport {
            ingest,
            outcome,
            status_emitted,
        })
    }

    fn deliver(&mut self, events: &[AlertEvent]) {
        for event in events {
            for sink in &mut self.sinks {
                if let Err(error) = sink.deliver(event) {
                    self.delivery_faults += 1;
                    metrics::counter!("skywatch.delivery.faults_total").increment(1);
                    warn!("delivery fault (swallowed): {:#}", error);
                }
            }
        }
    }

    /// Drive the engine from a feed until it is exhausted (replay) or
    /// shutdown is signalled (live). Polls on the configured tick interval.
    pub async fn run(&mut self, feed: &mut dyn Feed) -> Result<()> {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            self.config.tick.interval_s.max(1),
        ));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match feed.next_snapshot().await {
                        Ok(Some(snapshot)) => {
                            self.process_snapshot(snapshot);
                        }
                        Ok(None) => {
                            info!("feed exhausted after {} ticks", self.tick_count);
                            return Ok(());
                        }
                        Err(error) => {
                            warn!("feed poll failed: {:#}", error);
                            metrics::counter!("skywatch.feed.errors_total").increment(1);
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown requested after {} ticks", self.tick_count);
                    return Ok(());
                }
            }
        }
    }

    /// Replay an entire recorded feed synchronously, without pacing.
    /// Returns the per-tick reports; used by tests and re-analysis.
    pub async fn replay(&mut self, feed: &mut dyn Feed) -> Result<Vec<TickReport>> {
        let mut reports = Vec::new();
        while let Some(snapshot) = feed.next_snapshot().await? {
            if let Some(report) = self.process_snapshot(snapshot) {
                reports.push(report);
            }
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{TopicPublisher, TopicSink};
    use crate::snapshot::{AircraftSnapshot, Emergency, TcasAlert};
    use crate::squawks::Squawk;
    use chrono::TimeZone;
    use std::sync::{Arc as StdArc, Mutex};

    fn config() -> Config {
        let mut config = Config::default();
        config.tick.status_interval_ticks = 2;
        config
    }

    fn emergency_snapshot(hex: &str) -> AircraftSnapshot {
        AircraftSnapshot {
            hex: hex.to_string(),
            flight: Some("MAYDAY1".to_string()),
            lat: 51.6,
            lon: -0.4,
            track: Some(10.0),
            gs: Some(240.0),
            baro_rate: Some(50.0),
            track_rate: Some(0.5),
            roll: None,
            alt_baro: Some(9000),
            alt_geom: None,
            squawk: Some(Squawk::parse("7700").unwrap()),
            emergency: Emergency::None,
            alert: TcasAlert::None,
            category: None,
            seen_pos: Some(0.2),
        }
    }

    fn feed_snapshot(at_s: i64, aircraft: Vec<AircraftSnapshot>) -> FeedSnapshot {
        FeedSnapshot {
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
                + chrono::Duration::seconds(at_s),
            aircraft,
        }
    }

    #[derive(Clone, Default)]
    struct SharedPublisher {
        topics: StdArc<Mutex<Vec<String>>>,
    }

    impl TopicPublisher for SharedPublisher {
        fn publish(&mut self, topic: &str, _payload: &[u8]) -> Result<()> {
            self.topics.lock().unwrap().push(topic.to_string());
            Ok(())
        }
    }

    struct FailingSink;

    impl AlertSink for FailingSink {
        fn deliver(&mut self, _event: &AlertEvent) -> Result<()> {
            anyhow::bail!("sink outage")
        }
    }

    fn engine() -> Engine {
        Engine::new(
            config(),
            Arc::new(AirportIndex::new(vec![])),
            Arc::new(SquawkTable::default()),
        )
        .unwrap()
    }

    #[test]
    fn test_alert_lifecycle_through_engine() {
        let mut engine = engine();
        let publisher = SharedPublisher::default();
        engine.add_sink(Box::new(TopicSink::new("adsb", publisher.clone())));

        // Tick 1: the emergency squawk appears.
        let report = engine
            .process_snapshot(feed_snapshot(0, vec![emergency_snapshot("39AC45")]))
            .unwrap();
        assert_eq!(report.outcome.inserted, 1);
        assert!(!report.status_emitted, "status only every second tick here");

        // Tick 2: unchanged; no new events, but the periodic status fires.
        let report = engine
            .process_snapshot(feed_snapshot(5, vec![emergency_snapshot("39AC45")]))
            .unwrap();
        assert_eq!(report.outcome.inserted, 0);
        assert_eq!(report.outcome.removed, 0);
        assert!(report.status_emitted);

        // Ticks 3..: the aircraft vanishes; removal comes when it retires
        // (after retire_after_ticks consecutive absences).
        let mut removed_total = 0;
        for i in 0..6 {
            let report = engine
                .process_snapshot(feed_snapshot(10 + i * 5, vec![]))
                .unwrap();
            removed_total += report.outcome.removed;
        }
        assert_eq!(removed_total, 1, "the squawk alert must clear exactly once");

        let topics = publisher.topics.lock().unwrap();
        assert!(topics.iter().any(|t| t == "adsb/squawk/insert"));
        assert!(topics.iter().any(|t| t == "adsb/squawk/remove"));
        assert!(topics.iter().any(|t| t == "adsb/status"));
    }

    #[test]
    fn test_duplicate_snapshot_dropped() {
        let mut engine = engine();
        let first = feed_snapshot(0, vec![emergency_snapshot("39AC45")]);
        assert!(engine.process_snapshot(first.clone()).is_some());
        assert!(
            engine.process_snapshot(first).is_none(),
            "a snapshot with a non-advancing clock must be dropped"
        );
        // An older timestamp is dropped too.
        assert!(engine
            .process_snapshot(feed_snapshot(-5, vec![]))
            .is_none());
    }

    #[test]
    fn test_delivery_fault_swallowed_and_counted() {
        let mut engine = engine();
        engine.add_sink(Box::new(FailingSink));

        let report = engine
            .process_snapshot(feed_snapshot(0, vec![emergency_snapshot("39AC45")]))
            .unwrap();
        assert_eq!(report.outcome.inserted, 1);
        assert!(engine.delivery_faults() > 0);

        // The active table was updated despite the fault: the same input
        // does not re-emit.
        let report = engine
            .process_snapshot(feed_snapshot(5, vec![emergency_snapshot("39AC45")]))
            .unwrap();
        assert_eq!(report.outcome.inserted, 0, "no re-emission storm after sink faults");
    }

    #[tokio::test]
    async fn test_replay_runs_to_exhaustion() {
        use crate::feed::ReplayFeed;
        let mut engine = engine();
        let mut feed = ReplayFeed::new(vec![
            feed_snapshot(0, vec![emergency_snapshot("39AC45")]),
            feed_snapshot(5, vec![emergency_snapshot("39AC45")]),
            feed_snapshot(10, vec![]),
        ]);
        let reports = engine.replay(&mut feed).await.unwrap();
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].outcome.inserted, 1);
    }
}

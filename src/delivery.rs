//! Delivery sinks for alert and status events.
//!
//! The pipeline serialises all deliveries; a sink never sees concurrent
//! calls. Sink faults are counted and swallowed at the engine boundary so a
//! failed publish can never wedge the tick loop or re-emit alerts.

use std::io::Write;

use anyhow::Result;
use tracing::{info, warn};

use crate::alerts::{AlertEvent, AlertSub};

/// A consumer of pipeline events.
pub trait AlertSink: Send {
    fn deliver(&mut self, event: &AlertEvent) -> Result<()>;
}

/// Renders events as log lines.
pub struct LogSink;

impl AlertSink for LogSink {
    fn deliver(&mut self, event: &AlertEvent) -> Result<()> {
        match event {
            AlertEvent::Alerts { filter_id, sub, items } => {
                for alert in items {
                    let ident = alert.flight.as_deref().unwrap_or(&alert.hex);
                    match (sub, alert.warn) {
                        (AlertSub::Insert, true) => {
                            warn!("[{}] + {} {}", filter_id, ident, alert.text)
                        }
                        (AlertSub::Insert, false) => {
                            info!("[{}] + {} {}", filter_id, ident, alert.text)
                        }
                        (AlertSub::Remove, _) => {
                            info!("[{}] - {} {}", filter_id, ident, alert.text)
                        }
                    }
                }
            }
            AlertEvent::Status { report, .. } => {
                let triggered: usize = report.filters.values().map(|f| f.count).sum();
                info!(
                    "status tick={} aircraft={} triggered={}",
                    report.tick, report.aircraft_count, triggered
                );
            }
        }
        Ok(())
    }
}

/// Abstract topic publisher, e.g. an MQTT client adapter. The core only
/// formats topics and JSON bodies; wire concerns live outside the crate.
pub trait TopicPublisher: Send {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<()>;
}

/// Publishes events as JSON to `<base>/<type>/<sub>` topics.
pub struct TopicSink<P: TopicPublisher> {
    base: String,
    publisher: P,
}

impl<P: TopicPublisher> TopicSink<P> {
    pub fn new(base: impl Into<String>, publisher: P) -> Self {
        Self {
            base: base.into(),
            publisher,
        }
    }
}

impl<P: TopicPublisher> AlertSink for TopicSink<P> {
    fn deliver(&mut self, event: &AlertEvent) -> Result<()> {
        match event {
            AlertEvent::Alerts { filter_id, sub, items } => {
                let topic = format!("{}/{}/{}", self.base, filter_id, sub);
                let payload = serde_json::to_vec(items)?;
                self.publisher.publish(&topic, &payload)
            }
            AlertEvent::Status { .. } => {
                let topic = format!("{}/status", self.base);
                let payload = serde_json::to_vec(event)?;
                self.publisher.publish(&topic, &payload)
            }
        }
    }
}

/// Writes each event as one JSON line; the stdout renderer and the replay
/// tooling both consume this form.
pub struct JsonLineSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLineSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send> AlertSink for JsonLineSink<W> {
    fn deliver(&mut self, event: &AlertEvent) -> Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::Alert;

    #[derive(Default)]
    struct RecordingPublisher {
        published: Vec<(String, Vec<u8>)>,
    }

    impl TopicPublisher for RecordingPublisher {
        fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<()> {
            self.published.push((topic.to_string(), payload.to_vec()));
            Ok(())
        }
    }

    fn sample_alert() -> Alert {
        Alert {
            alert_type: "loitering".to_string(),
            hex: "43BFDD".to_string(),
            flight: None,
            text: "loitering (circling)".to_string(),
            warn: false,
            time_formatted: "09:15:00".to_string(),
            payload: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_topic_sink_formats_topics() {
        let mut sink = TopicSink::new("adsb/alerts", RecordingPublisher::default());
        sink.deliver(&AlertEvent::Alerts {
            filter_id: "loitering".to_string(),
            sub: AlertSub::Insert,
            items: vec![sample_alert()],
        })
        .unwrap();
        sink.deliver(&AlertEvent::Alerts {
            filter_id: "loitering".to_string(),
            sub: AlertSub::Remove,
            items: vec![sample_alert()],
        })
        .unwrap();

        let topics: Vec<&str> = sink
            .publisher
            .published
            .iter()
            .map(|(t, _)| t.as_str())
            .collect();
        assert_eq!(topics, vec!["adsb/alerts/loitering/insert", "adsb/alerts/loitering/remove"]);
    }

    #[test]
    fn test_json_line_sink_emits_parseable_lines() {
        let mut buffer = Vec::new();
        {
            let mut sink = JsonLineSink::new(&mut buffer);
            sink.deliver(&AlertEvent::Alerts {
                filter_id: "squawk".to_string(),
                sub: AlertSub::Insert,
                items: vec![sample_alert()],
            })
            .unwrap();
        }
        let line = String::from_utf8(buffer).unwrap();
        let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(value["kind"], "alerts");
        assert_eq!(value["sub"], "insert");
    }
}

//! Feed providers.
//!
//! A [`Feed`] yields, on demand, the set of aircraft snapshots the upstream
//! decoder currently tracks. The engine never parses wire formats beyond the
//! decoder's JSON state document; raw Mode-S decoding is a different
//! program's job.

use std::collections::VecDeque;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::snapshot::AircraftSnapshot;

/// One polled batch: the decoder's clock plus every tracked aircraft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSnapshot {
    pub timestamp: DateTime<Utc>,
    pub aircraft: Vec<AircraftSnapshot>,
}

/// A source of feed snapshots.
#[async_trait]
pub trait Feed: Send {
    /// The next snapshot, or `None` when the feed is exhausted (recorded
    /// feeds only; live feeds block until data is available).
    async fn next_snapshot(&mut self) -> Result<Option<FeedSnapshot>>;
}

/// The decoder's JSON state document (dump1090-style `aircraft.json`).
#[derive(Debug, Deserialize)]
struct DecoderDocument {
    /// Decoder clock, seconds since the Unix epoch.
    now: f64,
    aircraft: Vec<serde_json::Value>,
}

/// Parse a decoder state document into a feed snapshot.
///
/// Aircraft entries that do not deserialize (no position yet, malformed
/// fields) or fail the snapshot invariants are skipped, not errors: the
/// decoder legitimately tracks aircraft it has no position for.
pub fn parse_decoder_document(raw: &str) -> Result<FeedSnapshot> {
    let document: DecoderDocument =
        serde_json::from_str(raw).context("malformed decoder document")?;

    let millis = (document.now * 1000.0) as i64;
    let timestamp = Utc
        .timestamp_millis_opt(millis)
        .single()
        .context("decoder clock outside representable range")?;

    let total = document.aircraft.len();
    let aircraft: Vec<AircraftSnapshot> = document
        .aircraft
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<AircraftSnapshot>(value) {
            Ok(snapshot) if snapshot.is_valid() => Some(snapshot),
            Ok(snapshot) => {
                trace!("dropping out-of-domain snapshot for {}", snapshot.hex);
                None
            }
            Err(_) => None,
        })
        .collect();

    debug!(
        "decoder document: {} of {} aircraft usable",
        aircraft.len(),
        total
    );
    metrics::counter!("skywatch.feed.snapshots_total").increment(1);
    metrics::gauge!("skywatch.feed.aircraft").set(aircraft.len() as f64);

    Ok(FeedSnapshot {
        timestamp,
        aircraft,
    })
}

/// Polls a decoder's `aircraft.json` endpoint over HTTP.
pub struct HttpFeed {
    url: String,
    client: reqwest::Client,
}

impl HttpFeed {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Feed for HttpFeed {
    async fn next_snapshot(&mut self) -> Result<Option<FeedSnapshot>> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("feed request to {} failed", self.url))?
            .error_for_status()
            .context("feed returned an error status")?
            .text()
            .await
            .context("failed to read feed body")?;
        parse_decoder_document(&body).map(Some)
    }
}

/// Replays a recorded sequence of feed snapshots (one JSON document per
/// line). Used by tests and for deterministic re-analysis of captures.
pub struct ReplayFeed {
    snapshots: VecDeque<FeedSnapshot>,
}

impl ReplayFeed {
    pub fn new(snapshots: Vec<FeedSnapshot>) -> Self {
        Self {
            snapshots: snapshots.into(),
        }
    }

    /// Load a JSON-lines capture file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read capture {:?}", path))?;
        let snapshots = contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str::<FeedSnapshot>(line)
                    .with_context(|| format!("malformed capture line in {:?}", path))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(snapshots))
    }

    pub fn remaining(&self) -> usize {
        self.snapshots.len()
    }
}

#[async_trait]
impl Feed for ReplayFeed {
    async fn next_snapshot(&mut self) -> Result<Option<FeedSnapshot>> {
        Ok(self.snapshots.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE_DOCUMENT: &str = r#"{
        "now": 1717243200.5,
        "aircraft": [
            {"hex": "4CA2D6", "flight": "RYR81LK ", "lat": 51.3, "lon": -0.5,
             "track": 88.1, "gs": 412.3, "alt_baro": 36000, "squawk": "5471"},
            {"hex": "406B9E"},
            {"hex": "BAD001", "lat": 123.0, "lon": 0.0}
        ]
    }"#;

    #[test]
    fn test_parse_decoder_document_skips_unusable_entries() {
        let snapshot = parse_decoder_document(SAMPLE_DOCUMENT).unwrap();
        assert_eq!(snapshot.aircraft.len(), 1, "positionless and invalid entries skipped");
        assert_eq!(snapshot.aircraft[0].hex, "4CA2D6");
        assert_eq!(snapshot.timestamp.timestamp(), 1_717_243_200);
    }

    #[test]
    fn test_parse_decoder_document_rejects_garbage() {
        assert!(parse_decoder_document("not json").is_err());
    }

    #[tokio::test]
    async fn test_replay_feed_preserves_order_and_ends() {
        let first = parse_decoder_document(SAMPLE_DOCUMENT).unwrap();
        let mut second = first.clone();
        second.timestamp += chrono::Duration::seconds(5);

        let mut feed = ReplayFeed::new(vec![first.clone(), second.clone()]);
        assert_eq!(feed.next_snapshot().await.unwrap(), Some(first));
        assert_eq!(feed.next_snapshot().await.unwrap(), Some(second));
        assert_eq!(feed.next_snapshot().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_replay_feed_from_file() {
        let snapshot = parse_decoder_document(SAMPLE_DOCUMENT).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", serde_json::to_string(&snapshot).unwrap()).unwrap();
        writeln!(file).unwrap();

        let mut feed = ReplayFeed::from_file(file.path()).unwrap();
        assert_eq!(feed.remaining(), 1);
        assert_eq!(feed.next_snapshot().await.unwrap(), Some(snapshot));
    }
}

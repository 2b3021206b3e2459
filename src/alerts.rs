//! Alert model and the events the pipeline hands to delivery.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How serious a detected condition is. Ordered so `max()` picks the worst.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// Whether an event carries newly-raised or newly-cleared alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSub {
    Insert,
    Remove,
}

impl std::fmt::Display for AlertSub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSub::Insert => write!(f, "insert"),
            AlertSub::Remove => write!(f, "remove"),
        }
    }
}

/// The body a filter produces for a triggered aircraft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertBody {
    pub text: String,
    pub warn: bool,
    /// Filter-specific structured payload.
    pub payload: serde_json::Value,
}

/// One active or cleared alert. Identity for diffing is
/// `(alert_type, hex)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// The raising filter's id.
    #[serde(rename = "type")]
    pub alert_type: String,
    pub hex: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flight: Option<String>,
    pub text: String,
    pub warn: bool,
    pub time_formatted: String,
    pub payload: serde_json::Value,
}

/// Per-filter portion of a status snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterStatus {
    pub name: String,
    /// Currently-triggered aircraft count.
    pub count: usize,
    /// Filter-specific structured counts.
    pub stats: serde_json::Value,
    /// Wall time the filter spent this tick, milliseconds.
    pub duration_ms: f64,
    /// Whether the tick budget truncated this filter.
    pub truncated: bool,
}

/// Periodic summary of the filter set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub tick: u64,
    pub aircraft_count: usize,
    pub filters: BTreeMap<String, FilterStatus>,
}

/// What the pipeline emits to the delivery sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AlertEvent {
    Alerts {
        filter_id: String,
        sub: AlertSub,
        items: Vec<Alert>,
    },
    Status {
        report: StatusReport,
        time_formatted: String,
    },
}

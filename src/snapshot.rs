//! Per-tick aircraft snapshot model.
//!
//! An [`AircraftSnapshot`] is the immutable value the feed captures for one
//! aircraft on one tick. Field names follow the de-facto decoder JSON schema
//! (`hex`, `flight`, `gs`, `baro_rate`, ...) so feed adapters can deserialize
//! straight into it.

use serde::{Deserialize, Serialize};

use crate::squawks::Squawk;

/// ADS-B emitter category, e.g. "A1" (light) through "A5" (heavy),
/// "B1" (glider), "B6" (UAV), "C1"/"C2" (surface vehicles).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Category {
    A0, A1, A2, A3, A4, A5, A6, A7,
    B0, B1, B2, B3, B4, B5, B6, B7,
    C0, C1, C2, C3, C4, C5, C6, C7,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        use Category::*;
        match self {
            A0 => "A0", A1 => "A1", A2 => "A2", A3 => "A3",
            A4 => "A4", A5 => "A5", A6 => "A6", A7 => "A7",
            B0 => "B0", B1 => "B1", B2 => "B2", B3 => "B3",
            B4 => "B4", B5 => "B5", B6 => "B6", B7 => "B7",
            C0 => "C0", C1 => "C1", C2 => "C2", C3 => "C3",
            C4 => "C4", C5 => "C5", C6 => "C6", C7 => "C7",
        }
    }

    /// Rotorcraft.
    pub fn is_rotorcraft(&self) -> bool {
        matches!(self, Category::A7)
    }

    /// Light fixed-wing (< 15 500 lbs).
    pub fn is_light(&self) -> bool {
        matches!(self, Category::A1)
    }

    /// Heavy (> 300 000 lbs).
    pub fn is_heavy(&self) -> bool {
        matches!(self, Category::A5)
    }

    /// Glider or sailplane.
    pub fn is_glider(&self) -> bool {
        matches!(self, Category::B1)
    }

    /// Unmanned aerial vehicle.
    pub fn is_uav(&self) -> bool {
        matches!(self, Category::B6)
    }

    /// Surface emergency or service vehicle.
    pub fn is_surface_vehicle(&self) -> bool {
        matches!(self, Category::C1 | Category::C2)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Category {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        use Category::*;
        Ok(match value.as_str() {
            "A0" => A0, "A1" => A1, "A2" => A2, "A3" => A3,
            "A4" => A4, "A5" => A5, "A6" => A6, "A7" => A7,
            "B0" => B0, "B1" => B1, "B2" => B2, "B3" => B3,
            "B4" => B4, "B5" => B5, "B6" => B6, "B7" => B7,
            "C0" => C0, "C1" => C1, "C2" => C2, "C3" => C3,
            "C4" => C4, "C5" => C5, "C6" => C6, "C7" => C7,
            other => return Err(format!("unknown emitter category {:?}", other)),
        })
    }
}

impl From<Category> for String {
    fn from(value: Category) -> Self {
        value.as_str().to_string()
    }
}

/// Transponder emergency state as reported by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emergency {
    #[default]
    None,
    General,
    Lifeguard,
    Minfuel,
    Nordo,
    Unlawful,
    Downed,
    Reserved,
}

impl Emergency {
    /// True when the aircraft has declared any emergency condition.
    pub fn is_declared(&self) -> bool {
        !matches!(self, Emergency::None)
    }
}

/// TCAS advisory state. Upstream decoders report this either numerically
/// (0 = none, anything else an advisory) or symbolically ("ta"/"ra",
/// "advisory"/"resolution"); both spellings coerce onto this enum at the
/// feed boundary and the core only ever sees these three states. Ordered by
/// urgency so `max()` picks the stronger advisory of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TcasAlert {
    #[default]
    None,
    /// Traffic advisory.
    Advisory,
    /// Resolution advisory.
    Resolution,
}

impl<'de> Deserialize<'de> for TcasAlert {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(i64),
            Text(String),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(0) => TcasAlert::None,
            Raw::Number(_) => TcasAlert::Advisory,
            Raw::Text(text) => match text.to_ascii_lowercase().as_str() {
                "" | "none" | "0" => TcasAlert::None,
                "ra" | "resolution" => TcasAlert::Resolution,
                _ => TcasAlert::Advisory,
            },
        })
    }
}

impl TcasAlert {
    pub fn is_active(&self) -> bool {
        !matches!(self, TcasAlert::None)
    }
}

/// Immutable per-tick capture of one aircraft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AircraftSnapshot {
    /// ICAO 24-bit address as a hex string, e.g. "4CA2D6".
    pub hex: String,
    /// Callsign, trimmed; absent when the aircraft has not identified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flight: Option<String>,

    pub lat: f64,
    pub lon: f64,

    /// Ground track, degrees [0, 360).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<f64>,
    /// Ground speed, knots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gs: Option<f64>,
    /// Barometric vertical rate, ft/min.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baro_rate: Option<f64>,
    /// Turn rate, degrees/second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_rate: Option<f64>,
    /// Roll angle, degrees (right wing down positive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll: Option<f64>,

    /// Barometric altitude, ft.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_baro: Option<i32>,
    /// Geometric (GNSS) altitude, ft.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_geom: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub squawk: Option<Squawk>,
    #[serde(default)]
    pub emergency: Emergency,
    #[serde(default)]
    pub alert: TcasAlert,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,

    /// Seconds since the last position update was received.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seen_pos: Option<f64>,
}

impl AircraftSnapshot {
    /// Check the snapshot invariants: `|lat| <= 90`, `-180 < lon <= 180`,
    /// `0 <= track < 360`, `gs >= 0`. The feed adapter drops snapshots that
    /// fail so the detectors never see out-of-domain values.
    pub fn is_valid(&self) -> bool {
        if !self.lat.is_finite() || self.lat.abs() > 90.0 {
            return false;
        }
        if !self.lon.is_finite() || self.lon <= -180.0 || self.lon > 180.0 {
            return false;
        }
        if let Some(track) = self.track
            && (!track.is_finite() || !(0.0..360.0).contains(&track))
        {
            return false;
        }
        if let Some(gs) = self.gs
            && (!gs.is_finite() || gs < 0.0)
        {
            return false;
        }
        true
    }

    /// Preferred altitude: barometric when present, geometric otherwise.
    pub fn altitude_ft(&self) -> Option<i32> {
        self.alt_baro.or(self.alt_geom)
    }

    /// Callsign with surrounding whitespace removed, if non-empty.
    pub fn callsign(&self) -> Option<&str> {
        self.flight
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// True when the position is older than `max_age_s`.
    pub fn position_stale(&self, max_age_s: f64) -> bool {
        self.seen_pos.map(|age| age > max_age_s).unwrap_or(false)
    }
}

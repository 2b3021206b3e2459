//! Squawk codes and the squawk-range reference table.
//!
//! A squawk is canonically a fixed-width four-character octal string
//! ("0000".."7777"). Numeric values coming from configuration or upstream
//! JSON are coerced onto that representation at load time so the rest of the
//! crate never deals with the string/number ambiguity of raw decoder output.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SquawkParseError {
    #[error("squawk must be exactly four octal digits, got {0:?}")]
    Malformed(String),
}

/// A four-digit octal transponder code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Squawk([u8; 4]);

impl Squawk {
    /// Parse from a string of exactly four octal digits.
    pub fn parse(code: &str) -> Result<Self, SquawkParseError> {
        let bytes = code.as_bytes();
        if bytes.len() != 4 || !bytes.iter().all(|b| (b'0'..=b'7').contains(b)) {
            return Err(SquawkParseError::Malformed(code.to_string()));
        }
        Ok(Squawk([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Coerce a numeric code (e.g. 7700 read from a config table) onto the
    /// canonical representation. The number is interpreted as the decimal
    /// spelling of the octal digits, the usual convention in squawk tables.
    pub fn from_numeric(code: u16) -> Result<Self, SquawkParseError> {
        if code > 7777 {
            return Err(SquawkParseError::Malformed(code.to_string()));
        }
        Self::parse(&format!("{:04}", code))
    }

    pub fn as_str(&self) -> &str {
        // Constructed from validated ASCII octal digits.
        std::str::from_utf8(&self.0).expect("squawk digits are ASCII")
    }

    /// The code's value as an octal integer, for range containment tests.
    pub fn octal_value(&self) -> u16 {
        self.0
            .iter()
            .fold(0u16, |acc, b| acc * 8 + u16::from(b - b'0'))
    }

    /// The standard emergency codes 7500 / 7600 / 7700.
    pub fn is_emergency_code(&self) -> bool {
        matches!(self.as_str(), "7500" | "7600" | "7700")
    }
}

impl std::fmt::Display for Squawk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Squawk {
    type Err = SquawkParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Squawk {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Squawk {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Accept both "7700" and 7700; coerce numbers per the module contract.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u16),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Squawk::parse(&s).map_err(serde::de::Error::custom),
            Raw::Number(n) => Squawk::from_numeric(n).map_err(serde::de::Error::custom),
        }
    }
}

/// What a squawk range is allocated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SquawkKind {
    Emergency,
    Sar,
    Hems,
    Police,
    Royal,
    Government,
    Military,
    Special,
    DangerArea,
    Display,
    Helicopter,
    Monitoring,
    Conspicuity,
    Approach,
    Tower,
    Radar,
    Fis,
    Service,
    Training,
    Uas,
    Ifr,
    Domestic,
    Transit,
    Offshore,
    Assigned,
    Ground,
}

impl std::fmt::Display for SquawkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| std::fmt::Error)?;
        f.write_str(json.trim_matches('"'))
    }
}

/// One allocated range of squawk codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SquawkRange {
    pub begin: Squawk,
    /// Inclusive end; a single-code allocation omits it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Squawk>,
    #[serde(rename = "type")]
    pub kind: SquawkKind,
    #[serde(default)]
    pub description: Vec<String>,
}

impl SquawkRange {
    /// Whether `code` falls inside this range (octal comparison).
    pub fn contains(&self, code: Squawk) -> bool {
        let value = code.octal_value();
        let begin = self.begin.octal_value();
        match self.end {
            Some(end) => (begin..=end.octal_value()).contains(&value),
            None => value == begin,
        }
    }
}

/// Immutable lookup table over allocated squawk ranges.
///
/// Ranges overlap (a conspicuity code can sit inside a broader assignment
/// block), so lookups return every covering range.
#[derive(Debug, Default, Clone)]
pub struct SquawkTable {
    ranges: Vec<SquawkRange>,
}

impl SquawkTable {
    pub fn new(mut ranges: Vec<SquawkRange>) -> Self {
        ranges.sort_by_key(|r| (r.begin, r.end));
        Self { ranges }
    }

    /// Load from a JSON array of range records.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read squawk table {:?}", path))?;
        let ranges: Vec<SquawkRange> = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse squawk table {:?}", path))?;
        info!("Loaded {} squawk ranges from {:?}", ranges.len(), path);
        Ok(Self::new(ranges))
    }

    /// All ranges containing `code`.
    pub fn find_by_code(&self, code: Squawk) -> Vec<&SquawkRange> {
        self.ranges.iter().filter(|r| r.contains(code)).collect()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

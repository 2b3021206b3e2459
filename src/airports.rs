//! Airport reference data and the spatial index over it.
//!
//! Records follow the stable JSON schema produced by the upstream CSV
//! converters (OurAirports-derived). The index is an R-tree over airport
//! positions; queries are altitude-aware so a surface-level aircraft is
//! matched against strips and heliports while a high-level overflight only
//! sees airports that could plausibly concern it.

use std::path::Path;

use anyhow::{Context, Result};
use rstar::{AABB, RTree, primitives::GeomWithData};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::geometry;

/// Default "nearby" radius, an ATZ-sized 2.5 nm.
pub const ATZ_RADIUS_KM: f64 = 4.63;

/// Coarse airport classification, ordered small to large.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AirportType {
    SmallAirport,
    MediumAirport,
    LargeAirport,
    Heliport,
    Closed,
}

impl AirportType {
    /// Size rank for the fixed-wing types; heliports and closed airports
    /// sit outside the ordering.
    pub fn size_rank(&self) -> Option<u8> {
        match self {
            AirportType::SmallAirport => Some(0),
            AirportType::MediumAirport => Some(1),
            AirportType::LargeAirport => Some(2),
            AirportType::Heliport | AirportType::Closed => None,
        }
    }
}

/// One runway, described from both thresholds ("le" low end, "he" high end).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Runway {
    pub le_ident: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub le_heading_deg_t: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub le_latitude_deg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub le_longitude_deg: Option<f64>,
    pub he_ident: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub he_heading_deg_t: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub he_latitude_deg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub he_longitude_deg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_ft: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width_ft: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface: Option<String>,
    #[serde(default)]
    pub lighted: bool,
    #[serde(default)]
    pub closed: bool,
}

/// One landing direction of a runway.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunwayEnd<'a> {
    pub ident: &'a str,
    pub heading_deg: f64,
    pub threshold: Option<(f64, f64)>,
}

impl Runway {
    /// The usable landing directions of this runway; an end without a
    /// surveyed heading is skipped.
    pub fn ends(&self) -> Vec<RunwayEnd<'_>> {
        let mut ends = Vec::with_capacity(2);
        if let Some(heading) = self.le_heading_deg_t {
            ends.push(RunwayEnd {
                ident: &self.le_ident,
                heading_deg: heading,
                threshold: self.le_latitude_deg.zip(self.le_longitude_deg),
            });
        }
        if let Some(heading) = self.he_heading_deg_t {
            ends.push(RunwayEnd {
                ident: &self.he_ident,
                heading_deg: heading,
                threshold: self.he_latitude_deg.zip(self.he_longitude_deg),
            });
        }
        ends
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frequency {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub frequency_mhz: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Airport {
    pub icao_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iata_code: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub airport_type: AirportType,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation_ft: Option<i32>,
    #[serde(default)]
    pub runways: Vec<Runway>,
    #[serde(default)]
    pub frequencies: Vec<Frequency>,
}

impl Airport {
    pub fn position(&self) -> (f64, f64) {
        (self.latitude_deg, self.longitude_deg)
    }
}

/// A nearby-query hit: airport plus its distance from the query point.
#[derive(Debug, Clone, Copy)]
pub struct NearbyAirport<'a> {
    pub airport: &'a Airport,
    pub distance_km: f64,
}

/// Options for [`AirportIndex::find_nearby`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NearbyQuery {
    /// Search radius in km; defaults to [`ATZ_RADIUS_KM`].
    pub distance_km: Option<f64>,
    /// Aircraft altitude in ft; when present, filters out airport types that
    /// cannot concern an aircraft at that level.
    pub altitude_ft: Option<i32>,
}

/// Immutable spatial index over the airport set.
pub struct AirportIndex {
    airports: Vec<Airport>,
    tree: RTree<GeomWithData<[f64; 2], usize>>,
}

impl AirportIndex {
    pub fn new(airports: Vec<Airport>) -> Self {
        let points = airports
            .iter()
            .enumerate()
            .map(|(i, a)| GeomWithData::new([a.longitude_deg, a.latitude_deg], i))
            .collect();
        Self {
            airports,
            tree: RTree::bulk_load(points),
        }
    }

    /// Load from a JSON array of airport records.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read airport data {:?}", path))?;
        let airports: Vec<Airport> = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse airport data {:?}", path))?;
        info!("Loaded {} airports from {:?}", airports.len(), path);
        Ok(Self::new(airports))
    }

    pub fn len(&self) -> usize {
        self.airports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.airports.is_empty()
    }

    pub fn get(&self, icao: &str) -> Option<&Airport> {
        self.airports.iter().find(|a| a.icao_code == icao)
    }

    /// Airports within the query radius of (lat, lon), sorted by distance.
    ///
    /// Altitude filtering, when an altitude is supplied:
    /// - above 10 000 ft only medium and large airports are relevant;
    /// - above 3 000 ft heliports are dropped;
    /// - closed airports are never returned.
    pub fn find_nearby(&self, lat: f64, lon: f64, query: NearbyQuery) -> Vec<NearbyAirport<'_>> {
        let radius_km = query.distance_km.unwrap_or(ATZ_RADIUS_KM);
        if radius_km <= 0.0 {
            return Vec::new();
        }

        // Envelope in degree space wide enough to cover the radius at this
        // latitude; exact distances are re-checked with haversine below.
        let bbox = geometry::BoundingBox::around(lat, lon, radius_km);
        let envelope = AABB::from_corners(
            [bbox.min_lon, bbox.min_lat],
            [bbox.max_lon, bbox.max_lat],
        );

        let mut hits: Vec<NearbyAirport<'_>> = self
            .tree
            .locate_in_envelope(&envelope)
            .filter_map(|point| {
                let airport = &self.airports[point.data];
                if !self.altitude_compatible(airport, query.altitude_ft) {
                    return None;
                }
                let distance_km = geometry::distance_km(
                    lat,
                    lon,
                    airport.latitude_deg,
                    airport.longitude_deg,
                )
                .ok()?;
                (distance_km <= radius_km).then_some(NearbyAirport {
                    airport,
                    distance_km,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance_km
                .partial_cmp(&b.distance_km)
                .expect("haversine distances are finite")
        });
        hits
    }

    fn altitude_compatible(&self, airport: &Airport, altitude_ft: Option<i32>) -> bool {
        if airport.airport_type == AirportType::Closed {
            return false;
        }
        let Some(altitude) = altitude_ft else {
            return true;
        };
        match airport.airport_type {
            AirportType::Heliport => altitude <= 3000,
            AirportType::SmallAirport => altitude <= 10_000,
            _ => true,
        }
    }
}

//! Great-circle geometry kernel.
//!
//! Pure functions over WGS-84-ish spherical coordinates. Everything here is
//! side-effect free and fails by returning [`GeometryError`] when an input is
//! outside its domain; nothing panics on bad data from the feed.
//!
//! Distances use the haversine formula with a fixed mean Earth radius of
//! 6371 km. The curvature correction in [`vertical_angle`] uses a
//! latitude-adjusted geocentric radius instead, since observer latitude is
//! available there.

use thiserror::Error;

/// Mean Earth radius in kilometres, used by all haversine math.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// WGS-84 semi-major axis (km).
const WGS84_A_KM: f64 = 6378.137;
/// WGS-84 semi-minor axis (km).
const WGS84_B_KM: f64 = 6356.752;

/// Horizontal distance beyond which [`vertical_angle`] applies an Earth
/// curvature correction.
const CURVATURE_CORRECTION_KM: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum GeometryError {
    #[error("latitude {0} outside [-90, 90]")]
    InvalidLatitude(f64),
    #[error("longitude {0} outside (-180, 180]")]
    InvalidLongitude(f64),
    #[error("track {0} outside [0, 360)")]
    InvalidTrack(f64),
    #[error("ground speed {0} must be non-negative")]
    InvalidSpeed(f64),
    #[error("distance {0} must be non-negative")]
    InvalidDistance(f64),
}

fn check_latitude(lat: f64) -> Result<f64, GeometryError> {
    if !lat.is_finite() || lat.abs() > 90.0 {
        return Err(GeometryError::InvalidLatitude(lat));
    }
    Ok(lat)
}

fn check_longitude(lon: f64) -> Result<f64, GeometryError> {
    if !lon.is_finite() || lon <= -180.0 || lon > 180.0 {
        return Err(GeometryError::InvalidLongitude(lon));
    }
    Ok(lon)
}

fn check_track(track: f64) -> Result<f64, GeometryError> {
    if !track.is_finite() || !(0.0..360.0).contains(&track) {
        return Err(GeometryError::InvalidTrack(track));
    }
    Ok(track)
}

fn check_speed(gs: f64) -> Result<f64, GeometryError> {
    if !gs.is_finite() || gs < 0.0 {
        return Err(GeometryError::InvalidSpeed(gs));
    }
    Ok(gs)
}

/// Normalise an angle to [0, 360).
pub fn normalize_360(deg: f64) -> f64 {
    let wrapped = deg % 360.0;
    if wrapped < 0.0 { wrapped + 360.0 } else { wrapped }
}

/// Wrap an angle difference to (-180, 180].
pub fn wrap_180(deg: f64) -> f64 {
    let wrapped = normalize_360(deg);
    if wrapped > 180.0 { wrapped - 360.0 } else { wrapped }
}

/// Absolute difference between two headings, in [0, 180].
pub fn angular_difference(a: f64, b: f64) -> f64 {
    wrap_180(a - b).abs()
}

/// Haversine distance between two points in kilometres.
///
/// Identical points compare equal and return exactly zero. The asin argument
/// is clamped to [-1, 1] for numerical stability near antipodes.
pub fn distance_km(
    lat1: f64,
    lon1: f64,
    lat2: f64,
    lon2: f64,
) -> Result<f64, GeometryError> {
    check_latitude(lat1)?;
    check_longitude(lon1)?;
    check_latitude(lat2)?;
    check_longitude(lon2)?;

    if lat1 == lat2 && lon1 == lon2 {
        return Ok(0.0);
    }

    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().clamp(-1.0, 1.0).asin();
    Ok(EARTH_RADIUS_KM * c)
}

/// Initial great-circle bearing from point 1 to point 2, degrees in [0, 360).
pub fn bearing_deg(
    lat1: f64,
    lon1: f64,
    lat2: f64,
    lon2: f64,
) -> Result<f64, GeometryError> {
    check_latitude(lat1)?;
    check_longitude(lon1)?;
    check_latitude(lat2)?;
    check_longitude(lon2)?;

    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let y = dlambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlambda.cos();
    Ok(normalize_360(y.atan2(x).to_degrees()))
}

/// Great-circle forward projection: the point `distance_km` away from
/// (lat, lon) along `bearing_deg`.
///
/// The result latitude is clamped to [-90, 90] and the longitude normalised
/// to (-180, 180].
pub fn projected_position(
    lat: f64,
    lon: f64,
    distance_km: f64,
    bearing_deg: f64,
) -> Result<(f64, f64), GeometryError> {
    check_latitude(lat)?;
    check_longitude(lon)?;
    if !distance_km.is_finite() || distance_km < 0.0 {
        return Err(GeometryError::InvalidDistance(distance_km));
    }

    let delta = distance_km / EARTH_RADIUS_KM;
    let theta = normalize_360(bearing_deg).to_radians();
    let phi1 = lat.to_radians();
    let lambda1 = lon.to_radians();

    let sin_phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos())
        .clamp(-1.0, 1.0);
    let phi2 = sin_phi2.asin();
    let y = theta.sin() * delta.sin() * phi1.cos();
    let x = delta.cos() - phi1.sin() * sin_phi2;
    let lambda2 = lambda1 + y.atan2(x);

    let out_lat = phi2.to_degrees().clamp(-90.0, 90.0);
    let mut out_lon = wrap_180(lambda2.to_degrees());
    if out_lon <= -180.0 {
        out_lon += 360.0;
    }
    Ok((out_lat, out_lon))
}

/// Cross-track geometry of an observer relative to an aircraft's ground track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossTrack {
    /// Signed perpendicular distance from the track to the observer, km.
    /// Positive when the observer lies to the right of the track.
    pub cross_km: f64,
    /// Absolute arc distance along the track to the closest-approach point, km.
    pub along_km: f64,
    /// True when the aircraft is moving towards the observer
    /// (bearing to observer within 90° of track).
    pub is_approaching: bool,
}

/// Cross-track and along-track distance from the observer to the great-circle
/// path defined by the aircraft's position and ground track.
pub fn cross_track(
    observer_lat: f64,
    observer_lon: f64,
    aircraft_lat: f64,
    aircraft_lon: f64,
    track_deg: f64,
) -> Result<CrossTrack, GeometryError> {
    check_track(track_deg)?;
    let d13 = distance_km(aircraft_lat, aircraft_lon, observer_lat, observer_lon)?;
    let theta13 = bearing_deg(aircraft_lat, aircraft_lon, observer_lat, observer_lon)?;

    let delta13 = d13 / EARTH_RADIUS_KM;
    let offset = (theta13 - track_deg).to_radians();

    // Positive offset angle means the observer lies right of the track.
    let sin_xt = (delta13.sin() * offset.sin()).clamp(-1.0, 1.0);
    let xt = sin_xt.asin();
    let cross_km = xt * EARTH_RADIUS_KM;

    let cos_xt = xt.cos();
    let along_km = if cos_xt.abs() < f64::EPSILON {
        0.0
    } else {
        (delta13.cos() / cos_xt).clamp(-1.0, 1.0).acos() * EARTH_RADIUS_KM
    };

    let is_approaching = angular_difference(theta13, track_deg) < 90.0;

    Ok(CrossTrack {
        cross_km,
        along_km: along_km.abs(),
        is_approaching,
    })
}

/// Latitude-adjusted geocentric Earth radius, km.
fn geocentric_radius_km(lat_deg: f64) -> f64 {
    let phi = lat_deg.to_radians();
    let (a, b) = (WGS84_A_KM, WGS84_B_KM);
    let num = (a * a * phi.cos()).powi(2) + (b * b * phi.sin()).powi(2);
    let den = (a * phi.cos()).powi(2) + (b * phi.sin()).powi(2);
    (num / den).sqrt()
}

/// Elevation angle from an observer to a point `horizontal_km` away and
/// `relative_altitude_ft` above the observer, degrees in [-90, 90].
///
/// Beyond ~10 km horizontal the Earth's curvature drop (d²/2R, with R taken
/// at the observer's latitude) is subtracted from the relative altitude.
pub fn vertical_angle(
    horizontal_km: f64,
    relative_altitude_ft: f64,
    observer_lat: f64,
) -> Result<f64, GeometryError> {
    check_latitude(observer_lat)?;
    if !horizontal_km.is_finite() || horizontal_km < 0.0 {
        return Err(GeometryError::InvalidDistance(horizontal_km));
    }

    let mut altitude_km = feet_to_meters(relative_altitude_ft).value / 1000.0;
    if horizontal_km > CURVATURE_CORRECTION_KM {
        let drop_km = horizontal_km.powi(2) / (2.0 * geocentric_radius_km(observer_lat));
        altitude_km -= drop_km;
    }

    if horizontal_km == 0.0 {
        return Ok(if altitude_km >= 0.0 { 90.0 } else { -90.0 });
    }
    Ok(altitude_km.atan2(horizontal_km).to_degrees().clamp(-90.0, 90.0))
}

/// Straight-line range to a point `horizontal_km` away and
/// `relative_altitude_ft` above, km.
pub fn slant_range_km(horizontal_km: f64, relative_altitude_ft: f64) -> f64 {
    let altitude_km = feet_to_meters(relative_altitude_ft).value / 1000.0;
    (horizontal_km.powi(2) + altitude_km.powi(2)).sqrt()
}

/// Cartesian velocity components in the math-angle convention
/// (`(450 − track) mod 360`, x east, y north). Units follow `gs_knots`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityComponents {
    pub x: f64,
    pub y: f64,
}

pub fn velocity_components(
    track_deg: f64,
    gs_knots: f64,
) -> Result<VelocityComponents, GeometryError> {
    check_track(track_deg)?;
    check_speed(gs_knots)?;
    let math_deg = normalize_360(450.0 - track_deg);
    let math_rad = math_deg.to_radians();
    Ok(VelocityComponents {
        x: gs_knots * math_rad.cos(),
        y: gs_knots * math_rad.sin(),
    })
}

/// How two converging aircraft relate geometrically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncounterClass {
    Overtaking,
    HeadOn,
    Crossing,
    Converging,
}

impl std::fmt::Display for EncounterClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncounterClass::Overtaking => write!(f, "overtaking"),
            EncounterClass::HeadOn => write!(f, "head-on"),
            EncounterClass::Crossing => write!(f, "crossing"),
            EncounterClass::Converging => write!(f, "converging"),
        }
    }
}

/// Relative-motion geometry between a pair of aircraft.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosureGeometry {
    /// Rate at which the pair is closing, knots. Negative means diverging.
    pub closure_velocity_kt: f64,
    /// Seconds until the closest point of approach; `None` when the pair has
    /// no relative motion. Negative values mean the CPA is behind them.
    pub time_to_closest_approach_s: Option<f64>,
    /// Predicted separation at the CPA, km (current separation when the CPA
    /// is in the past).
    pub min_separation_km: f64,
    /// Absolute difference between the two tracks, degrees [0, 180].
    pub bearing_diff_deg: f64,
    /// Angle off aircraft 1's nose to aircraft 2, degrees [0, 180].
    pub aspect_angle_deg: f64,
    /// Supplement of the track difference, degrees [0, 180].
    pub crossing_angle_deg: f64,
    pub classification: EncounterClass,
}

/// Closure geometry between two aircraft given their tracks, speeds, and the
/// bearing/distance from aircraft 1 to aircraft 2.
///
/// Classification rules: track difference < 20° → overtaking, > 160° →
/// head-on; otherwise aspect angle < 70° or > 110° → crossing, else
/// converging.
pub fn closure_geometry(
    track1_deg: f64,
    gs1_knots: f64,
    track2_deg: f64,
    gs2_knots: f64,
    bearing_1_to_2_deg: f64,
    distance_km: f64,
) -> Result<ClosureGeometry, GeometryError> {
    if !distance_km.is_finite() || distance_km < 0.0 {
        return Err(GeometryError::InvalidDistance(distance_km));
    }
    let v1 = velocity_components(track1_deg, gs1_knots)?;
    let v2 = velocity_components(track2_deg, gs2_knots)?;

    // Relative position of 2 as seen from 1, in km (x east, y north).
    let bearing_rad = normalize_360(450.0 - bearing_1_to_2_deg).to_radians();
    let rx = distance_km * bearing_rad.cos();
    let ry = distance_km * bearing_rad.sin();

    // Relative velocity of 2 with respect to 1, converted knots → km/s.
    let kt_to_kmps = NM_PER_KT_SECOND;
    let vx = (v2.x - v1.x) * kt_to_kmps;
    let vy = (v2.y - v1.y) * kt_to_kmps;

    let v_sq = vx * vx + vy * vy;
    let r_dot_v = rx * vx + ry * vy;

    let closure_velocity_kt = if distance_km > 0.0 {
        -(r_dot_v / distance_km) / kt_to_kmps
    } else {
        (v_sq.sqrt()) / kt_to_kmps
    };

    let (time_to_closest_approach_s, min_separation_km) = if v_sq > f64::EPSILON {
        let t_cpa = -r_dot_v / v_sq;
        let sep = if t_cpa > 0.0 {
            let cx = rx + vx * t_cpa;
            let cy = ry + vy * t_cpa;
            (cx * cx + cy * cy).sqrt()
        } else {
            distance_km
        };
        (Some(t_cpa), sep)
    } else {
        (None, distance_km)
    };

    let bearing_diff_deg = angular_difference(track1_deg, track2_deg);
    let aspect_angle_deg = angular_difference(bearing_1_to_2_deg, track1_deg);
    let crossing_angle_deg = 180.0 - bearing_diff_deg;

    let classification = if bearing_diff_deg < 20.0 {
        EncounterClass::Overtaking
    } else if bearing_diff_deg > 160.0 {
        EncounterClass::HeadOn
    } else if aspect_angle_deg < 70.0 || aspect_angle_deg > 110.0 {
        EncounterClass::Crossing
    } else {
        EncounterClass::Converging
    };

    Ok(ClosureGeometry {
        closure_velocity_kt,
        time_to_closest_approach_s,
        min_separation_km,
        bearing_diff_deg,
        aspect_angle_deg,
        crossing_angle_deg,
        classification,
    })
}

const CARDINALS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

/// One of the 16 compass points for a bearing in degrees.
pub fn bearing_to_cardinal(deg: f64) -> &'static str {
    let index = (((normalize_360(deg) + 11.25) / 22.5).floor() as usize) % 16;
    CARDINALS[index]
}

/// A geographic bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Smallest box containing all of `points` ((lat, lon) pairs).
    /// Returns `None` for an empty input.
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a (f64, f64)>,
    {
        let mut iter = points.into_iter();
        let &(lat0, lon0) = iter.next()?;
        let mut bbox = BoundingBox {
            min_lat: lat0,
            max_lat: lat0,
            min_lon: lon0,
            max_lon: lon0,
        };
        for &(lat, lon) in iter {
            bbox.min_lat = bbox.min_lat.min(lat);
            bbox.max_lat = bbox.max_lat.max(lat);
            bbox.min_lon = bbox.min_lon.min(lon);
            bbox.max_lon = bbox.max_lon.max(lon);
        }
        Some(bbox)
    }

    /// Box of `radius_km` around a centre point, using the flat-earth degree
    /// approximation (1° latitude ≈ 111 km, longitude shrunk by cos lat).
    pub fn around(lat: f64, lon: f64, radius_km: f64) -> Self {
        let dlat = radius_km / 111.0;
        let dlon = radius_km / (111.0 * lat.to_radians().cos().abs().max(1e-6));
        BoundingBox {
            min_lat: lat - dlat,
            max_lat: lat + dlat,
            min_lon: lon - dlon,
            max_lon: lon + dlon,
        }
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat)
            && (self.min_lon..=self.max_lon).contains(&lon)
    }

    /// Great-circle length of the box diagonal, km.
    pub fn diagonal_km(&self) -> f64 {
        distance_km(self.min_lat, self.min_lon, self.max_lat, self.max_lon).unwrap_or(0.0)
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }
}

/// A converted value together with its unit label.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Quantity {
    pub value: f64,
    pub unit: &'static str,
}

/// Nautical miles per knot-second, i.e. km travelled per second at 1 kt.
const NM_PER_KT_SECOND: f64 = 1.852 / 3600.0;

pub fn nm_to_km(nm: f64) -> Quantity {
    Quantity { value: nm * 1.852, unit: "km" }
}

pub fn km_to_nm(km: f64) -> Quantity {
    Quantity { value: km / 1.852, unit: "nm" }
}

pub fn feet_to_meters(ft: f64) -> Quantity {
    Quantity { value: ft * 0.3048, unit: "m" }
}

pub fn meters_to_feet(m: f64) -> Quantity {
    Quantity { value: m / 0.3048, unit: "ft" }
}

pub fn knots_to_mps(kt: f64) -> Quantity {
    Quantity { value: kt * 0.514444, unit: "m/s" }
}

pub fn mps_to_knots(mps: f64) -> Quantity {
    Quantity { value: mps / 0.514444, unit: "kt" }
}

/// Knots to kilometres per minute (via nm/60).
pub fn knots_to_km_per_min(kt: f64) -> Quantity {
    Quantity { value: kt * 1.852 / 60.0, unit: "km/min" }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONDON: (f64, f64) = (51.5074, -0.1278);
    const PARIS: (f64, f64) = (48.8566, 2.3522);

    fn assert_close(actual: f64, expected: f64, tolerance: f64, what: &str) {
        assert!(
            (actual - expected).abs() < tolerance,
            "{}: expected ~{}, got {}",
            what,
            expected,
            actual
        );
    }

    #[test]
    fn test_distance_identical_points_is_exactly_zero() {
        let d = distance_km(LONDON.0, LONDON.1, LONDON.0, LONDON.1).unwrap();
        assert_eq!(d, 0.0, "identical points must give exactly zero");
    }

    #[test]
    fn test_distance_symmetry() {
        let ab = distance_km(LONDON.0, LONDON.1, PARIS.0, PARIS.1).unwrap();
        let ba = distance_km(PARIS.0, PARIS.1, LONDON.0, LONDON.1).unwrap();
        assert_close(ab, ba, 1e-9, "distance must be symmetric");
    }

    #[test]
    fn test_distance_london_paris() {
        let d = distance_km(LONDON.0, LONDON.1, PARIS.0, PARIS.1).unwrap();
        // Published great-circle distance is about 344 km
        assert_close(d, 344.0, 3.0, "London-Paris distance");
    }

    #[test]
    fn test_distance_rejects_bad_latitude() {
        let result = distance_km(95.0, 0.0, 0.0, 0.0);
        assert_eq!(result, Err(GeometryError::InvalidLatitude(95.0)));
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let north = bearing_deg(50.0, 0.0, 51.0, 0.0).unwrap();
        assert_close(north, 0.0, 0.1, "due north bearing");

        let east = bearing_deg(0.0, 0.0, 0.0, 1.0).unwrap();
        assert_close(east, 90.0, 0.1, "due east bearing on the equator");
    }

    #[test]
    fn test_projected_position_round_trip() {
        let (lat, lon) = projected_position(LONDON.0, LONDON.1, 100.0, 45.0).unwrap();
        let back = distance_km(LONDON.0, LONDON.1, lat, lon).unwrap();
        assert_close(back, 100.0, 0.01, "projection distance round trip");
        let brg = bearing_deg(LONDON.0, LONDON.1, lat, lon).unwrap();
        assert_close(brg, 45.0, 0.1, "projection bearing round trip");
    }

    #[test]
    fn test_cross_track_observer_on_path() {
        // Observer due east of the aircraft, aircraft tracking due east:
        // no cross-track error, along-track equals the separation.
        let separation = distance_km(0.0, 0.0, 0.0, 1.0).unwrap();
        let ct = cross_track(0.0, 1.0, 0.0, 0.0, 90.0).unwrap();
        assert_close(ct.cross_km, 0.0, 0.01, "observer on path has no cross-track");
        assert_close(ct.along_km, separation, 0.01, "along-track equals separation");
        assert!(ct.is_approaching, "aircraft tracking towards observer");
    }

    #[test]
    fn test_cross_track_sign_right_of_track() {
        // Aircraft at origin tracking north; observer to the east (right).
        let ct = cross_track(0.0, 0.5, 0.0, 0.0, 0.0).unwrap();
        assert!(
            ct.cross_km > 0.0,
            "observer right of track must give positive cross-track, got {}",
            ct.cross_km
        );

        // Observer to the west (left) flips the sign.
        let ct = cross_track(0.0, -0.5, 0.0, 0.0, 0.0).unwrap();
        assert!(ct.cross_km < 0.0, "observer left of track must be negative");
    }

    #[test]
    fn test_cross_track_receding() {
        // Aircraft at origin tracking north, observer due south behind it.
        let ct = cross_track(-1.0, 0.0, 0.0, 0.0, 0.0).unwrap();
        assert!(!ct.is_approaching, "observer behind the aircraft is receding");
    }

    #[test]
    fn test_vertical_angle_close_range() {
        // 1 km out, ~3281 ft up: 45 degrees, no curvature correction.
        let angle = vertical_angle(1.0, 1000.0 / 0.3048, 51.0).unwrap();
        assert_close(angle, 45.0, 0.1, "45 degree elevation at close range");
    }

    #[test]
    fn test_vertical_angle_curvature_reduces_elevation() {
        let near = vertical_angle(9.0, 10_000.0, 51.0).unwrap();
        let far = vertical_angle(40.0, 10_000.0, 51.0).unwrap();
        assert!(
            far < near,
            "curvature correction must lower the apparent elevation ({} vs {})",
            far,
            near
        );
    }

    #[test]
    fn test_slant_range() {
        // 3 km horizontal, 4 km vertical -> 5 km slant
        let ft = 4000.0 / 0.3048;
        assert_close(slant_range_km(3.0, ft), 5.0, 0.01, "3-4-5 slant range");
    }

    #[test]
    fn test_velocity_components_track_north_and_east() {
        let north = velocity_components(0.0, 100.0).unwrap();
        assert_close(north.x, 0.0, 1e-9, "northbound x component");
        assert_close(north.y, 100.0, 1e-9, "northbound y component");

        let east = velocity_components(90.0, 100.0).unwrap();
        assert_close(east.x, 100.0, 1e-9, "eastbound x component");
        assert_close(east.y, 0.0, 1e-9, "eastbound y component");
    }

    #[test]
    fn test_closure_head_on() {
        // Two aircraft 10 km apart on the equator flying straight at each
        // other at 250 kt each.
        let geometry = closure_geometry(90.0, 250.0, 270.0, 250.0, 90.0, 10.0).unwrap();
        assert_eq!(geometry.classification, EncounterClass::HeadOn);
        assert_close(
            geometry.closure_velocity_kt,
            500.0,
            1.0,
            "combined head-on closure",
        );
        let t_cpa = geometry
            .time_to_closest_approach_s
            .expect("head-on pair must have a CPA");
        assert!(t_cpa > 0.0, "CPA must be in the future");
        assert_close(geometry.min_separation_km, 0.0, 0.1, "head-on minimum separation");
    }

    #[test]
    fn test_closure_overtaking() {
        let geometry = closure_geometry(90.0, 400.0, 95.0, 150.0, 90.0, 5.0).unwrap();
        assert_eq!(geometry.classification, EncounterClass::Overtaking);
    }

    #[test]
    fn test_closure_diverging_pair_has_negative_closure() {
        let geometry = closure_geometry(270.0, 200.0, 90.0, 200.0, 90.0, 10.0).unwrap();
        assert!(
            geometry.closure_velocity_kt < 0.0,
            "back-to-back aircraft must diverge, got {}",
            geometry.closure_velocity_kt
        );
    }

    #[test]
    fn test_bearing_to_cardinal() {
        assert_eq!(bearing_to_cardinal(0.0), "N");
        assert_eq!(bearing_to_cardinal(359.9), "N");
        assert_eq!(bearing_to_cardinal(90.0), "E");
        assert_eq!(bearing_to_cardinal(247.5), "WSW");
        assert_eq!(bearing_to_cardinal(260.0), "W");
    }

    #[test]
    fn test_bounding_box_around() {
        let bbox = BoundingBox::around(51.5, -0.1, 11.1);
        assert_close(bbox.max_lat - bbox.min_lat, 0.2, 1e-6, "latitude span");
        assert!(bbox.contains(51.5, -0.1), "centre must be inside");
        assert!(!bbox.contains(52.0, -0.1), "far point must be outside");
    }

    #[test]
    fn test_unit_conversions() {
        assert_close(nm_to_km(1.0).value, 1.852, 1e-9, "nm to km");
        assert_close(km_to_nm(1.852).value, 1.0, 1e-9, "km to nm");
        assert_close(feet_to_meters(1.0).value, 0.3048, 1e-9, "ft to m");
        assert_close(knots_to_mps(1.0).value, 0.514444, 1e-9, "kt to m/s");
        assert_close(knots_to_km_per_min(60.0).value, 1.852, 1e-9, "kt to km/min");
        assert_eq!(nm_to_km(1.0).unit, "km");
    }
}

//! Runtime configuration.
//!
//! Loaded from a TOML file with per-field serde defaults, then overridden by
//! CLI flags. Every detector threshold in the filter set lives here; the
//! literals in the default functions are the documented deployment defaults,
//! never hard-coded in the detectors themselves.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::squawks::{Squawk, SquawkKind};

/// The receiver site the engine observes from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observer {
    pub lat: f64,
    pub lon: f64,
    /// Site elevation in metres.
    #[serde(default)]
    pub alt_m: f64,
}

impl Default for Observer {
    fn default() -> Self {
        // Central London receiver site.
        Observer {
            lat: 51.501_126,
            lon: -0.142_39,
            alt_m: 15.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickConfig {
    /// Seconds between feed polls.
    #[serde(default = "default_tick_interval_s")]
    pub interval_s: u64,
    /// Soft budget for one tick's filter work; exceeding it truncates the
    /// remaining filters for that tick.
    #[serde(default = "default_tick_budget_ms")]
    pub budget_ms: u64,
    /// Consecutive absent ticks before an aircraft is retired.
    #[serde(default = "default_retire_after_ticks")]
    pub retire_after_ticks: u32,
    /// Emit a status snapshot every N ticks.
    #[serde(default = "default_status_interval_ticks")]
    pub status_interval_ticks: u32,
    /// Trajectory retention window, minutes.
    #[serde(default = "default_trajectory_retention_min")]
    pub trajectory_retention_min: i64,
    /// Hard cap on trajectory entries per aircraft.
    #[serde(default = "default_trajectory_max_entries")]
    pub trajectory_max_entries: usize,
}

fn default_tick_interval_s() -> u64 {
    5
}
fn default_tick_budget_ms() -> u64 {
    2000
}
fn default_retire_after_ticks() -> u32 {
    5
}
fn default_status_interval_ticks() -> u32 {
    12
}
fn default_trajectory_retention_min() -> i64 {
    10
}
fn default_trajectory_max_entries() -> usize {
    1200
}

impl Default for TickConfig {
    fn default() -> Self {
        TickConfig {
            interval_s: default_tick_interval_s(),
            budget_ms: default_tick_budget_ms(),
            retire_after_ticks: default_retire_after_ticks(),
            status_interval_ticks: default_status_interval_ticks(),
            trajectory_retention_min: default_trajectory_retention_min(),
            trajectory_max_entries: default_trajectory_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceConfig {
    /// Path to the airports JSON produced by the upstream converter.
    #[serde(default)]
    pub airports_path: Option<PathBuf>,
    /// Path to the squawk-ranges JSON.
    #[serde(default)]
    pub squawks_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Decoder aircraft.json endpoint to poll.
    #[serde(default)]
    pub url: Option<String>,
    /// Recorded snapshot file to replay instead of polling.
    #[serde(default)]
    pub replay_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Topic prefix for the publish sink, e.g. "skywatch" yields
    /// "skywatch/airprox/insert".
    #[serde(default = "default_topic_base")]
    pub topic_base: String,
    /// Also render alerts to the log sink.
    #[serde(default = "default_true")]
    pub log_alerts: bool,
}

fn default_topic_base() -> String {
    "skywatch".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        DeliveryConfig {
            topic_base: default_topic_base(),
            log_alerts: default_true(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus scrape listener, e.g. "127.0.0.1:9633"; disabled when
    /// absent.
    #[serde(default)]
    pub addr: Option<SocketAddr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverheadConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum cross-track miss distance for an intercept, km.
    #[serde(default = "default_overhead_radius_km")]
    pub radius_km: f64,
    /// Maximum |seconds to closest approach|.
    #[serde(default = "default_overhead_time_limit_s")]
    pub time_limit_s: f64,
    /// Maximum projected altitude at the intercept point, ft.
    #[serde(default = "default_overhead_altitude_limit_ft")]
    pub altitude_limit_ft: f64,
    /// Maximum current distance from the observer, km.
    #[serde(default = "default_overhead_distance_limit_km")]
    pub distance_limit_km: f64,
    /// Refine confidence from trajectory stability.
    #[serde(default = "default_true")]
    pub refine_confidence: bool,
}

fn default_overhead_radius_km() -> f64 {
    2.0
}
fn default_overhead_time_limit_s() -> f64 {
    900.0
}
fn default_overhead_altitude_limit_ft() -> f64 {
    25_000.0
}
fn default_overhead_distance_limit_km() -> f64 {
    150.0
}

impl Default for OverheadConfig {
    fn default() -> Self {
        OverheadConfig {
            enabled: true,
            radius_km: default_overhead_radius_km(),
            time_limit_s: default_overhead_time_limit_s(),
            altitude_limit_ft: default_overhead_altitude_limit_ft(),
            distance_limit_km: default_overhead_distance_limit_km(),
            refine_confidence: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirportsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Basic "near an airport" radius, km.
    #[serde(default = "default_atz_radius_km")]
    pub atz_radius_km: f64,
    /// Default runway-alignment search distance, km.
    #[serde(default = "default_alignment_distance_km")]
    pub alignment_distance_km: f64,
    /// Per-emitter-category overrides of the alignment distance, km.
    #[serde(default = "default_alignment_distance_by_category")]
    pub alignment_distance_by_category: HashMap<String, f64>,
    /// ICAO codes given per-airport traffic analysis in postprocess.
    #[serde(default)]
    pub priority_airports: Vec<String>,
    /// Treat the coverage area as dense terminal airspace (light aircraft
    /// then skip large airports for relevance).
    #[serde(default)]
    pub dense_area: bool,
    /// Kept per-airport history entries for runway-change detection.
    #[serde(default = "default_analysis_history")]
    pub analysis_history: usize,
}

fn default_atz_radius_km() -> f64 {
    crate::airports::ATZ_RADIUS_KM
}
fn default_alignment_distance_km() -> f64 {
    20.0
}
fn default_alignment_distance_by_category() -> HashMap<String, f64> {
    HashMap::from([
        ("A1".to_string(), 10.0),
        ("A3".to_string(), 25.0),
        ("A4".to_string(), 25.0),
        ("A5".to_string(), 30.0),
        ("A7".to_string(), 5.0),
    ])
}
fn default_analysis_history() -> usize {
    20
}

impl Default for AirportsConfig {
    fn default() -> Self {
        AirportsConfig {
            enabled: true,
            atz_radius_km: default_atz_radius_km(),
            alignment_distance_km: default_alignment_distance_km(),
            alignment_distance_by_category: default_alignment_distance_by_category(),
            priority_airports: Vec::new(),
            dense_area: false,
            analysis_history: default_analysis_history(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirproxConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Horizontal proximity threshold, nm.
    #[serde(default = "default_airprox_horizontal_nm")]
    pub horizontal_nm: f64,
    /// Vertical proximity threshold, ft.
    #[serde(default = "default_airprox_vertical_ft")]
    pub vertical_ft: f64,
    /// Closure rate considered "high", kt.
    #[serde(default = "default_airprox_closure_kt")]
    pub high_closure_kt: f64,
    /// Positions older than this are ignored (unless a TCAS alert is
    /// active), seconds.
    #[serde(default = "default_airprox_stale_s")]
    pub stale_position_s: f64,
    /// Suppress likely formation pairs.
    #[serde(default = "default_true")]
    pub formation_filter: bool,
    #[serde(default = "default_formation_track_deg")]
    pub formation_track_deg: f64,
    #[serde(default = "default_formation_alt_ft")]
    pub formation_alt_ft: f64,
    #[serde(default = "default_formation_gs_kt")]
    pub formation_gs_kt: f64,
}

fn default_airprox_horizontal_nm() -> f64 {
    1.0
}
fn default_airprox_vertical_ft() -> f64 {
    1000.0
}
fn default_airprox_closure_kt() -> f64 {
    400.0
}
fn default_airprox_stale_s() -> f64 {
    30.0
}
fn default_formation_track_deg() -> f64 {
    5.0
}
fn default_formation_alt_ft() -> f64 {
    50.0
}
fn default_formation_gs_kt() -> f64 {
    20.0
}

impl Default for AirproxConfig {
    fn default() -> Self {
        AirproxConfig {
            enabled: true,
            horizontal_nm: default_airprox_horizontal_nm(),
            vertical_ft: default_airprox_vertical_ft(),
            high_closure_kt: default_airprox_closure_kt(),
            stale_position_s: default_airprox_stale_s(),
            formation_filter: true,
            formation_track_deg: default_formation_track_deg(),
            formation_alt_ft: default_formation_alt_ft(),
            formation_gs_kt: default_formation_gs_kt(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoiteringConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_loiter_max_altitude_ft")]
    pub max_altitude_ft: i32,
    #[serde(default = "default_loiter_min_gs_kt")]
    pub min_gs_kt: f64,
    #[serde(default = "default_loiter_max_gs_kt")]
    pub max_gs_kt: f64,
    #[serde(default = "default_loiter_min_entries")]
    pub min_entries: usize,
    /// Analysis window, minutes.
    #[serde(default = "default_loiter_window_min")]
    pub window_min: i64,
    #[serde(default = "default_loiter_min_diagonal_km")]
    pub min_diagonal_km: f64,
    #[serde(default = "default_loiter_max_diagonal_km")]
    pub max_diagonal_km: f64,
    #[serde(default = "default_loiter_min_path_km")]
    pub min_path_km: f64,
    #[serde(default = "default_loiter_score_threshold")]
    pub score_threshold: f64,
    /// Straight-line travel a non-loitering aircraft covers per minute, km;
    /// the bounding-box score compares the footprint against this.
    #[serde(default = "default_loiter_expected_travel")]
    pub expected_travel_km_per_min: f64,
    /// Altitude spread at which the consistency component reaches zero, ft.
    #[serde(default = "default_loiter_altitude_spread_ft")]
    pub altitude_spread_ft: f64,
}

fn default_loiter_max_altitude_ft() -> i32 {
    5000
}
fn default_loiter_min_gs_kt() -> f64 {
    10.0
}
fn default_loiter_max_gs_kt() -> f64 {
    150.0
}
fn default_loiter_min_entries() -> usize {
    10
}
fn default_loiter_window_min() -> i64 {
    10
}
fn default_loiter_min_diagonal_km() -> f64 {
    0.2
}
fn default_loiter_max_diagonal_km() -> f64 {
    10.0
}
fn default_loiter_min_path_km() -> f64 {
    0.5
}
fn default_loiter_score_threshold() -> f64 {
    0.7
}
fn default_loiter_expected_travel() -> f64 {
    2.0
}
fn default_loiter_altitude_spread_ft() -> f64 {
    1000.0
}

impl Default for LoiteringConfig {
    fn default() -> Self {
        LoiteringConfig {
            enabled: true,
            max_altitude_ft: default_loiter_max_altitude_ft(),
            min_gs_kt: default_loiter_min_gs_kt(),
            max_gs_kt: default_loiter_max_gs_kt(),
            min_entries: default_loiter_min_entries(),
            window_min: default_loiter_window_min(),
            min_diagonal_km: default_loiter_min_diagonal_km(),
            max_diagonal_km: default_loiter_max_diagonal_km(),
            min_path_km: default_loiter_min_path_km(),
            score_threshold: default_loiter_score_threshold(),
            expected_travel_km_per_min: default_loiter_expected_travel(),
            altitude_spread_ft: default_loiter_altitude_spread_ft(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquawkConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Literal codes that always flag the aircraft.
    #[serde(default)]
    pub watchlist: Vec<Squawk>,
    /// Range kinds that flag any aircraft squawking inside them.
    #[serde(default = "default_watched_kinds")]
    pub watched_kinds: Vec<SquawkKind>,
}

fn default_watched_kinds() -> Vec<SquawkKind> {
    vec![
        SquawkKind::Emergency,
        SquawkKind::Sar,
        SquawkKind::Hems,
        SquawkKind::Police,
        SquawkKind::Royal,
        SquawkKind::Military,
        SquawkKind::Special,
        SquawkKind::DangerArea,
        SquawkKind::Display,
        SquawkKind::Uas,
    ]
}

impl Default for SquawkConfig {
    fn default() -> Self {
        SquawkConfig {
            enabled: true,
            watchlist: Vec::new(),
            watched_kinds: default_watched_kinds(),
        }
    }
}

/// Expected performance figures for one emitter category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub initial_climb_fpm: f64,
    pub cruise_climb_fpm: f64,
    pub cruise_speed_low_kt: f64,
    pub cruise_speed_mid_kt: f64,
    pub cruise_speed_high_kt: f64,
    pub descent_fpm: f64,
    pub approach_descent_fpm: f64,
    pub ceiling_ft: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Tolerance for climb/descent comparisons (fractional buffer).
    #[serde(default = "default_perf_climb_tolerance")]
    pub climb_tolerance: f64,
    /// Tolerance for cruise speed comparisons.
    #[serde(default = "default_perf_speed_tolerance")]
    pub speed_tolerance: f64,
    /// Fractional buffer above expected climb that counts as excessive.
    #[serde(default = "default_perf_excessive_buffer")]
    pub excessive_buffer: f64,
    /// Per-category expected envelopes, keyed by emitter category string.
    #[serde(default = "default_envelopes")]
    pub envelopes: HashMap<String, Envelope>,
    /// Fallback envelope for categories without an entry.
    #[serde(default = "default_envelope")]
    pub default_envelope: Envelope,
}

fn default_perf_climb_tolerance() -> f64 {
    0.3
}
fn default_perf_speed_tolerance() -> f64 {
    0.1
}
fn default_perf_excessive_buffer() -> f64 {
    0.8
}

fn default_envelope() -> Envelope {
    Envelope {
        initial_climb_fpm: 2000.0,
        cruise_climb_fpm: 1200.0,
        cruise_speed_low_kt: 250.0,
        cruise_speed_mid_kt: 350.0,
        cruise_speed_high_kt: 450.0,
        descent_fpm: 1800.0,
        approach_descent_fpm: 800.0,
        ceiling_ft: 41_000.0,
    }
}

fn default_envelopes() -> HashMap<String, Envelope> {
    HashMap::from([
        ("A1".to_string(), Envelope {
            initial_climb_fpm: 800.0,
            cruise_climb_fpm: 500.0,
            cruise_speed_low_kt: 110.0,
            cruise_speed_mid_kt: 140.0,
            cruise_speed_high_kt: 160.0,
            descent_fpm: 700.0,
            approach_descent_fpm: 500.0,
            ceiling_ft: 14_000.0,
        }),
        ("A2".to_string(), Envelope {
            initial_climb_fpm: 1500.0,
            cruise_climb_fpm: 1000.0,
            cruise_speed_low_kt: 200.0,
            cruise_speed_mid_kt: 260.0,
            cruise_speed_high_kt: 300.0,
            descent_fpm: 1200.0,
            approach_descent_fpm: 700.0,
            ceiling_ft: 28_000.0,
        }),
        ("A3".to_string(), Envelope {
            initial_climb_fpm: 2500.0,
            cruise_climb_fpm: 1500.0,
            cruise_speed_low_kt: 280.0,
            cruise_speed_mid_kt: 400.0,
            cruise_speed_high_kt: 460.0,
            descent_fpm: 2000.0,
            approach_descent_fpm: 800.0,
            ceiling_ft: 41_000.0,
        }),
        ("A4".to_string(), Envelope {
            initial_climb_fpm: 2200.0,
            cruise_climb_fpm: 1400.0,
            cruise_speed_low_kt: 280.0,
            cruise_speed_mid_kt: 420.0,
            cruise_speed_high_kt: 480.0,
            descent_fpm: 2000.0,
            approach_descent_fpm: 800.0,
            ceiling_ft: 43_000.0,
        }),
        ("A5".to_string(), Envelope {
            initial_climb_fpm: 2000.0,
            cruise_climb_fpm: 1200.0,
            cruise_speed_low_kt: 290.0,
            cruise_speed_mid_kt: 450.0,
            cruise_speed_high_kt: 500.0,
            descent_fpm: 2200.0,
            approach_descent_fpm: 900.0,
            ceiling_ft: 45_000.0,
        }),
        ("A7".to_string(), Envelope {
            initial_climb_fpm: 1000.0,
            cruise_climb_fpm: 500.0,
            cruise_speed_low_kt: 110.0,
            cruise_speed_mid_kt: 140.0,
            cruise_speed_high_kt: 160.0,
            descent_fpm: 800.0,
            approach_descent_fpm: 500.0,
            ceiling_ft: 12_000.0,
        }),
        ("B1".to_string(), Envelope {
            initial_climb_fpm: 400.0,
            cruise_climb_fpm: 200.0,
            cruise_speed_low_kt: 60.0,
            cruise_speed_mid_kt: 90.0,
            cruise_speed_high_kt: 120.0,
            descent_fpm: 400.0,
            approach_descent_fpm: 300.0,
            ceiling_ft: 20_000.0,
        }),
        ("B6".to_string(), Envelope {
            initial_climb_fpm: 600.0,
            cruise_climb_fpm: 300.0,
            cruise_speed_low_kt: 40.0,
            cruise_speed_mid_kt: 70.0,
            cruise_speed_high_kt: 100.0,
            descent_fpm: 500.0,
            approach_descent_fpm: 300.0,
            ceiling_ft: 18_000.0,
        }),
    ])
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        PerformanceConfig {
            enabled: true,
            climb_tolerance: default_perf_climb_tolerance(),
            speed_tolerance: default_perf_speed_tolerance(),
            excessive_buffer: default_perf_excessive_buffer(),
            envelopes: default_envelopes(),
            default_envelope: default_envelope(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FiltersConfig {
    #[serde(default)]
    pub overhead: OverheadConfig,
    #[serde(default)]
    pub airports: AirportsConfig,
    #[serde(default)]
    pub airprox: AirproxConfig,
    #[serde(default)]
    pub loitering: LoiteringConfig,
    #[serde(default)]
    pub squawk: SquawkConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub observer: Observer,
    #[serde(default)]
    pub tick: TickConfig,
    #[serde(default)]
    pub reference: ReferenceConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub filters: FiltersConfig,
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {:?}", path))?;
        let config: Config =
            toml::from_str(&contents).with_context(|| format!("failed to parse {:?}", path))?;
        Ok(config)
    }

    /// Runway-alignment search distance for an aircraft of the given
    /// category.
    pub fn alignment_distance_km(&self, category: Option<&str>) -> f64 {
        category
            .and_then(|c| self.filters.airports.alignment_distance_by_category.get(c))
            .copied()
            .unwrap_or(self.filters.airports.alignment_distance_km)
    }
}

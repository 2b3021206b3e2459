//! skywatch: a real-time situational-awareness engine for ADS-B feeds.
//!
//! The engine polls snapshots of all currently-tracked aircraft from an
//! upstream decoder, maintains a short rolling trajectory per aircraft, and
//! on every tick runs a set of analytical filters (overhead intercept,
//! airport proximity and runway phase, airprox, loitering, squawk
//! classification, performance envelope). Classification transitions are
//! emitted as alert insertions and removals, plus a periodic status
//! snapshot, to pluggable delivery sinks.

pub mod aircraft;
pub mod airports;
pub mod alerts;
pub mod config;
pub mod delivery;
pub mod engine;
pub mod feed;
pub mod filters;
pub mod geometry;
pub mod metrics;
pub mod pipeline;
pub mod snapshot;
pub mod squawks;
pub mod statistics;
pub mod trajectory;

pub use aircraft::{Aircraft, AircraftTable};
pub use alerts::{Alert, AlertEvent, AlertSub, StatusReport};
pub use config::{Config, Observer};
pub use engine::Engine;
pub use feed::{Feed, FeedSnapshot, HttpFeed, ReplayFeed};
pub use pipeline::{Filter, FilterPipeline, TickContext};
pub use snapshot::AircraftSnapshot;

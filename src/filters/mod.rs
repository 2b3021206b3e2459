//! The analytical filter set.
//!
//! Each submodule owns one filter: its configuration snapshot, its typed
//! result struct (stored in the aircraft's `calculated` pocket), and the
//! detector kernel that fills it. Registration order does not matter; the
//! pipeline orders filters by priority.

pub mod airport;
pub mod airprox;
pub mod loitering;
pub mod overhead;
pub mod performance;
pub mod squawk;

use crate::config::Config;
use crate::pipeline::FilterPipeline;

/// Register every enabled filter from the configuration.
pub fn register_enabled(pipeline: &mut FilterPipeline, config: &Config) {
    let filters = &config.filters;
    if filters.overhead.enabled {
        pipeline.register(Box::new(overhead::OverheadFilter::default()));
    }
    if filters.airports.enabled {
        pipeline.register(Box::new(airport::AirportFilter::default()));
    }
    if filters.airprox.enabled {
        pipeline.register(Box::new(airprox::AirproxFilter::default()));
    }
    if filters.loitering.enabled {
        pipeline.register(Box::new(loitering::LoiteringFilter::default()));
    }
    if filters.squawk.enabled {
        pipeline.register(Box::new(squawk::SquawkFilter::default()));
    }
    if filters.performance.enabled {
        pipeline.register(Box::new(performance::PerformanceFilter::default()));
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use skywatch::airports::AirportIndex;
use skywatch::config::Config;
use skywatch::delivery::LogSink;
use skywatch::engine::Engine;
use skywatch::feed::{Feed, HttpFeed, ReplayFeed};
use skywatch::squawks::{Squawk, SquawkTable};

#[derive(Parser, Debug)]
#[command(name = "skywatch", about = "Situational awareness engine for ADS-B feeds")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Observer latitude (overrides the config file).
    #[arg(long)]
    lat: Option<f64>,

    /// Observer longitude (overrides the config file).
    #[arg(long)]
    lon: Option<f64>,

    /// Observer elevation in metres (overrides the config file).
    #[arg(long)]
    alt: Option<f64>,

    /// Seconds between feed polls (overrides the config file).
    #[arg(long)]
    interval: Option<u64>,

    /// Decoder aircraft.json URL to poll.
    #[arg(long)]
    feed_url: Option<String>,

    /// Recorded snapshot file to replay instead of polling.
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Disable a filter by id (repeatable).
    #[arg(long = "disable", value_name = "FILTER")]
    disabled_filters: Vec<String>,

    /// Priority airport ICAO code for traffic analysis (repeatable).
    #[arg(long = "priority-airport", value_name = "ICAO")]
    priority_airports: Vec<String>,

    /// Squawk code to watch (repeatable).
    #[arg(long = "watch-squawk", value_name = "CODE")]
    watch_squawks: Vec<String>,

    /// Prometheus scrape listener, e.g. 127.0.0.1:9633.
    #[arg(long)]
    metrics_addr: Option<std::net::SocketAddr>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn apply_to(&self, config: &mut Config) -> Result<()> {
        if let Some(lat) = self.lat {
            config.observer.lat = lat;
        }
        if let Some(lon) = self.lon {
            config.observer.lon = lon;
        }
        if let Some(alt) = self.alt {
            config.observer.alt_m = alt;
        }
        if let Some(interval) = self.interval {
            config.tick.interval_s = interval;
        }
        if let Some(url) = &self.feed_url {
            config.feed.url = Some(url.clone());
        }
        if let Some(path) = &self.replay {
            config.feed.replay_path = Some(path.clone());
        }
        if let Some(addr) = self.metrics_addr {
            config.metrics.addr = Some(addr);
        }
        if !self.priority_airports.is_empty() {
            config.filters.airports.priority_airports = self.priority_airports.clone();
        }
        for code in &self.watch_squawks {
            let squawk = Squawk::parse(code)
                .with_context(|| format!("invalid watchlist squawk {:?}", code))?;
            if !config.filters.squawk.watchlist.contains(&squawk) {
                config.filters.squawk.watchlist.push(squawk);
            }
        }
        for id in &self.disabled_filters {
            match id.as_str() {
                "overhead" => config.filters.overhead.enabled = false,
                "airports" => config.filters.airports.enabled = false,
                "airprox" => config.filters.airprox.enabled = false,
                "loitering" => config.filters.loitering.enabled = false,
                "squawk" => config.filters.squawk.enabled = false,
                "performance" => config.filters.performance.enabled = false,
                other => bail!("unknown filter id {:?}", other),
            }
        }
        Ok(())
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("skywatch={}", default_level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    cli.apply_to(&mut config)?;

    if let Some(addr) = config.metrics.addr {
        skywatch::metrics::init_metrics(addr)?;
    }

    let airports = match &config.reference.airports_path {
        Some(path) => Arc::new(AirportIndex::from_json_file(path)?),
        None => {
            warn!("no airport data configured; the airport filter will be idle");
            Arc::new(AirportIndex::new(vec![]))
        }
    };
    let squawks = match &config.reference.squawks_path {
        Some(path) => Arc::new(SquawkTable::from_json_file(path)?),
        None => {
            warn!("no squawk table configured; squawk matching limited to anomaly checks");
            Arc::new(SquawkTable::default())
        }
    };

    let mut feed: Box<dyn Feed> = match (&config.feed.replay_path, &config.feed.url) {
        (Some(path), _) => {
            info!("replaying capture {:?}", path);
            Box::new(ReplayFeed::from_file(path)?)
        }
        (None, Some(url)) => {
            info!(
                "polling {} every {} s from ({:.5}, {:.5})",
                url, config.tick.interval_s, config.observer.lat, config.observer.lon
            );
            Box::new(HttpFeed::new(url.clone()))
        }
        (None, None) => bail!("no feed configured: set feed.url or feed.replay_path"),
    };

    let log_alerts = config.delivery.log_alerts;
    let mut engine = Engine::new(config, airports, squawks)?;
    if log_alerts {
        engine.add_sink(Box::new(LogSink));
    }

    engine.run(feed.as_mut()).await
}

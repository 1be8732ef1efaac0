// Runtime configuration for the tracker
//
// Every setting can come from the command line or the environment (a `.env`
// file is loaded first by `main`).

use crate::hbt_destinations::DestinationTable;
use crate::hbt_feed::{DEFAULT_FEED_URL, FeedFormat};
use crate::hbt_filter::{DEFAULT_ROUTE_THRESHOLD, FilterState};
use crate::hbt_models::{HBTError, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, Parser)]
#[command(name = "hbt")]
#[command(about = "Live Halifax Transit bus tracker")]
pub struct Args {
    /// Vehicle position feed URL
    #[arg(long, env = "HBT_FEED_URL", default_value = DEFAULT_FEED_URL)]
    pub feed_url: String,

    /// Wire format served at the feed URL
    #[arg(long, env = "HBT_FEED_FORMAT", value_enum, default_value_t = FeedFormat::Json)]
    pub feed_format: FeedFormat,

    /// Seconds between polls
    #[arg(short, long, env = "HBT_POLL_INTERVAL_SECS", default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    pub interval: u64,

    /// Numeric routes below this id are tracked by default
    #[arg(long, env = "HBT_ROUTE_THRESHOLD", default_value_t = DEFAULT_ROUTE_THRESHOLD)]
    pub route_threshold: u32,

    /// HTTP timeout for one feed request, in seconds
    #[arg(long, env = "HBT_REQUEST_TIMEOUT_SECS", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout: u64,

    /// CSV with route_id,direction_id,destination columns
    #[arg(long, env = "HBT_DESTINATIONS_CSV")]
    pub destinations_csv: Option<PathBuf>,

    /// Write the displayed vehicles as GeoJSON to this file after every cycle
    #[arg(long, env = "HBT_GEOJSON_OUT")]
    pub geojson_out: Option<PathBuf>,

    /// Start tracking a single route instead of the default set
    #[arg(short, long)]
    pub route: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    pub feed_url: String,
    pub feed_format: FeedFormat,
    pub poll_interval: Duration,
    pub route_threshold: u32,
    pub request_timeout: Duration,
    pub destinations_csv: Option<PathBuf>,
    pub geojson_out: Option<PathBuf>,
    pub initial_route: Option<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            feed_url: DEFAULT_FEED_URL.to_string(),
            feed_format: FeedFormat::Json,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            route_threshold: DEFAULT_ROUTE_THRESHOLD,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            destinations_csv: None,
            geojson_out: None,
            initial_route: None,
        }
    }
}

impl TrackerConfig {
    pub fn from_args(args: Args) -> Result<Self> {
        let config = TrackerConfig {
            feed_url: args.feed_url,
            feed_format: args.feed_format,
            poll_interval: Duration::from_secs(args.interval),
            route_threshold: args.route_threshold,
            request_timeout: Duration::from_secs(args.request_timeout),
            destinations_csv: args.destinations_csv,
            geojson_out: args.geojson_out,
            initial_route: args
                .route
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.feed_url.trim().is_empty() {
            return Err(HBTError::Config("feed URL is empty".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(HBTError::Config(
                "poll interval must be at least one second".to_string(),
            ));
        }
        if self.route_threshold < 1 {
            return Err(HBTError::Config(
                "route threshold must be at least 1".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(HBTError::Config(
                "request timeout must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn default_filter(&self) -> FilterState {
        FilterState::DefaultRoutes {
            threshold: self.route_threshold,
        }
    }

    pub fn initial_filter(&self) -> FilterState {
        match &self.initial_route {
            Some(route) => FilterState::SingleRoute(route.clone()),
            None => self.default_filter(),
        }
    }

    pub fn load_destinations(&self) -> Result<DestinationTable> {
        match &self.destinations_csv {
            Some(path) => DestinationTable::load_csv(path),
            None => Ok(DestinationTable::builtin()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("hbt").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn command_line_overrides() {
        let args = parse(&[
            "--feed-url",
            "http://localhost:3000/busData",
            "--feed-format",
            "protobuf",
            "--interval",
            "10",
            "--route-threshold",
            "12",
            "--route",
            " 6A ",
        ]);
        let config = TrackerConfig::from_args(args).unwrap();

        assert_eq!(config.feed_url, "http://localhost:3000/busData");
        assert_eq!(config.feed_format, FeedFormat::Protobuf);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.initial_filter(), FilterState::SingleRoute("6A".to_string()));
        assert_eq!(config.default_filter(), FilterState::DefaultRoutes { threshold: 12 });
    }

    #[test]
    fn zero_interval_rejected() {
        let config = TrackerConfig {
            poll_interval: Duration::ZERO,
            ..TrackerConfig::default()
        };
        assert!(matches!(config.validate(), Err(HBTError::Config(_))));
    }

    #[test]
    fn zero_threshold_rejected() {
        let config = TrackerConfig {
            route_threshold: 0,
            ..TrackerConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(TrackerConfig::default().validate().is_ok());
    }

    #[test]
    fn builtin_destinations_without_csv() {
        let table = TrackerConfig::default().load_destinations().unwrap();
        assert!(table.is_known_route("433"));
    }
}

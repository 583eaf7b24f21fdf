//! Server configuration from environment.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use kerbside_core::index::{DEFAULT_BOUNDS_LIMIT, DEFAULT_TARGET_PER_CELL, DEFAULT_TOP_K};
use kerbside_core::GridConfig;
use kerbside_feed::melbourne::{DEFAULT_FEED_URL, DEFAULT_MAX_RECORDS, MAX_PAGE_SIZE};

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub feed_url: String,
    pub feed_page_size: usize,
    pub feed_max_records: usize,
    /// Read records from this JSON file instead of the live API
    pub records_file: Option<PathBuf>,
    pub boundaries_file: Option<PathBuf>,
    pub refresh_interval_secs: u64,
    pub fetch_timeout_secs: u64,
    /// Fixed grid cell size; derived from the data when unset
    pub cell_size_deg: Option<f64>,
    /// Occupancy rate decimals (1 or 2)
    pub rate_decimals: u32,
    pub nearby_limit: usize,
    pub bounds_limit: usize,
    /// Map listings leave out bays not reported within this many hours; 0 keeps all
    pub active_hours: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            feed_url: DEFAULT_FEED_URL.to_string(),
            feed_page_size: MAX_PAGE_SIZE,
            feed_max_records: DEFAULT_MAX_RECORDS,
            records_file: None,
            boundaries_file: None,
            refresh_interval_secs: 60,
            fetch_timeout_secs: 30,
            cell_size_deg: None,
            rate_decimals: 1,
            nearby_limit: DEFAULT_TOP_K,
            bounds_limit: DEFAULT_BOUNDS_LIMIT,
            active_hours: 24,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: parse_env("KERBSIDE_PORT").unwrap_or(defaults.server_port),
            feed_url: env::var("KERBSIDE_FEED_URL").unwrap_or(defaults.feed_url),
            feed_page_size: parse_env::<usize>("KERBSIDE_FEED_PAGE_SIZE")
                .map(|size| size.clamp(1, MAX_PAGE_SIZE))
                .unwrap_or(defaults.feed_page_size),
            feed_max_records: parse_env("KERBSIDE_FEED_MAX_RECORDS")
                .unwrap_or(defaults.feed_max_records),
            records_file: path_env("KERBSIDE_RECORDS_FILE"),
            boundaries_file: path_env("KERBSIDE_BOUNDARIES_FILE"),
            refresh_interval_secs: parse_env::<u64>("KERBSIDE_REFRESH_SECS")
                .filter(|secs| *secs > 0)
                .unwrap_or(defaults.refresh_interval_secs),
            fetch_timeout_secs: parse_env::<u64>("KERBSIDE_FETCH_TIMEOUT_SECS")
                .filter(|secs| *secs > 0)
                .unwrap_or(defaults.fetch_timeout_secs),
            cell_size_deg: parse_env::<f64>("KERBSIDE_CELL_SIZE_DEG")
                .filter(|size| size.is_finite() && *size > 0.0),
            rate_decimals: parse_env::<u32>("KERBSIDE_RATE_DECIMALS")
                .filter(|decimals| (1..=2).contains(decimals))
                .unwrap_or(defaults.rate_decimals),
            nearby_limit: parse_env("KERBSIDE_NEARBY_LIMIT").unwrap_or(defaults.nearby_limit),
            bounds_limit: parse_env("KERBSIDE_BOUNDS_LIMIT").unwrap_or(defaults.bounds_limit),
            active_hours: parse_env("KERBSIDE_ACTIVE_HOURS").unwrap_or(defaults.active_hours),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    pub fn grid(&self) -> GridConfig {
        GridConfig {
            cell_size_deg: self.cell_size_deg,
            target_per_cell: DEFAULT_TARGET_PER_CELL,
        }
    }
}

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.trim().parse().ok())
}

fn path_env(key: &str) -> Option<PathBuf> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.feed_page_size, 100);
        assert_eq!(config.refresh_interval(), Duration::from_secs(60));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(30));
        assert_eq!(config.nearby_limit, 20);
        assert_eq!(config.bounds_limit, 1000);
        assert_eq!(config.rate_decimals, 1);
        assert_eq!(config.active_hours, 24);
        assert!(config.grid().cell_size_deg.is_none());
    }

    #[test]
    fn unparsable_values_fall_back() {
        env::set_var("KERBSIDE_TEST_PARSE_NUMBER", "not-a-number");
        assert_eq!(parse_env::<u16>("KERBSIDE_TEST_PARSE_NUMBER"), None);
        env::set_var("KERBSIDE_TEST_PARSE_NUMBER", " 8080 ");
        assert_eq!(parse_env::<u16>("KERBSIDE_TEST_PARSE_NUMBER"), Some(8080));
        env::remove_var("KERBSIDE_TEST_PARSE_NUMBER");

        env::set_var("KERBSIDE_TEST_PATH", "  ");
        assert_eq!(path_env("KERBSIDE_TEST_PATH"), None);
        env::remove_var("KERBSIDE_TEST_PATH");
    }
}

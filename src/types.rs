/// Core type definitions for the ingestion and analytics pipeline
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A single trade event from the feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
}

/// OHLCV bar over one fixed time window
///
/// Uniquely identified by `(symbol, timeframe, open_time)`; a later upsert
/// for the same identity replaces the prior row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Fixed bar resolutions produced by the flusher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    OneSecond,
    OneMinute,
    FiveMinute,
}

impl Timeframe {
    pub const ALL: [Timeframe; 3] = [
        Timeframe::OneSecond,
        Timeframe::OneMinute,
        Timeframe::FiveMinute,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::OneSecond => "1s",
            Timeframe::OneMinute => "1m",
            Timeframe::FiveMinute => "5m",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1s" => Some(Timeframe::OneSecond),
            "1m" => Some(Timeframe::OneMinute),
            "5m" => Some(Timeframe::FiveMinute),
            _ => None,
        }
    }

    pub fn duration_secs(&self) -> i64 {
        match self {
            Timeframe::OneSecond => 1,
            Timeframe::OneMinute => 60,
            Timeframe::FiveMinute => 300,
        }
    }

    /// Floor a timestamp to the start of its window
    pub fn window_start(&self, timestamp: DateTime<Utc>) -> DateTime<Utc> {
        let secs = self.duration_secs();
        let floored = timestamp.timestamp().div_euclid(secs) * secs;
        Utc.timestamp_opt(floored, 0).unwrap()
    }
}

/// Derived pairs-trading statistics over two aligned price series
///
/// Never persisted; rebuilt on every query.
#[derive(Debug, Clone)]
pub struct PairSnapshot {
    pub hedge_ratio: f64,
    pub spread: Vec<f64>,
    pub zscore: Vec<f64>,
    pub rolling_corr: Vec<Option<f64>>,
    pub adf_stat: f64,
    pub adf_pvalue: f64,
}

/// Health snapshot for operational tooling
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub active_symbols: Vec<String>,
    pub buffer_len: usize,
    pub flusher_alive: bool,
}

/// Configuration for the pipeline
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Feed
    #[serde(default = "default_feed_url")]
    pub feed_url: String,
    #[serde(default)]
    pub symbols: Vec<String>,

    // Buffering
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    // Flush cycle
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    // Retention
    #[serde(default = "default_retention_hours")]
    pub retention_hours: i64,
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,

    // Reconnection
    #[serde(default = "default_backoff_start_secs")]
    pub backoff_start_secs: u64,
    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,

    // Storage
    #[serde(default = "default_db_path")]
    pub db_path: String,

    // Analytics defaults
    #[serde(default = "default_rolling_window")]
    pub rolling_window: usize,
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: i64,

    // Logging
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_feed_url() -> String {
    "wss://fstream.binance.com/ws".to_string()
}

fn default_buffer_capacity() -> usize {
    10_000
}

fn default_batch_size() -> usize {
    200
}

fn default_flush_interval_ms() -> u64 {
    1_000
}

fn default_retention_hours() -> i64 {
    6
}

fn default_prune_interval_secs() -> u64 {
    300
}

fn default_backoff_start_secs() -> u64 {
    1
}

fn default_backoff_cap_secs() -> u64 {
    30
}

fn default_db_path() -> String {
    "market_data.db".to_string()
}

fn default_rolling_window() -> usize {
    20
}

fn default_lookback_hours() -> i64 {
    6
}

fn default_log_filter() -> String {
    "tickspread=debug,info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        // Serde defaults double as the programmatic defaults
        toml::from_str("").expect("empty config must deserialize")
    }
}

impl Config {
    pub fn flush_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.flush_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_start_alignment() {
        let t = Utc.with_ymd_and_hms(2024, 3, 5, 10, 7, 43).unwrap();

        assert_eq!(
            Timeframe::OneSecond.window_start(t),
            Utc.with_ymd_and_hms(2024, 3, 5, 10, 7, 43).unwrap()
        );
        assert_eq!(
            Timeframe::OneMinute.window_start(t),
            Utc.with_ymd_and_hms(2024, 3, 5, 10, 7, 0).unwrap()
        );
        assert_eq!(
            Timeframe::FiveMinute.window_start(t),
            Utc.with_ymd_and_hms(2024, 3, 5, 10, 5, 0).unwrap()
        );
    }

    #[test]
    fn test_timeframe_round_trip() {
        for tf in Timeframe::ALL {
            assert_eq!(Timeframe::from_str(tf.as_str()), Some(tf));
        }
        assert_eq!(Timeframe::from_str("15m"), None);
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.buffer_capacity, 10_000);
        assert_eq!(config.batch_size, 200);
        assert_eq!(config.flush_interval_ms, 1_000);
        assert_eq!(config.retention_hours, 6);
        assert_eq!(config.prune_interval_secs, 300);
        assert_eq!(config.backoff_start_secs, 1);
        assert_eq!(config.backoff_cap_secs, 30);
    }
}

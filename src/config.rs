//! Configuration loaded from environment variables
//!
//! `AnalysisConfig` carries the tunable knobs of the core pipeline.
//! `HostConfig` carries the batch runner's folders and parallelism. Both fall
//! back to defaults for missing or unparsable values.

use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    /// Order-flow bucket width in seconds
    pub bucket_secs: i64,

    /// Number of equal-width volume profile bins
    pub profile_bins: usize,

    /// Value quantile that marks a trade as large
    pub large_trade_quantile: f64,

    /// How many top trades by value the narrative lists
    pub top_trades: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            bucket_secs: 60,
            profile_bins: 50,
            large_trade_quantile: 0.95,
            top_trades: 3,
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `TAPEFLOW_BUCKET_SECS` (default: 60)
    /// - `TAPEFLOW_PROFILE_BINS` (default: 50)
    /// - `TAPEFLOW_LARGE_QUANTILE` (default: 0.95)
    /// - `TAPEFLOW_TOP_TRADES` (default: 3)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            bucket_secs: parse_var("TAPEFLOW_BUCKET_SECS")
                .filter(|s: &i64| *s > 0)
                .unwrap_or(defaults.bucket_secs),

            profile_bins: parse_var("TAPEFLOW_PROFILE_BINS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.profile_bins),

            large_trade_quantile: parse_var("TAPEFLOW_LARGE_QUANTILE")
                .filter(|q: &f64| (0.0..=1.0).contains(q))
                .unwrap_or(defaults.large_trade_quantile),

            top_trades: parse_var("TAPEFLOW_TOP_TRADES").unwrap_or(defaults.top_trades),
        }
    }
}

/// Settings owned by the batch host
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub raw_data_path: PathBuf,
    pub analysis_path: PathBuf,
    pub reports_path: PathBuf,
    pub max_parallel: usize,
}

impl HostConfig {
    /// Environment variables:
    /// - `TAPEFLOW_RAW_DATA_PATH` (default: data/raw/trades)
    /// - `TAPEFLOW_ANALYSIS_PATH` (default: data/analysis)
    /// - `TAPEFLOW_REPORTS_PATH` (default: data/reports)
    /// - `TAPEFLOW_MAX_PARALLEL` (default: 4)
    pub fn from_env() -> Self {
        Self {
            raw_data_path: env::var("TAPEFLOW_RAW_DATA_PATH")
                .unwrap_or_else(|_| "data/raw/trades".to_string())
                .into(),
            analysis_path: env::var("TAPEFLOW_ANALYSIS_PATH")
                .unwrap_or_else(|_| "data/analysis".to_string())
                .into(),
            reports_path: env::var("TAPEFLOW_REPORTS_PATH")
                .unwrap_or_else(|_| "data/reports".to_string())
                .into(),
            max_parallel: parse_var("TAPEFLOW_MAX_PARALLEL")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(4),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_config_from_env() {
        env::remove_var("TAPEFLOW_BUCKET_SECS");
        env::remove_var("TAPEFLOW_PROFILE_BINS");
        env::remove_var("TAPEFLOW_LARGE_QUANTILE");
        env::remove_var("TAPEFLOW_TOP_TRADES");
        assert_eq!(AnalysisConfig::from_env(), AnalysisConfig::default());

        env::set_var("TAPEFLOW_BUCKET_SECS", "300");
        env::set_var("TAPEFLOW_PROFILE_BINS", "0");
        env::set_var("TAPEFLOW_LARGE_QUANTILE", "1.5");
        env::set_var("TAPEFLOW_TOP_TRADES", "5");

        let config = AnalysisConfig::from_env();
        assert_eq!(config.bucket_secs, 300);
        assert_eq!(config.profile_bins, 50);
        assert_eq!(config.large_trade_quantile, 0.95);
        assert_eq!(config.top_trades, 5);

        env::remove_var("TAPEFLOW_BUCKET_SECS");
        env::remove_var("TAPEFLOW_PROFILE_BINS");
        env::remove_var("TAPEFLOW_LARGE_QUANTILE");
        env::remove_var("TAPEFLOW_TOP_TRADES");
    }

    #[test]
    fn test_host_config_defaults() {
        env::remove_var("TAPEFLOW_MAX_PARALLEL");
        env::set_var("TAPEFLOW_RAW_DATA_PATH", "/tmp/tapeflow-raw");

        let config = HostConfig::from_env();
        assert_eq!(config.raw_data_path, PathBuf::from("/tmp/tapeflow-raw"));
        assert_eq!(config.max_parallel, 4);

        env::remove_var("TAPEFLOW_RAW_DATA_PATH");
    }
}

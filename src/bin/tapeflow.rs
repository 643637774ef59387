//! Tapeflow Binary - Batch Order-Flow Analysis and Candidate Ranking
//!
//! Loads every raw trade file under the raw data folder, analyzes each
//! instrument on a bounded pool of blocking workers, writes the analysis and
//! narrative artifacts into today's dated folders and prints the long/short
//! candidate ranking built from today's narratives.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin tapeflow
//! cargo run --release --bin tapeflow -- --rank-only
//! ```
//!
//! ## Environment Variables
//!
//! - TAPEFLOW_RAW_DATA_PATH - Raw trade JSON folder, searched recursively (default: data/raw/trades)
//! - TAPEFLOW_ANALYSIS_PATH - Analysis JSON output root (default: data/analysis)
//! - TAPEFLOW_REPORTS_PATH - Narrative report output root (default: data/reports)
//! - TAPEFLOW_MAX_PARALLEL - Instruments analyzed concurrently (default: 4)
//! - TAPEFLOW_BUCKET_SECS, TAPEFLOW_PROFILE_BINS, TAPEFLOW_LARGE_QUANTILE,
//!   TAPEFLOW_TOP_TRADES - Analysis tuning, see `AnalysisConfig`
//! - RUST_LOG - Logging level (optional, default: info)

use chrono::Utc;
use std::env;
use tapeflow::batch::{self, RunMode};
use tapeflow::config::{AnalysisConfig, HostConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let mode = RunMode::from_args(env::args().skip(1));
    let host = HostConfig::from_env();
    let config = AnalysisConfig::from_env();

    log::info!("🚀 Starting Tapeflow ({:?})", mode);
    log::info!("   Raw data: {}", host.raw_data_path.display());
    log::info!("   Analysis output: {}", host.analysis_path.display());
    log::info!("   Reports output: {}", host.reports_path.display());
    log::info!("   Max parallel: {}", host.max_parallel);
    log::info!(
        "   Bucket: {}s, profile bins: {}, large-trade quantile: {}",
        config.bucket_secs,
        config.profile_bins,
        config.large_trade_quantile
    );

    let ranking = batch::run(mode, &host, &config, Utc::now().date_naive()).await?;
    println!("{}", ranking);

    Ok(())
}

//! Batch host: analyze every instrument found in the raw data folder on a
//! bounded pool of blocking workers, persist the artifacts and rank today's
//! narratives.

use crate::analysis_core::{analyze_instrument, rank_candidates, CandidateScorer, Ranking};
use crate::config::{AnalysisConfig, HostConfig};
use crate::error::{BatchError, PersistenceError};
use crate::persistence::{
    discover_trade_files, group_by_instrument, load_narratives, load_trade_file, ArtifactSink,
    JsonArtifactWriter,
};
use chrono::{NaiveDate, Utc};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Full,
    RankOnly,
}

impl RunMode {
    /// `--rank-only` anywhere in the arguments skips analysis
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if args.into_iter().any(|arg| arg.as_ref() == "--rank-only") {
            RunMode::RankOnly
        } else {
            RunMode::Full
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Analyze and persist every instrument under `host.raw_data_path`.
///
/// A missing raw folder is fatal. Unreadable files are skipped, instruments
/// without usable trades are counted as skipped, and a failed write is counted
/// without stopping the other instruments.
pub async fn analyze_batch(
    host: &HostConfig,
    config: &AnalysisConfig,
    sink: Arc<dyn ArtifactSink>,
) -> Result<BatchSummary, BatchError> {
    let files = discover_trade_files(&host.raw_data_path)?;

    let mut records = Vec::new();
    for file in &files {
        match load_trade_file(file) {
            Ok(loaded) => records.extend(loaded),
            Err(e) => log::error!("Skipping {}: {}", file.display(), e),
        }
    }

    let groups = group_by_instrument(records);
    log::info!("📊 {} instruments to analyze ({} backend)", groups.len(), sink.backend_type());

    let semaphore = Arc::new(Semaphore::new(host.max_parallel.max(1)));
    let generated_at = Utc::now();
    let mut handles = Vec::with_capacity(groups.len());

    for (instrument, group) in groups {
        let permit = Arc::clone(&semaphore).acquire_owned().await?;
        let config = config.clone();
        let sink = Arc::clone(&sink);

        handles.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let run = analyze_instrument(&instrument, &group, &config, generated_at);
            if run.is_empty() {
                return (instrument, None);
            }
            let written = sink.write_run(&run);
            (instrument, Some(written))
        }));
    }

    let mut summary = BatchSummary::default();
    for handle in handles {
        match handle.await {
            Ok((instrument, None)) => {
                log::warn!("{}: no usable trades, skipped", instrument);
                summary.skipped += 1;
            }
            Ok((instrument, Some(Ok(paths)))) => {
                log::info!("✅ {}: report saved to {}", instrument, paths.report.display());
                summary.written += 1;
            }
            Ok((instrument, Some(Err(e)))) => {
                log::error!("{}: failed to write artifacts: {}", instrument, e);
                summary.failed += 1;
            }
            Err(e) => {
                log::error!("Analysis task failed: {}", e);
                summary.failed += 1;
            }
        }
    }

    log::info!(
        "Batch complete: {} written, {} skipped, {} failed",
        summary.written,
        summary.skipped,
        summary.failed
    );
    Ok(summary)
}

/// Rank the narratives in `reports_dir`.
///
/// In `RankOnly` mode a missing folder is an error. After a full run it only
/// means nothing was written, which ranks as empty.
pub fn rank_reports(mode: RunMode, reports_dir: &Path, scorer: &CandidateScorer) -> Result<Ranking, PersistenceError> {
    let narratives = match load_narratives(reports_dir) {
        Ok(narratives) => narratives,
        Err(PersistenceError::MissingInput(dir)) if mode == RunMode::Full => {
            log::warn!("No reports to rank in {}", dir.display());
            Vec::new()
        }
        Err(e) => return Err(e),
    };

    Ok(rank_candidates(
        scorer,
        narratives.iter().map(|(instrument, text)| (instrument.as_str(), text.as_str())),
    ))
}

/// Full host flow for one run date
pub async fn run(
    mode: RunMode,
    host: &HostConfig,
    config: &AnalysisConfig,
    run_date: NaiveDate,
) -> Result<Ranking, BatchError> {
    let scorer = CandidateScorer::new()?;
    let writer = Arc::new(JsonArtifactWriter::new(&host.analysis_path, &host.reports_path, run_date));

    if mode == RunMode::Full {
        analyze_batch(host, config, writer.clone()).await?;
    }

    Ok(rank_reports(mode, writer.reports_dir(), &scorer)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_run_mode_from_args() {
        assert_eq!(RunMode::from_args(["tapeflow"]), RunMode::Full);
        assert_eq!(RunMode::from_args(["tapeflow", "--rank-only"]), RunMode::RankOnly);
        assert_eq!(RunMode::from_args(Vec::<String>::new()), RunMode::Full);
    }

    #[test]
    fn test_rank_reports_missing_folder() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("2024-03-01");
        let scorer = CandidateScorer::new().unwrap();

        assert!(matches!(
            rank_reports(RunMode::RankOnly, &missing, &scorer),
            Err(PersistenceError::MissingInput(_))
        ));
        assert!(rank_reports(RunMode::Full, &missing, &scorer).unwrap().is_empty());
    }
}

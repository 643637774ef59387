//! Integration tests for the batch host: raw exchange files on disk through
//! analysis, artifact writing and candidate ranking.
//!
//! Key integration points tested:
//! - Recursive discovery, tabular JSON loading, unreadable files skipped
//! - Instruments without usable trades skipped, write failures isolated
//! - Concurrent analysis on blocking workers bounded by a semaphore
//! - Narratives read back from disk feed the ranking, also in rank-only mode
//! - Missing raw or report folders stop the run

#[cfg(test)]
mod pipeline_integration_tests {
    use chrono::{NaiveDate, Utc};
    use serde_json::{json, Value};
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tapeflow::analysis_core::{analyze_instrument, InstrumentRun};
    use tapeflow::batch::{self, analyze_batch, BatchSummary, RunMode};
    use tapeflow::config::{AnalysisConfig, HostConfig};
    use tapeflow::persistence::{group_by_instrument, load_trade_file, ArtifactPaths, ArtifactSink, JsonArtifactWriter};
    use tapeflow::{BatchError, PersistenceError};
    use tempfile::TempDir;

    fn run_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn host_in(root: &Path) -> HostConfig {
        HostConfig {
            raw_data_path: root.join("raw"),
            analysis_path: root.join("analysis"),
            reports_path: root.join("reports"),
            max_parallel: 2,
        }
    }

    /// Refuses to persist one instrument and delegates the rest
    struct RejectingSink {
        inner: JsonArtifactWriter,
        rejected: &'static str,
    }

    impl ArtifactSink for RejectingSink {
        fn write_run(&self, run: &InstrumentRun) -> Result<ArtifactPaths, PersistenceError> {
            if run.instrument() == self.rejected {
                return Err(PersistenceError::Format {
                    path: PathBuf::from(run.instrument()),
                    reason: "rejected".to_string(),
                });
            }
            self.inner.write_run(run)
        }

        fn backend_type(&self) -> &'static str {
            "rejecting"
        }
    }

    fn clock(secs: u32) -> String {
        format!("{:02}:{:02}:{:02}", 10 + secs / 3600, (secs / 60) % 60, secs % 60)
    }

    /// SBER: steady small buys plus five 120-lot prints.
    /// GAZP: sells, five of them heavier. BROKEN: nothing parseable.
    fn write_session(dir: &Path) {
        let mut rows: Vec<Value> = Vec::new();
        let mut tradeno = 1;
        for i in 0..95u32 {
            rows.push(json!([tradeno, "2024-03-01", clock(i * 10), "SBER", 100.0, 1, null, "B"]));
            tradeno += 1;
        }
        for i in 0..5u32 {
            rows.push(json!([tradeno, "2024-03-01", clock(950 + i * 60), "SBER", 100.0, 120, 12000.0, "B"]));
            tradeno += 1;
        }

        let mut other: Vec<Value> = Vec::new();
        for i in 0..40u32 {
            let lots = if i % 8 == 0 { 10 } else { 2 };
            other.push(json!([tradeno, "2024-03-01", clock(i * 15), "GAZP", "160.5", lots, null, "S"]));
            tradeno += 1;
        }
        other.push(json!([tradeno, "2024-03-01", "not a time", "BROKEN", "abc", 1, null, "B"]));

        let columns = json!(["TRADENO", "TRADEDATE", "TRADETIME", "SECID", "PRICE", "QUANTITY", "VALUE", "BUYSELL"]);
        fs::create_dir_all(dir.join("2024-03-01")).unwrap();
        fs::write(
            dir.join("2024-03-01/sber.json"),
            json!({"trades": {"columns": columns, "data": rows}}).to_string(),
        )
        .unwrap();
        fs::write(
            dir.join("other.json"),
            json!({"trades": {"columns": columns, "data": other}}).to_string(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_full_run_writes_artifacts_and_ranks() {
        let root = TempDir::new().unwrap();
        let host = host_in(root.path());
        write_session(&host.raw_data_path);
        fs::write(host.raw_data_path.join("empty.json"), "null").unwrap();

        let ranking = batch::run(RunMode::Full, &host, &AnalysisConfig::default(), run_date())
            .await
            .unwrap();

        let reports = host.reports_path.join("2024-03-01");
        assert!(reports.join("report_SBER.txt").exists());
        assert!(reports.join("report_GAZP.txt").exists());
        assert!(!reports.join("report_BROKEN.txt").exists());

        let sber: Value = serde_json::from_str(
            &fs::read_to_string(host.analysis_path.join("2024-03-01/analysis_SBER.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(sber["summary"]["total_trades"], 100);
        let sber_text = fs::read_to_string(reports.join("report_SBER.txt")).unwrap();
        assert!(sber_text.starts_with("Торговый отчёт по SBER"));

        assert_eq!(ranking.long.len(), 1);
        assert_eq!(ranking.long[0].instrument, "SBER");
        assert!(ranking.long[0].reasons.contains(&"Бычий сентимент".to_string()));
        assert_eq!(ranking.short.len(), 1);
        assert_eq!(ranking.short[0].instrument, "GAZP");
        assert!(ranking.short[0].reasons.contains(&"Медвежий сентимент".to_string()));

        // rank-only reads the same folder back
        let again = batch::run(RunMode::RankOnly, &host, &AnalysisConfig::default(), run_date())
            .await
            .unwrap();
        assert_eq!(again, ranking);
    }

    #[tokio::test]
    async fn test_batch_counts_skips_and_write_failures() {
        let root = TempDir::new().unwrap();
        let host = host_in(root.path());
        write_session(&host.raw_data_path);

        let sink = Arc::new(RejectingSink {
            inner: JsonArtifactWriter::new(&host.analysis_path, &host.reports_path, run_date()),
            rejected: "GAZP",
        });
        let summary = analyze_batch(&host, &AnalysisConfig::default(), sink).await.unwrap();

        assert_eq!(
            summary,
            BatchSummary {
                written: 1,
                skipped: 1,
                failed: 1,
            }
        );
        let reports = host.reports_path.join("2024-03-01");
        assert!(reports.join("report_SBER.txt").exists());
        assert!(!reports.join("report_GAZP.txt").exists());
    }

    #[tokio::test]
    async fn test_missing_raw_folder_is_fatal() {
        let root = TempDir::new().unwrap();
        let host = host_in(root.path());

        let result = batch::run(RunMode::Full, &host, &AnalysisConfig::default(), run_date()).await;
        assert!(matches!(
            result,
            Err(BatchError::Persistence(PersistenceError::MissingInput(_)))
        ));
        assert!(!host.reports_path.exists());
    }

    #[tokio::test]
    async fn test_rank_only_without_reports_fails() {
        let root = TempDir::new().unwrap();
        let host = host_in(root.path());

        let result = batch::run(RunMode::RankOnly, &host, &AnalysisConfig::default(), run_date()).await;
        assert!(matches!(
            result,
            Err(BatchError::Persistence(PersistenceError::MissingInput(_)))
        ));
    }

    #[test]
    fn test_analysis_artifact_is_json_report() {
        let root = TempDir::new().unwrap();
        write_session(root.path());

        let records = load_trade_file(&root.path().join("other.json")).unwrap();
        let groups = group_by_instrument(records);
        let (instrument, gazp) = &groups[0];
        let run = analyze_instrument(instrument, gazp, &AnalysisConfig::default(), Utc::now());

        let writer = JsonArtifactWriter::new(
            root.path().join("analysis"),
            root.path().join("reports"),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        );
        let paths = writer.write_run(&run).unwrap();

        let json: Value = serde_json::from_str(&fs::read_to_string(paths.analysis).unwrap()).unwrap();
        assert_eq!(json["instrument"], "GAZP");
        assert_eq!(json["summary"]["delta"], -120);
        assert_eq!(json["summary"]["sell_volume"], 120);
        assert!(json["order_flow"].as_array().is_some_and(|b| !b.is_empty()));

        let text = fs::read_to_string(paths.report).unwrap();
        assert!(text.starts_with("Торговый отчёт по GAZP"));
        assert!(text.contains("Медведи доминировали"));
    }
}

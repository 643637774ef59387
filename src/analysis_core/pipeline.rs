//! Whole-pipeline helper: raw records of one instrument to report, signals and
//! narrative

use super::detector::{AlgoSignalDetector, Signal};
use super::narrative::NarrativeReport;
use super::normalizer::{normalize_trades, RawTradeRecord, Trade};
use super::report::AnalysisReport;
use crate::config::AnalysisConfig;
use crate::error::NormalizeError;
use chrono::{DateTime, Utc};

/// Everything produced for one instrument
#[derive(Debug, Clone)]
pub struct InstrumentRun {
    pub report: AnalysisReport,
    pub signals: Vec<Signal>,
    pub narrative: NarrativeReport,
    pub malformed: usize,
    pub duplicates: usize,
}

impl InstrumentRun {
    pub fn instrument(&self) -> &str {
        &self.report.instrument
    }

    /// True when normalization left nothing to analyze
    pub fn is_empty(&self) -> bool {
        self.report.is_empty()
    }
}

/// Analyze already-normalized trades
pub fn analyze_trades(
    instrument: &str,
    trades: &[Trade],
    config: &AnalysisConfig,
    generated_at: DateTime<Utc>,
) -> InstrumentRun {
    let report = AnalysisReport::build(instrument, trades, config, generated_at);
    finish(report, config, 0, 0)
}

/// Normalize and analyze the raw records of one instrument.
///
/// `EmptyInput` from the normalizer is absorbed here: the run carries an empty
/// but well-formed report so callers can still persist and render it.
pub fn analyze_instrument(
    instrument: &str,
    records: &[RawTradeRecord],
    config: &AnalysisConfig,
    generated_at: DateTime<Utc>,
) -> InstrumentRun {
    match normalize_trades(instrument, records) {
        Ok(outcome) => {
            let report = AnalysisReport::build(instrument, &outcome.trades, config, generated_at);
            finish(report, config, outcome.malformed, outcome.duplicates)
        }
        Err(NormalizeError::EmptyInput { dropped, .. }) => {
            log::warn!("{}: no usable trades ({} records dropped)", instrument, dropped);
            finish(AnalysisReport::empty(instrument, generated_at), config, dropped, 0)
        }
    }
}

fn finish(report: AnalysisReport, config: &AnalysisConfig, malformed: usize, duplicates: usize) -> InstrumentRun {
    let signals = AlgoSignalDetector::with_defaults().detect(&report.large_trades);
    let narrative = NarrativeReport::generate(&report, &signals, config.top_trades);

    log::info!(
        "{}: {} large trades, {} signals",
        report.instrument,
        report.large_trades.len(),
        signals.len()
    );

    InstrumentRun {
        report,
        signals,
        narrative,
        malformed,
        duplicates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis_core::detector::SignalKind;
    use serde_json::json;

    fn record(time: &str, price: f64, qty: u64, side: &str) -> RawTradeRecord {
        RawTradeRecord {
            instrument: "SBER".to_string(),
            trade_date: Some("2024-03-01".to_string()),
            trade_time: Some(time.to_string()),
            price: Some(json!(price)),
            quantity: Some(json!(qty)),
            side: Some(side.to_string()),
            value: None,
            trade_id: None,
        }
    }

    #[test]
    fn test_analyze_instrument() {
        let records = vec![
            record("10:00:00", 100.0, 10, "B"),
            record("10:00:30", 100.5, 5, "S"),
            record("10:01:10", 101.0, 20, "B"),
            record("bad", 101.0, 20, "B"),
        ];
        let run = analyze_instrument("SBER", &records, &AnalysisConfig::default(), Utc::now());

        assert_eq!(run.instrument(), "SBER");
        assert_eq!(run.malformed, 1);
        assert_eq!(run.report.summary.total_trades, 3);
        assert_eq!(run.report.summary.delta, 25);
        assert!(!run.signals.is_empty());
        assert!(run.narrative.render().contains("Рынок был под контролем быков"));
    }

    #[test]
    fn test_empty_input_yields_empty_report() {
        let records = vec![record("garbage", 100.0, 1, "B")];
        let run = analyze_instrument("SBER", &records, &AnalysisConfig::default(), Utc::now());

        assert!(run.is_empty());
        assert_eq!(run.malformed, 1);
        assert_eq!(run.signals.len(), 1);
        assert_eq!(run.signals[0].kind(), SignalKind::NoneDetected);
        assert_eq!(run.narrative.sections().len(), 10);
    }

    #[test]
    fn test_analyze_trades_without_records() {
        let run = analyze_trades("SBER", &[], &AnalysisConfig::default(), Utc::now());
        assert!(run.is_empty());
        assert!(run.narrative.render().contains("Баланс сил"));
    }
}

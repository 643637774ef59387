//! File boundary: raw trade discovery and loading, artifact writing, and
//! narrative loading for ranking.
//!
//! Raw files use the exchange's tabular JSON layout:
//!
//! ```text
//! {"trades": {"columns": ["SECID", "TRADEDATE", ...], "data": [[...], ...]}}
//! ```
//!
//! Artifacts land in dated folders:
//! `<analysis>/<YYYY-MM-DD>/analysis_<ID>.json` and
//! `<reports>/<YYYY-MM-DD>/report_<ID>.txt`.

use crate::analysis_core::{InstrumentRun, RawTradeRecord};
use crate::error::PersistenceError;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const REQUIRED_COLUMNS: [&str; 6] = ["SECID", "TRADEDATE", "TRADETIME", "PRICE", "QUANTITY", "BUYSELL"];
const REPORT_PREFIX: &str = "report_";
const REPORT_EXTENSION: &str = "txt";

#[derive(Debug, Deserialize)]
struct TradeDocument {
    trades: Option<TradeTable>,
}

#[derive(Debug, Deserialize)]
struct TradeTable {
    columns: Vec<String>,
    data: Vec<Vec<Value>>,
}

/// All `*.json` files under `root`, recursively, in sorted path order
pub fn discover_trade_files(root: &Path) -> Result<Vec<PathBuf>, PersistenceError> {
    if !root.is_dir() {
        return Err(PersistenceError::MissingInput(root.to_path_buf()));
    }

    let mut files = Vec::new();
    collect_json_files(root, &mut files)?;
    files.sort();

    log::info!("Discovered {} trade files under {}", files.len(), root.display());
    Ok(files)
}

fn collect_json_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_json_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "json") {
            out.push(path);
        }
    }
    Ok(())
}

pub fn load_trade_file(path: &Path) -> Result<Vec<RawTradeRecord>, PersistenceError> {
    let content = fs::read_to_string(path)?;
    let records = parse_trade_document(path, &content)?;
    log::debug!("Loaded {} raw records from {}", records.len(), path.display());
    Ok(records)
}

/// Parse one tabular document. `path` is only used for error context.
pub fn parse_trade_document(path: &Path, content: &str) -> Result<Vec<RawTradeRecord>, PersistenceError> {
    let format_error = |reason: &str| PersistenceError::Format {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let document: Option<TradeDocument> = serde_json::from_str(content)?;
    let table = document
        .and_then(|d| d.trades)
        .ok_or_else(|| format_error("missing trades block"))?;

    let index: HashMap<&str, usize> = table
        .columns
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    if let Some(missing) = REQUIRED_COLUMNS.iter().find(|c| !index.contains_key(*c)) {
        return Err(format_error(&format!("missing column {}", missing)));
    }

    let cell = |row: &[Value], column: &str| -> Option<Value> {
        index
            .get(column)
            .and_then(|i| row.get(*i))
            .filter(|v| !v.is_null())
            .cloned()
    };
    let text = |row: &[Value], column: &str| -> Option<String> {
        cell(row, column).map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        })
    };

    Ok(table
        .data
        .iter()
        .map(|row| RawTradeRecord {
            instrument: text(row, "SECID").unwrap_or_default(),
            trade_date: text(row, "TRADEDATE"),
            trade_time: text(row, "TRADETIME"),
            price: cell(row, "PRICE"),
            quantity: cell(row, "QUANTITY"),
            side: text(row, "BUYSELL"),
            value: cell(row, "VALUE"),
            trade_id: text(row, "TRADENO"),
        })
        .collect())
}

/// Split records by instrument id, keeping first-seen instrument order.
/// Records without an id are dropped.
pub fn group_by_instrument(records: Vec<RawTradeRecord>) -> Vec<(String, Vec<RawTradeRecord>)> {
    let mut groups: Vec<(String, Vec<RawTradeRecord>)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut anonymous = 0;

    for record in records {
        if record.instrument.is_empty() {
            anonymous += 1;
            continue;
        }
        match positions.get(&record.instrument) {
            Some(&pos) => groups[pos].1.push(record),
            None => {
                positions.insert(record.instrument.clone(), groups.len());
                groups.push((record.instrument.clone(), vec![record]));
            }
        }
    }

    if anonymous > 0 {
        log::warn!("Dropped {} records without an instrument id", anonymous);
    }
    groups
}

/// Paths of the artifacts written for one instrument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub analysis: PathBuf,
    pub report: PathBuf,
}

/// Destination for per-instrument artifacts
pub trait ArtifactSink: Send + Sync {
    fn write_run(&self, run: &InstrumentRun) -> Result<ArtifactPaths, PersistenceError>;

    fn backend_type(&self) -> &'static str;
}

/// Writes the analysis document as pretty JSON and the narrative as text.
/// Both go through temp files that are renamed into place only once both
/// were written, so a failed run leaves no half of the pair behind.
pub struct JsonArtifactWriter {
    analysis_dir: PathBuf,
    reports_dir: PathBuf,
}

impl JsonArtifactWriter {
    pub fn new(analysis_root: impl AsRef<Path>, reports_root: impl AsRef<Path>, run_date: NaiveDate) -> Self {
        let dated = run_date.format("%Y-%m-%d").to_string();
        Self {
            analysis_dir: analysis_root.as_ref().join(&dated),
            reports_dir: reports_root.as_ref().join(&dated),
        }
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }
}

impl ArtifactSink for JsonArtifactWriter {
    fn write_run(&self, run: &InstrumentRun) -> Result<ArtifactPaths, PersistenceError> {
        let instrument = run.instrument();
        let analysis = self.analysis_dir.join(format!("analysis_{}.json", instrument));
        let report = self
            .reports_dir
            .join(format!("{}{}.{}", REPORT_PREFIX, instrument, REPORT_EXTENSION));

        let json = serde_json::to_string_pretty(&run.report)?;
        let analysis_tmp = stage(&analysis, json.as_bytes())?;
        let report_tmp = match stage(&report, run.narrative.render().as_bytes()) {
            Ok(tmp) => tmp,
            Err(e) => {
                let _ = fs::remove_file(&analysis_tmp);
                return Err(e);
            }
        };

        // Both files are staged; the pair is published or neither is
        if let Err(e) = fs::rename(&analysis_tmp, &analysis) {
            let _ = fs::remove_file(&analysis_tmp);
            let _ = fs::remove_file(&report_tmp);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&report_tmp, &report) {
            let _ = fs::remove_file(&report_tmp);
            let _ = fs::remove_file(&analysis);
            return Err(e.into());
        }

        log::debug!("{}: artifacts written to {} and {}", instrument, analysis.display(), report.display());
        Ok(ArtifactPaths { analysis, report })
    }

    fn backend_type(&self) -> &'static str {
        "JSON"
    }
}

/// Write `bytes` to a synced temp file next to `path` and return the temp path
fn stage(path: &Path, bytes: &[u8]) -> Result<PathBuf, PersistenceError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let result = fs::File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(tmp)
}

/// Read every `report_<ID>.txt` in `dir` as (instrument, narrative text),
/// sorted by instrument id
pub fn load_narratives(dir: &Path) -> Result<Vec<(String, String)>, PersistenceError> {
    if !dir.is_dir() {
        return Err(PersistenceError::MissingInput(dir.to_path_buf()));
    }

    let mut narratives = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().map_or(true, |ext| ext != REPORT_EXTENSION) {
            continue;
        }
        let Some(instrument) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.strip_prefix(REPORT_PREFIX))
            .filter(|s| !s.is_empty())
        else {
            continue;
        };
        narratives.push((instrument.to_string(), fs::read_to_string(&path)?));
    }
    narratives.sort_by(|a, b| a.0.cmp(&b.0));

    log::info!("Loaded {} narratives from {}", narratives.len(), dir.display());
    Ok(narratives)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis_core::analyze_instrument;
    use crate::config::AnalysisConfig;
    use chrono::Utc;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "trades": {
            "columns": ["TRADENO", "TRADEDATE", "TRADETIME", "SECID", "PRICE", "QUANTITY", "VALUE", "BUYSELL"],
            "data": [
                [101, "2024-03-01", "10:00:00", "SBER", 250.5, 10, 2505.0, "B"],
                [102, "2024-03-01", "10:00:05", "GAZP", "160.1", 3, null, "S"],
                [103, "2024-03-01", "10:00:07", "SBER", 251.0, 4, 1004.0, "S"]
            ]
        }
    }"#;

    #[test]
    fn test_parse_trade_document() {
        let records = parse_trade_document(Path::new("sample.json"), SAMPLE).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].instrument, "SBER");
        assert_eq!(records[0].trade_id.as_deref(), Some("101"));
        assert_eq!(records[0].trade_time.as_deref(), Some("10:00:00"));
        assert_eq!(records[1].price, Some(Value::String("160.1".to_string())));
        assert_eq!(records[1].value, None);
        assert_eq!(records[2].side.as_deref(), Some("S"));
    }

    #[test]
    fn test_format_errors() {
        let path = Path::new("bad.json");
        assert!(matches!(parse_trade_document(path, "null"), Err(PersistenceError::Format { .. })));
        assert!(matches!(parse_trade_document(path, "{}"), Err(PersistenceError::Format { .. })));
        assert!(matches!(
            parse_trade_document(path, r#"{"trades": {"columns": ["SECID"], "data": []}}"#),
            Err(PersistenceError::Format { .. })
        ));
        assert!(matches!(parse_trade_document(path, "{"), Err(PersistenceError::Serialization(_))));
    }

    #[test]
    fn test_group_by_instrument_keeps_first_seen_order() {
        let records = parse_trade_document(Path::new("sample.json"), SAMPLE).unwrap();
        let groups = group_by_instrument(records);

        let ids: Vec<&str> = groups.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["SBER", "GAZP"]);
        assert_eq!(groups[0].1.len(), 2);
    }

    #[test]
    fn test_discover_trade_files_recursive_sorted() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("2024-03-02")).unwrap();
        fs::write(dir.path().join("b.json"), SAMPLE).unwrap();
        fs::write(dir.path().join("a.json"), SAMPLE).unwrap();
        fs::write(dir.path().join("2024-03-02/c.json"), SAMPLE).unwrap();
        fs::write(dir.path().join("notes.txt"), "skip").unwrap();

        let files = discover_trade_files(dir.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["2024-03-02/c.json", "a.json", "b.json"]);

        let records = load_trade_file(&files[1]).unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_missing_input_folder() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(discover_trade_files(&missing), Err(PersistenceError::MissingInput(_))));
        assert!(matches!(load_narratives(&missing), Err(PersistenceError::MissingInput(_))));
    }

    #[test]
    fn test_artifacts_written_and_loaded() {
        let dir = TempDir::new().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let writer = JsonArtifactWriter::new(dir.path().join("analysis"), dir.path().join("reports"), date);

        let records = parse_trade_document(Path::new("sample.json"), SAMPLE).unwrap();
        let run = analyze_instrument("SBER", &records, &AnalysisConfig::default(), Utc::now());
        let paths = writer.write_run(&run).unwrap();

        assert_eq!(paths.analysis, dir.path().join("analysis/2024-03-01/analysis_SBER.json"));
        assert_eq!(paths.report, dir.path().join("reports/2024-03-01/report_SBER.txt"));
        assert!(!dir.path().join("reports/2024-03-01/report_SBER.txt.tmp").exists());

        let json: Value = serde_json::from_str(&fs::read_to_string(&paths.analysis).unwrap()).unwrap();
        assert_eq!(json["instrument"], "SBER");
        assert_eq!(json["summary"]["total_trades"], 2);

        let narratives = load_narratives(writer.reports_dir()).unwrap();
        assert_eq!(narratives.len(), 1);
        assert_eq!(narratives[0].0, "SBER");
        assert_eq!(narratives[0].1, run.narrative.render());
    }

    #[test]
    fn test_failed_report_write_leaves_no_analysis() {
        let dir = TempDir::new().unwrap();
        // a plain file where the reports root should be makes the report unwritable
        fs::write(dir.path().join("reports"), "not a folder").unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let writer = JsonArtifactWriter::new(dir.path().join("analysis"), dir.path().join("reports"), date);

        let records = parse_trade_document(Path::new("sample.json"), SAMPLE).unwrap();
        let run = analyze_instrument("SBER", &records, &AnalysisConfig::default(), Utc::now());

        assert!(writer.write_run(&run).is_err());
        let analysis_dir = dir.path().join("analysis/2024-03-01");
        assert!(!analysis_dir.join("analysis_SBER.json").exists());
        assert!(!analysis_dir.join("analysis_SBER.json.tmp").exists());
    }
}

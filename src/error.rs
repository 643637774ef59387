//! Error taxonomy for the analysis pipeline and its persistence boundary

use std::path::PathBuf;
use thiserror::Error;

/// Why a single raw record was rejected by the normalizer.
///
/// Malformed records are never fatal: the row is dropped and counted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedRecord {
    #[error("unparseable timestamp: {0}")]
    Timestamp(String),
    #[error("field {field} is not numeric: {raw}")]
    NotNumeric { field: &'static str, raw: String },
    #[error("field {field} is missing")]
    Missing { field: &'static str },
    #[error("field {field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },
    #[error("quantity must be a whole number of lots, got {0}")]
    FractionalQuantity(f64),
    #[error("record belongs to instrument {0}")]
    ForeignInstrument(String),
}

/// Normalizer failure that callers are expected to handle per instrument
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("no usable trades for {instrument} ({dropped} malformed records dropped)")]
    EmptyInput { instrument: String, dropped: usize },
}

/// Boundary errors: raw file loading and artifact writing
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("unexpected file format in {path}: {reason}")]
    Format { path: PathBuf, reason: String },
    #[error("input source not found: {0}")]
    MissingInput(PathBuf),
}

/// Batch-level failures that stop the host
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("invalid scoring rule: {0}")]
    Rules(#[from] regex::Error),
    #[error("worker pool closed: {0}")]
    WorkerPool(#[from] tokio::sync::AcquireError),
}

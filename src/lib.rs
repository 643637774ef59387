//! Tapeflow - session order-flow analytics for exchange trade tapes
//!
//! [`analysis_core`] holds the pure pipeline (normalize, analyze, detect,
//! narrate, score). [`persistence`] is the file boundary and
//! [`batch`] the host flow driven by the `tapeflow` binary.

pub mod analysis_core;
pub mod batch;
pub mod config;
pub mod error;
pub mod persistence;

pub use error::{BatchError, MalformedRecord, NormalizeError, PersistenceError};

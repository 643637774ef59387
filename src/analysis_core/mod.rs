//! Analysis Core - Session Order-Flow Analytics and Narrative Pipeline
//!
//! Turns one instrument's session of executed trades into analytics, pattern
//! signals, a narrative report and finally a long/short candidate score.
//!
//! # Architecture
//!
//! ```text
//! RawTradeRecord[] → normalize_trades → Trade[]
//!     ↓
//! AnalysisReport (delta series, VWAP, VolumeProfile/POC, large trades, hourly)
//!     ↓
//! AlgoSignalDetector (repeated qty/price, rapid-fire, time clusters)
//!     ↓
//! NarrativeAssembler → NarrativeReport (9 sections + hourly appendix)
//!     ↓
//! CandidateScorer → rank_candidates (top-5 long / top-5 short)
//! ```
//!
//! Every stage is synchronous and free of I/O; loading and persisting
//! artifacts belongs to [`crate::persistence`].

pub mod detector;
pub mod hourly;
pub mod large_trades;
pub mod narrative;
pub mod normalizer;
pub mod order_flow;
pub mod pipeline;
pub mod profile;
pub mod report;
pub mod scorer;

pub use detector::{AlgoSignalDetector, Signal, SignalKind};
pub use hourly::{HourDirection, HourlyStats};
pub use large_trades::LargeTradeExtractor;
pub use narrative::{NarrativeAssembler, NarrativeReport};
pub use normalizer::{normalize_trades, NormalizeOutcome, RawTradeRecord, Trade, TradeSide};
pub use order_flow::{delta_series, vwap_series, DeltaBucket, VwapPoint};
pub use pipeline::{analyze_instrument, analyze_trades, InstrumentRun};
pub use profile::{PointOfControl, ProfileBin, VolumeProfile};
pub use report::{AnalysisReport, SessionSpan, SummaryStats};
pub use scorer::{rank_candidates, Candidate, CandidateScorer, Ranking};

/// Division that yields 0.0 instead of inf/NaN on a zero denominator
pub fn guarded_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Integer with space-separated thousands: 1234567 → "1 234 567"
pub fn group_digits(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        grouped.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }
    grouped
}

/// Price rounded to 6 decimals, printed without trailing zeros
pub fn format_price(price: f64) -> String {
    format!("{}", (price * 1e6).round() / 1e6)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guarded_ratio() {
        assert_eq!(guarded_ratio(5.0, 0.0), 0.0);
        assert_eq!(guarded_ratio(5.0, 2.0), 2.5);
    }

    #[test]
    fn test_group_digits() {
        assert_eq!(group_digits(0), "0");
        assert_eq!(group_digits(120), "120");
        assert_eq!(group_digits(1234), "1 234");
        assert_eq!(group_digits(-1234567), "-1 234 567");
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(250.5), "250.5");
        assert_eq!(format_price(0.01234567), "0.012346");
        assert_eq!(format_price(100.0), "100");
    }
}

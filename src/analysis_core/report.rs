//! Per-instrument analysis artifact: stages 1-3 folded into one document

use super::hourly::{hourly_breakdown, HourlyStats};
use super::large_trades::LargeTradeExtractor;
use super::normalizer::Trade;
use super::order_flow::{delta_series, final_vwap, DeltaBucket};
use super::profile::{PointOfControl, ProfileBin, VolumeProfile};
use crate::config::AnalysisConfig;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSpan {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub total_trades: usize,
    pub total_volume: u64,
    pub buy_volume: u64,
    pub sell_volume: u64,
    pub delta: i64,
    pub poc: Option<PointOfControl>,
    pub final_vwap: Option<f64>,
    pub last_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub instrument: String,
    pub generated_at: DateTime<Utc>,
    pub period: SessionSpan,
    pub summary: SummaryStats,
    pub order_flow: Vec<DeltaBucket>,
    pub volume_profile: Vec<ProfileBin>,
    pub large_trades: Vec<Trade>,
    pub hourly: Vec<HourlyStats>,
}

impl AnalysisReport {
    /// Run delta, VWAP, profile, large-trade and hourly analysis over a
    /// normalized trade sequence
    pub fn build(
        instrument: &str,
        trades: &[Trade],
        config: &AnalysisConfig,
        generated_at: DateTime<Utc>,
    ) -> Self {
        log::info!("{}: running full analysis over {} trades", instrument, trades.len());

        let order_flow = delta_series(trades, config.bucket_secs);
        let profile = VolumeProfile::build(trades, config.profile_bins);
        let large_trades = LargeTradeExtractor::new(config.large_trade_quantile).extract(trades);

        let buy_volume = trades.iter().filter(|t| t.is_buy()).map(|t| t.quantity).sum();
        let sell_volume = trades.iter().filter(|t| t.is_sell()).map(|t| t.quantity).sum();

        let summary = SummaryStats {
            total_trades: trades.len(),
            total_volume: trades.iter().map(|t| t.quantity).sum(),
            buy_volume,
            sell_volume,
            delta: trades.iter().map(|t| t.signed_volume()).sum(),
            poc: profile.point_of_control(),
            final_vwap: final_vwap(trades),
            last_price: trades.last().map(|t| t.price),
        };

        Self {
            instrument: instrument.to_string(),
            generated_at,
            period: SessionSpan {
                start: trades.first().map(|t| t.timestamp),
                end: trades.last().map(|t| t.timestamp),
            },
            summary,
            order_flow,
            volume_profile: profile.bins,
            large_trades,
            hourly: hourly_breakdown(trades),
        }
    }

    /// Well-formed report for an instrument without usable trades
    pub fn empty(instrument: &str, generated_at: DateTime<Utc>) -> Self {
        Self {
            instrument: instrument.to_string(),
            generated_at,
            period: SessionSpan::default(),
            summary: SummaryStats::default(),
            order_flow: Vec::new(),
            volume_profile: Vec::new(),
            large_trades: Vec::new(),
            hourly: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.summary.total_trades == 0
    }

    pub fn profile(&self) -> VolumeProfile {
        VolumeProfile {
            bins: self.volume_profile.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis_core::normalizer::TradeSide;
    use chrono::NaiveDate;

    fn trade(minute: u32, side: TradeSide, price: f64, quantity: u64) -> Trade {
        Trade {
            instrument: "SBER".to_string(),
            trade_id: None,
            timestamp: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(10, minute, 0).unwrap(),
            price,
            quantity,
            side,
            value: price * quantity as f64,
        }
    }

    #[test]
    fn test_summary_stats() {
        let trades = vec![
            trade(0, TradeSide::Buy, 100.0, 10),
            trade(1, TradeSide::Sell, 101.0, 4),
            trade(2, TradeSide::Buy, 102.0, 6),
        ];
        let report = AnalysisReport::build("SBER", &trades, &AnalysisConfig::default(), Utc::now());

        assert_eq!(report.summary.total_trades, 3);
        assert_eq!(report.summary.total_volume, 20);
        assert_eq!(report.summary.buy_volume, 16);
        assert_eq!(report.summary.sell_volume, 4);
        assert_eq!(report.summary.delta, 12);
        assert_eq!(report.summary.last_price, Some(102.0));
        assert_eq!(report.order_flow.len(), 3);
        assert_eq!(report.volume_profile.len(), 50);
        assert!(report.summary.poc.is_some());
        assert_eq!(report.period.start, Some(trades[0].timestamp));
        assert_eq!(report.period.end, Some(trades[2].timestamp));
    }

    #[test]
    fn test_empty_report_is_zeroed() {
        let report = AnalysisReport::build("SBER", &[], &AnalysisConfig::default(), Utc::now());

        assert!(report.is_empty());
        assert_eq!(report.summary, SummaryStats::default());
        assert!(report.order_flow.is_empty());
        assert!(report.large_trades.is_empty());
        assert_eq!(report, AnalysisReport::empty("SBER", report.generated_at));
    }

    #[test]
    fn test_report_json_shape() {
        let trades = vec![trade(0, TradeSide::Buy, 100.0, 10)];
        let report = AnalysisReport::build("SBER", &trades, &AnalysisConfig::default(), Utc::now());
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["instrument"], "SBER");
        assert_eq!(json["large_trades"][0]["side"], "B");
        assert_eq!(json["summary"]["total_volume"], 10);

        let back: AnalysisReport = serde_json::from_value(json).unwrap();
        assert_eq!(back.summary.delta, 10);
        assert_eq!(back.large_trades, report.large_trades);
        assert_eq!(back.period, report.period);
    }
}

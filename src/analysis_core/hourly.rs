//! Per-hour breakdown of buy/sell activity

use super::large_trades::quantile;
use super::normalizer::Trade;
use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HourDirection {
    Buyers,
    Sellers,
    Balance,
}

impl HourDirection {
    pub fn from_delta(delta: i64) -> Self {
        match delta {
            d if d > 0 => HourDirection::Buyers,
            d if d < 0 => HourDirection::Sellers,
            _ => HourDirection::Balance,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HourDirection::Buyers => "Покупатели",
            HourDirection::Sellers => "Продавцы",
            HourDirection::Balance => "Баланс",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyStats {
    pub hour: String,
    pub direction: HourDirection,
    pub delta: i64,
    pub large_trades: usize,
    pub buy_volume: u64,
    pub sell_volume: u64,
}

/// Quantile inside each hour above which a trade counts as large for that hour
const HOURLY_LARGE_QUANTILE: f64 = 0.95;

/// Group trades by clock hour (ascending) and summarize each group
pub fn hourly_breakdown(trades: &[Trade]) -> Vec<HourlyStats> {
    let mut by_hour: BTreeMap<u32, Vec<&Trade>> = BTreeMap::new();
    for trade in trades {
        by_hour.entry(trade.timestamp.hour()).or_default().push(trade);
    }

    by_hour
        .into_iter()
        .map(|(hour, group)| {
            let buy_volume: u64 = group.iter().filter(|t| t.is_buy()).map(|t| t.quantity).sum();
            let sell_volume: u64 = group.iter().filter(|t| t.is_sell()).map(|t| t.quantity).sum();
            let delta = buy_volume as i64 - sell_volume as i64;

            let values: Vec<f64> = group.iter().map(|t| t.value).collect();
            let large_trades = quantile(&values, HOURLY_LARGE_QUANTILE)
                .map(|threshold| values.iter().filter(|v| **v > threshold).count())
                .unwrap_or(0);

            HourlyStats {
                hour: format!("{:02}:00–{:02}:00", hour, hour + 1),
                direction: HourDirection::from_delta(delta),
                delta,
                large_trades,
                buy_volume,
                sell_volume,
            }
        })
        .collect()
}

//! Order flow metrics: bucketed delta, cumulative delta and running VWAP

use super::guarded_ratio;
use super::normalizer::Trade;
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaBucket {
    pub bucket_start: NaiveDateTime,
    pub delta: i64,
    pub cumulative_delta: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VwapPoint {
    pub timestamp: NaiveDateTime,
    pub price: f64,
    pub vwap: f64,
}

/// Sum signed volume per fixed-width bucket and carry the running total.
///
/// Buckets span from the first trade's bucket to the last trade's bucket with
/// no gaps; a bucket without trades has delta 0.
pub fn delta_series(trades: &[Trade], bucket_secs: i64) -> Vec<DeltaBucket> {
    let width = bucket_secs.max(1);
    let mut per_bucket: BTreeMap<i64, i64> = BTreeMap::new();

    for trade in trades {
        let key = trade.timestamp.and_utc().timestamp().div_euclid(width) * width;
        *per_bucket.entry(key).or_insert(0) += trade.signed_volume();
    }

    let (first, last) = match (per_bucket.keys().next(), per_bucket.keys().next_back()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return Vec::new(),
    };

    let mut series = Vec::with_capacity(((last - first) / width + 1) as usize);
    let mut cumulative = 0;
    let mut key = first;
    while key <= last {
        let delta = per_bucket.get(&key).copied().unwrap_or(0);
        cumulative += delta;
        if let Some(start) = DateTime::from_timestamp(key, 0) {
            series.push(DeltaBucket {
                bucket_start: start.naive_utc(),
                delta,
                cumulative_delta: cumulative,
            });
        }
        key += width;
    }

    series
}

/// Running volume-weighted average price, one point per trade
pub fn vwap_series(trades: &[Trade]) -> Vec<VwapPoint> {
    let mut notional = 0.0;
    let mut quantity = 0.0;

    trades
        .iter()
        .map(|t| {
            notional += t.price * t.quantity as f64;
            quantity += t.quantity as f64;
            VwapPoint {
                timestamp: t.timestamp,
                price: t.price,
                vwap: guarded_ratio(notional, quantity),
            }
        })
        .collect()
}

pub fn final_vwap(trades: &[Trade]) -> Option<f64> {
    vwap_series(trades).last().map(|p| p.vwap)
}

//! Price-binned volume profile and point of control

use super::normalizer::Trade;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileBin {
    pub lower: f64,
    pub upper: f64,
    pub quantity: u64,
}

/// Bin with the largest traded quantity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointOfControl {
    pub lower: f64,
    pub upper: f64,
    pub volume: u64,
}

impl fmt::Display for PointOfControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} - {:.2}", self.lower, self.upper)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeProfile {
    pub bins: Vec<ProfileBin>,
}

impl VolumeProfile {
    /// Split [min price, max price] into `bin_count` equal-width bins.
    ///
    /// When every trade printed at the same price the range is widened by
    /// 0.1% on both sides so the bins keep a non-zero width.
    pub fn build(trades: &[Trade], bin_count: usize) -> Self {
        if trades.is_empty() || bin_count == 0 {
            return Self::default();
        }

        let (mut low, mut high) = trades.iter().fold((f64::MAX, f64::MIN), |(lo, hi), t| {
            (lo.min(t.price), hi.max(t.price))
        });
        if high <= low {
            let pad = if low != 0.0 { low.abs() * 0.001 } else { 0.001 };
            low -= pad;
            high += pad;
        }

        let width = (high - low) / bin_count as f64;
        let mut bins: Vec<ProfileBin> = (0..bin_count)
            .map(|i| ProfileBin {
                lower: low + width * i as f64,
                upper: if i + 1 == bin_count { high } else { low + width * (i + 1) as f64 },
                quantity: 0,
            })
            .collect();

        for trade in trades {
            let idx = (((trade.price - low) / width).floor() as usize).min(bin_count - 1);
            bins[idx].quantity += trade.quantity;
        }

        Self { bins }
    }

    /// Interval label matching how `build` assigns prices: `[lower, upper)`,
    /// except the last bin, which also holds the maximum price
    pub fn bin_label(&self, bin: &ProfileBin) -> String {
        if self.bins.last().is_some_and(|last| std::ptr::eq(last, bin)) {
            format!("[{:.2}, {:.2}]", bin.lower, bin.upper)
        } else {
            format!("[{:.2}, {:.2})", bin.lower, bin.upper)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn total_quantity(&self) -> u64 {
        self.bins.iter().map(|b| b.quantity).sum()
    }

    /// First bin holding the maximum quantity; `None` for an empty profile
    pub fn point_of_control(&self) -> Option<PointOfControl> {
        let mut best: Option<&ProfileBin> = None;
        for bin in &self.bins {
            if best.map_or(true, |b| bin.quantity > b.quantity) {
                best = Some(bin);
            }
        }
        best.map(|b| PointOfControl {
            lower: b.lower,
            upper: b.upper,
            volume: b.quantity,
        })
    }

    /// Bins ranked by quantity, ties keep price order
    pub fn top_bins(&self, n: usize) -> Vec<&ProfileBin> {
        let mut ranked: Vec<&ProfileBin> = self.bins.iter().collect();
        ranked.sort_by(|a, b| b.quantity.cmp(&a.quantity));
        ranked.truncate(n);
        ranked
    }
}

//! Upper-tail extraction of trades by notional value

use super::normalizer::Trade;

/// q-th quantile with linear interpolation between closest ranks,
/// position = (n - 1) * q over the sorted values
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let pos = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

/// Element at index floor(n * q) of the sorted values, or the maximum when
/// there is at most one value. Used by the narrative thresholds, which pick a
/// real observation instead of interpolating.
pub fn rank_threshold<T: PartialOrd + Copy>(values: &[T], q: f64) -> Option<T> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if sorted.len() <= 1 {
        return sorted.last().copied();
    }
    let idx = ((sorted.len() as f64 * q) as usize).min(sorted.len() - 1);
    Some(sorted[idx])
}

pub struct LargeTradeExtractor {
    quantile: f64,
}

impl LargeTradeExtractor {
    pub fn new(quantile: f64) -> Self {
        Self { quantile }
    }

    pub fn with_defaults() -> Self {
        Self::new(0.95)
    }

    pub fn threshold(&self, trades: &[Trade]) -> Option<f64> {
        let values: Vec<f64> = trades.iter().map(|t| t.value).collect();
        quantile(&values, self.quantile)
    }

    /// Trades whose value reaches the session quantile, in chronological order
    pub fn extract(&self, trades: &[Trade]) -> Vec<Trade> {
        let Some(threshold) = self.threshold(trades) else {
            return Vec::new();
        };

        let large: Vec<Trade> = trades.iter().filter(|t| t.value >= threshold).cloned().collect();
        log::debug!(
            "Large trade threshold {:.2} (q={}): {} of {} trades",
            threshold,
            self.quantile,
            large.len(),
            trades.len()
        );
        large
    }
}

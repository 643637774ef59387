//! Algorithmic / market-maker pattern detection over the large-trade subset

use super::group_digits;
use super::normalizer::Trade;
use chrono::{NaiveDateTime, TimeDelta};
use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    RepeatedQuantity,
    RapidFire,
    TimeCluster,
    RepeatedPrice,
    NoneDetected,
}

/// Longest contiguous stretch of sub-threshold gaps
#[derive(Debug, Clone, PartialEq)]
pub struct FastRun {
    pub trades: usize,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl FastRun {
    pub fn span_secs(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / 1000.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeCluster {
    pub trades: usize,
    pub total_volume: u64,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// (quantity, occurrences), most frequent first
    RepeatedQuantity { top: Vec<(u64, usize)> },
    RapidFire { fast_gaps: usize, longest_run: FastRun },
    TimeCluster {
        clusters: usize,
        clustered_trades: usize,
        largest: Vec<TradeCluster>,
    },
    /// (price, occurrences), most frequent first
    RepeatedPrice { top: Vec<(f64, usize)> },
    NoneDetected,
}

impl Signal {
    pub fn kind(&self) -> SignalKind {
        match self {
            Signal::RepeatedQuantity { .. } => SignalKind::RepeatedQuantity,
            Signal::RapidFire { .. } => SignalKind::RapidFire,
            Signal::TimeCluster { .. } => SignalKind::TimeCluster,
            Signal::RepeatedPrice { .. } => SignalKind::RepeatedPrice,
            Signal::NoneDetected => SignalKind::NoneDetected,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Signal::RepeatedQuantity { top } => {
                let details: Vec<String> = top
                    .iter()
                    .map(|(qty, n)| format!("{} лотов ({} раз)", group_digits(*qty as i64), n))
                    .collect();
                format!(
                    "Обнаружены серии сделок с одинаковым объёмом: {} — так выглядят единообразные входы или выходы торгового алгоритма.",
                    details.join("; ")
                )
            }
            Signal::RapidFire { fast_gaps, longest_run } => format!(
                "Обнаружено {} быстрых интервалов между крупными сделками (<2 сек); самая плотная серия: {} сделок за {:.1} сек. с {} до {} — вероятна высокочастотная активность или агрессивный алгоритм.",
                fast_gaps,
                longest_run.trades,
                longest_run.span_secs(),
                longest_run.start.format("%H:%M:%S"),
                longest_run.end.format("%H:%M:%S")
            ),
            Signal::TimeCluster {
                clusters,
                clustered_trades,
                largest,
            } => {
                let details: Vec<String> = largest
                    .iter()
                    .map(|c| {
                        format!(
                            "{} сделок ({} лотов) с {} до {}",
                            c.trades,
                            group_digits(c.total_volume as i64),
                            c.start.format("%H:%M:%S"),
                            c.end.format("%H:%M:%S")
                        )
                    })
                    .collect();
                format!(
                    "Обнаружено {} кластеров сделок (всего {} сделок в кластерах): {}. Плотные пачки крупных сделок характерны для маркет-мейкера, поддерживающего ликвидность, или группы алгоритмов.",
                    clusters,
                    clustered_trades,
                    details.join("; ")
                )
            }
            Signal::RepeatedPrice { top } => {
                let details: Vec<String> = top.iter().map(|(p, n)| format!("цена {} ({} раз)", p, n)).collect();
                format!(
                    "Обнаружены частые сделки по одной цене: {} — маркет-мейкер может защищать или удерживать этот уровень.",
                    details.join("; ")
                )
            }
            Signal::NoneDetected => "Явных признаков алгоритмической торговли или работы маркет-мейкера по крупным сделкам не обнаружено; это не исключает их присутствия на других интервалах или в других типах ордеров.".to_string(),
        }
    }
}

pub struct AlgoSignalDetector {
    min_repeats: usize,
    top_repeats: usize,
    fast_gap: TimeDelta,
    min_fast_gaps: usize,
    cluster_window: TimeDelta,
    min_cluster_size: usize,
    top_clusters: usize,
}

impl AlgoSignalDetector {
    pub fn with_defaults() -> Self {
        Self {
            min_repeats: 5,
            top_repeats: 3,
            fast_gap: TimeDelta::seconds(2),
            min_fast_gaps: 10,
            cluster_window: TimeDelta::seconds(5),
            min_cluster_size: 3,
            top_clusters: 2,
        }
    }

    /// Run every heuristic over the time-ordered large trades.
    ///
    /// Never returns an empty list: when nothing fires the result is a single
    /// `Signal::NoneDetected`.
    pub fn detect(&self, large_trades: &[Trade]) -> Vec<Signal> {
        let mut signals: Vec<Signal> = [
            self.repeated_quantity(large_trades),
            self.rapid_fire(large_trades),
            self.time_clusters(large_trades),
            self.repeated_price(large_trades),
        ]
        .into_iter()
        .flatten()
        .collect();

        for signal in &signals {
            log::info!("Signal {:?}: {}", signal.kind(), signal.describe());
        }
        if signals.is_empty() {
            signals.push(Signal::NoneDetected);
        }
        signals
    }

    fn repeated_quantity(&self, trades: &[Trade]) -> Option<Signal> {
        let top = self.frequent(trades.iter().map(|t| t.quantity).filter(|q| *q > 0));
        (!top.is_empty()).then_some(Signal::RepeatedQuantity { top })
    }

    fn repeated_price(&self, trades: &[Trade]) -> Option<Signal> {
        let top: Vec<(f64, usize)> = self
            .frequent(trades.iter().map(|t| t.price.to_bits()))
            .into_iter()
            .map(|(bits, n)| (f64::from_bits(bits), n))
            .collect();
        (!top.is_empty()).then_some(Signal::RepeatedPrice { top })
    }

    /// Keys seen at least `min_repeats` times, most frequent first, ties in
    /// first-seen order
    fn frequent<K: Eq + Hash + Copy>(&self, keys: impl Iterator<Item = K>) -> Vec<(K, usize)> {
        let mut slots: HashMap<K, usize> = HashMap::new();
        let mut counts: Vec<(K, usize)> = Vec::new();
        for key in keys {
            let slot = *slots.entry(key).or_insert_with(|| {
                counts.push((key, 0));
                counts.len() - 1
            });
            counts[slot].1 += 1;
        }

        counts.retain(|(_, n)| *n >= self.min_repeats);
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        counts.truncate(self.top_repeats);
        counts
    }

    fn rapid_fire(&self, trades: &[Trade]) -> Option<Signal> {
        let fast: Vec<bool> = trades
            .windows(2)
            .map(|w| w[1].timestamp - w[0].timestamp < self.fast_gap)
            .collect();
        let fast_gaps = fast.iter().filter(|f| **f).count();
        if fast_gaps <= self.min_fast_gaps {
            return None;
        }

        // gap i sits between trade i and trade i + 1
        let mut best: Option<(usize, usize)> = None;
        let mut run_start = None;
        for (i, is_fast) in fast.iter().chain(std::iter::once(&false)).enumerate() {
            match (*is_fast, run_start) {
                (true, None) => run_start = Some(i),
                (false, Some(start)) => {
                    if best.map_or(true, |(s, e)| i - start > e - s) {
                        best = Some((start, i));
                    }
                    run_start = None;
                }
                _ => {}
            }
        }

        let (first_gap, end_gap) = best?;
        Some(Signal::RapidFire {
            fast_gaps,
            longest_run: FastRun {
                trades: end_gap - first_gap + 1,
                start: trades[first_gap].timestamp,
                end: trades[end_gap].timestamp,
            },
        })
    }

    /// Greedy clustering anchored on each cluster's first trade. Trades that
    /// end up in a kept cluster are consumed and never start a new one.
    fn time_clusters(&self, trades: &[Trade]) -> Option<Signal> {
        let mut consumed = vec![false; trades.len()];
        let mut found: Vec<TradeCluster> = Vec::new();

        for start in 0..trades.len() {
            if consumed[start] {
                continue;
            }
            let anchor = trades[start].timestamp;
            let mut end = start + 1;
            while end < trades.len() && trades[end].timestamp - anchor <= self.cluster_window {
                end += 1;
            }

            if end - start >= self.min_cluster_size {
                consumed[start..end].iter_mut().for_each(|c| *c = true);
                found.push(TradeCluster {
                    trades: end - start,
                    total_volume: trades[start..end].iter().map(|t| t.quantity).sum(),
                    start: anchor,
                    end: trades[end - 1].timestamp,
                });
            }
        }

        if found.is_empty() {
            return None;
        }

        let clusters = found.len();
        let clustered_trades = found.iter().map(|c| c.trades).sum();
        found.sort_by(|a, b| b.trades.cmp(&a.trades));
        found.truncate(self.top_clusters);

        Some(Signal::TimeCluster {
            clusters,
            clustered_trades,
            largest: found,
        })
    }
}

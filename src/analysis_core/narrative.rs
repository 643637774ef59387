//! Narrative report assembly
//!
//! Builds a fixed-structure trader report from an [`AnalysisReport`] and the
//! detected signals. Sections, in order:
//!
//! 1. overall sentiment (net delta)
//! 2. close vs VWAP
//! 3. session dynamics (cumulative delta path, distribution / absorption)
//! 4. key levels (POC, heaviest profile bins)
//! 5. weakness levels among the heaviest large trades
//! 6. culmination in the last large trades
//! 7. risks and false breakouts of the POC
//! 8. top trades by value, volume spikes, top-50 majority
//! 9. algorithmic / market-maker signals
//!
//! followed by the hourly appendix. The phrasing of several lines is matched by
//! [`super::scorer`], so wording changes must keep those phrases intact.

use super::detector::Signal;
use super::large_trades::rank_threshold;
use super::normalizer::{Trade, TradeSide};
use super::report::AnalysisReport;
use super::{format_price, group_digits, guarded_ratio};
use chrono::NaiveDateTime;
use std::collections::HashSet;
use std::fmt;

const DELTA_SWING_SHARE: f64 = 0.30;
const NEAR_LEVEL_SHARE: f64 = 0.0005;
const WEAKNESS_QUANTILE: f64 = 0.9;
const WEAKNESS_LOOKAHEAD: usize = 5;
const WEAKNESS_PER_SIDE: usize = 3;
const CULMINATION_WINDOW: usize = 10;
const CULMINATION_MIN_TRADES: usize = 6;
const BREAKOUT_WINDOW: usize = 20;
const EXTREMES_WINDOW: usize = 10;
const VOLUME_SPIKE_QUANTILE: f64 = 0.995;
const TOP_DAY_TRADES: usize = 50;
const TOP_PROFILE_BINS: usize = 3;
const LATE_SESSION_BUCKETS: usize = 5;

const TRADE_TIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S";
const PERIOD_FORMAT: &str = "%d.%m.%Y %H:%M";

#[derive(Debug, Clone, PartialEq)]
pub struct NarrativeSection {
    pub number: Option<u8>,
    pub title: String,
    pub lines: Vec<String>,
}

/// Rendered report; fields are private so a generated report cannot change
#[derive(Debug, Clone, PartialEq)]
pub struct NarrativeReport {
    instrument: String,
    period: String,
    sections: Vec<NarrativeSection>,
}

impl NarrativeReport {
    pub fn generate(report: &AnalysisReport, signals: &[Signal], top_trades: usize) -> Self {
        NarrativeAssembler::new(report, signals, top_trades).assemble()
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn sections(&self) -> &[NarrativeSection] {
        &self.sections
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for NarrativeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Торговый отчёт по {}", self.instrument)?;
        writeln!(f, "{}", self.period)?;
        writeln!(f, "{}", "=".repeat(40))?;

        for section in &self.sections {
            match section.number {
                Some(n) => {
                    writeln!(f, "{}. {}", n, section.title)?;
                    for line in &section.lines {
                        writeln!(f, "- {}", line)?;
                    }
                    writeln!(f, "{}", "-".repeat(20))?;
                }
                None => {
                    writeln!(f, "--- {} ---", section.title)?;
                    for line in &section.lines {
                        writeln!(f, "{}", line)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Price level where one side's aggression was absorbed
#[derive(Debug, Clone, PartialEq)]
pub struct WeaknessLevel {
    pub price: f64,
    pub side: TradeSide,
    pub quantity: u64,
    pub timestamp: NaiveDateTime,
}

impl WeaknessLevel {
    pub fn label(&self) -> &'static str {
        match self.side {
            TradeSide::Buy => "Слабость покупателей",
            TradeSide::Sell => "Слабость продавцов",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Culmination {
    Buying,
    Selling,
}

/// Direction in which the POC was breached before price reverted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeBreakout {
    Upward,
    Downward,
}

pub struct NarrativeAssembler<'a> {
    report: &'a AnalysisReport,
    signals: &'a [Signal],
    top_trades: usize,
}

impl<'a> NarrativeAssembler<'a> {
    pub fn new(report: &'a AnalysisReport, signals: &'a [Signal], top_trades: usize) -> Self {
        Self {
            report,
            signals,
            top_trades,
        }
    }

    pub fn assemble(&self) -> NarrativeReport {
        let sections = vec![
            numbered(1, "ОБЩИЙ РЫНОЧНЫЙ СЕНТИМЕНТ", vec![self.sentiment()]),
            numbered(2, "ЦЕНА ЗАКРЫТИЯ И VWAP", vec![self.price_vs_vwap()]),
            numbered(3, "СЦЕНАРИЙ СЕССИИ", self.session_dynamics()),
            numbered(4, "КЛЮЧЕВЫЕ УРОВНИ", self.key_levels()),
            numbered(5, "ТОРГОВЫЕ УРОВНИ И ЗОНЫ СЛАБОСТИ", self.weakness_lines()),
            numbered(6, "КУЛЬМИНАЦИЯ", vec![self.culmination_line()]),
            numbered(7, "РИСКИ, ЛОВУШКИ, ЛОЖНЫЕ ПРОБОИ", self.risk_lines()),
            numbered(8, "КРУПНЕЙШИЕ СДЕЛКИ", self.top_trade_lines()),
            numbered(
                9,
                "ПРИЗНАКИ МАРКЕТ-МЕЙКЕРА И АЛГОРИТМИЧЕСКОЙ ТОРГОВЛИ",
                self.signals.iter().map(|s| s.describe()).collect(),
            ),
            NarrativeSection {
                number: None,
                title: "Почасовой мини-анализ".to_string(),
                lines: self.hourly_lines(),
            },
        ];

        log::debug!("{}: narrative assembled with {} sections", self.report.instrument, sections.len());

        NarrativeReport {
            instrument: self.report.instrument.clone(),
            period: self.period_line(),
            sections,
        }
    }

    fn period_line(&self) -> String {
        match (self.report.period.start, self.report.period.end) {
            (Some(start), Some(end)) => format!(
                "Период анализа: {} — {}",
                start.format(PERIOD_FORMAT),
                end.format(PERIOD_FORMAT)
            ),
            _ => "Период анализа: нет данных".to_string(),
        }
    }

    fn sentiment(&self) -> String {
        let delta = self.report.summary.delta;
        if delta > 0 {
            format!(
                "Рынок был под контролем быков: кумулятивная дельта ({}) на стороне покупателей, агрессивные покупки преобладали.",
                group_digits(delta)
            )
        } else if delta < 0 {
            format!(
                "Медведи доминировали: кумулятивная дельта ({}) отрицательная, агрессивные продажи преобладали.",
                group_digits(delta)
            )
        } else {
            "Баланс сил: ни у одной из сторон не было преимущества, кумулятивная дельта около нуля.".to_string()
        }
    }

    fn price_vs_vwap(&self) -> String {
        let (Some(last), Some(vwap)) = (self.report.summary.last_price, self.report.summary.final_vwap) else {
            return "Нет данных о цене закрытия для сравнения с VWAP.".to_string();
        };
        let (last_str, vwap_str) = (format_price(last), format_price(vwap));

        if (last - vwap).abs() < vwap * NEAR_LEVEL_SHARE {
            format!(
                "Цена закрытия ({}) находится вблизи VWAP ({}) — нейтральное завершение периода, возможен как отскок, так и пробой.",
                last_str, vwap_str
            )
        } else if last > vwap {
            format!(
                "Цена закрытия ({}) находится выше VWAP ({}) — бычий признак: сделки завершились выше средневзвешенной цены.",
                last_str, vwap_str
            )
        } else {
            format!(
                "Цена закрытия ({}) находится ниже VWAP ({}) — медвежий признак: давление продавцов сохраняется.",
                last_str, vwap_str
            )
        }
    }

    fn session_dynamics(&self) -> Vec<String> {
        let flow = &self.report.order_flow;
        let Some(first) = flow.first() else {
            return vec!["Нет данных для анализа динамики сессии.".to_string()];
        };
        let deltas: Vec<i64> = flow.iter().map(|b| b.cumulative_delta).collect();
        let mut lines = Vec::new();

        let initial = first.cumulative_delta;
        lines.push(match initial {
            d if d < 0 => format!(
                "С открытия ({}) инициативу захватили продавцы: кумулятивная дельта ушла в минус ({}).",
                first.bucket_start.format("%H:%M"),
                group_digits(d)
            ),
            d if d > 0 => format!(
                "С открытия ({}) инициативу взяли покупатели: кумулятивная дельта в плюсе ({}).",
                first.bucket_start.format("%H:%M"),
                group_digits(d)
            ),
            _ => format!(
                "С открытия ({}) стороны были в равновесии: кумулятивная дельта на нуле.",
                first.bucket_start.format("%H:%M")
            ),
        });

        let (trough_idx, trough) = first_extreme(&deltas, |a, b| a < b);
        let (peak_idx, peak) = first_extreme(&deltas, |a, b| a > b);
        let trough_time = flow[trough_idx].bucket_start.format("%H:%M");
        let peak_time = flow[peak_idx].bucket_start.format("%H:%M");

        if peak != trough {
            lines.push(format!(
                "Максимальное давление продавцов — в {} (кумулятивная дельта {}).",
                trough_time,
                group_digits(trough)
            ));
            lines.push(format!(
                "Пик активности покупателей — в {} (кумулятивная дельта {}).",
                peak_time,
                group_digits(peak)
            ));
        } else {
            lines.push("Кумулятивная дельта не показала выраженных пиков — боковое движение.".to_string());
        }

        let last = deltas.len() - 1;
        let close = deltas[last];

        if peak > 0 && peak_idx < last {
            let drop = guarded_ratio((peak - close) as f64, peak as f64);
            if drop >= DELTA_SWING_SHARE {
                lines.push(format!(
                    "Разгрузка на хаях: после пика в {} кумулятивная дельта снизилась на {:.0}% к закрытию — крупные покупатели фиксируют прибыль, возможен разворот вниз.",
                    peak_time,
                    drop * 100.0
                ));
            }
        }

        if trough < 0 && trough_idx < last {
            let rise = guarded_ratio((close - trough) as f64, trough.unsigned_abs() as f64);
            if rise >= DELTA_SWING_SHARE {
                lines.push(format!(
                    "Активный откуп на лоях: после минимума в {} кумулятивная дельта выросла на {:.0}% к закрытию — продажи поглощаются, возможен отскок вверх.",
                    trough_time,
                    rise * 100.0
                ));
            }
        }

        if deltas.len() > LATE_SESSION_BUCKETS && close < deltas[deltas.len() - LATE_SESSION_BUCKETS] {
            lines.push(
                "В последние минуты сессии кумулятивная дельта снижалась — продавцы давили на закрытии.".to_string(),
            );
        }

        lines
    }

    fn key_levels(&self) -> Vec<String> {
        let mut lines = Vec::new();
        match &self.report.summary.poc {
            Some(poc) => lines.push(format!(
                "POC ({}) — зона максимального объёма ({} лотов), выступает магнитом для цены и отражает интерес крупных участников.",
                poc,
                group_digits(poc.volume as i64)
            )),
            None => lines.push("POC не определён: нет данных профиля объёма.".to_string()),
        }

        let profile = self.report.profile();
        for bin in profile.top_bins(TOP_PROFILE_BINS).into_iter().filter(|b| b.quantity > 0) {
            lines.push(format!(
                "Кластер {} — объём {} лотов, здесь проходил основной торговый интерес.",
                profile.bin_label(bin),
                group_digits(bin.quantity as i64)
            ));
        }
        lines
    }

    /// Heaviest large trades whose direction was not confirmed by the next
    /// few heavy trades, deduplicated by price proximity
    pub fn weakness_levels(&self) -> Vec<WeaknessLevel> {
        let large = &self.report.large_trades;
        let quantities: Vec<u64> = large.iter().map(|t| t.quantity).collect();
        let Some(threshold) = rank_threshold(&quantities, WEAKNESS_QUANTILE) else {
            return Vec::new();
        };
        let heavy: Vec<&Trade> = large.iter().filter(|t| t.quantity >= threshold).collect();

        let mut candidates = Vec::new();
        for (i, trade) in heavy.iter().enumerate() {
            let lookahead = &heavy[i + 1..(i + 1 + WEAKNESS_LOOKAHEAD).min(heavy.len())];
            if lookahead.is_empty() {
                continue;
            }
            let unconfirmed = match trade.side {
                TradeSide::Buy => lookahead.iter().all(|t| t.price <= trade.price),
                TradeSide::Sell => lookahead.iter().all(|t| t.price >= trade.price),
            };
            if unconfirmed {
                candidates.push(WeaknessLevel {
                    price: trade.price,
                    side: trade.side,
                    quantity: trade.quantity,
                    timestamp: trade.timestamp,
                });
            }
        }

        candidates.sort_by(|a, b| b.quantity.cmp(&a.quantity));
        let mut kept: Vec<WeaknessLevel> = Vec::new();
        for level in candidates {
            let distinct = kept
                .iter()
                .all(|k| guarded_ratio((level.price - k.price).abs(), k.price) > NEAR_LEVEL_SHARE);
            if distinct {
                kept.push(level);
            }
        }

        let buyers = kept.iter().filter(|w| w.side == TradeSide::Buy).take(WEAKNESS_PER_SIDE);
        let sellers = kept.iter().filter(|w| w.side == TradeSide::Sell).take(WEAKNESS_PER_SIDE);
        buyers.chain(sellers).cloned().collect()
    }

    fn weakness_lines(&self) -> Vec<String> {
        let levels = self.weakness_levels();
        if levels.is_empty() {
            return vec!["Выраженных уровней слабости по крупным сделкам не обнаружено.".to_string()];
        }

        let mut lines = vec!["Только наиболее значимые уровни слабости (крупные сделки без продолжения движения):".to_string()];
        lines.extend(levels.iter().map(|w| {
            format!(
                "{} на {} (объём {} лотов, сделка в {}) — агрессия одной стороны была поглощена другой, возможный разворотный уровень.",
                w.label(),
                format_price(w.price),
                group_digits(w.quantity as i64),
                w.timestamp.format(TRADE_TIME_FORMAT)
            )
        }));
        lines
    }

    pub fn culmination(&self) -> Option<Culmination> {
        let large = &self.report.large_trades;
        let tail = &large[large.len().saturating_sub(CULMINATION_WINDOW)..];

        let (buys, sells): (Vec<&Trade>, Vec<&Trade>) = tail.iter().partition(|t| t.is_buy());
        let buy_qty: u64 = buys.iter().map(|t| t.quantity).sum();
        let sell_qty: u64 = sells.iter().map(|t| t.quantity).sum();

        if buys.len() >= CULMINATION_MIN_TRADES && buy_qty > sell_qty {
            Some(Culmination::Buying)
        } else if sells.len() >= CULMINATION_MIN_TRADES && sell_qty > buy_qty {
            Some(Culmination::Selling)
        } else {
            None
        }
    }

    fn culmination_line(&self) -> String {
        match self.culmination() {
            Some(Culmination::Buying) => "Кульминация покупок: в конце сессии прошла серия агрессивных покупок на повышенных объёмах, что часто предшествует коррекции вниз.".to_string(),
            Some(Culmination::Selling) => "Кульминация продаж: в конце сессии прошла серия агрессивных продаж на повышенных объёмах, возможен отскок вверх.".to_string(),
            None => "Односторонней серии крупных сделок в конце сессии не было.".to_string(),
        }
    }

    /// POC (its lower bound) breached within the last large trades, with the
    /// final large trade back on the other side
    pub fn fake_breakout(&self) -> Option<FakeBreakout> {
        let level = self.report.summary.poc.as_ref()?.lower;
        let large = &self.report.large_trades;
        let last_price = large.last()?.price;
        let window = &large[large.len().saturating_sub(BREAKOUT_WINDOW)..];

        let high = window.iter().map(|t| t.price).fold(f64::MIN, f64::max);
        let low = window.iter().map(|t| t.price).fold(f64::MAX, f64::min);

        if high > level && last_price < level {
            Some(FakeBreakout::Upward)
        } else if low < level && last_price > level {
            Some(FakeBreakout::Downward)
        } else {
            None
        }
    }

    fn risk_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let summary = &self.report.summary;

        if let (Some(poc), Some(fake)) = (&summary.poc, self.fake_breakout()) {
            lines.push(match fake {
                FakeBreakout::Upward => format!(
                    "Закол уровня POC ({}): цена пробила уровень вверх, но вернулась под него — ложный пробой и ловушка для лонгистов, слабость покупателей.",
                    poc
                ),
                FakeBreakout::Downward => format!(
                    "Закол уровня POC ({}): цена пробила уровень вниз и вернулась выше — ловушка для шортистов, говорит о силе покупателей.",
                    poc
                ),
            });
        }

        if let (Some(poc), Some(last)) = (&summary.poc, summary.last_price) {
            if last < poc.lower {
                lines.push(format!(
                    "Закрытие ({}) ниже POC ({}) — уровень перешёл под контроль продавцов.",
                    format_price(last),
                    poc
                ));
            } else if (last - poc.lower).abs() < poc.lower * NEAR_LEVEL_SHARE {
                lines.push(format!(
                    "Закрытие ({}) удержалось на POC ({}) — уровень может стать поддержкой или сопротивлением.",
                    format_price(last),
                    poc
                ));
            }
        }

        let large = &self.report.large_trades;
        let tail = &large[large.len().saturating_sub(EXTREMES_WINDOW)..];
        let highest = tail.iter().reduce(|best, t| if t.price > best.price { t } else { best });
        let lowest = tail.iter().reduce(|best, t| if t.price < best.price { t } else { best });
        if let Some(t) = highest.filter(|t| t.is_sell()) {
            lines.push(format!(
                "На максимумах финала сессии прошла крупная продажа по {} — возможна смена сценария.",
                format_price(t.price)
            ));
        }
        if let Some(t) = lowest.filter(|t| t.is_buy()) {
            lines.push(format!(
                "На минимумах финала сессии прошла крупная покупка по {} — возможен разворот вверх.",
                format_price(t.price)
            ));
        }

        if lines.is_empty() {
            lines.push("Явных признаков ловушек и разворота не обнаружено.".to_string());
        }
        lines
    }

    fn top_trade_lines(&self) -> Vec<String> {
        let large = &self.report.large_trades;
        if large.is_empty() {
            return vec!["Нет крупных сделок для анализа.".to_string()];
        }

        let mut by_value: Vec<&Trade> = large.iter().collect();
        by_value.sort_by(|a, b| b.value.total_cmp(&a.value));

        let mut seen = HashSet::new();
        let top: Vec<&Trade> = by_value
            .iter()
            .copied()
            .filter(|t| seen.insert((t.timestamp, t.price.to_bits(), t.quantity, t.side)))
            .take(self.top_trades)
            .collect();

        let mut lines = vec![format!("ТОП-{} агрессивных сделок (выходы объёма):", top.len())];
        lines.extend(top.iter().map(|t| describe_trade(t)));

        let values: Vec<f64> = large.iter().map(|t| t.value).collect();
        if let Some(spike) = rank_threshold(&values, VOLUME_SPIKE_QUANTILE) {
            let spikes = values.iter().filter(|v| **v >= spike).count();
            lines.push(format!(
                "Аномальных выходов объёма (сумма от {} руб.): {}.",
                group_digits(spike as i64),
                spikes
            ));
        }

        let day_top = &by_value[..by_value.len().min(TOP_DAY_TRADES)];
        lines.push(format!("ТОП-{} сделок дня:", day_top.len()));
        lines.extend(
            day_top
                .iter()
                .enumerate()
                .map(|(i, t)| format!("{:2}. {}", i + 1, describe_trade(t))),
        );

        let buys = day_top.iter().filter(|t| t.is_buy()).count();
        let sells = day_top.len() - buys;
        lines.push(if buys > sells {
            format!("Общий характер ТОП-{} сделок: преобладали крупные ПОКУПКИ ({} шт.)", day_top.len(), buys)
        } else if sells > buys {
            format!("Общий характер ТОП-{} сделок: преобладали крупные ПРОДАЖИ ({} шт.)", day_top.len(), sells)
        } else {
            format!("Общий характер ТОП-{} сделок: покупки и продажи сбалансированы.", day_top.len())
        });
        lines
    }

    fn hourly_lines(&self) -> Vec<String> {
        if self.report.hourly.is_empty() {
            return vec!["Нет данных для почасового анализа.".to_string()];
        }
        self.report
            .hourly
            .iter()
            .map(|h| {
                format!(
                    "{}: направление — {}, дельта {:+}, крупных сделок: {}, покупки: {} лотов, продажи: {} лотов",
                    h.hour,
                    h.direction.as_str(),
                    h.delta,
                    h.large_trades,
                    group_digits(h.buy_volume as i64),
                    group_digits(h.sell_volume as i64)
                )
            })
            .collect()
    }
}

fn numbered(number: u8, title: &str, lines: Vec<String>) -> NarrativeSection {
    NarrativeSection {
        number: Some(number),
        title: title.to_string(),
        lines,
    }
}

fn describe_trade(trade: &Trade) -> String {
    let direction = match trade.side {
        TradeSide::Buy => "ПОКУПКА",
        TradeSide::Sell => "ПРОДАЖА",
    };
    format!(
        "{} — {} на {} лотов по {} (сумма {} руб.)",
        trade.timestamp.format(TRADE_TIME_FORMAT),
        direction,
        group_digits(trade.quantity as i64),
        format_price(trade.price),
        group_digits(trade.value as i64)
    )
}

/// Index and value of the first element that no later element beats
fn first_extreme(values: &[i64], beats: impl Fn(i64, i64) -> bool) -> (usize, i64) {
    let mut best = (0, values[0]);
    for (i, v) in values.iter().copied().enumerate().skip(1) {
        if beats(v, best.1) {
            best = (i, v);
        }
    }
    best
}

//! Trade normalization from raw exchange records to the canonical Trade sequence

use crate::error::{MalformedRecord, NormalizeError};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// One row as handed over by the data-collection side. Numeric fields may be
/// JSON numbers or strings, and any of them may be missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTradeRecord {
    pub instrument: String,
    pub trade_date: Option<String>,
    pub trade_time: Option<String>,
    pub price: Option<Value>,
    pub quantity: Option<Value>,
    pub side: Option<String>,
    pub value: Option<Value>,
    pub trade_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeSide {
    #[serde(rename = "B")]
    Buy,
    #[serde(rename = "S")]
    Sell,
}

impl TradeSide {
    /// Anything that is not an explicit buy marker counts as a sell
    pub fn from_marker(marker: &str) -> Self {
        let marker = marker.trim();
        if marker.eq_ignore_ascii_case("B") || marker.eq_ignore_ascii_case("BUY") {
            TradeSide::Buy
        } else {
            TradeSide::Sell
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub instrument: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_id: Option<String>,
    pub timestamp: NaiveDateTime,
    pub price: f64,
    pub quantity: u64,
    pub side: TradeSide,
    pub value: f64,
}

impl Trade {
    /// Convert a raw record, rejecting anything that cannot be coerced
    pub fn from_raw(record: &RawTradeRecord) -> Result<Self, MalformedRecord> {
        let timestamp = parse_timestamp(record.trade_date.as_deref(), record.trade_time.as_deref())?;

        let price = coerce_number("price", record.price.as_ref())?;
        if price <= 0.0 {
            return Err(MalformedRecord::NonPositive { field: "price", value: price });
        }

        let quantity = coerce_number("quantity", record.quantity.as_ref())?;
        if quantity <= 0.0 {
            return Err(MalformedRecord::NonPositive { field: "quantity", value: quantity });
        }
        if quantity.fract() != 0.0 {
            return Err(MalformedRecord::FractionalQuantity(quantity));
        }
        let quantity = quantity as u64;

        let value = match record.value.as_ref() {
            None | Some(Value::Null) => price * quantity as f64,
            supplied => coerce_number("value", supplied)?,
        };

        let side = TradeSide::from_marker(record.side.as_deref().unwrap_or_default());

        Ok(Self {
            instrument: record.instrument.clone(),
            trade_id: record.trade_id.clone(),
            timestamp,
            price,
            quantity,
            side,
            value,
        })
    }

    pub fn is_buy(&self) -> bool {
        matches!(self.side, TradeSide::Buy)
    }

    pub fn is_sell(&self) -> bool {
        matches!(self.side, TradeSide::Sell)
    }

    /// +quantity for buyer-initiated trades, -quantity for seller-initiated ones
    pub fn signed_volume(&self) -> i64 {
        match self.side {
            TradeSide::Buy => self.quantity as i64,
            TradeSide::Sell => -(self.quantity as i64),
        }
    }

    fn identity(&self) -> TradeIdentity {
        match &self.trade_id {
            Some(id) => TradeIdentity::Id(id.clone()),
            None => TradeIdentity::Tuple(
                self.timestamp,
                self.price.to_bits(),
                self.quantity,
                self.side,
            ),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
enum TradeIdentity {
    Id(String),
    Tuple(NaiveDateTime, u64, u64, TradeSide),
}

/// Cleaned trade sequence plus bookkeeping about what was discarded
#[derive(Debug, Clone)]
pub struct NormalizeOutcome {
    pub trades: Vec<Trade>,
    pub malformed: usize,
    pub duplicates: usize,
}

/// Clean, dedupe and order the raw records of one instrument.
///
/// Returns `NormalizeError::EmptyInput` when nothing survives cleaning so that
/// batch callers can skip the instrument instead of aborting.
pub fn normalize_trades(
    instrument: &str,
    records: &[RawTradeRecord],
) -> Result<NormalizeOutcome, NormalizeError> {
    let mut trades = Vec::with_capacity(records.len());
    let mut seen = HashSet::with_capacity(records.len());
    let mut malformed = 0;
    let mut duplicates = 0;

    for record in records {
        let parsed = if !record.instrument.is_empty() && record.instrument != instrument {
            Err(MalformedRecord::ForeignInstrument(record.instrument.clone()))
        } else {
            Trade::from_raw(record)
        };

        match parsed {
            Ok(mut trade) => {
                if seen.insert(trade.identity()) {
                    trade.instrument = instrument.to_string();
                    trades.push(trade);
                } else {
                    duplicates += 1;
                }
            }
            Err(e) => {
                log::debug!("{}: dropping record: {}", instrument, e);
                malformed += 1;
            }
        }
    }

    if trades.is_empty() {
        return Err(NormalizeError::EmptyInput {
            instrument: instrument.to_string(),
            dropped: malformed,
        });
    }

    // Stable: equal timestamps keep their arrival order
    trades.sort_by_key(|t| t.timestamp);

    log::info!(
        "{}: normalized {} trades ({} malformed, {} duplicates dropped)",
        instrument,
        trades.len(),
        malformed,
        duplicates
    );

    Ok(NormalizeOutcome {
        trades,
        malformed,
        duplicates,
    })
}

fn coerce_number(field: &'static str, raw: Option<&Value>) -> Result<f64, MalformedRecord> {
    let parsed = match raw {
        None | Some(Value::Null) => return Err(MalformedRecord::Missing { field }),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(MalformedRecord::NotNumeric {
            field,
            raw: raw.map(|v| v.to_string()).unwrap_or_default(),
        }),
    }
}

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

fn parse_timestamp(date: Option<&str>, time: Option<&str>) -> Result<NaiveDateTime, MalformedRecord> {
    let time = time.map(str::trim).ok_or(MalformedRecord::Missing { field: "trade_time" })?;

    // Some feeds already put the full instant into the time column
    let candidate = if time.contains(' ') || time.contains('T') {
        time.to_string()
    } else {
        let date = date.map(str::trim).ok_or(MalformedRecord::Missing { field: "trade_date" })?;
        format!("{} {}", date, time)
    };

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&candidate, fmt).ok())
        .ok_or(MalformedRecord::Timestamp(candidate))
}

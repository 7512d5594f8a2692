//! Quote normalization.
//!
//! Pure functions that turn each upstream payload shape into the canonical
//! [`Candle`] and [`Ticker`] records. Numeric fields may arrive as JSON strings
//! or JSON numbers; a field that does not parse fails the whole message with a
//! decode error naming the field. No defaults are substituted.
//!
//! Supported shapes:
//! 1. REST kline array: `[openTimeMs, o, h, l, c, v, closeTimeMs, ...]`
//! 2. Stream kline event: `{"e":"kline","s":..,"k":{t,T,s,i,o,c,h,l,v,n,x}}`
//! 3. Stream ticker event: `{"e":"24hrTicker","s":..,"p","P","c","h","l","v"}`
//! 4. REST 24hr ticker: `{symbol, lastPrice, priceChangePercent, volume, highPrice, lowPrice}`

use crate::error::{DataSourceError, FeedResult};
use perpdex_core::{Candle, Price, Size, Symbol, Ticker};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;

/// Kline payload, one variant per upstream source.
#[derive(Debug, Clone, PartialEq)]
pub enum KlinePayload {
    /// Fixed-position REST array.
    Rest(Vec<Value>),
    /// Streaming kline event.
    Stream(StreamKlineEvent),
}

/// Streaming kline event envelope.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamKlineEvent {
    #[serde(rename = "e", default)]
    pub event_type: Option<String>,
    #[serde(rename = "E", default)]
    pub event_time: Option<i64>,
    #[serde(rename = "s", default)]
    pub symbol: Option<String>,
    #[serde(rename = "k")]
    pub kline: StreamKline,
}

/// Kline body of a stream event. Numeric fields stay raw until normalized.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamKline {
    #[serde(rename = "t")]
    pub open_time: Value,
    #[serde(rename = "T", default)]
    pub close_time: Option<Value>,
    #[serde(rename = "s", default)]
    pub symbol: Option<String>,
    #[serde(rename = "i", default)]
    pub interval: Option<String>,
    #[serde(rename = "o")]
    pub open: Value,
    #[serde(rename = "c")]
    pub close: Value,
    #[serde(rename = "h")]
    pub high: Value,
    #[serde(rename = "l")]
    pub low: Value,
    #[serde(rename = "v")]
    pub volume: Value,
    #[serde(rename = "n", default)]
    pub trades: Option<Value>,
    #[serde(rename = "x", default)]
    pub is_closed: bool,
}

/// Streaming 24h ticker event.
///
/// `p` (absolute change) is carried but not used by [`Ticker`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamTickerEvent {
    #[serde(rename = "e", default)]
    pub event_type: Option<String>,
    #[serde(rename = "E", default)]
    pub event_time: Option<i64>,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p", default)]
    pub price_change: Option<Value>,
    #[serde(rename = "P")]
    pub price_change_percent: Value,
    #[serde(rename = "c")]
    pub last_price: Value,
    #[serde(rename = "h")]
    pub high: Value,
    #[serde(rename = "l")]
    pub low: Value,
    #[serde(rename = "v")]
    pub volume: Value,
}

/// REST `/ticker/24hr` response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestTicker24h {
    pub symbol: String,
    pub last_price: Value,
    pub price_change_percent: Value,
    pub volume: Value,
    pub high_price: Value,
    pub low_price: Value,
}

/// Normalize any kline payload into a candle.
pub fn normalize_candle(payload: KlinePayload) -> FeedResult<Candle> {
    let candle = match payload {
        KlinePayload::Rest(fields) => normalize_rest_kline(&fields)?,
        KlinePayload::Stream(event) => normalize_stream_kline(&event.kline)?,
    };

    if !candle.is_consistent() {
        return Err(DataSourceError::Decode(format!(
            "inconsistent OHLC at time {}: o={} h={} l={} c={}",
            candle.time, candle.open, candle.high, candle.low, candle.close
        )));
    }
    Ok(candle)
}

/// Normalize a streaming ticker event.
pub fn normalize_ticker(event: StreamTickerEvent) -> FeedResult<Ticker> {
    Ok(Ticker {
        symbol: parse_symbol(&event.symbol, "s")?,
        price: Price::new(decimal_field(&event.last_price, "c")?),
        change_24h: decimal_field(&event.price_change_percent, "P")?,
        volume_24h: Size::new(decimal_field(&event.volume, "v")?),
        high_24h: Price::new(decimal_field(&event.high, "h")?),
        low_24h: Price::new(decimal_field(&event.low, "l")?),
    })
}

/// Normalize a REST 24h ticker.
pub fn normalize_rest_ticker(ticker: RestTicker24h) -> FeedResult<Ticker> {
    Ok(Ticker {
        symbol: parse_symbol(&ticker.symbol, "symbol")?,
        price: Price::new(decimal_field(&ticker.last_price, "lastPrice")?),
        change_24h: decimal_field(&ticker.price_change_percent, "priceChangePercent")?,
        volume_24h: Size::new(decimal_field(&ticker.volume, "volume")?),
        high_24h: Price::new(decimal_field(&ticker.high_price, "highPrice")?),
        low_24h: Price::new(decimal_field(&ticker.low_price, "lowPrice")?),
    })
}

/// Decode a raw stream kline event object.
pub fn decode_stream_candle(data: &Value) -> FeedResult<Candle> {
    let event: StreamKlineEvent = serde_json::from_value(data.clone())
        .map_err(|e| DataSourceError::Decode(format!("kline event: {e}")))?;
    normalize_candle(KlinePayload::Stream(event))
}

/// Decode a raw stream ticker event object.
pub fn decode_stream_ticker(data: &Value) -> FeedResult<Ticker> {
    let event: StreamTickerEvent = serde_json::from_value(data.clone())
        .map_err(|e| DataSourceError::Decode(format!("ticker event: {e}")))?;
    normalize_ticker(event)
}

fn normalize_rest_kline(fields: &[Value]) -> FeedResult<Candle> {
    const NAMES: [&str; 6] = ["openTime", "open", "high", "low", "close", "volume"];
    if fields.len() < NAMES.len() {
        return Err(DataSourceError::Decode(format!(
            "kline array has {} fields, expected at least {}",
            fields.len(),
            NAMES.len()
        )));
    }

    Ok(Candle {
        time: millis_to_secs(int_field(&fields[0], NAMES[0])?),
        open: Price::new(decimal_field(&fields[1], NAMES[1])?),
        high: Price::new(decimal_field(&fields[2], NAMES[2])?),
        low: Price::new(decimal_field(&fields[3], NAMES[3])?),
        close: Price::new(decimal_field(&fields[4], NAMES[4])?),
        volume: Size::new(decimal_field(&fields[5], NAMES[5])?),
        closed: true,
    })
}

fn normalize_stream_kline(kline: &StreamKline) -> FeedResult<Candle> {
    Ok(Candle {
        time: millis_to_secs(int_field(&kline.open_time, "k.t")?),
        open: Price::new(decimal_field(&kline.open, "k.o")?),
        high: Price::new(decimal_field(&kline.high, "k.h")?),
        low: Price::new(decimal_field(&kline.low, "k.l")?),
        close: Price::new(decimal_field(&kline.close, "k.c")?),
        volume: Size::new(decimal_field(&kline.volume, "k.v")?),
        closed: kline.is_closed,
    })
}

fn millis_to_secs(ms: i64) -> i64 {
    ms.div_euclid(1000)
}

fn parse_symbol(raw: &str, field: &str) -> FeedResult<Symbol> {
    Symbol::new(raw).map_err(|e| DataSourceError::field(field, e))
}

/// Parse a decimal from a JSON string or number.
fn decimal_field(value: &Value, field: &str) -> FeedResult<Decimal> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(DataSourceError::field(
                field,
                format!("expected number or numeric string, got {other}"),
            ))
        }
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| DataSourceError::field(field, format!("'{text}' is not a decimal")))
}

/// Parse an integer from a JSON number or numeric string.
fn int_field(value: &Value, field: &str) -> FeedResult<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| DataSourceError::field(field, format!("'{n}' is not an integer"))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| DataSourceError::field(field, format!("'{s}' is not an integer"))),
        other => Err(DataSourceError::field(
            field,
            format!("expected integer, got {other}"),
        )),
    }
}

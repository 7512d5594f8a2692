//! Canonical market data records.
//!
//! Every upstream payload shape (REST kline arrays, streaming kline objects,
//! streaming and REST tickers) is normalized into one of these records before
//! it reaches a chart or a ticker board.

use crate::error::CoreError;
use crate::{Price, Size};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trading pair identifier (e.g., "BTCUSDT").
///
/// Stored uppercase. Stream channel names use the lowercase form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Create a symbol, normalizing to uppercase.
    ///
    /// Only ASCII alphanumerics are accepted; the exchange rejects anything else
    /// and the value is spliced into stream paths.
    pub fn new(raw: impl AsRef<str>) -> crate::Result<Self> {
        let raw = raw.as_ref().trim();
        if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CoreError::InvalidSymbol(raw.to_string()));
        }
        Ok(Self(raw.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase form used in stream channel names.
    pub fn channel_name(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

/// Candle interval.
///
/// The upstream API accepts more codes, but charts only offer this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "1w")]
    OneWeek,
}

impl Interval {
    pub const ALL: [Interval; 7] = [
        Self::OneMinute,
        Self::FiveMinutes,
        Self::FifteenMinutes,
        Self::OneHour,
        Self::FourHours,
        Self::OneDay,
        Self::OneWeek,
    ];

    /// Wire code used in REST queries and stream channel names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::OneHour => "1h",
            Self::FourHours => "4h",
            Self::OneDay => "1d",
            Self::OneWeek => "1w",
        }
    }

    /// Bucket length in seconds.
    pub fn duration_secs(&self) -> i64 {
        match self {
            Self::OneMinute => 60,
            Self::FiveMinutes => 5 * 60,
            Self::FifteenMinutes => 15 * 60,
            Self::OneHour => 60 * 60,
            Self::FourHours => 4 * 60 * 60,
            Self::OneDay => 24 * 60 * 60,
            Self::OneWeek => 7 * 24 * 60 * 60,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|interval| interval.as_str() == s)
            .ok_or_else(|| CoreError::InvalidInterval(s.to_string()))
    }
}

/// OHLCV summary for one time bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket open time, seconds since epoch.
    pub time: i64,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Size,
    /// Whether the bucket has closed. Open candles may still be rewritten.
    pub closed: bool,
}

impl Candle {
    /// Compare the OHLCV fields and time, ignoring the closed flag.
    pub fn same_bar(&self, other: &Candle) -> bool {
        self.time == other.time
            && self.open == other.open
            && self.high == other.high
            && self.low == other.low
            && self.close == other.close
            && self.volume == other.volume
    }

    /// High bounds open/close from above and low bounds them from below.
    pub fn is_consistent(&self) -> bool {
        self.high >= self.open.max(self.close)
            && self.low <= self.open.min(self.close)
            && self.low <= self.high
    }
}

/// Latest price and 24-hour statistics for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: Symbol,
    /// Last traded price.
    pub price: Price,
    /// 24h change in percent.
    pub change_24h: Decimal,
    pub volume_24h: Size,
    pub high_24h: Price,
    pub low_24h: Price,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_symbol_normalizes_case() {
        let symbol = Symbol::new("btcUsdt").unwrap();
        assert_eq!(symbol.as_str(), "BTCUSDT");
        assert_eq!(symbol.channel_name(), "btcusdt");
    }

    #[test]
    fn test_symbol_rejects_path_characters() {
        assert!(Symbol::new("").is_err());
        assert!(Symbol::new("btc/usdt").is_err());
        assert!(Symbol::new("btc@ticker").is_err());
    }

    #[test]
    fn test_symbol_serde_roundtrip_validates() {
        let symbol: Symbol = serde_json::from_str("\"ethusdt\"").unwrap();
        assert_eq!(symbol.as_str(), "ETHUSDT");
        assert!(serde_json::from_str::<Symbol>("\"eth usdt\"").is_err());
    }

    #[test]
    fn test_interval_codes() {
        for interval in Interval::ALL {
            let parsed: Interval = interval.as_str().parse().unwrap();
            assert_eq!(parsed, interval);
        }
        assert!("2h".parse::<Interval>().is_err());
        assert_eq!(Interval::FourHours.duration_secs(), 14_400);
    }

    #[test]
    fn test_candle_consistency() {
        let candle = Candle {
            time: 1_700_000_000,
            open: Price::new(dec!(100)),
            high: Price::new(dec!(105)),
            low: Price::new(dec!(98)),
            close: Price::new(dec!(103)),
            volume: Size::new(dec!(12.5)),
            closed: true,
        };
        assert!(candle.is_consistent());

        let broken = Candle {
            high: Price::new(dec!(101)),
            ..candle.clone()
        };
        assert!(!broken.is_consistent());

        let reopened = Candle {
            closed: false,
            ..candle.clone()
        };
        assert!(candle.same_bar(&reopened));
        assert_ne!(candle, reopened);
    }
}

//! Subscription descriptors and stream channel naming.
//!
//! A subscription is keyed by its canonical lowercase channel name
//! (`btcusdt@kline_1h`, `btcusdt@ticker`). Multi-symbol ticker subscriptions
//! use one combined stream whose key joins the channels with `/`.

use crate::error::{WsError, WsResult};
use perpdex_core::{Interval, Symbol};
use std::fmt;

/// What a subscription streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    /// Kline updates for one interval.
    Candles(Interval),
    /// Rolling 24h ticker updates.
    Ticker,
}

/// Which symbols a subscription covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamTarget {
    Symbol(Symbol),
    /// Two or more distinct symbols sharing one combined connection.
    Symbols(Vec<Symbol>),
}

impl StreamTarget {
    pub fn symbols(&self) -> &[Symbol] {
        match self {
            Self::Symbol(symbol) => std::slice::from_ref(symbol),
            Self::Symbols(symbols) => symbols,
        }
    }
}

/// Build the canonical channel name for one symbol.
pub fn channel_name(symbol: &Symbol, kind: SubscriptionKind) -> String {
    match kind {
        SubscriptionKind::Candles(interval) => {
            format!("{}@kline_{}", symbol.channel_name(), interval.as_str())
        }
        SubscriptionKind::Ticker => format!("{}@ticker", symbol.channel_name()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub target: StreamTarget,
    pub kind: SubscriptionKind,
}

impl Subscription {
    /// Candle stream for one symbol and interval.
    pub fn candles(symbol: Symbol, interval: Interval) -> Self {
        Self {
            target: StreamTarget::Symbol(symbol),
            kind: SubscriptionKind::Candles(interval),
        }
    }

    /// Ticker stream for a set of symbols.
    ///
    /// Duplicates are dropped keeping first-seen order. A single symbol uses a
    /// plain stream; more than one uses a combined stream.
    pub fn tickers(symbols: impl IntoIterator<Item = Symbol>) -> WsResult<Self> {
        let mut unique: Vec<Symbol> = Vec::new();
        for symbol in symbols {
            if !unique.contains(&symbol) {
                unique.push(symbol);
            }
        }

        let target = match unique.len() {
            0 => {
                return Err(WsError::InvalidSubscription(
                    "ticker subscription needs at least one symbol".to_string(),
                ))
            }
            1 => StreamTarget::Symbol(unique.remove(0)),
            _ => StreamTarget::Symbols(unique),
        };

        Ok(Self {
            target,
            kind: SubscriptionKind::Ticker,
        })
    }

    /// Channel names in target order.
    pub fn channels(&self) -> Vec<String> {
        self.target
            .symbols()
            .iter()
            .map(|symbol| channel_name(symbol, self.kind))
            .collect()
    }

    /// Canonical key: the channel name, or the combined stream list.
    pub fn key(&self) -> String {
        self.channels().join("/")
    }

    /// Whether frames arrive wrapped in `{stream, data}` envelopes.
    pub fn is_combined(&self) -> bool {
        matches!(self.target, StreamTarget::Symbols(_))
    }

    /// Full connection URL under `ws_base`.
    pub fn stream_url(&self, ws_base: &str) -> String {
        let base = ws_base.trim_end_matches('/');
        if self.is_combined() {
            format!("{}/stream?streams={}", base, self.key())
        } else {
            format!("{}/ws/{}", base, self.key())
        }
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

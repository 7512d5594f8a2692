//! Historical candle and ticker loading over REST.
//!
//! One request per call, no caching and no cancellation. Callers that switch
//! views while a request is in flight discard the stale result themselves.

use crate::error::{DataSourceError, FeedResult};
use crate::normalizer::{normalize_candle, normalize_rest_ticker, KlinePayload, RestTicker24h};
use perpdex_core::{Candle, Interval, Symbol, Ticker};
use perpdex_telemetry::Metrics;
use reqwest::Client;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default timeout for REST requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Candles requested when the caller does not specify a limit.
pub const DEFAULT_CANDLE_LIMIT: u32 = 500;

/// Upstream hard cap on candles per request.
pub const MAX_CANDLE_LIMIT: u32 = 1000;

/// Clamp a requested limit to `1..=MAX_CANDLE_LIMIT`.
pub fn effective_limit(limit: Option<u32>) -> u32 {
    limit
        .unwrap_or(DEFAULT_CANDLE_LIMIT)
        .clamp(1, MAX_CANDLE_LIMIT)
}

/// REST client for market history.
#[derive(Debug, Clone)]
pub struct HistoricalLoader {
    client: Client,
    /// API base, e.g. `https://api.binance.com/api/v3`.
    base_url: String,
}

impl HistoricalLoader {
    pub fn new(base_url: impl Into<String>) -> FeedResult<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> FeedResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DataSourceError::Http(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch recent candles, oldest first.
    ///
    /// Returns at most `limit` candles (default 500, capped at 1000) with
    /// non-decreasing times. The most recent candle is marked open.
    pub async fn fetch_candles(
        &self,
        symbol: &Symbol,
        interval: Interval,
        limit: Option<u32>,
    ) -> FeedResult<Vec<Candle>> {
        let limit = effective_limit(limit);
        let limit_param = limit.to_string();
        let query = [
            ("symbol", symbol.as_str()),
            ("interval", interval.as_str()),
            ("limit", limit_param.as_str()),
        ];

        let body = self.get_json("klines", &query).await?;
        let rows = body
            .as_array()
            .ok_or_else(|| DataSourceError::Decode("klines response is not an array".to_string()))?;

        let mut candles = Vec::with_capacity(rows.len());
        for (idx, row) in rows.iter().enumerate() {
            let fields = row.as_array().ok_or_else(|| {
                DataSourceError::Decode(format!("klines entry {idx} is not an array"))
            })?;
            candles.push(normalize_candle(KlinePayload::Rest(fields.clone()))?);
        }

        candles.sort_by_key(|c| c.time);
        candles.dedup_by(|later, earlier| {
            if later.time == earlier.time {
                *earlier = later.clone();
                true
            } else {
                false
            }
        });

        let limit = limit as usize;
        if candles.len() > limit {
            let excess = candles.len() - limit;
            candles.drain(..excess);
        }
        if let Some(last) = candles.last_mut() {
            last.closed = false;
        }

        info!(
            symbol = %symbol,
            interval = %interval,
            count = candles.len(),
            "Loaded candle history"
        );
        Ok(candles)
    }

    /// Fetch the rolling 24h ticker for one symbol.
    pub async fn fetch_ticker_24hr(&self, symbol: &Symbol) -> FeedResult<Ticker> {
        let body = self
            .get_json("ticker/24hr", &[("symbol", symbol.as_str())])
            .await?;
        let raw: RestTicker24h = serde_json::from_value(body)
            .map_err(|e| DataSourceError::Decode(format!("ticker/24hr response: {e}")))?;
        normalize_rest_ticker(raw)
    }

    async fn get_json(&self, endpoint: &str, query: &[(&str, &str)]) -> FeedResult<Value> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let started = Instant::now();
        debug!(%url, ?query, "REST request");

        let result = self.send(&url, query).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let outcome = if result.is_ok() { "ok" } else { "error" };
        Metrics::rest_latency(endpoint, outcome, elapsed_ms);

        if let Err(e) = &result {
            warn!(%url, error = %e, elapsed_ms, "REST request failed");
        }
        result
    }

    async fn send(&self, url: &str, query: &[(&str, &str)]) -> FeedResult<Value> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| DataSourceError::Http(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DataSourceError::Status {
                code: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("Unknown").to_string(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| DataSourceError::Decode(format!("Failed to parse response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_limit() {
        assert_eq!(effective_limit(None), 500);
        assert_eq!(effective_limit(Some(0)), 1);
        assert_eq!(effective_limit(Some(250)), 250);
        assert_eq!(effective_limit(Some(5000)), 1000);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let loader = HistoricalLoader::new("http://localhost:8080/api/v3/").unwrap();
        assert_eq!(loader.base_url(), "http://localhost:8080/api/v3");
    }
}

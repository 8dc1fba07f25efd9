//! External reference volatility sources.

use crate::error::SurfaceError;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, trace};

/// Source of an authoritative volatility per symbol.
pub trait ReferenceFeed: Send + Sync {
    /// Latest reference volatility for `symbol` as a decimal (0.45 = 45%).
    ///
    /// Any transport or decoding failure is reported as
    /// [`SurfaceError::ReferenceUnavailable`].
    fn latest_volatility(
        &self,
        symbol: &str,
    ) -> impl Future<Output = Result<f64, SurfaceError>> + Send;
}

/// Connection settings for [`HttpReferenceFeed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceFeedConfig {
    /// Endpoint queried as `GET {base_url}?currency={symbol}`.
    pub base_url: String,
    /// Per-request HTTP timeout.
    pub request_timeout_ms: u64,
    /// Multiplier applied to the quoted value; the public feed quotes
    /// percentages, hence 0.01.
    pub value_scale: f64,
}

impl Default for ReferenceFeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.deribit.com/api/v2/public/get_historical_volatility"
                .to_string(),
            request_timeout_ms: 2_000,
            value_scale: 0.01,
        }
    }
}

impl ReferenceFeedConfig {
    /// Sets the endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_request_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = timeout_ms;
        self
    }

    /// Sets the value multiplier.
    #[must_use]
    pub fn with_value_scale(mut self, value_scale: f64) -> Self {
        self.value_scale = value_scale;
        self
    }
}

#[derive(Debug, Deserialize)]
struct HistoricalVolatilityResponse {
    result: Vec<(f64, f64)>,
}

/// Extracts the most recent volatility from a historical volatility payload
/// of the form `{"result": [[timestamp, value], ...]}`.
pub fn parse_historical_volatility(
    symbol: &str,
    body: &str,
    value_scale: f64,
) -> Result<f64, SurfaceError> {
    let unavailable = |reason: String| SurfaceError::ReferenceUnavailable {
        symbol: symbol.to_string(),
        reason,
    };

    let response: HistoricalVolatilityResponse =
        serde_json::from_str(body).map_err(|e| unavailable(format!("malformed payload: {e}")))?;
    let (timestamp, value) = response
        .result
        .into_iter()
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .ok_or_else(|| unavailable("empty result".to_string()))?;

    trace!("reference {} at {}: {}", symbol, timestamp, value);
    Ok(value * value_scale)
}

/// Reference feed backed by an HTTP historical-volatility endpoint.
#[derive(Debug, Clone)]
pub struct HttpReferenceFeed {
    client: reqwest::Client,
    config: ReferenceFeedConfig,
}

impl HttpReferenceFeed {
    /// Builds the HTTP client.
    pub fn new(config: ReferenceFeedConfig) -> Result<Self, SurfaceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| SurfaceError::invalid_input(format!("http client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Feed configuration.
    pub fn config(&self) -> &ReferenceFeedConfig {
        &self.config
    }

    async fn fetch(&self, symbol: &str) -> Result<String, reqwest::Error> {
        self.client
            .get(&self.config.base_url)
            .query(&[("currency", symbol)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

impl ReferenceFeed for HttpReferenceFeed {
    async fn latest_volatility(&self, symbol: &str) -> Result<f64, SurfaceError> {
        debug!("fetching reference volatility for {}", symbol);
        let body = self
            .fetch(symbol)
            .await
            .map_err(|e| SurfaceError::ReferenceUnavailable {
                symbol: symbol.to_string(),
                reason: e.to_string(),
            })?;
        parse_historical_volatility(symbol, &body, self.config.value_scale)
    }
}

/// In-memory feed with fixed values, for offline runs and tests.
#[derive(Debug, Default)]
pub struct StaticReferenceFeed {
    values: DashMap<String, f64>,
}

impl StaticReferenceFeed {
    /// Empty feed; every symbol is unavailable until set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the reference volatility for `symbol`.
    pub fn set(&self, symbol: impl Into<String>, volatility: f64) {
        self.values.insert(symbol.into(), volatility);
    }

    /// Removes `symbol`, making it unavailable.
    pub fn remove(&self, symbol: &str) -> Option<f64> {
        self.values.remove(symbol).map(|(_, value)| value)
    }
}

impl ReferenceFeed for StaticReferenceFeed {
    async fn latest_volatility(&self, symbol: &str) -> Result<f64, SurfaceError> {
        self.values
            .get(symbol)
            .map(|value| *value)
            .ok_or_else(|| SurfaceError::ReferenceUnavailable {
                symbol: symbol.to_string(),
                reason: "no static value".to_string(),
            })
    }
}

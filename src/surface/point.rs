//! Surface entries and the request/response types that reach the store.

use crate::error::SurfaceError;
use crate::implied_volatility::OptionSide;
use crate::reconcile::Reconciliation;
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// One cached implied volatility at `(symbol, expiry, strike)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityPoint {
    /// Underlying instrument, e.g. `"BTC"`.
    pub symbol: String,
    /// Expiry calendar date.
    pub expiry: NaiveDate,
    /// Strike in price units.
    pub strike: f64,
    /// Implied volatility as a decimal, never negative.
    pub volatility: f64,
    /// When the value was computed (milliseconds since epoch).
    pub observed_at: u64,
    /// Solver confidence at the time the value was stored.
    pub converged: bool,
    /// Value was taken from the reference feed rather than solved locally.
    #[serde(default)]
    pub reconciled: bool,
}

/// Exact strike key.
///
/// Keys hold the raw bits of a positive finite `f64`, for which bit order
/// and numeric order coincide, so `100.0` and `100.0000001` stay distinct and
/// iteration runs from the lowest strike up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrikeKey(u64);

impl StrikeKey {
    /// Builds a key, rejecting zero, negative and non-finite strikes.
    pub fn new(strike: f64) -> Result<Self, SurfaceError> {
        if !strike.is_finite() || strike <= 0.0 {
            return Err(SurfaceError::invalid_input(format!(
                "strike must be positive and finite, got {strike}"
            )));
        }
        Ok(Self(strike.to_bits()))
    }

    /// Strike value the key was built from.
    #[must_use]
    pub fn value(&self) -> f64 {
        f64::from_bits(self.0)
    }
}

impl Ord for StrikeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for StrikeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Parses an ISO-8601 expiry, either a plain date (`2025-03-28`) or a full
/// RFC 3339 timestamp whose date part is used.
pub fn parse_expiry(raw: &str) -> Result<NaiveDate, SurfaceError> {
    let raw = raw.trim();
    if let Ok(date) = raw.parse::<NaiveDate>() {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|timestamp| timestamp.date_naive())
        .map_err(|_| SurfaceError::invalid_input(format!("unparseable expiry {raw:?}")))
}

/// Inbound volatility query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityQuery {
    /// Underlying instrument.
    pub symbol: String,
    /// Expiry as an ISO-8601 date.
    pub expiry: String,
    /// Strike in price units.
    pub strike: f64,
    /// Current spot of the underlying.
    pub spot: f64,
    /// Call or put.
    pub side: OptionSide,
    /// Market price to solve from on a cache miss.
    #[serde(default)]
    pub observed_price: Option<f64>,
}

impl VolatilityQuery {
    /// Creates a query without an observed price.
    pub fn new(
        symbol: impl Into<String>,
        expiry: impl Into<String>,
        strike: f64,
        spot: f64,
        side: OptionSide,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            expiry: expiry.into(),
            strike,
            spot,
            side,
            observed_price: None,
        }
    }

    /// Attaches the market price used when the surface has no entry yet.
    #[must_use]
    pub fn with_observed_price(mut self, price: f64) -> Self {
        self.observed_price = Some(price);
        self
    }
}

/// Inbound trade print. Always re-solves and overwrites the surface entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeUpdate {
    /// Underlying instrument.
    pub symbol: String,
    /// Expiry as an ISO-8601 date.
    pub expiry: String,
    /// Strike in price units.
    pub strike: f64,
    /// Spot of the underlying at trade time.
    pub spot: f64,
    /// Option price of the trade.
    pub last_trade_price: f64,
    /// Call or put.
    pub side: OptionSide,
}

/// Confidence attached to a returned volatility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    /// Solver met its tolerance.
    Converged,
    /// Best estimate from a solve that did not converge.
    LowConfidence,
    /// Contract has no time left; volatility is zero.
    Expired,
    /// Nothing cached and no price to solve from.
    NoData,
    /// Value replaced by the reference feed.
    Reconciled,
}

impl QuoteStatus {
    pub(crate) fn for_point(point: &VolatilityPoint) -> Self {
        if point.reconciled {
            QuoteStatus::Reconciled
        } else if point.converged {
            QuoteStatus::Converged
        } else {
            QuoteStatus::LowConfidence
        }
    }

    /// True when the quote carries a volatility the surface holds.
    #[must_use]
    pub fn has_value(&self) -> bool {
        !matches!(self, QuoteStatus::Expired | QuoteStatus::NoData)
    }
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QuoteStatus::Converged => "converged",
            QuoteStatus::LowConfidence => "low_confidence",
            QuoteStatus::Expired => "expired",
            QuoteStatus::NoData => "no_data",
            QuoteStatus::Reconciled => "reconciled",
        };
        f.write_str(label)
    }
}

/// Response to a query or trade update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceQuote {
    /// Underlying instrument.
    pub symbol: String,
    /// Expiry date.
    pub expiry: NaiveDate,
    /// Strike in price units.
    pub strike: f64,
    /// Implied volatility as a decimal.
    pub volatility: f64,
    /// Confidence of `volatility`.
    pub status: QuoteStatus,
    /// Milliseconds since epoch at which the value was produced.
    pub timestamp: u64,
    /// Reference check performed before returning, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciliation: Option<Reconciliation>,
}

impl SurfaceQuote {
    /// Advisory condition attached to the served value, if any.
    ///
    /// A reference check takes precedence; otherwise a low-confidence solve
    /// is reported as [`SurfaceError::NonConvergence`].
    pub fn advisory(&self) -> Option<SurfaceError> {
        if let Some(reconciliation) = &self.reconciliation {
            let (_, advisory) = reconciliation.clone().into_parts();
            if advisory.is_some() {
                return advisory;
            }
        }
        (self.status == QuoteStatus::LowConfidence).then(|| SurfaceError::NonConvergence {
            symbol: self.symbol.clone(),
            volatility: self.volatility,
        })
    }

    pub(crate) fn from_point(point: &VolatilityPoint) -> Self {
        Self {
            symbol: point.symbol.clone(),
            expiry: point.expiry,
            strike: point.strike,
            volatility: point.volatility,
            status: QuoteStatus::for_point(point),
            timestamp: point.observed_at,
            reconciliation: None,
        }
    }

    pub(crate) fn empty(
        symbol: &str,
        expiry: NaiveDate,
        strike: f64,
        status: QuoteStatus,
        timestamp: u64,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            expiry,
            strike,
            volatility: 0.0,
            status,
            timestamp,
            reconciliation: None,
        }
    }
}

/// What caused a surface mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateSource {
    /// Cache miss solved from a query's observed price.
    Solved,
    /// Trade print re-solve.
    Trade,
    /// Reference feed write-back.
    Reconciled,
}

/// Emitted to the store's update listener after every stored mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceUpdateEvent {
    /// Point as stored.
    pub point: VolatilityPoint,
    /// Origin of the mutation.
    pub source: UpdateSource,
}

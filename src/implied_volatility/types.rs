//! Types for option pricing and implied volatility calculation.

use super::error::IVError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Side of an option contract.
///
/// Inbound payloads spell this several ways (`"CALL"`, `"call"`, `"C"`), so
/// parsing accepts all of them and the rest of the crate only sees the enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionSide {
    /// Call option (right to buy the underlying at strike price).
    #[serde(alias = "CALL", alias = "call", alias = "C", alias = "c")]
    Call,
    /// Put option (right to sell the underlying at strike price).
    #[serde(alias = "PUT", alias = "put", alias = "P", alias = "p")]
    Put,
}

impl FromStr for OptionSide {
    type Err = IVError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CALL" | "C" => Ok(OptionSide::Call),
            "PUT" | "P" => Ok(OptionSide::Put),
            _ => Err(IVError::InvalidParams {
                message: format!("unknown option side {s:?}, expected CALL or PUT"),
            }),
        }
    }
}

impl fmt::Display for OptionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionSide::Call => write!(f, "CALL"),
            OptionSide::Put => write!(f, "PUT"),
        }
    }
}

/// Which legs of the closed-form price carry the `e^(-rT)` discount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingConvention {
    /// Spot and strike legs both discounted:
    /// `C = S·e^(-rT)·Φ(d1) - K·e^(-rT)·Φ(d2)`.
    ///
    /// Used by stores unless configured otherwise. For out-of-the-money
    /// contracts with a positive rate the low-volatility limit can fall below
    /// zero and price is not monotone there; the solver flags such solves as
    /// not converged.
    #[default]
    DiscountedSpot,
    /// Black-Scholes-Merton without dividends: `C = S·Φ(d1) - K·e^(-rT)·Φ(d2)`.
    /// Strictly increasing in volatility everywhere.
    Standard,
}

/// Contract and market parameters shared by every pricer call of one solve.
///
/// Volatility is deliberately absent: the solver varies it, see
/// [`OptionParams::with_volatility`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptionParams {
    /// Underlying spot price in price units.
    pub spot: f64,
    /// Option strike price in price units.
    pub strike: f64,
    /// Time to expiration in years (e.g., 30 days = 30.0 / 365.0).
    pub time_to_expiry: f64,
    /// Risk-free interest rate (annualized, e.g., 0.05 for 5%).
    pub risk_free_rate: f64,
    /// Call or Put.
    pub side: OptionSide,
    /// Discounting convention used by the pricer.
    #[serde(default)]
    pub convention: PricingConvention,
}

impl OptionParams {
    /// Creates new option parameters.
    #[must_use]
    pub fn new(
        spot: f64,
        strike: f64,
        time_to_expiry: f64,
        risk_free_rate: f64,
        side: OptionSide,
    ) -> Self {
        Self {
            spot,
            strike,
            time_to_expiry,
            risk_free_rate,
            side,
            convention: PricingConvention::default(),
        }
    }

    /// Switches the discounting convention.
    #[must_use]
    pub fn with_convention(mut self, convention: PricingConvention) -> Self {
        self.convention = convention;
        self
    }

    /// Creates parameters for a call option.
    #[must_use]
    pub fn call(spot: f64, strike: f64, time_to_expiry: f64, risk_free_rate: f64) -> Self {
        Self::new(spot, strike, time_to_expiry, risk_free_rate, OptionSide::Call)
    }

    /// Creates parameters for a put option.
    #[must_use]
    pub fn put(spot: f64, strike: f64, time_to_expiry: f64, risk_free_rate: f64) -> Self {
        Self::new(spot, strike, time_to_expiry, risk_free_rate, OptionSide::Put)
    }

    /// Builds the pricer input for a given volatility.
    #[must_use]
    pub fn with_volatility(&self, volatility: f64) -> PricingRequest {
        PricingRequest {
            spot: self.spot,
            strike: self.strike,
            time_to_expiry: self.time_to_expiry,
            volatility,
            risk_free_rate: self.risk_free_rate,
            side: self.side,
            convention: self.convention,
        }
    }
}

/// A single pricer invocation. Built per call and dropped right after.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingRequest {
    /// Underlying spot price (S).
    pub spot: f64,
    /// Strike price (K).
    pub strike: f64,
    /// Time to expiration in years (T).
    pub time_to_expiry: f64,
    /// Volatility (σ) as a decimal, 0.25 = 25%.
    pub volatility: f64,
    /// Annualized risk-free rate (r).
    pub risk_free_rate: f64,
    /// Call or Put.
    pub side: OptionSide,
    /// Discounting convention.
    pub convention: PricingConvention,
}

impl PricingRequest {
    /// Contract part of the request, without the volatility.
    #[must_use]
    pub fn params(&self) -> OptionParams {
        OptionParams::new(
            self.spot,
            self.strike,
            self.time_to_expiry,
            self.risk_free_rate,
            self.side,
        )
        .with_convention(self.convention)
    }
}

/// How a solve terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveOutcome {
    /// Price error fell below tolerance.
    Converged,
    /// Iteration cap reached; the best volatility seen is reported.
    MaxIterations,
    /// The observed price lies outside the prices at the volatility bounds.
    Unbracketed,
    /// A price inside the bracket fell outside the bracket's end prices, so
    /// the bisection invariant did not hold.
    NonMonotonic,
    /// No time left to expiry; volatility is reported as zero.
    Expired,
}

/// Result of an implied volatility solve.
///
/// `converged == false` means "use with reduced confidence", not failure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IVSolution {
    /// Implied volatility (0.25 = 25%).
    pub volatility: f64,
    /// Whether the price error met the solver tolerance.
    pub converged: bool,
    /// Pricer evaluations spent in bisection and refinement.
    pub iterations: u32,
    /// Absolute difference between model and observed price at `volatility`.
    pub price_error: f64,
    /// Termination reason.
    pub outcome: SolveOutcome,
}

impl IVSolution {
    /// Zero-volatility result for a contract with no time left.
    #[must_use]
    pub fn expired() -> Self {
        Self {
            volatility: 0.0,
            converged: false,
            iterations: 0,
            price_error: 0.0,
            outcome: SolveOutcome::Expired,
        }
    }

    /// Returns the volatility as a percentage (e.g., 25.0 for 25%).
    #[must_use]
    pub fn volatility_percent(&self) -> f64 {
        self.volatility * 100.0
    }

    /// Returns true when the solver had no remaining time to work with.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.outcome == SolveOutcome::Expired
    }
}

//! Closed-form option pricing and vega.
//!
//! Under the default [`PricingConvention::DiscountedSpot`] both legs of the
//! payoff are discounted with `e^(-rT)`:
//!
//! - Call: `C = S·e^(-rT)·Φ(d1) - K·e^(-rT)·Φ(d2)`
//! - Put:  `P = K·e^(-rT)·Φ(-d2) - S·e^(-rT)·Φ(-d1)`
//!
//! so `C - P = e^(-rT)·(S - K)` holds exactly for the same `d1`/`d2`.
//! [`PricingConvention::Standard`] leaves the spot leg undiscounted.
//!
//! Puts are always priced from `Φ(-d1)`/`Φ(-d2)` directly, never derived
//! from the call through parity.
//!
//! Vega is quoted per unit of volatility (a move from 0.20 to 1.20);
//! [`BlackScholes::vega_per_point`] gives the per-vol-point figure.

use super::error::IVError;
use super::types::{OptionParams, OptionSide, PricingConvention, PricingRequest};
use std::f64::consts::{PI, SQRT_2};

/// Closed-form pricing model.
pub struct BlackScholes;

impl BlackScholes {
    /// Standard normal cumulative distribution function (CDF).
    ///
    /// Φ(x) = 0.5 · erfc(-x / √2)
    #[must_use]
    pub fn norm_cdf(x: f64) -> f64 {
        0.5 * libm::erfc(-x / SQRT_2)
    }

    /// Standard normal probability density function (PDF).
    ///
    /// φ(x) = exp(-x²/2) / √(2π)
    #[must_use]
    pub fn norm_pdf(x: f64) -> f64 {
        (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
    }

    /// Calculates the d1 parameter.
    ///
    /// d1 = [ln(S/K) + (r + σ²/2)T] / (σ√T)
    #[must_use]
    pub fn d1(spot: f64, strike: f64, rate: f64, time: f64, vol: f64) -> f64 {
        let sqrt_time = time.sqrt();
        ((spot / strike).ln() + (rate + 0.5 * vol * vol) * time) / (vol * sqrt_time)
    }

    /// Calculates the d2 parameter.
    ///
    /// d2 = d1 - σ√T
    #[must_use]
    pub fn d2(d1: f64, vol: f64, time: f64) -> f64 {
        d1 - vol * time.sqrt()
    }

    /// Checks the pricer preconditions.
    ///
    /// Spot, strike, volatility and time to expiry must be finite and
    /// strictly positive; the rate must be finite.
    pub fn validate(request: &PricingRequest) -> Result<(), IVError> {
        let checks = [
            ("spot", request.spot),
            ("strike", request.strike),
            ("volatility", request.volatility),
            ("time to expiry", request.time_to_expiry),
        ];
        for (name, value) in checks {
            if !value.is_finite() || value <= 0.0 {
                return Err(IVError::invalid(format!(
                    "{name} must be positive and finite, got {value}"
                )));
            }
        }
        if !request.risk_free_rate.is_finite() {
            return Err(IVError::invalid(format!(
                "risk-free rate must be finite, got {}",
                request.risk_free_rate
            )));
        }
        Ok(())
    }

    /// Theoretical option price.
    ///
    /// # Errors
    /// Returns [`IVError::InvalidParams`] when a precondition fails, so a bad
    /// input never turns into a NaN price.
    pub fn price(request: &PricingRequest) -> Result<f64, IVError> {
        Self::validate(request)?;
        Ok(Self::price_at(&request.params(), request.volatility))
    }

    /// Vega (∂price/∂σ) per unit of volatility.
    ///
    /// Vega = S · √T · φ(d1), identical for calls and puts.
    pub fn vega(request: &PricingRequest) -> Result<f64, IVError> {
        Self::validate(request)?;
        Ok(Self::vega_at(
            request.spot,
            request.strike,
            request.risk_free_rate,
            request.time_to_expiry,
            request.volatility,
        ))
    }

    /// Vega scaled to a one-vol-point (0.01) move.
    pub fn vega_per_point(request: &PricingRequest) -> Result<f64, IVError> {
        Ok(Self::vega(request)? * 0.01)
    }

    /// Unchecked pricing for callers that validated the contract once
    /// up front and only vary a strictly positive volatility.
    pub(crate) fn price_at(params: &OptionParams, vol: f64) -> f64 {
        let d1 = Self::d1(
            params.spot,
            params.strike,
            params.risk_free_rate,
            params.time_to_expiry,
            vol,
        );
        let d2 = Self::d2(d1, vol, params.time_to_expiry);
        let discount = (-params.risk_free_rate * params.time_to_expiry).exp();
        let spot_leg = match params.convention {
            PricingConvention::DiscountedSpot => params.spot * discount,
            PricingConvention::Standard => params.spot,
        };

        match params.side {
            OptionSide::Call => {
                spot_leg * Self::norm_cdf(d1) - params.strike * discount * Self::norm_cdf(d2)
            }
            OptionSide::Put => {
                params.strike * discount * Self::norm_cdf(-d2) - spot_leg * Self::norm_cdf(-d1)
            }
        }
    }

    pub(crate) fn vega_at(spot: f64, strike: f64, rate: f64, time: f64, vol: f64) -> f64 {
        let d1 = Self::d1(spot, strike, rate, time, vol);
        spot * time.sqrt() * Self::norm_pdf(d1)
    }
}

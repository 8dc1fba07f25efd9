//! Bracketed implied volatility solver.
//!
//! Bisection over a finite volatility interval establishes and keeps the
//! invariant `price(low) <= observed <= price(high)`; a few guarded
//! Newton-Raphson steps then polish the best bisection point using vega.

use super::black_scholes::BlackScholes;
use super::error::IVError;
use super::types::{IVSolution, OptionParams, SolveOutcome};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Configuration for the implied volatility solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Maximum bisection iterations before giving up.
    pub max_iterations: u32,
    /// Convergence tolerance on the absolute price difference.
    pub tolerance: f64,
    /// Lower volatility bound (default: 1e-6).
    pub min_vol: f64,
    /// Upper volatility bound (default: 10.0 = 1000%).
    pub max_vol: f64,
    /// Newton-Raphson refinement steps applied after bisection.
    pub newton_steps: u32,
    /// Vega below which a Newton step is skipped.
    pub min_vega: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-6,
            min_vol: 1e-6,
            max_vol: 10.0,
            newton_steps: 3,
            min_vega: 1e-8,
        }
    }
}

impl SolverConfig {
    /// Creates a new solver configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of bisection iterations.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the convergence tolerance.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the volatility bounds.
    #[must_use]
    pub fn with_bounds(mut self, min_vol: f64, max_vol: f64) -> Self {
        self.min_vol = min_vol;
        self.max_vol = max_vol;
        self
    }

    /// Sets the number of Newton-Raphson refinement steps (0 disables them).
    #[must_use]
    pub fn with_newton_steps(mut self, newton_steps: u32) -> Self {
        self.newton_steps = newton_steps;
        self
    }

    /// Sets the vega floor for Newton steps.
    #[must_use]
    pub fn with_min_vega(mut self, min_vega: f64) -> Self {
        self.min_vega = min_vega;
        self
    }

    /// Checks the configuration itself.
    pub fn validate(&self) -> Result<(), IVError> {
        if !(self.min_vol.is_finite() && self.min_vol > 0.0) {
            return Err(IVError::invalid(format!(
                "min_vol must be positive, got {}",
                self.min_vol
            )));
        }
        if !(self.max_vol.is_finite() && self.max_vol > self.min_vol) {
            return Err(IVError::invalid(format!(
                "max_vol must be finite and above min_vol, got [{}, {}]",
                self.min_vol, self.max_vol
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(IVError::invalid(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Validates contract parameters and the observed price.
///
/// Time to expiry is only checked for NaN here: a non-positive value is a
/// legitimate "expired" answer, not an input error.
fn validate_params(params: &OptionParams, observed_price: f64) -> Result<(), IVError> {
    if !params.spot.is_finite() || params.spot <= 0.0 {
        return Err(IVError::invalid(format!(
            "spot price must be positive, got {}",
            params.spot
        )));
    }

    if !params.strike.is_finite() || params.strike <= 0.0 {
        return Err(IVError::invalid(format!(
            "strike price must be positive, got {}",
            params.strike
        )));
    }

    if params.time_to_expiry.is_nan() {
        return Err(IVError::invalid("time to expiry is NaN"));
    }

    if !params.risk_free_rate.is_finite() {
        return Err(IVError::invalid(format!(
            "risk-free rate must be finite, got {}",
            params.risk_free_rate
        )));
    }

    if !observed_price.is_finite() || observed_price < 0.0 {
        return Err(IVError::InvalidPrice {
            price: observed_price,
        });
    }

    Ok(())
}

/// Best point seen so far: volatility and signed price error at it.
#[derive(Clone, Copy)]
struct Candidate {
    vol: f64,
    error: f64,
}

impl Candidate {
    fn abs_error(&self) -> f64 {
        self.error.abs()
    }
}

/// Solves for implied volatility.
///
/// # Returns
/// - `Ok(IVSolution)` always once inputs are valid. Check
///   [`IVSolution::converged`]: exhausting the iteration cap, an unbracketed
///   price or a non-monotone price curve all return the best estimate with
///   `converged = false`. A non-positive time to expiry returns
///   [`IVSolution::expired`] immediately.
/// - `Err(IVError)` for invalid inputs.
///
/// # Example
/// ```
/// use ivsurface_rs::implied_volatility::{BlackScholes, OptionParams, SolverConfig, solve_iv};
///
/// let params = OptionParams::call(100.0, 100.0, 0.25, 0.05);
/// let price = BlackScholes::price(&params.with_volatility(0.3)).unwrap();
///
/// let solution = solve_iv(&params, price, &SolverConfig::default()).unwrap();
/// assert!(solution.converged);
/// assert!((solution.volatility - 0.3).abs() < 1e-4);
/// ```
pub fn solve_iv(
    params: &OptionParams,
    observed_price: f64,
    config: &SolverConfig,
) -> Result<IVSolution, IVError> {
    validate_params(params, observed_price)?;
    config.validate()?;

    if params.time_to_expiry <= 0.0 {
        trace!(
            "time to expiry {} <= 0, returning expired solution",
            params.time_to_expiry
        );
        return Ok(IVSolution::expired());
    }

    let price = |vol: f64| BlackScholes::price_at(params, vol);
    let tolerance = config.tolerance;

    let mut low = config.min_vol;
    let mut high = config.max_vol;
    let mut price_low = price(low);
    let mut price_high = price(high);
    let mut iterations: u32 = 2;

    let at_low = Candidate {
        vol: low,
        error: price_low - observed_price,
    };
    let at_high = Candidate {
        vol: high,
        error: price_high - observed_price,
    };
    let mut best = if at_low.abs_error() <= at_high.abs_error() {
        at_low
    } else {
        at_high
    };

    if price_low > price_high
        || observed_price < price_low - tolerance
        || observed_price > price_high + tolerance
    {
        debug!(
            "observed price {observed_price} outside bracket [{price_low}, {price_high}] for vol in [{low}, {high}]"
        );
        return Ok(IVSolution {
            volatility: best.vol,
            converged: false,
            iterations,
            price_error: best.abs_error(),
            outcome: SolveOutcome::Unbracketed,
        });
    }

    let mut monotonic = true;
    let mut bisection_steps = 0;
    while best.abs_error() >= tolerance && bisection_steps < config.max_iterations {
        let mid = 0.5 * (low + high);
        let price_mid = price(mid);
        iterations += 1;
        bisection_steps += 1;

        if price_mid < price_low || price_mid > price_high {
            monotonic = false;
        }

        let error = price_mid - observed_price;
        if error.abs() < best.abs_error() {
            best = Candidate { vol: mid, error };
        }
        if error.abs() < tolerance {
            break;
        }

        if error > 0.0 {
            high = mid;
            price_high = price_mid;
        } else {
            low = mid;
            price_low = price_mid;
        }
    }

    for _ in 0..config.newton_steps {
        if best.error == 0.0 {
            break;
        }
        let vega = BlackScholes::vega_at(
            params.spot,
            params.strike,
            params.risk_free_rate,
            params.time_to_expiry,
            best.vol,
        );
        if !(vega >= config.min_vega) {
            trace!("vega {vega} below floor, keeping bisection value {}", best.vol);
            break;
        }

        let next = best.vol - best.error / vega;
        if !(next > low && next < high) {
            break;
        }

        let error = price(next) - observed_price;
        iterations += 1;
        if error.abs() >= best.abs_error() {
            break;
        }
        best = Candidate { vol: next, error };
    }

    let converged = monotonic && best.abs_error() < tolerance;
    let outcome = if !monotonic {
        SolveOutcome::NonMonotonic
    } else if converged {
        SolveOutcome::Converged
    } else {
        SolveOutcome::MaxIterations
    };

    trace!(
        "solved iv {} ({:?}) in {} evaluations, price error {}",
        best.vol,
        outcome,
        iterations,
        best.abs_error()
    );

    Ok(IVSolution {
        volatility: best.vol,
        converged,
        iterations,
        price_error: best.abs_error(),
        outcome,
    })
}

/// Owned solver handle carrying its configuration.
#[derive(Debug, Clone, Default)]
pub struct ImpliedVolatilitySolver {
    config: SolverConfig,
}

impl ImpliedVolatilitySolver {
    /// Creates a solver with the given configuration.
    #[must_use]
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    /// Returns the solver configuration.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Solves for the volatility that reproduces `observed_price`.
    pub fn solve(&self, observed_price: f64, params: &OptionParams) -> Result<IVSolution, IVError> {
        solve_iv(params, observed_price, &self.config)
    }
}

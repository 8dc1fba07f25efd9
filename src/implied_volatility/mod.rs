//! Closed-form option pricing and implied volatility inversion.
//!
//! # Overview
//!
//! Implied volatility (IV) is the volatility input that makes the pricer
//! reproduce an observed market price. There is no analytical inverse, so
//! [`solve_iv`] brackets the answer with bisection on a finite interval
//! (`[1e-6, 10.0]` by default) and polishes it with guarded Newton-Raphson
//! steps that use vega as the derivative.
//!
//! Non-convergence is never an error: the solver always hands back its best
//! estimate and a `converged` flag. Errors are reserved for inputs that cannot
//! be priced at all.
//!
//! # Example
//!
//! ```
//! use ivsurface_rs::implied_volatility::{ImpliedVolatilitySolver, OptionParams, SolverConfig};
//!
//! let solver = ImpliedVolatilitySolver::new(SolverConfig::default());
//! let params = OptionParams::call(8400.0, 8000.0, 2.0 / 365.0, 0.07);
//!
//! let solution = solver.solve(492.31, &params).unwrap();
//! assert!(solution.converged);
//! println!("IV: {:.2}%", solution.volatility_percent());
//! ```

mod black_scholes;
mod error;
mod solver;
mod types;

pub use black_scholes::BlackScholes;
pub use error::IVError;
pub use solver::{ImpliedVolatilitySolver, SolverConfig, solve_iv};
pub use types::{
    IVSolution, OptionParams, OptionSide, PricingConvention, PricingRequest, SolveOutcome,
};

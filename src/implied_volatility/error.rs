//! Error types for pricing and implied volatility calculation.

use std::fmt;

/// Errors raised before any pricing work is attempted.
///
/// Non-convergence is not an error: the solver reports it through
/// [`IVSolution::converged`](super::IVSolution::converged).
#[derive(Debug, Clone, PartialEq)]
pub enum IVError {
    /// Invalid input parameters (non-positive spot, strike, volatility, ...).
    InvalidParams {
        /// Description of the invalid parameter.
        message: String,
    },

    /// Observed option price is negative or not a finite number.
    InvalidPrice {
        /// Price supplied by the caller.
        price: f64,
    },
}

impl IVError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        IVError::InvalidParams {
            message: message.into(),
        }
    }
}

impl fmt::Display for IVError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IVError::InvalidParams { message } => {
                write!(f, "invalid parameters: {message}")
            }
            IVError::InvalidPrice { price } => {
                write!(f, "observed price {price} must be finite and non-negative")
            }
        }
    }
}

impl std::error::Error for IVError {}

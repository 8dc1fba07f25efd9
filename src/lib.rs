//! # ivsurface-rs
//!
//! Implied volatility solving and a concurrent volatility surface cache.
//!
//! The crate is built in layers, leaves first:
//!
//! - [`implied_volatility`]: closed-form pricer, vega, and a bracketed
//!   bisection plus Newton solver that always returns its best estimate
//!   together with a convergence flag.
//! - [`surface`]: a thread-safe store keyed by `symbol -> expiry -> strike`
//!   that solves on a cache miss, re-solves on every trade print, emits
//!   update events and persists checksum-protected snapshots.
//! - [`reconcile`]: compares stored values with an external reference feed
//!   and lets the reference win when the relative deviation exceeds a
//!   threshold (2% by default).
//! - [`VolatilityService`]: async entry points with bounded concurrency.
//!
//! ## Example
//!
//! ```
//! use ivsurface_rs::prelude::*;
//!
//! let store = VolatilitySurfaceStore::new(StoreConfig::default(), SolverConfig::default());
//! let expiry = (chrono::Utc::now() + chrono::Duration::days(30)).date_naive();
//!
//! let query = VolatilityQuery::new("BTC", expiry.to_string(), 60_000.0, 58_000.0, OptionSide::Call)
//!     .with_observed_price(2_500.0);
//! let quote = store.get(&query).unwrap();
//! assert_eq!(quote.status, QuoteStatus::Converged);
//!
//! // Served from the cache the second time, without a price.
//! let again = store.get(&VolatilityQuery { observed_price: None, ..query }).unwrap();
//! assert_eq!(again.volatility, quote.volatility);
//! ```
//!
//! ## Status semantics
//!
//! | Status | Meaning |
//! |--------|---------|
//! | `Converged` | solver met its tolerance |
//! | `LowConfidence` | best estimate from a solve that did not converge |
//! | `Expired` | no time left to expiry, volatility 0, nothing stored |
//! | `NoData` | cache miss and no observed price to solve from |
//! | `Reconciled` | reference feed value replaced the local one |

pub mod config;
pub mod error;
pub mod implied_volatility;
pub mod reconcile;
mod service;
pub mod surface;
mod utils;

pub use config::{ConfigError, ServiceConfig};
pub use error::SurfaceError;
pub use service::VolatilityService;
pub use utils::current_time_millis;

/// Commonly used types.
pub mod prelude {
    pub use crate::config::ServiceConfig;
    pub use crate::error::SurfaceError;
    pub use crate::implied_volatility::{
        BlackScholes, IVSolution, ImpliedVolatilitySolver, OptionParams, OptionSide,
        PricingConvention, SolverConfig,
    };
    pub use crate::reconcile::{
        HttpReferenceFeed, Reconciliation, ReconciliationOutcome, ReconcilerConfig,
        ReferenceFeed, ReferenceReconciler, StaticReferenceFeed,
    };
    pub use crate::service::VolatilityService;
    pub use crate::surface::{
        QuoteStatus, SurfaceQuote, TradeUpdate, VolatilityQuery, VolatilitySurfaceStore,
        StoreConfig,
    };
}

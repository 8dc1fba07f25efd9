//! Cross-checks local volatilities against a reference feed.

use super::feed::ReferenceFeed;
use crate::error::SurfaceError;
use crate::surface::{UpdateSource, VolatilityPoint, VolatilitySurfaceStore};
use crate::utils::current_time_millis;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, trace, warn};

/// Reconciliation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Relative deviation above which the reference replaces the local value.
    pub deviation_threshold: f64,
    /// Upper bound on one reference fetch.
    pub timeout_ms: u64,
    /// Write the reference value back into the store on deviation.
    pub write_back: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            deviation_threshold: 0.02,
            timeout_ms: 2_000,
            write_back: true,
        }
    }
}

impl ReconcilerConfig {
    /// Sets the relative deviation threshold.
    #[must_use]
    pub fn with_deviation_threshold(mut self, threshold: f64) -> Self {
        self.deviation_threshold = threshold;
        self
    }

    /// Sets the fetch timeout.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Enables or disables store write-back.
    #[must_use]
    pub fn with_write_back(mut self, write_back: bool) -> Self {
        self.write_back = write_back;
        self
    }

    /// Checks the configuration is usable.
    pub fn validate(&self) -> Result<(), SurfaceError> {
        if !self.deviation_threshold.is_finite() || self.deviation_threshold < 0.0 {
            return Err(SurfaceError::invalid_input(
                "deviation_threshold must be finite and non-negative",
            ));
        }
        if self.timeout_ms == 0 {
            return Err(SurfaceError::invalid_input("timeout_ms must be positive"));
        }
        Ok(())
    }
}

/// Result of comparing a local value with the reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconciliationOutcome {
    /// Within threshold; local value kept.
    Agreed,
    /// Beyond threshold; reference value returned.
    DeviationDetected {
        /// `|reference - local| / reference`.
        deviation: f64,
    },
    /// Reference unusable; local value kept.
    Skipped {
        /// Why the reference could not be used.
        reason: String,
    },
}

/// Volatility to serve after a reference check, with the evidence behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    /// Instrument checked.
    pub symbol: String,
    /// Value to serve.
    pub volatility: f64,
    /// Value held locally before the check.
    pub local: f64,
    /// Reference value, when one was obtained.
    pub reference: Option<f64>,
    /// Threshold in force.
    pub threshold: f64,
    /// Comparison result.
    pub outcome: ReconciliationOutcome,
}

impl Reconciliation {
    /// True when the reference overrode the local value.
    #[must_use]
    pub fn is_deviation(&self) -> bool {
        matches!(self.outcome, ReconciliationOutcome::DeviationDetected { .. })
    }

    /// Splits into the value to serve and an advisory error, if any.
    pub fn into_parts(self) -> (f64, Option<SurfaceError>) {
        let advisory = match self.outcome {
            ReconciliationOutcome::Agreed => None,
            ReconciliationOutcome::DeviationDetected { deviation } => {
                Some(SurfaceError::DeviationDetected {
                    local: self.local,
                    reference: self.reference.unwrap_or(self.volatility),
                    deviation,
                    threshold: self.threshold,
                })
            }
            ReconciliationOutcome::Skipped { reason } => Some(SurfaceError::ReferenceUnavailable {
                symbol: self.symbol,
                reason,
            }),
        };
        (self.volatility, advisory)
    }
}

/// Compares local volatilities with a [`ReferenceFeed`].
pub struct ReferenceReconciler<F> {
    feed: F,
    config: ReconcilerConfig,
}

impl<F: ReferenceFeed> ReferenceReconciler<F> {
    /// Create a reconciler over `feed`.
    pub fn new(feed: F, config: ReconcilerConfig) -> Self {
        Self { feed, config }
    }

    /// Reconciler settings.
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Underlying feed.
    pub fn feed(&self) -> &F {
        &self.feed
    }

    /// Fetches the reference for `symbol` within the configured timeout and
    /// compares it with `local`. Never fails: an unusable reference yields
    /// the local value with outcome [`ReconciliationOutcome::Skipped`].
    pub async fn reconcile(
        &self,
        symbol: &str,
        expiry: NaiveDate,
        strike: f64,
        local: f64,
    ) -> Reconciliation {
        trace!("reconciling {} {} {} local {}", symbol, expiry, strike, local);
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let fetched = match tokio::time::timeout(timeout, self.feed.latest_volatility(symbol)).await
        {
            Ok(result) => result,
            Err(_) => Err(SurfaceError::ReferenceUnavailable {
                symbol: symbol.to_string(),
                reason: format!("timed out after {}ms", self.config.timeout_ms),
            }),
        };

        match fetched {
            Ok(reference) => self.compare(symbol, local, reference),
            Err(error) => {
                warn!("Reference check skipped for {}: {}", symbol, error);
                self.skipped(symbol, local, None, error.to_string())
            }
        }
    }

    /// Applies the threshold rule to an already fetched reference.
    pub fn compare(&self, symbol: &str, local: f64, reference: f64) -> Reconciliation {
        if !reference.is_finite() || reference <= 0.0 {
            warn!(
                "Reference check skipped for {}: non-positive reference {}",
                symbol, reference
            );
            return self.skipped(
                symbol,
                local,
                Some(reference),
                format!("non-positive reference {reference}"),
            );
        }

        let deviation = (reference - local).abs() / reference;
        let threshold = self.config.deviation_threshold;
        if deviation > threshold {
            info!(
                "{}: local volatility {:.4} deviates {:.2}% from reference {:.4}, using reference",
                symbol,
                local,
                deviation * 100.0,
                reference
            );
            Reconciliation {
                symbol: symbol.to_string(),
                volatility: reference,
                local,
                reference: Some(reference),
                threshold,
                outcome: ReconciliationOutcome::DeviationDetected { deviation },
            }
        } else {
            trace!("{}: deviation {} within {}", symbol, deviation, threshold);
            Reconciliation {
                symbol: symbol.to_string(),
                volatility: local,
                local,
                reference: Some(reference),
                threshold,
                outcome: ReconciliationOutcome::Agreed,
            }
        }
    }

    /// Reconciles the stored value at an exact key.
    ///
    /// The local value is read under the store's shard lock, the fetch runs
    /// with no lock held, and on deviation the reference is written back when
    /// `write_back` is enabled. Returns `None` when nothing is stored.
    pub async fn reconcile_store(
        &self,
        store: &VolatilitySurfaceStore,
        symbol: &str,
        expiry: NaiveDate,
        strike: f64,
    ) -> Option<Reconciliation> {
        let point = store.lookup(symbol, expiry, strike)?;
        let reconciliation = self.reconcile(symbol, expiry, strike, point.volatility).await;

        if reconciliation.is_deviation() && self.config.write_back {
            let replaced = VolatilityPoint {
                volatility: reconciliation.volatility,
                observed_at: current_time_millis(),
                converged: true,
                reconciled: true,
                ..point
            };
            if let Err(error) = store.upsert(replaced, UpdateSource::Reconciled) {
                warn!("Reference write-back failed for {}: {}", symbol, error);
            }
        }

        Some(reconciliation)
    }

    fn skipped(
        &self,
        symbol: &str,
        local: f64,
        reference: Option<f64>,
        reason: String,
    ) -> Reconciliation {
        Reconciliation {
            symbol: symbol.to_string(),
            volatility: local,
            local,
            reference,
            threshold: self.config.deviation_threshold,
            outcome: ReconciliationOutcome::Skipped { reason },
        }
    }
}

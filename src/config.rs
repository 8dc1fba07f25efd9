//! Service configuration loaded from JSON.
//!
//! Every section falls back to its defaults, so `{}` is a valid file:
//!
//! ```json
//! {
//!   "solver": { "tolerance": 1e-6, "max_iterations": 100 },
//!   "store": { "risk_free_rate": 0.05 },
//!   "reconciler": { "deviation_threshold": 0.02, "timeout_ms": 2000 },
//!   "reference": { "base_url": "https://www.deribit.com/api/v2/public/get_historical_volatility" },
//!   "max_in_flight": 64,
//!   "snapshot_path": "surface.json"
//! }
//! ```

use crate::implied_volatility::SolverConfig;
use crate::reconcile::{ReconcilerConfig, ReferenceFeedConfig};
use crate::surface::StoreConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Errors raised while loading or validating configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// File could not be read.
    Io {
        /// Path that failed.
        path: String,
        /// OS error message.
        message: String,
    },
    /// JSON was malformed or had wrong types.
    Parse {
        /// Deserializer message.
        message: String,
    },
    /// A value is outside its allowed range.
    Invalid {
        /// Section holding the bad value.
        section: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, message } => {
                write!(f, "cannot read config {path}: {message}")
            }
            ConfigError::Parse { message } => write!(f, "invalid config json: {message}"),
            ConfigError::Invalid { section, message } => {
                write!(f, "invalid {section} config: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Top-level configuration of a [`VolatilityService`](crate::VolatilityService).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Implied volatility solver settings.
    pub solver: SolverConfig,
    /// Surface store settings.
    pub store: StoreConfig,
    /// Reference reconciliation settings.
    pub reconciler: ReconcilerConfig,
    /// Reference feed connection.
    pub reference: ReferenceFeedConfig,
    /// Requests processed concurrently before callers queue.
    pub max_in_flight: usize,
    /// Snapshot file to restore at startup and keep updated.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            solver: SolverConfig::default(),
            store: StoreConfig::default(),
            reconciler: ReconcilerConfig::default(),
            reference: ReferenceFeedConfig::default(),
            max_in_flight: 64,
            snapshot_path: None,
        }
    }
}

impl ServiceConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(data: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(data).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json_str(&data)
    }

    /// Sets the concurrency bound.
    #[must_use]
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    /// Sets the snapshot file.
    #[must_use]
    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    /// Checks every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.solver.validate().map_err(|e| ConfigError::Invalid {
            section: "solver",
            message: e.to_string(),
        })?;
        self.store.validate().map_err(|e| ConfigError::Invalid {
            section: "store",
            message: e.to_string(),
        })?;
        self.reconciler.validate().map_err(|e| ConfigError::Invalid {
            section: "reconciler",
            message: e.to_string(),
        })?;
        if self.reference.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                section: "reference",
                message: "base_url must not be empty".to_string(),
            });
        }
        if !self.reference.value_scale.is_finite() || self.reference.value_scale <= 0.0 {
            return Err(ConfigError::Invalid {
                section: "reference",
                message: "value_scale must be positive".to_string(),
            });
        }
        if self.max_in_flight == 0 {
            return Err(ConfigError::Invalid {
                section: "service",
                message: "max_in_flight must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

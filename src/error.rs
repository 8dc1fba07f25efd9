//! Error types for the volatility surface.

use crate::implied_volatility::IVError;
use std::fmt;

/// Errors surfaced by the store, the reconciler and snapshot handling.
///
/// `ReferenceUnavailable` and `DeviationDetected` are advisory: the
/// reconciler reports them next to a usable volatility instead of failing
/// the request.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceError {
    /// Non-positive spot/strike, unparseable expiry, bad side, bad price.
    InvalidInput {
        /// Description of the rejected input.
        message: String,
    },

    /// Solver stopped without meeting its tolerance; the value is a best
    /// estimate. Carried as a quote status, never returned as `Err`.
    NonConvergence {
        /// Instrument of the quote.
        symbol: String,
        /// Best-estimate volatility served.
        volatility: f64,
    },

    /// External reference fetch failed or timed out.
    ReferenceUnavailable {
        /// Instrument the reference was requested for.
        symbol: String,
        /// Transport, decoding or timeout detail.
        reason: String,
    },

    /// Local and reference volatility disagree by more than the threshold.
    DeviationDetected {
        /// Volatility held by the store.
        local: f64,
        /// Volatility reported by the reference feed.
        reference: f64,
        /// `|reference - local| / reference`.
        deviation: f64,
        /// Relative threshold that was exceeded.
        threshold: f64,
    },

    /// Serializing a snapshot failed.
    SerializationError {
        /// Serializer message.
        message: String,
    },

    /// Deserializing a snapshot or configuration failed.
    DeserializationError {
        /// Deserializer message.
        message: String,
    },

    /// Snapshot checksum did not match its payload.
    ChecksumMismatch {
        /// Checksum stored in the package.
        expected: String,
        /// Checksum computed from the payload.
        actual: String,
    },

    /// Snapshot written by an incompatible format version.
    UnsupportedSnapshotVersion {
        /// Version found in the package.
        found: u32,
        /// Version this build reads.
        expected: u32,
    },

    /// Filesystem failure while reading or writing a snapshot.
    Io {
        /// OS error message.
        message: String,
    },
}

impl SurfaceError {
    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        SurfaceError::InvalidInput {
            message: message.into(),
        }
    }

    /// Returns true for conditions reported alongside a usable value.
    #[must_use]
    pub fn is_advisory(&self) -> bool {
        matches!(
            self,
            SurfaceError::NonConvergence { .. }
                | SurfaceError::ReferenceUnavailable { .. }
                | SurfaceError::DeviationDetected { .. }
        )
    }
}

impl fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceError::InvalidInput { message } => write!(f, "invalid input: {message}"),
            SurfaceError::NonConvergence { symbol, volatility } => {
                write!(f, "{symbol}: solver did not converge, best estimate {volatility:.4}")
            }
            SurfaceError::ReferenceUnavailable { symbol, reason } => {
                write!(f, "reference volatility unavailable for {symbol}: {reason}")
            }
            SurfaceError::DeviationDetected {
                local,
                reference,
                deviation,
                threshold,
            } => write!(
                f,
                "local volatility {local:.4} deviates {:.2}% from reference {reference:.4} (threshold {:.2}%)",
                deviation * 100.0,
                threshold * 100.0
            ),
            SurfaceError::SerializationError { message } => {
                write!(f, "serialization error: {message}")
            }
            SurfaceError::DeserializationError { message } => {
                write!(f, "deserialization error: {message}")
            }
            SurfaceError::ChecksumMismatch { expected, actual } => {
                write!(f, "checksum mismatch: expected {expected}, got {actual}")
            }
            SurfaceError::UnsupportedSnapshotVersion { found, expected } => {
                write!(
                    f,
                    "unsupported snapshot version {found} (expected {expected})"
                )
            }
            SurfaceError::Io { message } => write!(f, "io error: {message}"),
        }
    }
}

impl std::error::Error for SurfaceError {}

impl From<IVError> for SurfaceError {
    fn from(error: IVError) -> Self {
        SurfaceError::InvalidInput {
            message: error.to_string(),
        }
    }
}

impl From<std::io::Error> for SurfaceError {
    fn from(error: std::io::Error) -> Self {
        SurfaceError::Io {
            message: error.to_string(),
        }
    }
}

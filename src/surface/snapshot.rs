//! Surface snapshot for persistence and warm restarts

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use tracing::trace;

use super::point::VolatilityPoint;
use crate::error::SurfaceError;

/// A copy of every surface entry at a specific point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurfaceSnapshot {
    /// Timestamp when the snapshot was created (milliseconds since epoch)
    pub timestamp: u64,

    /// Points ordered by symbol, expiry and strike
    pub points: Vec<VolatilityPoint>,
}

impl SurfaceSnapshot {
    /// Distinct symbols present in the snapshot
    pub fn symbols(&self) -> BTreeSet<&str> {
        self.points.iter().map(|point| point.symbol.as_str()).collect()
    }

    /// Points belonging to one symbol
    pub fn points_for<'a>(&'a self, symbol: &'a str) -> impl Iterator<Item = &'a VolatilityPoint> {
        self.points.iter().filter(move |point| point.symbol == symbol)
    }

    /// Sorts points into surface order so equal surfaces checksum equally.
    pub fn normalize(&mut self) {
        self.points.sort_by(|a, b| {
            a.symbol
                .cmp(&b.symbol)
                .then(a.expiry.cmp(&b.expiry))
                .then(a.strike.total_cmp(&b.strike))
        });
        trace!("normalized snapshot with {} points", self.points.len());
    }
}

/// Format version used for checksum-enabled surface snapshots.
pub const SURFACE_SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Wrapper that provides checksum validation for `SurfaceSnapshot` instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceSnapshotPackage {
    /// Version of the snapshot schema for forward compatibility.
    pub version: u32,
    /// Snapshot payload.
    pub snapshot: SurfaceSnapshot,
    /// Hex-encoded SHA-256 of the serialized snapshot.
    pub checksum: String,
}

impl SurfaceSnapshotPackage {
    /// Creates a new snapshot package computing the checksum of the snapshot contents.
    pub fn new(mut snapshot: SurfaceSnapshot) -> Result<Self, SurfaceError> {
        snapshot.normalize();

        let checksum = Self::compute_checksum(&snapshot)?;

        Ok(Self {
            version: SURFACE_SNAPSHOT_FORMAT_VERSION,
            snapshot,
            checksum,
        })
    }

    /// Serializes the package to JSON.
    pub fn to_json(&self) -> Result<String, SurfaceError> {
        serde_json::to_string(self).map_err(|error| SurfaceError::SerializationError {
            message: error.to_string(),
        })
    }

    /// Deserializes the package from JSON.
    pub fn from_json(data: &str) -> Result<Self, SurfaceError> {
        serde_json::from_str(data).map_err(|error| SurfaceError::DeserializationError {
            message: error.to_string(),
        })
    }

    /// Validates the checksum and version.
    pub fn validate(&self) -> Result<(), SurfaceError> {
        if self.version != SURFACE_SNAPSHOT_FORMAT_VERSION {
            return Err(SurfaceError::UnsupportedSnapshotVersion {
                found: self.version,
                expected: SURFACE_SNAPSHOT_FORMAT_VERSION,
            });
        }

        let computed = Self::compute_checksum(&self.snapshot)?;
        if computed != self.checksum {
            return Err(SurfaceError::ChecksumMismatch {
                expected: self.checksum.clone(),
                actual: computed,
            });
        }

        Ok(())
    }

    /// Consumes the package and returns the validated snapshot.
    pub fn into_snapshot(self) -> Result<SurfaceSnapshot, SurfaceError> {
        self.validate()?;
        Ok(self.snapshot)
    }

    fn compute_checksum(snapshot: &SurfaceSnapshot) -> Result<String, SurfaceError> {
        let payload =
            serde_json::to_vec(snapshot).map_err(|error| SurfaceError::SerializationError {
                message: error.to_string(),
            })?;

        let mut hasher = Sha256::new();
        hasher.update(payload);

        let checksum_bytes = hasher.finalize();
        Ok(format!("{:x}", checksum_bytes))
    }
}

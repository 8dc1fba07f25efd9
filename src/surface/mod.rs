//! Volatility surface cache keyed by `symbol -> expiry -> strike`.

pub mod persistence;
pub mod point;
pub mod snapshot;
pub mod store;

pub use persistence::{SnapshotFile, SnapshotWriter};
pub use point::{
    QuoteStatus, StrikeKey, SurfaceQuote, SurfaceUpdateEvent, TradeUpdate, UpdateSource,
    VolatilityPoint, VolatilityQuery, parse_expiry,
};
pub use snapshot::{SURFACE_SNAPSHOT_FORMAT_VERSION, SurfaceSnapshot, SurfaceSnapshotPackage};
pub use store::{StoreConfig, UpdateListener, VolatilitySurfaceStore};

//! Reference volatility feed and reconciliation against the local surface.

pub mod feed;
pub mod reconciler;

pub use feed::{
    HttpReferenceFeed, ReferenceFeed, ReferenceFeedConfig, StaticReferenceFeed,
    parse_historical_volatility,
};
pub use reconciler::{
    Reconciliation, ReconciliationOutcome, ReconcilerConfig, ReferenceReconciler,
};

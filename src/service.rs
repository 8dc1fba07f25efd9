//! Request-facing entry points tying the store to the reconciler.

use crate::config::ServiceConfig;
use crate::error::SurfaceError;
use crate::reconcile::{ReferenceFeed, ReferenceReconciler};
use crate::surface::{
    QuoteStatus, SnapshotFile, SnapshotWriter, SurfaceQuote, TradeUpdate, VolatilityQuery,
    VolatilitySurfaceStore,
};
use crate::utils::current_time_millis;
use std::sync::Arc;
use std::thread;
use tokio::sync::Semaphore;
use tracing::{info, trace};

/// Shared handle serving volatility queries and trade updates.
///
/// Cheap to share behind an `Arc`; at most `max_in_flight` requests run at
/// once and the rest wait for a permit.
pub struct VolatilityService<F> {
    store: Arc<VolatilitySurfaceStore>,
    reconciler: Option<ReferenceReconciler<F>>,
    permits: Semaphore,
    max_in_flight: usize,
}

impl<F: ReferenceFeed> VolatilityService<F> {
    /// Wraps an existing store.
    pub fn new(
        store: Arc<VolatilitySurfaceStore>,
        reconciler: Option<ReferenceReconciler<F>>,
        max_in_flight: usize,
    ) -> Self {
        let max_in_flight = max_in_flight.max(1);
        Self {
            store,
            reconciler,
            permits: Semaphore::new(max_in_flight),
            max_in_flight,
        }
    }

    /// Builds a service from configuration.
    ///
    /// With a `snapshot_path` the surface is restored from that file and a
    /// writer thread keeps it updated; its handle is returned so callers can
    /// join it after dropping the service.
    pub fn from_config(
        config: &ServiceConfig,
        feed: Option<F>,
    ) -> Result<(Self, Option<thread::JoinHandle<()>>), SurfaceError> {
        let reconciler = feed.map(|feed| ReferenceReconciler::new(feed, config.reconciler.clone()));

        let Some(path) = &config.snapshot_path else {
            let store = VolatilitySurfaceStore::new(config.store.clone(), config.solver.clone());
            return Ok((
                Self::new(Arc::new(store), reconciler, config.max_in_flight),
                None,
            ));
        };

        let file = SnapshotFile::new(path);
        let mut writer = SnapshotWriter::new();
        let store = VolatilitySurfaceStore::with_update_listener(
            config.store.clone(),
            config.solver.clone(),
            writer.listener(),
        );
        let restored = file.restore_into(&store)?;
        let handle = writer.start(file, store.create_snapshot().points)?;
        info!(
            "Volatility service started with {} restored points, snapshot at {}",
            restored,
            path.display()
        );

        Ok((
            Self::new(Arc::new(store), reconciler, config.max_in_flight),
            Some(handle),
        ))
    }

    /// The underlying surface.
    pub fn store(&self) -> &Arc<VolatilitySurfaceStore> {
        &self.store
    }

    /// Reconciler, when a reference feed is configured.
    pub fn reconciler(&self) -> Option<&ReferenceReconciler<F>> {
        self.reconciler.as_ref()
    }

    /// Configured concurrency bound.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Permits currently free.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Serves a volatility query, reconciling any stored value against the
    /// reference feed before returning it.
    pub async fn query(&self, query: &VolatilityQuery) -> Result<SurfaceQuote, SurfaceError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| SurfaceError::invalid_input("volatility service is shut down"))?;

        let mut quote = self.store.get(query)?;
        if !quote.status.has_value() {
            return Ok(quote);
        }

        if let Some(reconciler) = &self.reconciler
            && let Some(reconciliation) = reconciler
                .reconcile_store(&self.store, &quote.symbol, quote.expiry, quote.strike)
                .await
        {
            if reconciliation.is_deviation() {
                quote.volatility = reconciliation.volatility;
                quote.status = QuoteStatus::Reconciled;
                quote.timestamp = current_time_millis();
            }
            quote.reconciliation = Some(reconciliation);
        }

        trace!(
            "served {} {} {}: {} ({})",
            quote.symbol, quote.expiry, quote.strike, quote.volatility, quote.status
        );
        Ok(quote)
    }

    /// Applies a trade print to the surface.
    ///
    /// Privileged: this overwrites stored values unconditionally, so the
    /// transport layer must authenticate callers before reaching it.
    pub async fn record_trade(&self, trade: &TradeUpdate) -> Result<SurfaceQuote, SurfaceError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| SurfaceError::invalid_input("volatility service is shut down"))?;

        let quote = self.store.update(trade)?;
        info!(
            "Trade update {} {} {} at {}: volatility {} ({})",
            trade.symbol,
            quote.expiry,
            trade.strike,
            trade.last_trade_price,
            quote.volatility,
            quote.status
        );
        Ok(quote)
    }
}

//! Concurrent volatility surface keyed by symbol, expiry and strike.

use super::point::{
    QuoteStatus, StrikeKey, SurfaceQuote, SurfaceUpdateEvent, TradeUpdate, UpdateSource,
    VolatilityPoint, VolatilityQuery, parse_expiry,
};
use super::snapshot::{SurfaceSnapshot, SurfaceSnapshotPackage};
use crate::error::SurfaceError;
use crate::implied_volatility::{
    ImpliedVolatilitySolver, OptionParams, OptionSide, PricingConvention, SolverConfig,
};
use crate::utils::{current_time_millis, year_fraction};
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Callback invoked after every stored mutation.
pub type UpdateListener = Arc<dyn Fn(&SurfaceUpdateEvent) + Send + Sync>;

type ExpiryMap = BTreeMap<NaiveDate, BTreeMap<StrikeKey, VolatilityPoint>>;

/// Market assumptions the store applies when it solves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Annualized risk-free rate used for every solve.
    pub risk_free_rate: f64,
    /// Days per year when converting time to expiry.
    pub day_count: f64,
    /// UTC hour on the expiry date at which contracts stop trading.
    pub expiry_hour_utc: u32,
    /// Discounting convention handed to the pricer.
    pub convention: PricingConvention,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.05,
            day_count: 365.0,
            expiry_hour_utc: 0,
            convention: PricingConvention::default(),
        }
    }
}

impl StoreConfig {
    /// Sets the risk-free rate.
    #[must_use]
    pub fn with_risk_free_rate(mut self, rate: f64) -> Self {
        self.risk_free_rate = rate;
        self
    }

    /// Sets the day-count basis.
    #[must_use]
    pub fn with_day_count(mut self, day_count: f64) -> Self {
        self.day_count = day_count;
        self
    }

    /// Sets the UTC expiry hour.
    #[must_use]
    pub fn with_expiry_hour_utc(mut self, hour: u32) -> Self {
        self.expiry_hour_utc = hour;
        self
    }

    /// Sets the pricing convention.
    #[must_use]
    pub fn with_convention(mut self, convention: PricingConvention) -> Self {
        self.convention = convention;
        self
    }

    /// Checks the configuration is usable.
    pub fn validate(&self) -> Result<(), SurfaceError> {
        if !self.risk_free_rate.is_finite() {
            return Err(SurfaceError::invalid_input("risk_free_rate must be finite"));
        }
        if !self.day_count.is_finite() || self.day_count <= 0.0 {
            return Err(SurfaceError::invalid_input("day_count must be positive"));
        }
        if self.expiry_hour_utc > 23 {
            return Err(SurfaceError::invalid_input(
                "expiry_hour_utc must be between 0 and 23",
            ));
        }
        Ok(())
    }
}

struct Contract {
    expiry: NaiveDate,
    key: StrikeKey,
    time_to_expiry: f64,
}

/// Process-wide cache of implied volatilities.
///
/// Reads and writes lock only the shard holding the symbol, and never while
/// the solver runs. Concurrent writes to the same key are last-writer-wins.
pub struct VolatilitySurfaceStore {
    surface: DashMap<String, ExpiryMap>,
    solver: ImpliedVolatilitySolver,
    config: StoreConfig,
    update_listener: Option<UpdateListener>,
}

impl VolatilitySurfaceStore {
    /// Create an empty store
    pub fn new(config: StoreConfig, solver: SolverConfig) -> Self {
        Self {
            surface: DashMap::new(),
            solver: ImpliedVolatilitySolver::new(solver),
            config,
            update_listener: None,
        }
    }

    /// Create an empty store that reports every mutation to `listener`
    pub fn with_update_listener(
        config: StoreConfig,
        solver: SolverConfig,
        listener: UpdateListener,
    ) -> Self {
        Self {
            update_listener: Some(listener),
            ..Self::new(config, solver)
        }
    }

    /// Set the update listener
    pub fn set_update_listener(&mut self, listener: UpdateListener) {
        self.update_listener = Some(listener);
    }

    /// Remove the update listener
    pub fn remove_update_listener(&mut self) {
        self.update_listener = None;
    }

    /// Store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Solver used on cache misses and trades.
    pub fn solver(&self) -> &ImpliedVolatilitySolver {
        &self.solver
    }

    /// Time to expiry in years as seen at `now`.
    pub fn time_to_expiry(&self, expiry: NaiveDate, now: DateTime<Utc>) -> f64 {
        year_fraction(
            expiry,
            self.config.expiry_hour_utc,
            self.config.day_count,
            now,
        )
    }

    /// Returns the cached volatility, solving from the query's observed price
    /// on a miss.
    ///
    /// # Errors
    /// [`SurfaceError::InvalidInput`] for an unparseable expiry, a bad strike
    /// or spot, or a negative observed price. Expired contracts and misses
    /// without a price are reported through [`QuoteStatus`], not as errors.
    pub fn get(&self, query: &VolatilityQuery) -> Result<SurfaceQuote, SurfaceError> {
        self.get_at(query, Utc::now())
    }

    /// [`get`](Self::get) evaluated at a fixed instant.
    pub fn get_at(
        &self,
        query: &VolatilityQuery,
        now: DateTime<Utc>,
    ) -> Result<SurfaceQuote, SurfaceError> {
        let contract =
            self.resolve(&query.symbol, &query.expiry, query.strike, query.spot, now)?;
        let timestamp = millis(now);

        if contract.time_to_expiry <= 0.0 {
            trace!(
                "surface {} {} {}: expired",
                query.symbol, contract.expiry, query.strike
            );
            return Ok(SurfaceQuote::empty(
                &query.symbol,
                contract.expiry,
                query.strike,
                QuoteStatus::Expired,
                timestamp,
            ));
        }

        if let Some(point) = self.lookup_key(&query.symbol, contract.expiry, contract.key) {
            trace!(
                "surface {} {} {}: hit {}",
                query.symbol, contract.expiry, query.strike, point.volatility
            );
            return Ok(SurfaceQuote::from_point(&point));
        }

        let Some(observed_price) = query.observed_price else {
            debug!(
                "surface {} {} {}: miss without observed price",
                query.symbol, contract.expiry, query.strike
            );
            return Ok(SurfaceQuote::empty(
                &query.symbol,
                contract.expiry,
                query.strike,
                QuoteStatus::NoData,
                timestamp,
            ));
        };

        let point = self.solve_point(
            &query.symbol,
            &contract,
            query.spot,
            query.side,
            observed_price,
            timestamp,
        )?;
        self.store_point(contract.key, point.clone(), UpdateSource::Solved);
        Ok(SurfaceQuote::from_point(&point))
    }

    /// Re-solves from a trade print and overwrites the stored value.
    pub fn update(&self, trade: &TradeUpdate) -> Result<SurfaceQuote, SurfaceError> {
        self.update_at(trade, Utc::now())
    }

    /// [`update`](Self::update) evaluated at a fixed instant.
    pub fn update_at(
        &self,
        trade: &TradeUpdate,
        now: DateTime<Utc>,
    ) -> Result<SurfaceQuote, SurfaceError> {
        let contract =
            self.resolve(&trade.symbol, &trade.expiry, trade.strike, trade.spot, now)?;
        let timestamp = millis(now);

        if contract.time_to_expiry <= 0.0 {
            debug!(
                "trade on expired contract {} {} {} ignored",
                trade.symbol, contract.expiry, trade.strike
            );
            return Ok(SurfaceQuote::empty(
                &trade.symbol,
                contract.expiry,
                trade.strike,
                QuoteStatus::Expired,
                timestamp,
            ));
        }

        let point = self.solve_point(
            &trade.symbol,
            &contract,
            trade.spot,
            trade.side,
            trade.last_trade_price,
            timestamp,
        )?;
        self.store_point(contract.key, point.clone(), UpdateSource::Trade);
        Ok(SurfaceQuote::from_point(&point))
    }

    /// Stored point at an exact key, without solving.
    pub fn lookup(&self, symbol: &str, expiry: NaiveDate, strike: f64) -> Option<VolatilityPoint> {
        let key = StrikeKey::new(strike).ok()?;
        self.lookup_key(symbol, expiry, key)
    }

    /// Writes a point directly, replacing any existing value at its key.
    ///
    /// # Errors
    /// Rejects empty symbols, invalid strikes, negative or non-finite
    /// volatility, and points whose expiry has already passed.
    pub fn upsert(&self, point: VolatilityPoint, source: UpdateSource) -> Result<(), SurfaceError> {
        let key = self.check_point(&point, Utc::now())?;
        self.store_point(key, point, source);
        Ok(())
    }

    /// Number of stored points across all symbols.
    pub fn len(&self) -> usize {
        self.surface
            .iter()
            .map(|entry| entry.value().values().map(BTreeMap::len).sum::<usize>())
            .sum()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Symbols with at least one stored point, sorted.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.surface.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        symbols
    }

    /// Points for one symbol ordered by expiry, then strike.
    pub fn points(&self, symbol: &str) -> Vec<VolatilityPoint> {
        self.surface
            .get(symbol)
            .map(|expiries| {
                expiries
                    .values()
                    .flat_map(|strikes| strikes.values().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Create a snapshot of every stored point
    pub fn create_snapshot(&self) -> SurfaceSnapshot {
        let mut points = Vec::with_capacity(self.len());
        for symbol in self.symbols() {
            points.extend(self.points(&symbol));
        }
        SurfaceSnapshot {
            timestamp: current_time_millis(),
            points,
        }
    }

    /// Create a checksum-protected snapshot package of the entire surface.
    pub fn create_snapshot_package(&self) -> Result<SurfaceSnapshotPackage, SurfaceError> {
        SurfaceSnapshotPackage::new(self.create_snapshot())
    }

    /// Serialize a checksum-protected snapshot package to JSON.
    pub fn snapshot_to_json(&self) -> Result<String, SurfaceError> {
        self.create_snapshot_package()?.to_json()
    }

    /// Restore the surface from a checksum-validated snapshot package.
    pub fn restore_from_snapshot_package(
        &self,
        package: SurfaceSnapshotPackage,
    ) -> Result<usize, SurfaceError> {
        self.restore_from_snapshot(package.into_snapshot()?)
    }

    /// Restore the surface from a JSON payload containing a checksum-protected snapshot package.
    pub fn restore_from_snapshot_json(&self, data: &str) -> Result<usize, SurfaceError> {
        let package = SurfaceSnapshotPackage::from_json(data)?;
        self.restore_from_snapshot_package(package)
    }

    /// Restore the surface from a snapshot, without checksum validation.
    pub fn restore_from_snapshot(&self, snapshot: SurfaceSnapshot) -> Result<usize, SurfaceError> {
        self.restore_from_snapshot_at(snapshot, Utc::now())
    }

    /// Replaces the surface with the snapshot's points, dropping any that
    /// have expired by `now` or fail validation. No update events are
    /// emitted. Returns the number of points restored.
    pub fn restore_from_snapshot_at(
        &self,
        snapshot: SurfaceSnapshot,
        now: DateTime<Utc>,
    ) -> Result<usize, SurfaceError> {
        for symbol in snapshot.symbols() {
            debug!(
                "snapshot holds {} points for {}",
                snapshot.points_for(symbol).count(),
                symbol
            );
        }
        self.surface.clear();

        let total = snapshot.points.len();
        let mut restored = 0;
        for point in snapshot.points {
            match self.check_point(&point, now) {
                Ok(key) => {
                    self.surface
                        .entry(point.symbol.clone())
                        .or_default()
                        .entry(point.expiry)
                        .or_default()
                        .insert(key, point);
                    restored += 1;
                }
                Err(error) => trace!("skipping snapshot point: {}", error),
            }
        }

        info!(
            "Restored {} of {} surface points from snapshot taken at {}",
            restored, total, snapshot.timestamp
        );
        Ok(restored)
    }

    fn resolve(
        &self,
        symbol: &str,
        expiry: &str,
        strike: f64,
        spot: f64,
        now: DateTime<Utc>,
    ) -> Result<Contract, SurfaceError> {
        if symbol.trim().is_empty() {
            return Err(SurfaceError::invalid_input("symbol must not be empty"));
        }
        if !spot.is_finite() || spot <= 0.0 {
            return Err(SurfaceError::invalid_input(format!(
                "spot must be positive and finite, got {spot}"
            )));
        }
        let expiry = parse_expiry(expiry)?;
        let key = StrikeKey::new(strike)?;
        Ok(Contract {
            expiry,
            key,
            time_to_expiry: self.time_to_expiry(expiry, now),
        })
    }

    fn solve_point(
        &self,
        symbol: &str,
        contract: &Contract,
        spot: f64,
        side: OptionSide,
        observed_price: f64,
        timestamp: u64,
    ) -> Result<VolatilityPoint, SurfaceError> {
        let params = OptionParams::new(
            spot,
            contract.key.value(),
            contract.time_to_expiry,
            self.config.risk_free_rate,
            side,
        )
        .with_convention(self.config.convention);

        let solution = self.solver.solve(observed_price, &params)?;
        if !solution.converged {
            debug!(
                "surface {} {} {}: solve ended {:?} at {} (error {})",
                symbol,
                contract.expiry,
                contract.key.value(),
                solution.outcome,
                solution.volatility,
                solution.price_error
            );
        }

        Ok(VolatilityPoint {
            symbol: symbol.to_string(),
            expiry: contract.expiry,
            strike: contract.key.value(),
            volatility: solution.volatility.max(0.0),
            observed_at: timestamp,
            converged: solution.converged,
            reconciled: false,
        })
    }

    fn check_point(
        &self,
        point: &VolatilityPoint,
        now: DateTime<Utc>,
    ) -> Result<StrikeKey, SurfaceError> {
        if point.symbol.trim().is_empty() {
            return Err(SurfaceError::invalid_input("symbol must not be empty"));
        }
        let key = StrikeKey::new(point.strike)?;
        if !point.volatility.is_finite() || point.volatility < 0.0 {
            return Err(SurfaceError::invalid_input(format!(
                "volatility must be finite and non-negative, got {}",
                point.volatility
            )));
        }
        if self.time_to_expiry(point.expiry, now) <= 0.0 {
            return Err(SurfaceError::invalid_input(format!(
                "{} {} has already expired",
                point.symbol, point.expiry
            )));
        }
        Ok(key)
    }

    fn lookup_key(
        &self,
        symbol: &str,
        expiry: NaiveDate,
        key: StrikeKey,
    ) -> Option<VolatilityPoint> {
        self.surface
            .get(symbol)
            .and_then(|expiries| expiries.get(&expiry)?.get(&key).cloned())
    }

    fn store_point(&self, key: StrikeKey, point: VolatilityPoint, source: UpdateSource) {
        {
            let mut expiries = self.surface.entry(point.symbol.clone()).or_default();
            expiries
                .entry(point.expiry)
                .or_default()
                .insert(key, point.clone());
        }

        trace!(
            "surface {} {} {} <- {} ({:?})",
            point.symbol, point.expiry, point.strike, point.volatility, source
        );

        if let Some(ref listener) = self.update_listener {
            listener(&SurfaceUpdateEvent { point, source });
        }
    }
}

impl Default for VolatilitySurfaceStore {
    fn default() -> Self {
        Self::new(StoreConfig::default(), SolverConfig::default())
    }
}

fn millis(now: DateTime<Utc>) -> u64 {
    now.timestamp_millis().max(0) as u64
}

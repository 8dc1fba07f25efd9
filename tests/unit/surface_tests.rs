use chrono::{Duration, NaiveDate, TimeZone, Utc};
use ivsurface_rs::SurfaceError;
use ivsurface_rs::implied_volatility::{OptionSide, SolverConfig};
use ivsurface_rs::surface::{
    QuoteStatus, StoreConfig, SurfaceUpdateEvent, TradeUpdate, UpdateListener, UpdateSource,
    VolatilityQuery, VolatilitySurfaceStore,
};
use std::sync::{Arc, Mutex};
use std::thread;

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap()
}

fn eth_query(strike: f64) -> VolatilityQuery {
    VolatilityQuery::new("ETH", "2025-02-28", strike, 3300.0, OptionSide::Call)
}

#[test]
fn test_expiry_boundary() {
    let store = VolatilitySurfaceStore::default();
    let expiry = NaiveDate::from_ymd_opt(2025, 2, 28).unwrap();

    let just_before = Utc.with_ymd_and_hms(2025, 2, 27, 23, 59, 59).unwrap();
    assert!(store.time_to_expiry(expiry, just_before) > 0.0);
    let quote = store
        .get_at(&eth_query(3300.0).with_observed_price(40.0), just_before)
        .unwrap();
    assert!(quote.status.has_value());

    let at_midnight = Utc.with_ymd_and_hms(2025, 2, 28, 0, 0, 0).unwrap();
    assert_eq!(store.time_to_expiry(expiry, at_midnight), 0.0);
    let quote = store
        .get_at(&eth_query(3400.0).with_observed_price(40.0), at_midnight)
        .unwrap();
    assert_eq!(quote.status, QuoteStatus::Expired);
    assert_eq!(quote.volatility, 0.0);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_expiry_hour_shifts_the_boundary() {
    let store = VolatilitySurfaceStore::new(
        StoreConfig::default().with_expiry_hour_utc(8),
        SolverConfig::default(),
    );
    let at_midnight = Utc.with_ymd_and_hms(2025, 2, 28, 0, 0, 0).unwrap();
    let quote = store
        .get_at(&eth_query(3300.0).with_observed_price(5.0), at_midnight)
        .unwrap();
    assert_ne!(quote.status, QuoteStatus::Expired);
}

#[test]
fn test_rfc3339_expiry_maps_to_same_key() {
    let store = VolatilitySurfaceStore::default();
    let first = store
        .get_at(&eth_query(3500.0).with_observed_price(95.0), now())
        .unwrap();

    let mut query = eth_query(3500.0);
    query.expiry = "2025-02-28T08:00:00Z".to_string();
    let second = store.get_at(&query, now()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_nearby_strikes_are_distinct_keys() {
    let store = VolatilitySurfaceStore::default();
    store
        .get_at(&eth_query(3500.0).with_observed_price(95.0), now())
        .unwrap();
    let quote = store.get_at(&eth_query(3500.000_001), now()).unwrap();
    assert_eq!(quote.status, QuoteStatus::NoData);
}

#[test]
fn test_non_converged_solve_is_stored_as_low_confidence() {
    let store = VolatilitySurfaceStore::default();
    // Far above what any volatility up to the ceiling can produce.
    let quote = store
        .get_at(&eth_query(3300.0).with_observed_price(10_000.0), now())
        .unwrap();
    assert_eq!(quote.status, QuoteStatus::LowConfidence);
    assert!(matches!(
        quote.advisory(),
        Some(SurfaceError::NonConvergence { .. })
    ));

    let hit = store.get_at(&eth_query(3300.0), now()).unwrap();
    assert_eq!(hit.status, QuoteStatus::LowConfidence);
    assert_eq!(hit.volatility, quote.volatility);
}

#[test]
fn test_trade_on_expired_contract_is_ignored() {
    let store = VolatilitySurfaceStore::default();
    let trade = TradeUpdate {
        symbol: "ETH".to_string(),
        expiry: "2025-01-01".to_string(),
        strike: 3300.0,
        spot: 3300.0,
        last_trade_price: 12.0,
        side: OptionSide::Put,
    };
    let quote = store.update_at(&trade, now()).unwrap();
    assert_eq!(quote.status, QuoteStatus::Expired);
    assert!(store.is_empty());
}

#[test]
fn test_trade_with_bad_side_string_never_reaches_store() {
    let payload = r#"{"symbol":"ETH","expiry":"2025-02-28","strike":3300.0,"spot":3300.0,"last_trade_price":12.0,"side":"STRADDLE"}"#;
    assert!(serde_json::from_str::<TradeUpdate>(payload).is_err());
}

#[test]
fn test_concurrent_readers_and_writers() {
    let events = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&events);
    let listener: UpdateListener = Arc::new(move |_: &SurfaceUpdateEvent| {
        *counter.lock().unwrap() += 1;
    });
    let store = Arc::new(VolatilitySurfaceStore::with_update_listener(
        StoreConfig::default(),
        SolverConfig::default(),
        listener,
    ));
    let expiry = (Utc::now() + Duration::days(60)).date_naive().to_string();

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let store = Arc::clone(&store);
            let expiry = expiry.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    let strike = 80.0 + i as f64;
                    let symbol = if worker % 2 == 0 { "SPX" } else { "NDX" };
                    if worker < 4 {
                        let query =
                            VolatilityQuery::new(symbol, expiry.as_str(), strike, 100.0, OptionSide::Put)
                                .with_observed_price(3.0);
                        store.get(&query).unwrap();
                    } else {
                        let trade = TradeUpdate {
                            symbol: symbol.to_string(),
                            expiry: expiry.clone(),
                            strike,
                            spot: 100.0,
                            last_trade_price: 4.0,
                            side: OptionSide::Put,
                        };
                        store.update(&trade).unwrap();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.symbols(), vec!["NDX".to_string(), "SPX".to_string()]);
    assert_eq!(store.len(), 50);
    // Trades always write; queries write only on a miss.
    let written = *events.lock().unwrap();
    assert!((100..=200).contains(&written));
}

#[test]
fn test_reconciled_upsert_reports_reconciled_status() {
    let store = VolatilitySurfaceStore::default();
    let expiry = (Utc::now() + Duration::days(10)).date_naive();
    let query = VolatilityQuery::new("BTC", expiry.to_string(), 100_000.0, 98_000.0, OptionSide::Call)
        .with_observed_price(2_000.0);
    store.get(&query).unwrap();

    let mut point = store.lookup("BTC", expiry, 100_000.0).unwrap();
    point.volatility = 0.55;
    point.reconciled = true;
    store.upsert(point, UpdateSource::Reconciled).unwrap();

    let quote = store.get(&VolatilityQuery { observed_price: None, ..query }).unwrap();
    assert_eq!(quote.status, QuoteStatus::Reconciled);
    assert_eq!(quote.volatility, 0.55);
}

#[test]
fn test_bad_spot_is_rejected_on_every_path() {
    let store = VolatilitySurfaceStore::default();
    store
        .get_at(&eth_query(3300.0).with_observed_price(40.0), now())
        .unwrap();

    let mut hit = eth_query(3300.0);
    hit.spot = -1.0;
    assert!(matches!(
        store.get_at(&hit, now()),
        Err(SurfaceError::InvalidInput { .. })
    ));

    let mut no_data = eth_query(3400.0);
    no_data.spot = f64::NAN;
    assert!(matches!(
        store.get_at(&no_data, now()),
        Err(SurfaceError::InvalidInput { .. })
    ));

    let mut expired = eth_query(3300.0);
    expired.expiry = "2025-01-01".to_string();
    expired.spot = 0.0;
    assert!(matches!(
        store.get_at(&expired, now()),
        Err(SurfaceError::InvalidInput { .. })
    ));

    let trade = TradeUpdate {
        symbol: "ETH".to_string(),
        expiry: "2025-01-01".to_string(),
        strike: 3300.0,
        spot: f64::INFINITY,
        last_trade_price: 12.0,
        side: OptionSide::Put,
    };
    assert!(matches!(
        store.update_at(&trade, now()),
        Err(SurfaceError::InvalidInput { .. })
    ));
    assert_eq!(store.len(), 1);
}

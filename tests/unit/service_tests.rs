use chrono::{Duration, Utc};
use ivsurface_rs::implied_volatility::OptionSide;
use ivsurface_rs::reconcile::{ReconciliationOutcome, StaticReferenceFeed};
use ivsurface_rs::surface::{QuoteStatus, SnapshotFile, TradeUpdate, VolatilityQuery};
use ivsurface_rs::{ServiceConfig, SurfaceError, VolatilityService, current_time_millis};
use std::sync::Arc;

fn expiry(days: i64) -> String {
    (Utc::now() + Duration::days(days)).date_naive().to_string()
}

fn query(strike: f64) -> VolatilityQuery {
    VolatilityQuery::new("BTC", expiry(20), strike, 60_000.0, OptionSide::Call)
}

fn service_with_feed(feed: StaticReferenceFeed) -> VolatilityService<StaticReferenceFeed> {
    let (service, writer) = VolatilityService::from_config(&ServiceConfig::default(), Some(feed)).unwrap();
    assert!(writer.is_none());
    service
}

#[tokio::test]
async fn test_query_reconciles_against_reference() {
    let feed = StaticReferenceFeed::new();
    feed.set("BTC", 3.0);
    let service = service_with_feed(feed);

    let quote = service
        .query(&query(62_000.0).with_observed_price(2_500.0))
        .await
        .unwrap();
    assert_eq!(quote.status, QuoteStatus::Reconciled);
    assert_eq!(quote.volatility, 3.0);
    let reconciliation = quote.reconciliation.as_ref().unwrap();
    assert!(reconciliation.local < 3.0);
    assert!(matches!(
        quote.advisory(),
        Some(SurfaceError::DeviationDetected { reference, .. }) if reference == 3.0
    ));

    // The reference was written back, so the next check agrees.
    let again = service.query(&query(62_000.0)).await.unwrap();
    assert_eq!(again.status, QuoteStatus::Reconciled);
    assert_eq!(again.volatility, 3.0);
    assert_eq!(
        again.reconciliation.unwrap().outcome,
        ReconciliationOutcome::Agreed
    );
}

#[tokio::test]
async fn test_query_without_reference_keeps_local_value() {
    let service = service_with_feed(StaticReferenceFeed::new());

    let quote = service
        .query(&query(62_000.0).with_observed_price(2_500.0))
        .await
        .unwrap();
    assert_eq!(quote.status, QuoteStatus::Converged);
    let local = service
        .store()
        .lookup("BTC", quote.expiry, 62_000.0)
        .unwrap()
        .volatility;
    assert_eq!(quote.volatility, local);
    assert!(matches!(
        quote.advisory(),
        Some(SurfaceError::ReferenceUnavailable { .. })
    ));
}

#[tokio::test]
async fn test_no_data_and_expired_skip_reconciliation() {
    let feed = StaticReferenceFeed::new();
    feed.set("BTC", 0.5);
    let service = service_with_feed(feed);

    let quote = service.query(&query(61_000.0)).await.unwrap();
    assert_eq!(quote.status, QuoteStatus::NoData);
    assert!(quote.reconciliation.is_none());

    let expired = VolatilityQuery::new("BTC", expiry(-3), 61_000.0, 60_000.0, OptionSide::Call)
        .with_observed_price(100.0);
    let quote = service.query(&expired).await.unwrap();
    assert_eq!(quote.status, QuoteStatus::Expired);
    assert!(quote.reconciliation.is_none());
    assert!(service.store().is_empty());
}

#[tokio::test]
async fn test_invalid_query_is_an_error() {
    let service = service_with_feed(StaticReferenceFeed::new());
    let mut bad = query(62_000.0).with_observed_price(2_500.0);
    bad.expiry = "next friday".to_string();
    assert!(matches!(
        service.query(&bad).await,
        Err(SurfaceError::InvalidInput { .. })
    ));
}

#[tokio::test]
async fn test_record_trade_overwrites() {
    let service = service_with_feed(StaticReferenceFeed::new());
    let first = service
        .query(&query(62_000.0).with_observed_price(2_500.0))
        .await
        .unwrap();

    let trade = TradeUpdate {
        symbol: "BTC".to_string(),
        expiry: expiry(20),
        strike: 62_000.0,
        spot: 60_000.0,
        last_trade_price: 3_500.0,
        side: OptionSide::Call,
    };
    let traded = service.record_trade(&trade).await.unwrap();
    assert!(traded.volatility > first.volatility);
    assert_eq!(service.store().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bounded_concurrency() {
    let config = ServiceConfig::default().with_max_in_flight(3);
    let (service, _) =
        VolatilityService::<StaticReferenceFeed>::from_config(&config, None).unwrap();
    let service = Arc::new(service);
    assert_eq!(service.max_in_flight(), 3);

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                let strike = 50_000.0 + 500.0 * i as f64;
                service
                    .query(&query(strike).with_observed_price(1_500.0))
                    .await
            })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }

    assert_eq!(service.store().len(), 32);
    assert_eq!(service.available_permits(), 3);
}

#[tokio::test]
async fn test_snapshot_survives_restart() {
    let path = std::env::temp_dir().join(format!(
        "ivsurface-service-{}-{}.json",
        std::process::id(),
        current_time_millis()
    ));
    let config = ServiceConfig::default().with_snapshot_path(&path);

    let (service, writer) =
        VolatilityService::<StaticReferenceFeed>::from_config(&config, None).unwrap();
    let quote = service
        .query(&query(64_000.0).with_observed_price(1_200.0))
        .await
        .unwrap();
    drop(service);
    writer.unwrap().join().unwrap();

    let snapshot = SnapshotFile::new(&path).load().unwrap().unwrap();
    assert_eq!(snapshot.points.len(), 1);

    let (restarted, writer) =
        VolatilityService::<StaticReferenceFeed>::from_config(&config, None).unwrap();
    let hit = restarted.query(&query(64_000.0)).await.unwrap();
    assert_eq!(hit.volatility, quote.volatility);
    assert_eq!(hit.status, quote.status);

    drop(restarted);
    writer.unwrap().join().unwrap();
    std::fs::remove_file(path).unwrap();
}

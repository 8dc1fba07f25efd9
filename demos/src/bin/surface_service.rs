//! Example driving a volatility service end to end
//!
//! This example shows how to:
//! 1. Load a `ServiceConfig` from a JSON file, or fall back to defaults
//! 2. Solve implied volatilities on cache misses and serve them from the cache
//! 3. Apply trade prints and reconcile against a reference feed
//!
//! Run with `--live` to reconcile against the public HTTP feed instead of
//! the built-in static values:
//!
//! ```text
//! cargo run -p demos --bin surface_service -- [config.json] [--live]
//! ```

use chrono::{Duration, Utc};
use ivsurface_rs::prelude::*;
use std::sync::Arc;
use tracing::{info, warn};

async fn run<F: ReferenceFeed + 'static>(
    service: Arc<VolatilityService<F>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let expiry = (Utc::now() + Duration::days(14)).date_naive().to_string();
    let spot = 60_000.0;

    // Option chain snapshot: strike -> call mid price
    let chain = [
        (55_000.0, 5_600.0),
        (58_000.0, 3_300.0),
        (60_000.0, 2_050.0),
        (62_000.0, 1_150.0),
        (65_000.0, 420.0),
    ];

    let mut tasks = Vec::new();
    for (strike, price) in chain {
        let service = Arc::clone(&service);
        let query = VolatilityQuery::new("BTC", expiry.as_str(), strike, spot, OptionSide::Call)
            .with_observed_price(price);
        tasks.push(tokio::spawn(async move { service.query(&query).await }));
    }

    for task in tasks {
        let quote = task.await??;
        info!(
            "{} {} {:>8}: {:6.2}% [{}]",
            quote.symbol,
            quote.expiry,
            quote.strike,
            quote.volatility * 100.0,
            quote.status
        );
        if let Some(advisory) = quote.advisory() {
            warn!("  {}", advisory);
        }
    }

    let trade = TradeUpdate {
        symbol: "BTC".to_string(),
        expiry: expiry.clone(),
        strike: 60_000.0,
        spot: 60_400.0,
        last_trade_price: 2_300.0,
        side: OptionSide::Call,
    };
    let quote = service.record_trade(&trade).await?;
    info!(
        "After trade at {}: {:.2}% [{}]",
        trade.last_trade_price,
        quote.volatility * 100.0,
        quote.status
    );

    let cached = service
        .query(&VolatilityQuery::new("BTC", expiry.as_str(), 60_000.0, spot, OptionSide::Call))
        .await?;
    assert_ne!(cached.status, QuoteStatus::NoData);
    info!("Served from cache: {}", serde_json::to_string(&cached)?);

    info!("Surface holds {} points", service.store().len());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let live = args.iter().any(|arg| arg == "--live");
    let config = match args.iter().find(|arg| !arg.starts_with("--")) {
        Some(path) => ServiceConfig::from_json_file(path)?,
        None => ServiceConfig::default(),
    };

    info!("Starting volatility surface example (live reference: {})", live);

    let writer = if live {
        let feed = HttpReferenceFeed::new(config.reference.clone())?;
        let (service, writer) = VolatilityService::from_config(&config, Some(feed))?;
        run(Arc::new(service)).await?;
        writer
    } else {
        let feed = StaticReferenceFeed::new();
        feed.set("BTC", 0.55);
        let (service, writer) = VolatilityService::from_config(&config, Some(feed))?;
        run(Arc::new(service)).await?;
        writer
    };

    if let Some(handle) = writer
        && handle.join().is_err()
    {
        warn!("Snapshot writer panicked");
    }

    info!("Example completed successfully");
    Ok(())
}

use chrono::{Duration, Utc};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use ivsurface_rs::implied_volatility::{
    BlackScholes, OptionParams, OptionSide, PricingConvention, SolverConfig, solve_iv,
};
use ivsurface_rs::surface::{StoreConfig, VolatilityQuery, VolatilitySurfaceStore};
use std::hint::black_box;

fn bench_pricer(c: &mut Criterion) {
    let request = OptionParams::call(100.0, 105.0, 0.5, 0.05).with_volatility(0.25);
    c.bench_function("price_call", |b| {
        b.iter(|| BlackScholes::price(black_box(&request)))
    });
    c.bench_function("vega", |b| b.iter(|| BlackScholes::vega(black_box(&request))));
}

fn bench_solver(c: &mut Criterion) {
    let mut group = c.benchmark_group("solve_iv");
    let config = SolverConfig::default();
    for (name, convention) in [
        ("discounted_spot", PricingConvention::DiscountedSpot),
        ("standard", PricingConvention::Standard),
    ] {
        let params = OptionParams::new(8400.0, 8000.0, 2.0 / 365.0, 0.07, OptionSide::Call)
            .with_convention(convention);
        group.bench_with_input(BenchmarkId::new("short_dated_itm_call", name), &params, |b, params| {
            b.iter(|| solve_iv(black_box(params), black_box(492.31), &config))
        });
    }
    group.finish();
}

fn bench_store(c: &mut Criterion) {
    let store = VolatilitySurfaceStore::new(StoreConfig::default(), SolverConfig::default());
    let expiry = (Utc::now() + Duration::days(30)).date_naive().to_string();
    for i in 0..200 {
        let query = VolatilityQuery::new("BTC", expiry.as_str(), 50_000.0 + 100.0 * i as f64, 60_000.0, OptionSide::Put)
            .with_observed_price(900.0);
        let _ = store.get(&query);
    }

    let hit = VolatilityQuery::new("BTC", expiry.as_str(), 60_000.0, 60_000.0, OptionSide::Put);
    c.bench_function("store_hit", |b| b.iter(|| store.get(black_box(&hit))));

    c.bench_function("store_trade_update", |b| {
        let trade = ivsurface_rs::surface::TradeUpdate {
            symbol: "ETH".to_string(),
            expiry: expiry.clone(),
            strike: 3_000.0,
            spot: 3_100.0,
            last_trade_price: 95.0,
            side: OptionSide::Put,
        };
        b.iter(|| store.update(black_box(&trade)))
    });
}

criterion_group!(benches, bench_pricer, bench_solver, bench_store);
criterion_main!(benches);

use ivsurface_rs::implied_volatility::{
    BlackScholes, OptionParams, OptionSide, PricingConvention, SolverConfig, solve_iv,
};
use proptest::prelude::*;

fn side(is_call: bool) -> OptionSide {
    if is_call { OptionSide::Call } else { OptionSide::Put }
}

fn price(params: &OptionParams, vol: f64) -> f64 {
    BlackScholes::price(&params.with_volatility(vol)).unwrap()
}

fn vega(params: &OptionParams, vol: f64) -> f64 {
    BlackScholes::vega(&params.with_volatility(vol)).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn standard_round_trip(
        strike in 70.0f64..130.0,
        time in 0.05f64..2.0,
        rate in 0.0f64..0.1,
        vol in 0.01f64..5.0,
        is_call in any::<bool>(),
    ) {
        let params = OptionParams::new(100.0, strike, time, rate, side(is_call))
            .with_convention(PricingConvention::Standard);
        prop_assume!(vega(&params, vol) > 0.5);

        let observed = price(&params, vol);
        let solution = solve_iv(&params, observed, &SolverConfig::default()).unwrap();

        prop_assert!(solution.converged);
        prop_assert!((solution.volatility - vol).abs() < 1e-4,
            "solved {} for true {}", solution.volatility, vol);
    }

    #[test]
    fn discounted_spot_round_trip(
        strike in 70.0f64..130.0,
        time in 0.05f64..2.0,
        rate in 0.0f64..0.1,
        vol in 0.01f64..5.0,
        is_call in any::<bool>(),
    ) {
        let params = OptionParams::new(100.0, strike, time, rate, side(is_call));
        prop_assume!(vega(&params, vol) > 0.5);
        let observed = price(&params, vol);
        // Prices at or below the zero-volatility limit have no unique preimage.
        prop_assume!(observed > price(&params, 1e-6) + 1e-4);

        let solution = solve_iv(&params, observed, &SolverConfig::default()).unwrap();
        prop_assert!((solution.volatility - vol).abs() < 1e-4,
            "solved {} for true {} ({:?})", solution.volatility, vol, solution.outcome);
    }

    #[test]
    fn standard_price_increases_with_volatility(
        strike in 50.0f64..150.0,
        time in 0.02f64..3.0,
        rate in 0.0f64..0.1,
        low in 0.01f64..4.0,
        step in 0.01f64..1.0,
        is_call in any::<bool>(),
    ) {
        let params = OptionParams::new(100.0, strike, time, rate, side(is_call))
            .with_convention(PricingConvention::Standard);
        prop_assume!(vega(&params, low) > 1e-3);
        prop_assert!(price(&params, low + step) > price(&params, low));
    }

    #[test]
    fn discounted_spot_call_put_relation(
        strike in 50.0f64..150.0,
        time in 0.02f64..3.0,
        rate in -0.02f64..0.1,
        vol in 0.01f64..5.0,
    ) {
        let call = price(&OptionParams::call(100.0, strike, time, rate), vol);
        let put = price(&OptionParams::put(100.0, strike, time, rate), vol);
        let expected = (-rate * time).exp() * (100.0 - strike);
        prop_assert!((call - put - expected).abs() < 1e-8);
    }

    #[test]
    fn solver_never_errors_on_valid_prices(
        strike in 10.0f64..500.0,
        time in -0.5f64..3.0,
        rate in -0.05f64..0.2,
        observed in 0.0f64..200.0,
        is_call in any::<bool>(),
    ) {
        let params = OptionParams::new(100.0, strike, time, rate, side(is_call));
        let solution = solve_iv(&params, observed, &SolverConfig::default()).unwrap();
        prop_assert!(solution.volatility.is_finite());
        prop_assert!(solution.volatility >= 0.0 && solution.volatility <= 10.0);
        if time <= 0.0 {
            prop_assert!(solution.is_expired());
        }
    }
}

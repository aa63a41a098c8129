// ═══════════════════════════════════════════════════════════════════
// Valuation Tests — fallback chain, totals, diversification score
// ═══════════════════════════════════════════════════════════════════

use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;

use semilla_core::models::holding::{Holding, LedgerDerivation};
use semilla_core::models::instrument::{Instrument, InstrumentId, InstrumentRegistry};
use semilla_core::models::quote::{PriceLookup, PriceQuote, QuoteCache, QuoteSource};
use semilla_core::models::valuation::{HoldingValuation, PriceSource};
use semilla_core::services::valuation_service::ValuationService;

fn dt(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

fn icolcap() -> InstrumentId {
    InstrumentId::new("ICOLCAP")
}

fn as_of() -> DateTime<Utc> {
    dt(2025, 6, 1, 12)
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}

fn holding(id: &InstrumentId, units: f64, cost_basis: f64) -> Holding {
    Holding {
        instrument_id: id.clone(),
        units,
        cost_basis,
        average_cost: if units > 0.0 { cost_basis / units } else { 0.0 },
    }
}

fn derivation_of(holdings: Vec<Holding>) -> LedgerDerivation {
    LedgerDerivation {
        holdings: holdings
            .into_iter()
            .map(|h| (h.instrument_id.clone(), h))
            .collect(),
        dividends: HashMap::new(),
        total_dividends: 0.0,
    }
}

fn live_quote(id: &InstrumentId, price_in_base: f64) -> PriceQuote {
    PriceQuote {
        instrument_id: id.clone(),
        price_in_base,
        price_in_foreign: None,
        change_pct: 0.0,
        fetched_at: dt(2025, 6, 1, 7),
        source: QuoteSource::Live,
    }
}

// ═══════════════════════════════════════════════════════════════════
//  Price fallback chain
// ═══════════════════════════════════════════════════════════════════

mod fallback_chain {
    use super::*;

    #[test]
    fn cached_quote_wins() {
        let registry = InstrumentRegistry::with_default_universe();
        let mut cache = QuoteCache::new();
        cache.merge_quote(live_quote(&icolcap(), 14_000.0));

        let derivation = derivation_of(vec![holding(&icolcap(), 10.0, 125_000.0)]);
        let valuation =
            ValuationService::new().valuate(&derivation, &cache, &registry, "COP", as_of());

        let hv = &valuation.holdings[0];
        assert_eq!(hv.price_per_unit, 14_000.0);
        assert_eq!(hv.price_source, PriceSource::Quote);
        assert_eq!(hv.value, 140_000.0);
    }

    #[test]
    fn reference_price_when_no_quote() {
        let registry = InstrumentRegistry::with_default_universe();
        let cache = QuoteCache::new();
        let reference = registry.get(&icolcap()).unwrap().reference_price;

        let derivation = derivation_of(vec![holding(&icolcap(), 2.0, 30_000.0)]);
        let valuation =
            ValuationService::new().valuate(&derivation, &cache, &registry, "COP", as_of());

        let hv = &valuation.holdings[0];
        assert_eq!(hv.price_source, PriceSource::Reference);
        assert_eq!(hv.price_per_unit, reference);
        assert_close(hv.value, 2.0 * reference);
    }

    #[test]
    fn zero_when_nothing_known() {
        // an instrument without a catalog reference price and no quote
        let mut registry = InstrumentRegistry::new();
        registry.register(Instrument::new("MYST", "MYST", "Mystery Fund", "COP", 0.0));
        let cache = QuoteCache::new();

        let id = InstrumentId::new("MYST");
        let derivation = derivation_of(vec![holding(&id, 5.0, 1_000.0)]);
        let valuation =
            ValuationService::new().valuate(&derivation, &cache, &registry, "COP", as_of());

        // unpriced is representable, not an error — the holding still shows
        let hv = &valuation.holdings[0];
        assert_eq!(hv.price_source, PriceSource::Unpriced);
        assert_eq!(hv.price_per_unit, 0.0);
        assert_eq!(hv.value, 0.0);
        assert_eq!(hv.units, 5.0);
        assert_eq!(valuation.current_value, 0.0);
    }

    #[test]
    fn stale_and_manual_quotes_still_count_as_quotes() {
        let registry = InstrumentRegistry::with_default_universe();
        let mut cache = QuoteCache::new();
        let mut quote = live_quote(&icolcap(), 13_500.0);
        quote.source = QuoteSource::StaleFallback;
        cache.merge_quote(quote);

        let derivation = derivation_of(vec![holding(&icolcap(), 1.0, 12_500.0)]);
        let valuation =
            ValuationService::new().valuate(&derivation, &cache, &registry, "COP", as_of());
        assert_eq!(valuation.holdings[0].price_source, PriceSource::Quote);
        assert_eq!(valuation.holdings[0].price_per_unit, 13_500.0);
    }

    #[test]
    fn price_lookup_is_a_seam() {
        // any PriceLookup implementation plugs in — no reach-through
        struct FixedPrice(PriceQuote);
        impl PriceLookup for FixedPrice {
            fn quote(&self, id: &InstrumentId) -> Option<&PriceQuote> {
                (id == &self.0.instrument_id).then_some(&self.0)
            }
        }

        let registry = InstrumentRegistry::with_default_universe();
        let lookup = FixedPrice(live_quote(&icolcap(), 15_000.0));
        let derivation = derivation_of(vec![holding(&icolcap(), 2.0, 25_000.0)]);
        let valuation =
            ValuationService::new().valuate(&derivation, &lookup, &registry, "COP", as_of());
        assert_eq!(valuation.holdings[0].price_per_unit, 15_000.0);
    }
}

// ═══════════════════════════════════════════════════════════════════
//  Totals & zero-division safety
// ═══════════════════════════════════════════════════════════════════

mod totals {
    use super::*;

    #[test]
    fn spec_scenario_valuation() {
        // 12 units @ 14,000 with basis ≈ 152,000 → value 168,000, return ≈ 16,000
        let registry = InstrumentRegistry::with_default_universe();
        let mut cache = QuoteCache::new();
        cache.merge_quote(live_quote(&icolcap(), 14_000.0));

        let derivation = derivation_of(vec![holding(&icolcap(), 12.0, 152_000.0)]);
        let valuation =
            ValuationService::new().valuate(&derivation, &cache, &registry, "COP", as_of());

        assert_close(valuation.current_value, 168_000.0);
        assert_close(valuation.total_invested, 152_000.0);
        assert_close(valuation.total_return, 16_000.0);
        assert_close(valuation.total_return_pct, 16_000.0 / 152_000.0 * 100.0);
        assert_eq!(valuation.currency, "COP");
        assert_eq!(valuation.as_of, as_of());
    }

    #[test]
    fn empty_portfolio_is_all_zeros() {
        let registry = InstrumentRegistry::with_default_universe();
        let cache = QuoteCache::new();
        let valuation = ValuationService::new().valuate(
            &LedgerDerivation::default(),
            &cache,
            &registry,
            "COP",
            as_of(),
        );
        assert_eq!(valuation.current_value, 0.0);
        assert_eq!(valuation.total_invested, 0.0);
        assert_eq!(valuation.total_return, 0.0);
        // never NaN / Infinity
        assert_eq!(valuation.total_return_pct, 0.0);
        assert_eq!(valuation.diversification_score, 0.0);
        assert!(valuation.holdings.is_empty());
    }

    #[test]
    fn zero_invested_never_divides_by_zero() {
        let registry = InstrumentRegistry::with_default_universe();
        let mut cache = QuoteCache::new();
        cache.merge_quote(live_quote(&icolcap(), 14_000.0));

        // zero cost basis (e.g. gifted units) with positive value
        let derivation = derivation_of(vec![holding(&icolcap(), 1.0, 0.0)]);
        let valuation =
            ValuationService::new().valuate(&derivation, &cache, &registry, "COP", as_of());
        assert_eq!(valuation.total_return_pct, 0.0);
        assert_eq!(valuation.holdings[0].unrealized_gain_pct, 0.0);
        assert!(valuation.total_return_pct.is_finite());
    }

    #[test]
    fn per_holding_gains() {
        let registry = InstrumentRegistry::with_default_universe();
        let mut cache = QuoteCache::new();
        cache.merge_quote(live_quote(&icolcap(), 14_000.0));

        let derivation = derivation_of(vec![holding(&icolcap(), 10.0, 125_000.0)]);
        let valuation =
            ValuationService::new().valuate(&derivation, &cache, &registry, "COP", as_of());
        let hv = &valuation.holdings[0];
        assert_close(hv.unrealized_gain, 15_000.0);
        assert_close(hv.unrealized_gain_pct, 12.0);
    }

    #[test]
    fn allocations_sum_to_hundred_and_sort_descending() {
        let registry = InstrumentRegistry::with_default_universe();
        let voo = InstrumentId::new("VOO");
        let mut cache = QuoteCache::new();
        cache.merge_quote(live_quote(&icolcap(), 10_000.0));
        cache.merge_quote(live_quote(&voo, 30_000.0));

        let derivation = derivation_of(vec![
            holding(&icolcap(), 1.0, 9_000.0),
            holding(&voo, 1.0, 28_000.0),
        ]);
        let valuation =
            ValuationService::new().valuate(&derivation, &cache, &registry, "COP", as_of());

        let pct_sum: f64 = valuation.holdings.iter().map(|h| h.pct_of_portfolio).sum();
        assert_close(pct_sum, 100.0);
        assert_eq!(valuation.holdings[0].instrument_id, voo);
        assert_close(valuation.holdings[0].pct_of_portfolio, 75.0);
        assert_close(valuation.holdings[1].pct_of_portfolio, 25.0);
    }

    #[test]
    fn dividends_pass_through() {
        let registry = InstrumentRegistry::with_default_universe();
        let cache = QuoteCache::new();
        let mut derivation = derivation_of(vec![]);
        derivation.total_dividends = 1_234.5;
        let valuation =
            ValuationService::new().valuate(&derivation, &cache, &registry, "COP", as_of());
        assert_eq!(valuation.total_dividends, 1_234.5);
    }
}

// ═══════════════════════════════════════════════════════════════════
//  Diversification score
// ═══════════════════════════════════════════════════════════════════

mod diversification {
    use super::*;

    fn hv(id: &str, value: f64) -> HoldingValuation {
        HoldingValuation {
            instrument_id: InstrumentId::new(id),
            units: 1.0,
            cost_basis: value,
            average_cost: value,
            price_per_unit: value,
            price_source: PriceSource::Quote,
            value,
            unrealized_gain: 0.0,
            unrealized_gain_pct: 0.0,
            pct_of_portfolio: 0.0,
        }
    }

    #[test]
    fn single_holding_scores_minimum() {
        let holdings = vec![hv("ICOLCAP", 100.0)];
        assert_eq!(
            ValuationService::diversification_score(&holdings, 100.0),
            0.0
        );
    }

    #[test]
    fn zero_value_scores_minimum() {
        let holdings = vec![hv("ICOLCAP", 0.0), hv("VOO", 0.0)];
        assert_eq!(ValuationService::diversification_score(&holdings, 0.0), 0.0);
    }

    #[test]
    fn even_two_way_split() {
        let holdings = vec![hv("ICOLCAP", 50.0), hv("VOO", 50.0)];
        assert_close(
            ValuationService::diversification_score(&holdings, 100.0),
            50.0,
        );
    }

    #[test]
    fn even_four_way_split() {
        let holdings = vec![
            hv("ICOLCAP", 25.0),
            hv("VOO", 25.0),
            hv("VT", 25.0),
            hv("GLD", 25.0),
        ];
        assert_close(
            ValuationService::diversification_score(&holdings, 100.0),
            75.0,
        );
    }

    #[test]
    fn approaches_hundred_as_n_grows() {
        let holdings: Vec<HoldingValuation> =
            (0..50).map(|i| hv(&format!("I{i}"), 2.0)).collect();
        let score = ValuationService::diversification_score(&holdings, 100.0);
        assert!(score > 97.0 && score < 100.0, "score = {score}");
    }

    #[test]
    fn concentration_lowers_the_score() {
        let even = vec![hv("ICOLCAP", 50.0), hv("VOO", 50.0)];
        let skewed = vec![hv("ICOLCAP", 80.0), hv("VOO", 20.0)];
        assert!(
            ValuationService::diversification_score(&skewed, 100.0)
                < ValuationService::diversification_score(&even, 100.0)
        );
    }

    #[test]
    fn computed_inside_valuate() {
        let registry = InstrumentRegistry::with_default_universe();
        let voo = InstrumentId::new("VOO");
        let mut cache = QuoteCache::new();
        cache.merge_quote(live_quote(&icolcap(), 100.0));
        cache.merge_quote(live_quote(&voo, 100.0));

        let derivation = derivation_of(vec![
            holding(&icolcap(), 1.0, 90.0),
            holding(&voo, 1.0, 90.0),
        ]);
        let valuation =
            ValuationService::new().valuate(&derivation, &cache, &registry, "COP", as_of());
        assert_close(valuation.diversification_score, 50.0);
    }
}

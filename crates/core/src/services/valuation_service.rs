use chrono::{DateTime, Utc};
use tracing::warn;

use crate::models::holding::LedgerDerivation;
use crate::models::instrument::{InstrumentId, InstrumentRegistry};
use crate::models::quote::PriceLookup;
use crate::models::valuation::{HoldingValuation, PortfolioValuation, PriceSource};

/// Combines holdings with current prices into the portfolio summary.
///
/// Never fails for data-completeness reasons: an instrument with no
/// known price degrades through the fallback chain (cached quote →
/// catalog reference price → zero) instead of blocking the valuation.
/// Prices arrive through the injected [`PriceLookup`] capability.
pub struct ValuationService;

impl ValuationService {
    pub fn new() -> Self {
        Self
    }

    /// Value a derived holdings set at `as_of`.
    pub fn valuate(
        &self,
        derivation: &LedgerDerivation,
        prices: &dyn PriceLookup,
        registry: &InstrumentRegistry,
        base_currency: &str,
        as_of: DateTime<Utc>,
    ) -> PortfolioValuation {
        let mut holdings = Vec::new();
        let mut current_value = 0.0;
        let mut total_invested = 0.0;

        for holding in derivation.holdings_sorted() {
            let (price, source) = Self::resolve_price(&holding.instrument_id, prices, registry);
            if source == PriceSource::Unpriced {
                warn!(instrument = %holding.instrument_id, "no price available; holding valued at zero");
            }

            let value = holding.units * price;
            current_value += value;
            total_invested += holding.cost_basis;

            let unrealized_gain = value - holding.cost_basis;
            holdings.push(HoldingValuation {
                instrument_id: holding.instrument_id.clone(),
                units: holding.units,
                cost_basis: holding.cost_basis,
                average_cost: holding.average_cost,
                price_per_unit: price,
                price_source: source,
                value,
                unrealized_gain,
                unrealized_gain_pct: if holding.cost_basis > 0.0 {
                    unrealized_gain / holding.cost_basis * 100.0
                } else {
                    0.0
                },
                pct_of_portfolio: 0.0, // filled below once the total is known
            });
        }

        for valuation in &mut holdings {
            valuation.pct_of_portfolio = if current_value > 0.0 {
                valuation.value / current_value * 100.0
            } else {
                0.0
            };
        }

        // Largest allocation first
        holdings.sort_by(|a, b| {
            b.pct_of_portfolio
                .partial_cmp(&a.pct_of_portfolio)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let total_return = current_value - total_invested;
        let total_return_pct = if total_invested > 0.0 {
            total_return / total_invested * 100.0
        } else {
            0.0
        };

        PortfolioValuation {
            as_of,
            currency: base_currency.to_string(),
            total_invested,
            current_value,
            total_return,
            total_return_pct,
            total_dividends: derivation.total_dividends,
            diversification_score: Self::diversification_score(&holdings, current_value),
            holdings,
        }
    }

    /// Three-level price fallback: cached quote, then the instrument's
    /// reference price, then zero. Zero is representable, not an error —
    /// the holding is reported with `PriceSource::Unpriced` so the
    /// caller can surface it distinctly from "no holding".
    fn resolve_price(
        id: &InstrumentId,
        prices: &dyn PriceLookup,
        registry: &InstrumentRegistry,
    ) -> (f64, PriceSource) {
        if let Some(quote) = prices.quote(id) {
            return (quote.price_in_base, PriceSource::Quote);
        }
        if let Some(instrument) = registry.get(id) {
            if instrument.reference_price > 0.0 {
                return (instrument.reference_price, PriceSource::Reference);
            }
        }
        (0.0, PriceSource::Unpriced)
    }

    /// Herfindahl-based evenness score in 0–100; higher means more
    /// evenly spread. `100 * (1 - Σ share²)`: a single holding scores 0,
    /// an even N-way split approaches 100 as N grows. Defined as 0 for
    /// an empty or single-holding portfolio.
    #[must_use]
    pub fn diversification_score(holdings: &[HoldingValuation], total_value: f64) -> f64 {
        if total_value <= 0.0 || holdings.len() < 2 {
            return 0.0;
        }
        let concentration: f64 = holdings
            .iter()
            .map(|h| {
                let share = h.value / total_value;
                share * share
            })
            .sum();
        100.0 * (1.0 - concentration)
    }
}

impl Default for ValuationService {
    fn default() -> Self {
        Self::new()
    }
}

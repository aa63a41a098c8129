use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::instrument::InstrumentId;

/// Which level of the price fallback chain produced a holding's price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceSource {
    /// A cached quote (live, manual, or stale fallback)
    Quote,
    /// The instrument's catalog reference price
    Reference,
    /// No price known — the holding contributes zero value.
    /// Distinct from "no holding": units are still reported.
    Unpriced,
}

impl std::fmt::Display for PriceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceSource::Quote => write!(f, "Quote"),
            PriceSource::Reference => write!(f, "Reference"),
            PriceSource::Unpriced => write!(f, "Unpriced"),
        }
    }
}

/// One holding valued at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingValuation {
    pub instrument_id: InstrumentId,

    /// Units held
    pub units: f64,

    /// Blended acquisition cost in the base currency
    pub cost_basis: f64,

    /// `cost_basis / units` (zero when no units)
    pub average_cost: f64,

    /// Resolved price per unit in the base currency
    pub price_per_unit: f64,

    /// Which fallback level resolved the price
    pub price_source: PriceSource,

    /// `units * price_per_unit`
    pub value: f64,

    /// `value - cost_basis`
    pub unrealized_gain: f64,

    /// Percentage gain over cost basis (zero when nothing invested)
    pub unrealized_gain_pct: f64,

    /// This holding's share of total portfolio value, in percent
    pub pct_of_portfolio: f64,
}

/// Point-in-time valuation of a user's whole portfolio.
///
/// The sole contract the presentation layer depends on. Computed from
/// the currently persisted ledger plus cached prices; never fails for
/// data-completeness reasons — unpriced instruments degrade to zero
/// value with `PriceSource::Unpriced`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioValuation {
    /// When this valuation was computed
    pub as_of: DateTime<Utc>,

    /// Base reporting currency for every monetary figure
    pub currency: String,

    /// Sum of cost bases across active holdings
    pub total_invested: f64,

    /// Sum of current values across active holdings
    pub current_value: f64,

    /// `current_value - total_invested`
    pub total_return: f64,

    /// Percentage return (zero when nothing invested — never NaN)
    pub total_return_pct: f64,

    /// Dividend cash received, tracked separately from unrealized return
    pub total_dividends: f64,

    /// 0–100 evenness score; higher means more evenly spread
    pub diversification_score: f64,

    /// Per-holding breakdown, largest allocation first
    pub holdings: Vec<HoldingValuation>,
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::instrument::InstrumentId;

/// A user's current position in one instrument, derived from the ledger.
///
/// Never stored as source of truth — always recomputable from the full
/// transaction history. `units >= 0` holds for every valid ledger;
/// `average_cost == cost_basis / units` when units are held.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub instrument_id: InstrumentId,

    /// Units currently held (never negative)
    pub units: f64,

    /// Blended acquisition cost in the base currency, fees included
    pub cost_basis: f64,

    /// `cost_basis / units`; zero when no units are held
    pub average_cost: f64,
}

/// Everything the aggregator derives from one user's ledger in a single
/// replay: active holdings plus the dividend cash-flow totals, which are
/// tracked separately from cost basis.
#[derive(Debug, Clone, Default)]
pub struct LedgerDerivation {
    /// Active holdings (positions with zero units are dropped)
    pub holdings: HashMap<InstrumentId, Holding>,

    /// Dividend cash received per instrument, in the base currency
    pub dividends: HashMap<InstrumentId, f64>,

    /// Sum of all dividends received, in the base currency
    pub total_dividends: f64,
}

impl LedgerDerivation {
    /// Active holdings sorted by instrument id (deterministic order).
    #[must_use]
    pub fn holdings_sorted(&self) -> Vec<&Holding> {
        let mut holdings: Vec<&Holding> = self.holdings.values().collect();
        holdings.sort_by(|a, b| a.instrument_id.cmp(&b.instrument_id));
        holdings
    }
}

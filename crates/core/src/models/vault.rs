use serde::{Deserialize, Serialize};

use super::quote::QuoteCache;
use super::settings::Settings;
use super::snapshot::PortfolioSnapshot;
use super::transaction::Transaction;

/// The main data container. Everything in here gets serialized,
/// encrypted, and saved to the portable .smla file.
///
/// Holds the append-only transaction ledger (kept sorted by
/// `(occurred_at, seq)`), the snapshot log, the quote cache (so the last
/// valuation works offline) and user settings. Transactions and
/// snapshots carry their `user_id`, so one vault can hold several
/// children's ledgers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vault {
    /// All ledger entries, sorted by `(occurred_at, seq)`
    pub transactions: Vec<Transaction>,

    /// Append-only snapshot log
    #[serde(default)]
    pub snapshots: Vec<PortfolioSnapshot>,

    /// Cached market data — quotes survive offline sessions here
    pub quote_cache: QuoteCache,

    /// User settings (currencies, API keys, refresh cutoff)
    pub settings: Settings,

    /// Monotonic counter bumped on every ledger mutation; derived-state
    /// caches key off it
    pub ledger_version: u64,

    /// Next sequence number to assign at append
    pub next_seq: u64,
}

impl Default for Vault {
    fn default() -> Self {
        Self {
            transactions: Vec::new(),
            snapshots: Vec::new(),
            quote_cache: QuoteCache::new(),
            settings: Settings::default(),
            ledger_version: 0,
            next_seq: 0,
        }
    }
}

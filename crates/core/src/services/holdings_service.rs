use std::collections::HashMap;
use tracing::error;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::holding::{Holding, LedgerDerivation};
use crate::models::instrument::InstrumentId;
use crate::models::transaction::{Transaction, TransactionKind};
use crate::models::vault::Vault;

/// Positions with fewer units than this are treated as fully closed.
pub const UNITS_EPSILON: f64 = 1e-9;

struct CachedDerivation {
    ledger_version: u64,
    derivation: LedgerDerivation,
}

/// Reduces the transaction ledger into current holdings.
///
/// Pure average-cost accounting — a single blended cost per instrument,
/// not per-lot FIFO/LIFO tracking. Holdings are always recomputed from
/// the full history; a small memo keyed by the vault's monotonic ledger
/// version makes repeated reads without new transactions O(1).
pub struct HoldingsService {
    cache: HashMap<Uuid, CachedDerivation>,
}

impl HoldingsService {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    /// Derive a user's holdings from the vault's current ledger.
    ///
    /// Cached per user until the ledger version moves; every mutation
    /// bumps the version, so stale reads are impossible.
    pub fn derive(&mut self, vault: &Vault, user_id: Uuid) -> Result<LedgerDerivation, CoreError> {
        if let Some(cached) = self.cache.get(&user_id) {
            if cached.ledger_version == vault.ledger_version {
                return Ok(cached.derivation.clone());
            }
        }

        let transactions: Vec<&Transaction> = vault
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .collect();
        let derivation = Self::aggregate(&transactions, &vault.settings.base_currency)?;

        self.cache.insert(
            user_id,
            CachedDerivation {
                ledger_version: vault.ledger_version,
                derivation: derivation.clone(),
            },
        );
        Ok(derivation)
    }

    /// Reduce a transaction slice into holdings and dividend totals.
    ///
    /// Entries are processed in chronological order, ties broken by the
    /// ledger-assigned sequence number, so replay is deterministic
    /// regardless of storage order:
    /// - buy: units and cost basis (fees included) accumulate
    /// - sell: units shrink and the basis is relieved at the pre-sell
    ///   average cost; selling more than held fails with
    ///   `InsufficientUnits`
    /// - dividend: units and basis untouched; the cash accumulates into
    ///   the separate dividend totals
    ///
    /// Positions driven to zero units are dropped from the active set;
    /// their history remains in the ledger.
    pub fn aggregate(
        transactions: &[&Transaction],
        base_currency: &str,
    ) -> Result<LedgerDerivation, CoreError> {
        struct Position {
            units: f64,
            cost_basis: f64,
        }

        let mut ordered: Vec<&Transaction> = transactions.to_vec();
        ordered.sort_by_key(|t| (t.occurred_at, t.seq));

        let mut positions: HashMap<InstrumentId, Position> = HashMap::new();
        let mut dividends: HashMap<InstrumentId, f64> = HashMap::new();
        let mut total_dividends = 0.0;

        for tx in ordered {
            if !tx.units.is_finite() || tx.units < 0.0 {
                error!(transaction = %tx.id, units = tx.units, "invalid units reached the aggregator");
                return Err(CoreError::LedgerCorrupted(format!(
                    "transaction {} carries invalid units {}",
                    tx.id, tx.units
                )));
            }

            match tx.kind {
                TransactionKind::Buy => {
                    let position = positions
                        .entry(tx.instrument_id.clone())
                        .or_insert(Position {
                            units: 0.0,
                            cost_basis: 0.0,
                        });
                    position.units += tx.units;
                    position.cost_basis += tx.total_in_base(base_currency);
                }
                TransactionKind::Sell => {
                    let held = positions
                        .get(&tx.instrument_id)
                        .map(|p| p.units)
                        .unwrap_or(0.0);
                    if tx.units > held + UNITS_EPSILON {
                        return Err(CoreError::InsufficientUnits {
                            instrument: tx.instrument_id.to_string(),
                            requested: tx.units,
                            held,
                        });
                    }
                    if let Some(position) = positions.get_mut(&tx.instrument_id) {
                        let average = if position.units > UNITS_EPSILON {
                            position.cost_basis / position.units
                        } else {
                            0.0
                        };
                        position.units -= tx.units;
                        position.cost_basis -= average * tx.units;
                        if position.units <= UNITS_EPSILON {
                            // position closed; history stays in the ledger
                            positions.remove(&tx.instrument_id);
                        }
                    }
                }
                TransactionKind::Dividend => {
                    let amount = tx.total_in_base(base_currency);
                    *dividends.entry(tx.instrument_id.clone()).or_insert(0.0) += amount;
                    total_dividends += amount;
                }
            }
        }

        let holdings = positions
            .into_iter()
            .map(|(id, position)| {
                let average_cost = if position.units > UNITS_EPSILON {
                    position.cost_basis / position.units
                } else {
                    0.0
                };
                (
                    id.clone(),
                    Holding {
                        instrument_id: id,
                        units: position.units,
                        // float noise only; a valid ledger never goes negative
                        cost_basis: position.cost_basis.max(0.0),
                        average_cost,
                    },
                )
            })
            .collect();

        Ok(LedgerDerivation {
            holdings,
            dividends,
            total_dividends,
        })
    }
}

impl Default for HoldingsService {
    fn default() -> Self {
        Self::new()
    }
}

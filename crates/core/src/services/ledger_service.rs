use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::instrument::InstrumentRegistry;
use crate::models::settings::Settings;
use crate::models::transaction::{
    Transaction, TransactionDraft, TransactionFilter, TransactionKind, TransactionPatch,
};
use crate::models::vault::Vault;
use super::holdings_service::HoldingsService;

/// Relative tolerance for the `total == units * price + fees` identity.
const AMOUNT_TOLERANCE: f64 = 1e-6;

/// Manages the append-only transaction ledger.
///
/// Pure business logic — no I/O, no API calls. Appends validate input
/// shape and sell feasibility; corrective amend/remove are owner-only
/// and keep the ledger replayable (a change that would strand a later
/// sell is rejected and rolled back). Every mutation bumps the vault's
/// ledger version so derived-state caches invalidate; nothing else is
/// recomputed eagerly.
pub struct LedgerService;

impl LedgerService {
    pub fn new() -> Self {
        Self
    }

    /// Validate and append a new entry. Returns the committed
    /// transaction with its ledger-assigned id and sequence number.
    ///
    /// A sell that would drive units negative fails with
    /// `InsufficientUnits` and leaves the ledger unchanged.
    pub fn append(
        &self,
        vault: &mut Vault,
        registry: &InstrumentRegistry,
        draft: TransactionDraft,
        now: DateTime<Utc>,
    ) -> Result<Transaction, CoreError> {
        Self::validate(registry, &vault.settings, &draft, now)?;

        let tx = Transaction {
            id: Uuid::new_v4(),
            user_id: draft.user_id,
            instrument_id: draft.instrument_id,
            kind: draft.kind,
            units: draft.units,
            price_per_unit: draft.price_per_unit,
            total_amount: draft.total_amount,
            currency: draft.currency.to_uppercase(),
            exchange_rate_at_entry: draft.exchange_rate_at_entry,
            fees: draft.fees,
            occurred_at: draft.occurred_at,
            seq: vault.next_seq,
            note: draft.note,
            milestone_tag: draft.milestone_tag,
        };

        Self::sorted_insert(&mut vault.transactions, tx.clone());

        // Only a sell can invalidate the ledger (backdated sells included);
        // buys and dividends never reduce holdings.
        if tx.kind == TransactionKind::Sell {
            if let Err(e) = Self::replay_user(vault, tx.user_id) {
                vault.transactions.retain(|t| t.id != tx.id);
                return Err(e);
            }
        }

        vault.next_seq += 1;
        vault.ledger_version += 1;
        Ok(tx)
    }

    /// Append multiple entries at once, all-or-nothing: every draft is
    /// validated against a scratch copy first; if any fails, none are
    /// committed.
    pub fn append_many(
        &self,
        vault: &mut Vault,
        registry: &InstrumentRegistry,
        drafts: Vec<TransactionDraft>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, CoreError> {
        let mut scratch = vault.clone();
        let mut committed = Vec::with_capacity(drafts.len());

        for draft in drafts {
            committed.push(self.append(&mut scratch, registry, draft, now)?);
        }

        *vault = scratch;
        Ok(committed)
    }

    /// All of a user's entries matching the filter, in storage order.
    /// Storage order is not a contract — replay consumers sort by
    /// `(occurred_at, seq)` themselves.
    pub fn list<'a>(
        &self,
        vault: &'a Vault,
        user_id: Uuid,
        filter: &TransactionFilter,
    ) -> Vec<&'a Transaction> {
        vault
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id && filter.matches(t))
            .collect()
    }

    /// Fetch one entry, enforcing ownership.
    pub fn get<'a>(
        &self,
        vault: &'a Vault,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<&'a Transaction, CoreError> {
        let tx = vault
            .transactions
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| CoreError::TransactionNotFound(id.to_string()))?;
        if tx.user_id != user_id {
            return Err(CoreError::NotOwner(id.to_string()));
        }
        Ok(tx)
    }

    /// Remove an entry (owner-only corrective operation).
    ///
    /// Removing a buy that a later sell depends on is rejected and
    /// rolled back, keeping the ledger replayable.
    pub fn remove(
        &self,
        vault: &mut Vault,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Transaction, CoreError> {
        let idx = vault
            .transactions
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| CoreError::TransactionNotFound(id.to_string()))?;
        if vault.transactions[idx].user_id != user_id {
            return Err(CoreError::NotOwner(id.to_string()));
        }

        let removed = vault.transactions.remove(idx);

        if removed.kind == TransactionKind::Buy {
            if let Err(e) = Self::replay_user(vault, user_id) {
                Self::sorted_insert(&mut vault.transactions, removed);
                return Err(e);
            }
        }

        vault.ledger_version += 1;
        Ok(removed)
    }

    /// Amend an entry (owner-only corrective operation). The patched
    /// entry is fully revalidated and the ledger replay-checked; on any
    /// failure the original is restored.
    pub fn amend(
        &self,
        vault: &mut Vault,
        registry: &InstrumentRegistry,
        user_id: Uuid,
        id: Uuid,
        patch: &TransactionPatch,
        now: DateTime<Utc>,
    ) -> Result<Transaction, CoreError> {
        let idx = vault
            .transactions
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| CoreError::TransactionNotFound(id.to_string()))?;
        if vault.transactions[idx].user_id != user_id {
            return Err(CoreError::NotOwner(id.to_string()));
        }

        let original = vault.transactions.remove(idx);
        let updated = patch.apply(&original);

        if let Err(e) = Self::validate(registry, &vault.settings, &(&updated).into(), now) {
            Self::sorted_insert(&mut vault.transactions, original);
            return Err(e);
        }

        Self::sorted_insert(&mut vault.transactions, updated.clone());

        if let Err(e) = Self::replay_user(vault, user_id) {
            vault.transactions.retain(|t| t.id != id);
            Self::sorted_insert(&mut vault.transactions, original);
            return Err(e);
        }

        vault.ledger_version += 1;
        Ok(updated)
    }

    /// Validate an entry's shape before it touches the ledger.
    ///
    /// Rules:
    /// - the instrument must exist in the catalog
    /// - amounts must be recorded in the base or foreign currency; a
    ///   foreign entry must carry the exchange rate captured at entry
    /// - buy/sell: positive units, `total == units * price + fees`
    /// - dividend: zero units, positive cash amount
    /// - `occurred_at` must not be in the future
    fn validate(
        registry: &InstrumentRegistry,
        settings: &Settings,
        draft: &TransactionDraft,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        if !registry.contains(&draft.instrument_id) {
            return Err(CoreError::UnknownInstrument(draft.instrument_id.to_string()));
        }

        let currency = draft.currency.to_uppercase();
        if currency != settings.base_currency && currency != settings.foreign_currency {
            return Err(CoreError::Validation(format!(
                "Currency '{}' is not the reporting currency ({}) or the foreign currency ({})",
                draft.currency, settings.base_currency, settings.foreign_currency
            )));
        }
        if currency == settings.foreign_currency {
            match draft.exchange_rate_at_entry {
                Some(rate) if rate.is_finite() && rate > 0.0 => {}
                _ => {
                    return Err(CoreError::Validation(
                        "Foreign-currency entries must carry a positive exchange rate at entry"
                            .into(),
                    ));
                }
            }
        }

        if !draft.fees.is_finite() || draft.fees < 0.0 {
            return Err(CoreError::Validation(format!(
                "Fees must be non-negative, got {}",
                draft.fees
            )));
        }

        if draft.occurred_at > now {
            return Err(CoreError::Validation(format!(
                "Event date {} is in the future",
                draft.occurred_at
            )));
        }

        if !draft.total_amount.is_finite() || draft.total_amount <= 0.0 {
            return Err(CoreError::Validation(format!(
                "Total amount must be positive, got {}",
                draft.total_amount
            )));
        }

        match draft.kind {
            TransactionKind::Buy | TransactionKind::Sell => {
                if !draft.units.is_finite() || draft.units <= 0.0 {
                    return Err(CoreError::Validation(format!(
                        "Units must be positive for a {}, got {}",
                        draft.kind, draft.units
                    )));
                }
                if !draft.price_per_unit.is_finite() || draft.price_per_unit < 0.0 {
                    return Err(CoreError::Validation(format!(
                        "Price per unit must be non-negative, got {}",
                        draft.price_per_unit
                    )));
                }
                let expected = draft.units * draft.price_per_unit + draft.fees;
                let tolerance = AMOUNT_TOLERANCE * expected.abs().max(1.0);
                if (draft.total_amount - expected).abs() > tolerance {
                    return Err(CoreError::Validation(format!(
                        "Total amount {} does not equal units * price + fees = {}",
                        draft.total_amount, expected
                    )));
                }
            }
            TransactionKind::Dividend => {
                if draft.units != 0.0 {
                    return Err(CoreError::Validation(format!(
                        "Dividends carry no units, got {}",
                        draft.units
                    )));
                }
            }
        }

        Ok(())
    }

    /// Replay a user's full ledger through the aggregator, surfacing
    /// `InsufficientUnits` if any sell exceeds the units held at its
    /// point in history.
    fn replay_user(vault: &Vault, user_id: Uuid) -> Result<(), CoreError> {
        let transactions: Vec<&Transaction> = vault
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .collect();
        HoldingsService::aggregate(&transactions, &vault.settings.base_currency).map(|_| ())
    }

    /// Binary insert into the `(occurred_at, seq)`-sorted ledger in O(log n).
    fn sorted_insert(transactions: &mut Vec<Transaction>, tx: Transaction) {
        let pos = transactions
            .binary_search_by_key(&(tx.occurred_at, tx.seq), |t| (t.occurred_at, t.seq))
            .unwrap_or_else(|pos| pos);
        transactions.insert(pos, tx);
    }
}

impl Default for LedgerService {
    fn default() -> Self {
        Self::new()
    }
}

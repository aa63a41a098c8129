use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::instrument::InstrumentId;

/// Kind of ledger event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Acquiring units of an instrument
    Buy,
    /// Disposing of units
    Sell,
    /// Cash distribution received; carries no units
    Dividend,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionKind::Buy => write!(f, "Buy"),
            TransactionKind::Sell => write!(f, "Sell"),
            TransactionKind::Dividend => write!(f, "Dividend"),
        }
    }
}

/// Sort order for transaction listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionSortOrder {
    /// Newest first (default for display)
    OccurredDesc,
    /// Oldest first
    OccurredAsc,
    /// Largest amount first
    AmountDesc,
    /// Smallest amount first
    AmountAsc,
    /// Alphabetical by instrument id
    InstrumentAsc,
    /// Reverse alphabetical by instrument id
    InstrumentDesc,
}

/// A single committed ledger entry.
///
/// Append-only: once created it is immutable except for corrective
/// amend/remove by the owning user. `id` and `seq` are assigned by the
/// ledger; `seq` is the monotonic tie-breaker when two entries share the
/// same `occurred_at`.
///
/// For buys and sells `total_amount == units * price_per_unit + fees`
/// holds in the recorded currency; for dividends `units == 0` and
/// `total_amount` is the cash received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier
    pub id: Uuid,

    /// Owning user — the ledger is keyed by this
    pub user_id: Uuid,

    /// Which instrument this entry concerns
    pub instrument_id: InstrumentId,

    /// Buy, Sell or Dividend
    pub kind: TransactionKind,

    /// Units moved (always positive for buy/sell, zero for dividends)
    pub units: f64,

    /// Price per unit in the recorded currency (zero for dividends)
    pub price_per_unit: f64,

    /// Total cash amount of the entry in the recorded currency
    pub total_amount: f64,

    /// Currency the amounts are recorded in (base or foreign)
    pub currency: String,

    /// Exchange rate to the base currency captured at entry time.
    /// Required when `currency` is the foreign currency.
    #[serde(default)]
    pub exchange_rate_at_entry: Option<f64>,

    /// Broker/transfer fees, included in cost basis for buys
    #[serde(default)]
    pub fees: f64,

    /// When the event happened (must not be in the future)
    pub occurred_at: DateTime<Utc>,

    /// Ledger-assigned monotonic sequence number; tie-break for equal
    /// `occurred_at` so replay order is deterministic
    pub seq: u64,

    /// Optional free-text note
    #[serde(default)]
    pub note: Option<String>,

    /// Optional milestone label (e.g., "first-birthday")
    #[serde(default)]
    pub milestone_tag: Option<String>,
}

impl Transaction {
    /// The entry's total amount expressed in the base reporting currency.
    ///
    /// Entries recorded in the foreign currency are converted with the
    /// exchange rate captured at entry time. A foreign entry without a
    /// stored rate indicates ledger corruption (validation requires it)
    /// and is surfaced by the aggregator, so this helper degrades to the
    /// raw amount.
    #[must_use]
    pub fn total_in_base(&self, base_currency: &str) -> f64 {
        if self.currency.eq_ignore_ascii_case(base_currency) {
            self.total_amount
        } else {
            match self.exchange_rate_at_entry {
                Some(rate) => self.total_amount * rate,
                None => self.total_amount,
            }
        }
    }
}

/// User input for a new ledger entry, before the ledger assigns identity.
///
/// Built through the kind-specific constructors so the amount identity
/// (`total = units * price + fees`) holds by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDraft {
    pub user_id: Uuid,
    pub instrument_id: InstrumentId,
    pub kind: TransactionKind,
    pub units: f64,
    pub price_per_unit: f64,
    pub total_amount: f64,
    pub currency: String,
    #[serde(default)]
    pub exchange_rate_at_entry: Option<f64>,
    #[serde(default)]
    pub fees: f64,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub milestone_tag: Option<String>,
}

impl TransactionDraft {
    /// A buy of `units` at `price_per_unit`, recorded in the base currency.
    pub fn buy(
        user_id: Uuid,
        instrument_id: InstrumentId,
        units: f64,
        price_per_unit: f64,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            instrument_id,
            kind: TransactionKind::Buy,
            units,
            price_per_unit,
            total_amount: units * price_per_unit,
            currency: super::settings::DEFAULT_BASE_CURRENCY.to_string(),
            exchange_rate_at_entry: None,
            fees: 0.0,
            occurred_at,
            note: None,
            milestone_tag: None,
        }
    }

    /// A sell of `units` at `price_per_unit`, recorded in the base currency.
    pub fn sell(
        user_id: Uuid,
        instrument_id: InstrumentId,
        units: f64,
        price_per_unit: f64,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: TransactionKind::Sell,
            ..Self::buy(user_id, instrument_id, units, price_per_unit, occurred_at)
        }
    }

    /// A cash dividend of `amount`, recorded in the base currency.
    pub fn dividend(
        user_id: Uuid,
        instrument_id: InstrumentId,
        amount: f64,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            instrument_id,
            kind: TransactionKind::Dividend,
            units: 0.0,
            price_per_unit: 0.0,
            total_amount: amount,
            currency: super::settings::DEFAULT_BASE_CURRENCY.to_string(),
            exchange_rate_at_entry: None,
            fees: 0.0,
            occurred_at,
            note: None,
            milestone_tag: None,
        }
    }

    /// Add fees to a buy/sell; the total is restated to keep the amount
    /// identity intact.
    #[must_use]
    pub fn with_fees(mut self, fees: f64) -> Self {
        self.fees = fees;
        if self.kind != TransactionKind::Dividend {
            self.total_amount = self.units * self.price_per_unit + fees;
        }
        self
    }

    /// Record the entry in the foreign currency, capturing the exchange
    /// rate to the base currency at entry time.
    #[must_use]
    pub fn in_foreign_currency(mut self, currency: impl Into<String>, rate_to_base: f64) -> Self {
        self.currency = currency.into().to_uppercase();
        self.exchange_rate_at_entry = Some(rate_to_base);
        self
    }

    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    #[must_use]
    pub fn with_milestone(mut self, tag: impl Into<String>) -> Self {
        self.milestone_tag = Some(tag.into());
        self
    }
}

impl From<&Transaction> for TransactionDraft {
    fn from(tx: &Transaction) -> Self {
        Self {
            user_id: tx.user_id,
            instrument_id: tx.instrument_id.clone(),
            kind: tx.kind,
            units: tx.units,
            price_per_unit: tx.price_per_unit,
            total_amount: tx.total_amount,
            currency: tx.currency.clone(),
            exchange_rate_at_entry: tx.exchange_rate_at_entry,
            fees: tx.fees,
            occurred_at: tx.occurred_at,
            note: tx.note.clone(),
            milestone_tag: tx.milestone_tag.clone(),
        }
    }
}

/// Corrective changes to an existing entry. `None` fields are untouched.
///
/// For buys/sells the total is recomputed from the patched components
/// unless `total_amount` is set explicitly.
#[derive(Debug, Clone, Default)]
pub struct TransactionPatch {
    pub units: Option<f64>,
    pub price_per_unit: Option<f64>,
    pub total_amount: Option<f64>,
    pub fees: Option<f64>,
    pub occurred_at: Option<DateTime<Utc>>,
    /// `Some(None)` clears the note
    pub note: Option<Option<String>>,
    /// `Some(None)` clears the milestone tag
    pub milestone_tag: Option<Option<String>>,
}

impl TransactionPatch {
    /// Apply this patch to a copy of `original`, preserving id, seq and
    /// ownership.
    #[must_use]
    pub fn apply(&self, original: &Transaction) -> Transaction {
        let mut updated = original.clone();
        if let Some(units) = self.units {
            updated.units = units;
        }
        if let Some(price) = self.price_per_unit {
            updated.price_per_unit = price;
        }
        if let Some(fees) = self.fees {
            updated.fees = fees;
        }
        if let Some(at) = self.occurred_at {
            updated.occurred_at = at;
        }
        if let Some(ref note) = self.note {
            updated.note = note.clone();
        }
        if let Some(ref tag) = self.milestone_tag {
            updated.milestone_tag = tag.clone();
        }
        updated.total_amount = match self.total_amount {
            Some(total) => total,
            None if updated.kind != TransactionKind::Dividend => {
                updated.units * updated.price_per_unit + updated.fees
            }
            None => updated.total_amount,
        };
        updated
    }
}

/// Optional filters for transaction listings.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub instrument_id: Option<InstrumentId>,
    pub kind: Option<TransactionKind>,
    /// Inclusive lower bound on `occurred_at`
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `occurred_at`
    pub to: Option<DateTime<Utc>>,
}

impl TransactionFilter {
    #[must_use]
    pub fn matches(&self, tx: &Transaction) -> bool {
        if let Some(ref id) = self.instrument_id {
            if &tx.instrument_id != id {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if tx.kind != kind {
                return false;
            }
        }
        if let Some(from) = self.from {
            if tx.occurred_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if tx.occurred_at > to {
                return false;
            }
        }
        true
    }
}

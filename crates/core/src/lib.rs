pub mod errors;
pub mod models;
pub mod providers;
pub mod services;
pub mod storage;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use models::{
    holding::Holding,
    instrument::{Instrument, InstrumentId, InstrumentRegistry},
    quote::{PriceQuote, QuoteSource},
    settings::Settings,
    snapshot::{PortfolioSnapshot, SnapshotKind},
    transaction::{
        Transaction, TransactionDraft, TransactionFilter, TransactionPatch, TransactionSortOrder,
    },
    valuation::PortfolioValuation,
    vault::Vault,
};
use providers::{
    alphavantage::AlphaVantageProvider,
    frankfurter::FrankfurterProvider,
    traits::{QuoteProvider, RateProvider},
};
use services::{
    holdings_service::HoldingsService,
    ledger_service::LedgerService,
    refresh_service::{RefreshOutcome, RefreshService},
    snapshot_service::SnapshotService,
    valuation_service::ValuationService,
};
use storage::manager::StorageManager;

use errors::CoreError;

/// Main entry point for the Semilla core library.
///
/// Owns the vault (ledger, snapshots, quote cache, settings) and wires
/// the services that operate on it. Every ledger, aggregation, and
/// valuation call takes the acting `user_id` explicitly — there is no
/// ambient current-user — and valuation reads prices through an
/// injected lookup, never another component's internals.
#[must_use]
pub struct SemillaTracker {
    vault: Vault,
    registry: InstrumentRegistry,
    ledger_service: LedgerService,
    holdings_service: HoldingsService,
    refresh_service: RefreshService,
    valuation_service: ValuationService,
    snapshot_service: SnapshotService,
    quote_provider: Option<Box<dyn QuoteProvider>>,
    rate_provider: Box<dyn RateProvider>,
    /// Tracks whether any mutation has occurred since the last save/load.
    dirty: bool,
}

impl std::fmt::Debug for SemillaTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemillaTracker")
            .field("transactions", &self.vault.transactions.len())
            .field("snapshots", &self.vault.snapshots.len())
            .field("cached_quotes", &self.vault.quote_cache.len())
            .field("settings", &self.vault.settings)
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl SemillaTracker {
    /// Create a brand new empty vault with default settings and the
    /// default instrument universe.
    pub fn create_new() -> Self {
        Self::build(Vault::default())
    }

    /// Load an existing vault from encrypted bytes (password required).
    /// Use this for WASM / Tauri where the frontend handles file I/O.
    pub fn load_from_bytes(encrypted: &[u8], password: &str) -> Result<Self, CoreError> {
        let vault = StorageManager::load_from_bytes(encrypted, password)?;
        Ok(Self::build(vault))
    }

    /// Save the current vault to encrypted bytes.
    /// Returns raw bytes that the frontend can write to a file.
    /// Clears the unsaved-changes flag on success.
    pub fn save_to_bytes(&mut self, password: &str) -> Result<Vec<u8>, CoreError> {
        let bytes = StorageManager::save_to_bytes(&self.vault, password)?;
        self.dirty = false;
        Ok(bytes)
    }

    /// Load from an encrypted file on disk (native only, not WASM).
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_from_file(path: &str, password: &str) -> Result<Self, CoreError> {
        let vault = StorageManager::load_from_file(path, password)?;
        Ok(Self::build(vault))
    }

    /// Save to an encrypted file on disk (native only).
    /// Clears the unsaved-changes flag on success.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn save_to_file(&mut self, path: &str, password: &str) -> Result<(), CoreError> {
        StorageManager::save_to_file(&self.vault, path, password)?;
        self.dirty = false;
        Ok(())
    }

    /// Replace the market-data providers (dependency injection seam —
    /// tests plug mocks in here).
    pub fn with_providers(
        mut self,
        quote_provider: Option<Box<dyn QuoteProvider>>,
        rate_provider: Box<dyn RateProvider>,
    ) -> Self {
        self.quote_provider = quote_provider;
        self.rate_provider = rate_provider;
        self
    }

    // ── Ledger ──────────────────────────────────────────────────────

    /// Validate and append one transaction to the ledger.
    /// Returns the committed entry with its assigned id.
    pub fn record_transaction(&mut self, draft: TransactionDraft) -> Result<Transaction, CoreError> {
        let tx = self
            .ledger_service
            .append(&mut self.vault, &self.registry, draft, Utc::now())?;
        self.dirty = true;
        Ok(tx)
    }

    /// Append multiple transactions at once. All drafts are validated
    /// first; if any fails, none are committed (all-or-nothing).
    pub fn record_transactions(
        &mut self,
        drafts: Vec<TransactionDraft>,
    ) -> Result<Vec<Transaction>, CoreError> {
        let txs =
            self.ledger_service
                .append_many(&mut self.vault, &self.registry, drafts, Utc::now())?;
        self.dirty = true;
        Ok(txs)
    }

    /// Correct an existing entry (owner-only). The patched entry is
    /// fully revalidated before committing.
    pub fn amend_transaction(
        &mut self,
        user_id: Uuid,
        transaction_id: Uuid,
        patch: &TransactionPatch,
    ) -> Result<Transaction, CoreError> {
        let tx = self.ledger_service.amend(
            &mut self.vault,
            &self.registry,
            user_id,
            transaction_id,
            patch,
            Utc::now(),
        )?;
        self.dirty = true;
        Ok(tx)
    }

    /// Remove an entry (owner-only). Removal that would strand a later
    /// sell is rejected.
    pub fn remove_transaction(
        &mut self,
        user_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Transaction, CoreError> {
        let tx = self
            .ledger_service
            .remove(&mut self.vault, user_id, transaction_id)?;
        self.dirty = true;
        Ok(tx)
    }

    /// Get a single entry by id (owner-only).
    pub fn get_transaction(
        &self,
        user_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<&Transaction, CoreError> {
        self.ledger_service.get(&self.vault, user_id, transaction_id)
    }

    /// All of a user's entries, newest first.
    #[must_use]
    pub fn get_transactions(&self, user_id: Uuid) -> Vec<&Transaction> {
        let mut txs = self
            .ledger_service
            .list(&self.vault, user_id, &TransactionFilter::default());
        txs.sort_by(|a, b| (b.occurred_at, b.seq).cmp(&(a.occurred_at, a.seq)));
        txs
    }

    /// A user's entries matching a filter, newest first.
    #[must_use]
    pub fn get_transactions_filtered(
        &self,
        user_id: Uuid,
        filter: &TransactionFilter,
    ) -> Vec<&Transaction> {
        let mut txs = self.ledger_service.list(&self.vault, user_id, filter);
        txs.sort_by(|a, b| (b.occurred_at, b.seq).cmp(&(a.occurred_at, a.seq)));
        txs
    }

    /// A user's entries in a specific sort order.
    #[must_use]
    pub fn get_transactions_sorted(
        &self,
        user_id: Uuid,
        order: &TransactionSortOrder,
    ) -> Vec<&Transaction> {
        let mut txs = self
            .ledger_service
            .list(&self.vault, user_id, &TransactionFilter::default());
        match order {
            TransactionSortOrder::OccurredDesc => {
                txs.sort_by(|a, b| (b.occurred_at, b.seq).cmp(&(a.occurred_at, a.seq)));
            }
            TransactionSortOrder::OccurredAsc => {
                txs.sort_by(|a, b| (a.occurred_at, a.seq).cmp(&(b.occurred_at, b.seq)));
            }
            TransactionSortOrder::AmountDesc => txs.sort_by(|a, b| {
                b.total_amount
                    .partial_cmp(&a.total_amount)
                    .unwrap_or(std::cmp::Ordering::Equal)
            }),
            TransactionSortOrder::AmountAsc => txs.sort_by(|a, b| {
                a.total_amount
                    .partial_cmp(&b.total_amount)
                    .unwrap_or(std::cmp::Ordering::Equal)
            }),
            TransactionSortOrder::InstrumentAsc => {
                txs.sort_by(|a, b| a.instrument_id.cmp(&b.instrument_id));
            }
            TransactionSortOrder::InstrumentDesc => {
                txs.sort_by(|a, b| b.instrument_id.cmp(&a.instrument_id));
            }
        }
        txs
    }

    /// Number of ledger entries for a user.
    #[must_use]
    pub fn transaction_count(&self, user_id: Uuid) -> usize {
        self.vault
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .count()
    }

    /// When the user's first contribution happened, if any.
    #[must_use]
    pub fn earliest_transaction_at(&self, user_id: Uuid) -> Option<DateTime<Utc>> {
        self.vault
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(|t| t.occurred_at)
            .min()
    }

    /// When the user's most recent contribution happened, if any.
    #[must_use]
    pub fn latest_transaction_at(&self, user_id: Uuid) -> Option<DateTime<Utc>> {
        self.vault
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(|t| t.occurred_at)
            .max()
    }

    // ── Holdings & Valuation ────────────────────────────────────────

    /// Current holdings derived from the user's full ledger, sorted by
    /// instrument id. Positions sold down to zero are not included.
    pub fn holdings(&mut self, user_id: Uuid) -> Result<Vec<Holding>, CoreError> {
        let derivation = self.holdings_service.derive(&self.vault, user_id)?;
        Ok(derivation.holdings_sorted().into_iter().cloned().collect())
    }

    /// Total dividend cash the user has received, in the base currency.
    pub fn total_dividends(&mut self, user_id: Uuid) -> Result<f64, CoreError> {
        let derivation = self.holdings_service.derive(&self.vault, user_id)?;
        Ok(derivation.total_dividends)
    }

    /// Full portfolio valuation from the currently persisted ledger and
    /// cached prices. Unpriced instruments contribute zero value; they
    /// never fail the valuation.
    pub fn portfolio_valuation(&mut self, user_id: Uuid) -> Result<PortfolioValuation, CoreError> {
        let derivation = self.holdings_service.derive(&self.vault, user_id)?;
        Ok(self.valuation_service.valuate(
            &derivation,
            &self.vault.quote_cache,
            &self.registry,
            &self.vault.settings.base_currency,
            Utc::now(),
        ))
    }

    // ── Price Refresh ───────────────────────────────────────────────

    /// Refresh quotes if the daily cutoff gate says one is due.
    /// Returns `None` when prices are already fresh for today.
    pub async fn refresh_prices(&mut self) -> Option<RefreshOutcome> {
        let now = Utc::now();
        if !RefreshService::is_refresh_due(
            self.vault.quote_cache.last_refreshed_at,
            now,
            self.vault.settings.refresh_cutoff_hour,
        ) {
            return None;
        }
        Some(self.force_refresh_prices().await)
    }

    /// Refresh quotes unconditionally, bypassing the daily gate.
    ///
    /// Partial failures are collected in the outcome, never thrown;
    /// instruments whose fetch failed keep their last known-good quote.
    pub async fn force_refresh_prices(&mut self) -> RefreshOutcome {
        let now = Utc::now();
        let settings = self.vault.settings.clone();
        let outcome = self
            .refresh_service
            .refresh(
                self.registry.all(),
                self.quote_provider.as_deref(),
                self.rate_provider.as_ref(),
                &mut self.vault.quote_cache,
                &settings,
                now,
            )
            .await;

        if outcome.quotes_updated > 0 || outcome.exchange_rate.is_some() {
            // Successful fetches become the new fallback reference prices.
            for instrument in self.registry.all().to_vec() {
                if let Some(quote) = self.vault.quote_cache.get(&instrument.id) {
                    if quote.fetched_at == outcome.fetched_at {
                        self.registry.update_reference_price(
                            &instrument.id,
                            quote.price_in_base,
                            quote.fetched_at,
                        );
                    }
                }
            }
            self.dirty = true;
        }

        outcome
    }

    /// Insert a hand-entered quote (offline use, historical import).
    pub fn set_manual_quote(
        &mut self,
        instrument_id: &InstrumentId,
        price_in_base: f64,
    ) -> Result<(), CoreError> {
        if !self.registry.contains(instrument_id) {
            return Err(CoreError::UnknownInstrument(instrument_id.to_string()));
        }
        if !price_in_base.is_finite() || price_in_base < 0.0 {
            return Err(CoreError::Validation(format!(
                "Manual quote must be finite and non-negative, got {price_in_base}"
            )));
        }
        self.vault.quote_cache.merge_quote(PriceQuote {
            instrument_id: instrument_id.clone(),
            price_in_base,
            price_in_foreign: None,
            change_pct: 0.0,
            fetched_at: Utc::now(),
            source: QuoteSource::Manual,
        });
        self.dirty = true;
        Ok(())
    }

    /// Latest cached quote for an instrument.
    #[must_use]
    pub fn get_quote(&self, instrument_id: &InstrumentId) -> Option<&PriceQuote> {
        self.vault.quote_cache.get(instrument_id)
    }

    /// Last known foreign→base exchange rate.
    #[must_use]
    pub fn exchange_rate(&self) -> Option<f64> {
        self.vault.quote_cache.exchange_rate
    }

    /// When a refresh last updated the quote cache.
    #[must_use]
    pub fn last_refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.vault.quote_cache.last_refreshed_at
    }

    /// Drop all cached market data.
    pub fn clear_quote_cache(&mut self) {
        self.vault.quote_cache.clear();
        self.dirty = true;
    }

    // ── Snapshots ───────────────────────────────────────────────────

    /// Capture an immutable snapshot of the user's portfolio, derived
    /// from a fresh aggregate + valuate pass. An empty portfolio yields
    /// a valid zero-valued snapshot.
    pub fn take_snapshot(
        &mut self,
        user_id: Uuid,
        kind: SnapshotKind,
    ) -> Result<PortfolioSnapshot, CoreError> {
        let now = Utc::now();
        let derivation = self.holdings_service.derive(&self.vault, user_id)?;
        let valuation = self.valuation_service.valuate(
            &derivation,
            &self.vault.quote_cache,
            &self.registry,
            &self.vault.settings.base_currency,
            now,
        );
        let snapshot = self
            .snapshot_service
            .take(&mut self.vault, user_id, kind, &valuation, now);
        self.dirty = true;
        Ok(snapshot)
    }

    /// A user's snapshots, oldest first.
    #[must_use]
    pub fn snapshots(&self, user_id: Uuid) -> Vec<&PortfolioSnapshot> {
        self.snapshot_service.list(&self.vault, user_id)
    }

    // ── Instruments ─────────────────────────────────────────────────

    /// The instrument catalog.
    #[must_use]
    pub fn instruments(&self) -> &[Instrument] {
        self.registry.all()
    }

    /// Look up one instrument.
    #[must_use]
    pub fn instrument(&self, id: &InstrumentId) -> Option<&Instrument> {
        self.registry.get(id)
    }

    /// Add (or replace) an instrument in the catalog.
    pub fn register_instrument(&mut self, instrument: Instrument) {
        self.registry.register(instrument);
    }

    // ── Settings ────────────────────────────────────────────────────

    /// Current settings.
    #[must_use]
    pub fn get_settings(&self) -> &Settings {
        &self.vault.settings
    }

    /// Set the base reporting currency (3 ASCII letters). Clears the
    /// quote cache: cached prices are denominated in the old base.
    pub fn set_base_currency(&mut self, currency: String) -> Result<(), CoreError> {
        let trimmed = currency.trim().to_uppercase();
        if trimmed.len() != 3 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CoreError::Validation(format!(
                "Invalid currency code '{currency}': must be exactly 3 ASCII letters (e.g., COP, USD)"
            )));
        }
        self.vault.settings.base_currency = trimmed;
        self.vault.quote_cache.clear();
        self.dirty = true;
        Ok(())
    }

    /// Set the daily refresh cutoff hour (0–23).
    pub fn set_refresh_cutoff_hour(&mut self, hour: u32) -> Result<(), CoreError> {
        if hour > 23 {
            return Err(CoreError::Validation(format!(
                "Cutoff hour must be 0–23, got {hour}"
            )));
        }
        self.vault.settings.refresh_cutoff_hour = hour;
        self.dirty = true;
        Ok(())
    }

    /// Set an API key for a provider (e.g., "alphavantage").
    /// Rebuilds the quote provider so the new key takes effect immediately.
    pub fn set_api_key(&mut self, provider: String, key: String) {
        self.vault.settings.api_keys.insert(provider, key);
        self.quote_provider = Self::build_quote_provider(&self.vault.settings);
        self.dirty = true;
    }

    /// Remove an API key. With no key configured, price refreshes become
    /// no-ops that report `NotConfigured`.
    pub fn remove_api_key(&mut self, provider: &str) -> bool {
        let removed = self.vault.settings.api_keys.remove(provider).is_some();
        if removed {
            self.quote_provider = Self::build_quote_provider(&self.vault.settings);
            self.dirty = true;
        }
        removed
    }

    // ── Password & Dirty State ──────────────────────────────────────

    /// Re-encrypt the vault with a new password.
    /// Returns the encrypted bytes. The caller should write them to storage.
    ///
    /// `last_saved_bytes` must be the most recently saved encrypted
    /// bytes for this vault. The current password is verified by
    /// decrypting them; on failure returns `CoreError::Decryption`.
    pub fn change_password(
        &mut self,
        last_saved_bytes: &[u8],
        current_password: &str,
        new_password: &str,
    ) -> Result<Vec<u8>, CoreError> {
        StorageManager::load_from_bytes(last_saved_bytes, current_password)?;
        let new_bytes = StorageManager::save_to_bytes(&self.vault, new_password)?;
        self.dirty = false;
        Ok(new_bytes)
    }

    /// Returns `true` if the vault has been modified since the last
    /// save or load.
    #[must_use]
    pub fn has_unsaved_changes(&self) -> bool {
        self.dirty
    }

    // ── Export / Import ─────────────────────────────────────────────

    /// Export a user's transactions as a JSON string.
    pub fn export_transactions_to_json(&self, user_id: Uuid) -> Result<String, CoreError> {
        let txs: Vec<&Transaction> = self
            .vault
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .collect();
        serde_json::to_string_pretty(&txs).map_err(|e| {
            CoreError::Serialization(format!("Failed to serialize transactions to JSON: {e}"))
        })
    }

    /// Export a user's transactions as a CSV string.
    /// Columns: id, kind, instrument, units, price_per_unit, total_amount,
    /// currency, fees, occurred_at, milestone_tag, note
    #[must_use]
    pub fn export_transactions_to_csv(&self, user_id: Uuid) -> String {
        let mut csv = String::from(
            "id,kind,instrument,units,price_per_unit,total_amount,currency,fees,occurred_at,milestone_tag,note\n",
        );
        for tx in self
            .vault
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
        {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{},{}\n",
                tx.id,
                tx.kind,
                tx.instrument_id,
                tx.units,
                tx.price_per_unit,
                tx.total_amount,
                tx.currency,
                tx.fees,
                tx.occurred_at.to_rfc3339(),
                escape_csv_field(tx.milestone_tag.as_deref().unwrap_or("")),
                escape_csv_field(tx.note.as_deref().unwrap_or("")),
            ));
        }
        csv
    }

    /// Import transactions from a JSON string of drafts. Each draft is
    /// revalidated and recorded under `user_id` (all-or-nothing).
    /// Returns the number of entries imported.
    pub fn import_transactions_from_json(
        &mut self,
        user_id: Uuid,
        json: &str,
    ) -> Result<usize, CoreError> {
        let mut drafts: Vec<TransactionDraft> = serde_json::from_str(json)?;
        for draft in &mut drafts {
            draft.user_id = user_id;
        }
        let count = drafts.len();
        self.record_transactions(drafts)?;
        Ok(count)
    }

    /// Export the full vault as JSON (unencrypted dump for debugging).
    pub fn to_json(&self) -> Result<String, CoreError> {
        serde_json::to_string_pretty(&self.vault)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize vault: {e}")))
    }

    // ── Internal ────────────────────────────────────────────────────

    fn build(vault: Vault) -> Self {
        let quote_provider = Self::build_quote_provider(&vault.settings);
        Self {
            vault,
            registry: InstrumentRegistry::with_default_universe(),
            ledger_service: LedgerService::new(),
            holdings_service: HoldingsService::new(),
            refresh_service: RefreshService::new(),
            valuation_service: ValuationService::new(),
            snapshot_service: SnapshotService::new(),
            quote_provider,
            rate_provider: Box::new(FrankfurterProvider::new()),
            dirty: false,
        }
    }

    fn build_quote_provider(settings: &Settings) -> Option<Box<dyn QuoteProvider>> {
        settings
            .api_keys
            .get("alphavantage")
            .map(|key| Box::new(AlphaVantageProvider::new(key.clone())) as Box<dyn QuoteProvider>)
    }
}

/// Quote CSV fields containing commas, quotes, or newlines.
fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

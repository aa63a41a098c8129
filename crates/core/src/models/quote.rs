use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::instrument::InstrumentId;

/// Where a cached quote came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuoteSource {
    /// Fetched from the live quote provider
    Live,
    /// Entered by hand (offline use, historical import)
    Manual,
    /// A previously live quote kept after a failed refresh
    StaleFallback,
}

impl std::fmt::Display for QuoteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuoteSource::Live => write!(f, "Live"),
            QuoteSource::Manual => write!(f, "Manual"),
            QuoteSource::StaleFallback => write!(f, "StaleFallback"),
        }
    }
}

/// Latest known market price for one instrument.
///
/// Ephemeral cache data, never ledger truth: replaced per instrument on
/// each successful refresh, persisted only so valuations work offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub instrument_id: InstrumentId,

    /// Price per unit in the base reporting currency
    pub price_in_base: f64,

    /// Price per unit in the instrument's own currency, when that is the
    /// foreign currency
    #[serde(default)]
    pub price_in_foreign: Option<f64>,

    /// Day-over-day change reported by the provider, in percent
    pub change_pct: f64,

    /// When this quote was obtained
    pub fetched_at: DateTime<Utc>,

    pub source: QuoteSource,
}

/// Read capability handed to the valuation engine.
///
/// Valuation depends on this seam instead of reaching into the cache
/// type directly, so tests and alternative price sources plug in without
/// touching the engine.
pub trait PriceLookup {
    /// Latest cached quote for an instrument, if any.
    fn quote(&self, id: &InstrumentId) -> Option<&PriceQuote>;
}

/// Cache of the latest quote per instrument plus the foreign-exchange
/// rate, persisted inside the vault.
///
/// Merge discipline: always forward in time. A refresh result is applied
/// per instrument and only if it is not older than what is already
/// cached, so a response that completes after the user moved on can
/// never clobber newer data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteCache {
    /// Latest quote per instrument
    pub quotes: HashMap<InstrumentId, PriceQuote>,

    /// Last known foreign→base exchange rate
    #[serde(default)]
    pub exchange_rate: Option<f64>,

    /// When the exchange rate was last fetched
    #[serde(default)]
    pub exchange_rate_fetched_at: Option<DateTime<Utc>>,

    /// When a refresh last updated anything in this cache.
    /// The refresh gate's "already done for today" check keys off this.
    #[serde(default)]
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

impl QuoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cached quote for an instrument.
    #[must_use]
    pub fn get(&self, id: &InstrumentId) -> Option<&PriceQuote> {
        self.quotes.get(id)
    }

    /// Merge one quote forward in time. Returns `false` (and leaves the
    /// cache untouched) if a newer quote for the instrument is already
    /// cached.
    pub fn merge_quote(&mut self, quote: PriceQuote) -> bool {
        match self.quotes.get(&quote.instrument_id) {
            Some(existing) if existing.fetched_at > quote.fetched_at => false,
            _ => {
                self.quotes.insert(quote.instrument_id.clone(), quote);
                true
            }
        }
    }

    /// Downgrade an instrument's cached quote to `StaleFallback` after a
    /// failed refresh, keeping its last known-good price.
    pub fn mark_stale(&mut self, id: &InstrumentId) {
        if let Some(quote) = self.quotes.get_mut(id) {
            quote.source = QuoteSource::StaleFallback;
        }
    }

    /// Record the exchange rate, forward-only in time.
    pub fn set_exchange_rate(&mut self, rate: f64, fetched_at: DateTime<Utc>) -> bool {
        match self.exchange_rate_fetched_at {
            Some(existing) if existing > fetched_at => false,
            _ => {
                self.exchange_rate = Some(rate);
                self.exchange_rate_fetched_at = Some(fetched_at);
                true
            }
        }
    }

    /// Record that a refresh ran, forward-only in time.
    pub fn mark_refreshed(&mut self, at: DateTime<Utc>) {
        match self.last_refreshed_at {
            Some(existing) if existing > at => {}
            _ => self.last_refreshed_at = Some(at),
        }
    }

    /// Number of instruments with a cached quote.
    #[must_use]
    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// Drop all cached quotes and rate data.
    pub fn clear(&mut self) {
        self.quotes.clear();
        self.exchange_rate = None;
        self.exchange_rate_fetched_at = None;
        self.last_refreshed_at = None;
    }
}

impl PriceLookup for QuoteCache {
    fn quote(&self, id: &InstrumentId) -> Option<&PriceQuote> {
        self.get(id)
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of an instrument in the catalog, uppercased (e.g., "ICOLCAP").
///
/// **Equality and hashing** are based on the normalized id string, so the
/// same instrument referenced with different casing resolves to one key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstrumentId(String);

impl InstrumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tradable instrument in the bounded catalog (ETF-like).
///
/// Immutable except for the reference-price fields, which track the
/// last successfully fetched price and serve as the valuation fallback
/// when no cached quote is available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    /// Catalog identity
    pub id: InstrumentId,

    /// Exchange ticker used when querying the quote provider
    pub ticker: String,

    /// Human-readable name shown to the parent (e.g., "iShares COLCAP")
    pub display_name: String,

    /// Currency the instrument trades in ("COP" or "USD")
    pub currency: String,

    /// Last-known price **in the base reporting currency**.
    /// Seeded from the catalog, refreshed after each successful fetch.
    pub reference_price: f64,

    /// When the reference price was last refreshed. `None` means the
    /// catalog seed value has never been updated from a live quote.
    #[serde(default)]
    pub reference_price_at: Option<DateTime<Utc>>,
}

impl Instrument {
    pub fn new(
        id: impl Into<String>,
        ticker: impl Into<String>,
        display_name: impl Into<String>,
        currency: impl Into<String>,
        reference_price: f64,
    ) -> Self {
        Self {
            id: InstrumentId::new(id),
            ticker: ticker.into().to_uppercase(),
            display_name: display_name.into(),
            currency: currency.into().to_uppercase(),
            reference_price,
            reference_price_at: None,
        }
    }
}

/// Bounded catalog of tradable instruments.
///
/// Static/configurable: ships with the default child-portfolio universe,
/// and callers may register additional instruments. Lookup is by id.
pub struct InstrumentRegistry {
    instruments: Vec<Instrument>,
}

impl InstrumentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            instruments: Vec::new(),
        }
    }

    /// Create a registry with the default instrument universe.
    ///
    /// Reference prices are catalog seeds in COP, replaced by live data
    /// after the first successful refresh.
    pub fn with_default_universe() -> Self {
        let mut registry = Self::new();
        registry.register(Instrument::new(
            "ICOLCAP",
            "ICOLCAP",
            "iShares COLCAP",
            "COP",
            17_350.0,
        ));
        registry.register(Instrument::new(
            "VOO",
            "VOO",
            "Vanguard S&P 500 ETF",
            "USD",
            2_245_000.0,
        ));
        registry.register(Instrument::new(
            "VT",
            "VT",
            "Vanguard Total World Stock ETF",
            "USD",
            512_000.0,
        ));
        registry.register(Instrument::new(
            "GLD",
            "GLD",
            "SPDR Gold Shares",
            "USD",
            1_228_000.0,
        ));
        registry
    }

    /// Register an instrument. An existing instrument with the same id
    /// is replaced.
    pub fn register(&mut self, instrument: Instrument) {
        match self.instruments.iter().position(|i| i.id == instrument.id) {
            Some(idx) => self.instruments[idx] = instrument,
            None => self.instruments.push(instrument),
        }
    }

    /// Look up an instrument by id.
    #[must_use]
    pub fn get(&self, id: &InstrumentId) -> Option<&Instrument> {
        self.instruments.iter().find(|i| &i.id == id)
    }

    /// Whether the catalog contains an instrument with this id.
    #[must_use]
    pub fn contains(&self, id: &InstrumentId) -> bool {
        self.get(id).is_some()
    }

    /// All instruments in registration order.
    #[must_use]
    pub fn all(&self) -> &[Instrument] {
        &self.instruments
    }

    /// Number of instruments in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// Update the fallback reference price after a successful live fetch.
    /// Returns `false` if the instrument is not in the catalog.
    pub fn update_reference_price(
        &mut self,
        id: &InstrumentId,
        price_in_base: f64,
        at: DateTime<Utc>,
    ) -> bool {
        match self.instruments.iter_mut().find(|i| &i.id == id) {
            Some(instrument) => {
                instrument.reference_price = price_in_base;
                instrument.reference_price_at = Some(at);
                true
            }
            None => false,
        }
    }
}

impl Default for InstrumentRegistry {
    fn default() -> Self {
        Self::with_default_universe()
    }
}

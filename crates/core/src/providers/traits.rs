use async_trait::async_trait;

use crate::errors::CoreError;

/// Raw quote as returned by a market-data provider, in the instrument's
/// own trading currency.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentQuote {
    /// Latest price per unit
    pub price: f64,

    /// Day-over-day change in percent
    pub change_pct: f64,
}

/// Source of instrument quotes (SOLID: Dependency Inversion).
///
/// The refresh gate talks to this seam, never to a concrete API client,
/// so a provider change touches one implementation and tests run against
/// mocks.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait QuoteProvider: Send + Sync {
    /// Human-readable name of this provider (for logs/errors).
    fn name(&self) -> &str;

    /// Fetch the latest quote for one ticker.
    async fn fetch_quote(&self, ticker: &str) -> Result<InstrumentQuote, CoreError>;
}

/// Source of foreign-exchange rates.
///
/// Kept separate from [`QuoteProvider`]: the FX fetch and the
/// per-instrument fetches are independent failure domains.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait RateProvider: Send + Sync {
    /// Human-readable name of this provider (for logs/errors).
    fn name(&self) -> &str;

    /// Latest exchange rate: how many units of `to` one unit of `from`
    /// buys.
    async fn fetch_rate(&self, from: &str, to: &str) -> Result<f64, CoreError>;
}

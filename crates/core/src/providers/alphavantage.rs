use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;

use crate::errors::CoreError;
use super::traits::{InstrumentQuote, QuoteProvider};

const BASE_URL: &str = "https://www.alphavantage.co/query";

/// Alpha Vantage API provider for ETF/equity quotes.
///
/// - **Free tier**: 25 requests/day (across ALL endpoints).
/// - **Requires**: API key (set via settings as "alphavantage").
/// - **Coverage**: 100k+ global symbols.
/// - **Strategy**: one GLOBAL_QUOTE call per instrument per refresh; the
///   daily cutoff gate keeps usage inside the free tier.
///
/// Returns prices in the instrument's native currency. Conversion to the
/// base reporting currency happens in the refresh gate.
pub struct AlphaVantageProvider {
    client: Client,
    api_key: String,
}

impl AlphaVantageProvider {
    pub fn new(api_key: String) -> Self {
        let builder = Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(Duration::from_secs(30));
        Self {
            client: builder.build().unwrap_or_else(|_| Client::new()),
            api_key,
        }
    }
}

// ── Alpha Vantage API response types ────────────────────────────────

#[derive(Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
}

#[derive(Deserialize)]
struct GlobalQuote {
    #[serde(rename = "05. price")]
    price: Option<String>,

    #[serde(rename = "10. change percent")]
    change_percent: Option<String>,
}

/// Parse Alpha Vantage's percent strings ("0.5724%") into a number.
fn parse_change_pct(raw: Option<&str>) -> f64 {
    raw.map(|s| s.trim().trim_end_matches('%'))
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0)
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl QuoteProvider for AlphaVantageProvider {
    fn name(&self) -> &str {
        "Alpha Vantage"
    }

    async fn fetch_quote(&self, ticker: &str) -> Result<InstrumentQuote, CoreError> {
        let symbol = ticker.to_uppercase();
        let url = format!(
            "{BASE_URL}?function=GLOBAL_QUOTE&symbol={symbol}&apikey={}",
            self.api_key
        );

        let resp: GlobalQuoteResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .json()
            .await
            .map_err(|e| CoreError::Api {
                provider: "Alpha Vantage".into(),
                message: format!("Failed to parse GLOBAL_QUOTE response for {symbol}: {e}"),
            })?;

        // An unknown symbol or an exhausted quota both come back as an
        // empty/missing "Global Quote" object rather than an HTTP error.
        let quote = resp.global_quote.ok_or_else(|| CoreError::Api {
            provider: "Alpha Vantage".into(),
            message: format!("No quote data returned for {symbol} (unknown symbol or rate limit)"),
        })?;

        let price: f64 = quote
            .price
            .as_deref()
            .and_then(|p| p.trim().parse().ok())
            .ok_or_else(|| CoreError::Api {
                provider: "Alpha Vantage".into(),
                message: format!("Missing or unparseable price for {symbol}"),
            })?;

        Ok(InstrumentQuote {
            price,
            change_pct: parse_change_pct(quote.change_percent.as_deref()),
        })
    }
}

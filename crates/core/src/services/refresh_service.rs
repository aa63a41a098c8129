use chrono::{DateTime, Duration, NaiveTime, Utc};
use tracing::warn;

use crate::models::instrument::Instrument;
use crate::models::quote::{PriceQuote, QuoteCache, QuoteSource};
use crate::models::settings::Settings;
use crate::providers::traits::{QuoteProvider, RateProvider};

/// How a refresh attempt concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStatus {
    /// Fetches were attempted; see `errors` for partial failures
    Completed,
    /// No API credential configured — nothing attempted, zero errors
    NotConfigured,
}

/// One failed fetch inside an otherwise usable refresh.
#[derive(Debug, Clone)]
pub struct RefreshError {
    /// What failed: an instrument id, or "exchange-rate"
    pub subject: String,
    pub provider: String,
    pub message: String,
}

/// Result of a refresh pass. Failures are collected, never thrown, so
/// the caller can show "prices may be stale" without losing the rest.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub status: RefreshStatus,
    /// Quotes actually merged into the cache
    pub quotes_updated: usize,
    /// Freshly fetched exchange rate, if the FX fetch succeeded
    pub exchange_rate: Option<f64>,
    pub errors: Vec<RefreshError>,
    pub fetched_at: DateTime<Utc>,
}

/// Time-gated integration with the external price/FX source.
///
/// "Once per day" is anchored to a fixed wall-clock cutoff hour, not a
/// rolling 24h window: a refresh at 07:00 and a check at 23:00 the same
/// day both count as done, while 06:01 the next morning is due again.
pub struct RefreshService;

impl RefreshService {
    pub fn new() -> Self {
        Self
    }

    /// Whether a refresh is due: never fetched, or the last fetch
    /// predates the most recent daily cutoff instant.
    #[must_use]
    pub fn is_refresh_due(
        last_fetched_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        cutoff_hour: u32,
    ) -> bool {
        match last_fetched_at {
            None => true,
            Some(last) => last < Self::most_recent_cutoff(now, cutoff_hour),
        }
    }

    /// The latest cutoff instant at or before `now`: today at
    /// `cutoff_hour:00` if that has passed, otherwise yesterday's.
    fn most_recent_cutoff(now: DateTime<Utc>, cutoff_hour: u32) -> DateTime<Utc> {
        let cutoff_time = NaiveTime::from_hms_opt(cutoff_hour, 0, 0).unwrap_or(NaiveTime::MIN);
        let todays = now.date_naive().and_time(cutoff_time).and_utc();
        if todays <= now {
            todays
        } else {
            todays - Duration::days(1)
        }
    }

    /// Fetch fresh quotes and the exchange rate, merging results into
    /// the cache.
    ///
    /// The FX fetch and each per-instrument fetch are independent
    /// failure domains: one failure never blocks the others, and
    /// partial results are merged — never a wholesale overwrite — so
    /// unaffected instruments keep their last known-good quote (marked
    /// `StaleFallback` when their own fetch failed). Merging is
    /// forward-only in `fetched_at`, so a response completing after the
    /// user moved on cannot clobber newer data.
    ///
    /// With no quote provider configured this is a no-op reporting
    /// `NotConfigured` and zero errors. A refresh in which every fetch
    /// failed does not advance `last_refreshed_at`, leaving the gate
    /// open for a retry the same day.
    pub async fn refresh(
        &self,
        instruments: &[Instrument],
        quote_provider: Option<&dyn QuoteProvider>,
        rate_provider: &dyn RateProvider,
        cache: &mut QuoteCache,
        settings: &Settings,
        now: DateTime<Utc>,
    ) -> RefreshOutcome {
        let Some(provider) = quote_provider else {
            return RefreshOutcome {
                status: RefreshStatus::NotConfigured,
                quotes_updated: 0,
                exchange_rate: None,
                errors: Vec::new(),
                fetched_at: now,
            };
        };

        let mut errors = Vec::new();

        // FX first — foreign-currency instruments need it to be priced
        // in the reporting currency.
        let mut fetched_rate = None;
        match rate_provider
            .fetch_rate(&settings.foreign_currency, &settings.base_currency)
            .await
        {
            Ok(rate) if rate.is_finite() && rate > 0.0 => fetched_rate = Some(rate),
            Ok(rate) => errors.push(RefreshError {
                subject: "exchange-rate".into(),
                provider: rate_provider.name().into(),
                message: format!("Invalid exchange rate returned: {rate}"),
            }),
            Err(e) => {
                warn!(provider = rate_provider.name(), "exchange rate fetch failed: {e}");
                errors.push(RefreshError {
                    subject: "exchange-rate".into(),
                    provider: rate_provider.name().into(),
                    message: e.to_string(),
                });
            }
        }
        // Fall back to the last known rate for conversions this pass.
        let effective_rate = fetched_rate.or(cache.exchange_rate);

        let mut quotes_updated = 0;
        for instrument in instruments {
            match provider.fetch_quote(&instrument.ticker).await {
                Ok(raw) if raw.price.is_finite() && raw.price >= 0.0 => {
                    let quote = if instrument
                        .currency
                        .eq_ignore_ascii_case(&settings.base_currency)
                    {
                        Some(PriceQuote {
                            instrument_id: instrument.id.clone(),
                            price_in_base: raw.price,
                            price_in_foreign: None,
                            change_pct: raw.change_pct,
                            fetched_at: now,
                            source: QuoteSource::Live,
                        })
                    } else if instrument
                        .currency
                        .eq_ignore_ascii_case(&settings.foreign_currency)
                    {
                        match effective_rate {
                            Some(rate) => Some(PriceQuote {
                                instrument_id: instrument.id.clone(),
                                price_in_base: raw.price * rate,
                                price_in_foreign: Some(raw.price),
                                change_pct: raw.change_pct,
                                fetched_at: now,
                                source: QuoteSource::Live,
                            }),
                            None => {
                                errors.push(RefreshError {
                                    subject: instrument.id.to_string(),
                                    provider: rate_provider.name().into(),
                                    message: format!(
                                        "No {}/{} rate available to convert {}",
                                        settings.foreign_currency,
                                        settings.base_currency,
                                        instrument.id
                                    ),
                                });
                                cache.mark_stale(&instrument.id);
                                None
                            }
                        }
                    } else {
                        errors.push(RefreshError {
                            subject: instrument.id.to_string(),
                            provider: provider.name().into(),
                            message: format!(
                                "Instrument trades in unsupported currency '{}'",
                                instrument.currency
                            ),
                        });
                        None
                    };

                    if let Some(quote) = quote {
                        if cache.merge_quote(quote) {
                            quotes_updated += 1;
                        }
                    }
                }
                Ok(raw) => {
                    errors.push(RefreshError {
                        subject: instrument.id.to_string(),
                        provider: provider.name().into(),
                        message: format!(
                            "Invalid price returned for {}: {} (must be finite and non-negative)",
                            instrument.ticker, raw.price
                        ),
                    });
                    cache.mark_stale(&instrument.id);
                }
                Err(e) => {
                    warn!(
                        provider = provider.name(),
                        instrument = %instrument.id,
                        "quote fetch failed: {e}"
                    );
                    errors.push(RefreshError {
                        subject: instrument.id.to_string(),
                        provider: provider.name().into(),
                        message: e.to_string(),
                    });
                    cache.mark_stale(&instrument.id);
                }
            }
        }

        if let Some(rate) = fetched_rate {
            cache.set_exchange_rate(rate, now);
        }
        if quotes_updated > 0 || fetched_rate.is_some() {
            cache.mark_refreshed(now);
        }

        RefreshOutcome {
            status: RefreshStatus::Completed,
            quotes_updated,
            exchange_rate: fetched_rate,
            errors,
            fetched_at: now,
        }
    }
}

impl Default for RefreshService {
    fn default() -> Self {
        Self::new()
    }
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Base reporting currency every portfolio figure is denominated in.
pub const DEFAULT_BASE_CURRENCY: &str = "COP";

/// The single convertible foreign currency.
pub const DEFAULT_FOREIGN_CURRENCY: &str = "USD";

/// Hour of day (UTC) after which cached prices count as stale.
pub const DEFAULT_REFRESH_CUTOFF_HOUR: u32 = 6;

/// User-configurable settings, stored inside the encrypted vault file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Currency all portfolio values are reported in (e.g., "COP")
    pub base_currency: String,

    /// The one foreign currency entries may be recorded in (e.g., "USD")
    pub foreign_currency: String,

    /// Optional API keys for providers that require them.
    /// Keys: provider name (e.g., "alphavantage"). Values: the key string.
    pub api_keys: HashMap<String, String>,

    /// Daily wall-clock hour anchoring the price refresh gate (0–23)
    #[serde(default = "default_cutoff_hour")]
    pub refresh_cutoff_hour: u32,
}

fn default_cutoff_hour() -> u32 {
    DEFAULT_REFRESH_CUTOFF_HOUR
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_currency: DEFAULT_BASE_CURRENCY.to_string(),
            foreign_currency: DEFAULT_FOREIGN_CURRENCY.to_string(),
            api_keys: HashMap::new(),
            refresh_cutoff_hour: DEFAULT_REFRESH_CUTOFF_HOUR,
        }
    }
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::CoreError;
use crate::models::quote::QuoteCache;
use crate::models::settings::{Settings, DEFAULT_REFRESH_CUTOFF_HOUR};
use crate::models::transaction::Transaction;
use crate::models::vault::Vault;
use super::format::CURRENT_VERSION;

/// Envelope version 1: before the snapshot log and the configurable
/// refresh cutoff existed.
pub const VERSION_1: u16 = 1;

/// Settings as persisted by version-1 vaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsV1 {
    pub base_currency: String,
    pub foreign_currency: String,
    pub api_keys: HashMap<String, String>,
}

/// The version-1 vault payload. Kept `Serialize` so tests can craft
/// legacy files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultV1 {
    pub transactions: Vec<Transaction>,
    pub quote_cache: QuoteCache,
    pub settings: SettingsV1,
    pub ledger_version: u64,
    pub next_seq: u64,
}

/// Upgrade a version-1 vault to the current shape. Pure function: the
/// envelope's explicit version tag selects it — never format-sniffing
/// by catching deserialization errors.
pub fn migrate_v1(v1: VaultV1) -> Vault {
    Vault {
        transactions: v1.transactions,
        snapshots: Vec::new(),
        quote_cache: v1.quote_cache,
        settings: Settings {
            base_currency: v1.settings.base_currency,
            foreign_currency: v1.settings.foreign_currency,
            api_keys: v1.settings.api_keys,
            refresh_cutoff_hour: DEFAULT_REFRESH_CUTOFF_HOUR,
        },
        ledger_version: v1.ledger_version,
        next_seq: v1.next_seq,
    }
}

/// Decode a decrypted payload according to its envelope version,
/// migrating older shapes forward.
pub fn decode_payload(version: u16, plaintext: &[u8]) -> Result<Vault, CoreError> {
    match version {
        VERSION_1 => {
            let v1: VaultV1 = bincode::deserialize(plaintext).map_err(|e| {
                CoreError::Deserialization(format!("Failed to deserialize v1 vault: {e}"))
            })?;
            Ok(migrate_v1(v1))
        }
        CURRENT_VERSION => bincode::deserialize(plaintext).map_err(|e| {
            CoreError::Deserialization(format!("Failed to deserialize vault: {e}"))
        }),
        other => Err(CoreError::UnsupportedVersion(other)),
    }
}

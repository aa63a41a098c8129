use crate::errors::CoreError;
use crate::models::vault::Vault;

use super::encryption;
use super::format;
use super::migration;

/// High-level storage operations: save/load the vault to/from encrypted
/// bytes or files.
pub struct StorageManager;

impl StorageManager {
    /// Encrypt and serialize a vault to raw bytes (portable,
    /// platform-independent).
    ///
    /// Flow: Vault → bincode → AES-256-GCM(Argon2id(password)) → SMLA bytes
    pub fn save_to_bytes(vault: &Vault, password: &str) -> Result<Vec<u8>, CoreError> {
        let plaintext = bincode::serialize(vault)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize vault: {e}")))?;

        let sealed = encryption::seal(&plaintext, password)?;
        Ok(format::write_file(format::CURRENT_VERSION, &sealed))
    }

    /// Decrypt and deserialize a vault from raw bytes, migrating older
    /// envelope versions forward.
    ///
    /// Flow: SMLA bytes → parse header → Argon2id(password, salt) →
    /// AES-256-GCM decrypt → bincode (version-dispatched) → Vault
    pub fn load_from_bytes(data: &[u8], password: &str) -> Result<Vault, CoreError> {
        let (header, ciphertext) = format::read_file(data)?;
        let plaintext = encryption::open(
            password,
            &header.kdf_params,
            &header.salt,
            &header.nonce,
            ciphertext,
        )?;
        migration::decode_payload(header.version, &plaintext)
    }

    /// Save the vault to an encrypted file on disk (native only).
    #[cfg(not(target_arch = "wasm32"))]
    pub fn save_to_file(vault: &Vault, path: &str, password: &str) -> Result<(), CoreError> {
        let bytes = Self::save_to_bytes(vault, password)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Load a vault from an encrypted file on disk (native only).
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_from_file(path: &str, password: &str) -> Result<Vault, CoreError> {
        let bytes = std::fs::read(path)?;
        Self::load_from_bytes(&bytes, password)
    }
}

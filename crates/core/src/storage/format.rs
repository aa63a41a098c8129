use crate::errors::CoreError;
use super::encryption::{KdfParams, SealedPayload};

/// Magic bytes identifying an SMLA (Semilla) vault file.
pub const MAGIC: &[u8; 4] = b"SMLA";

/// Current envelope version. Version 1 payloads are still readable and
/// upgraded through `storage::migration`.
pub const CURRENT_VERSION: u16 = 2;

/// Minimum header size in bytes:
/// magic(4) + version(2) + kdf_params(12) + salt(16) + nonce(12) + ciphertext_len(8) = 54
pub const MIN_HEADER_SIZE: usize = 54;

/// Header read from an encrypted .smla file.
#[derive(Debug)]
pub struct FileHeader {
    pub version: u16,
    pub kdf_params: KdfParams,
    pub salt: [u8; 16],
    pub nonce: [u8; 12],
    pub ciphertext_len: u64,
}

/// Assemble a complete vault file from a sealed payload.
///
/// Layout:
/// ```text
/// [SMLA: 4B] [version: 2B LE] [memory_cost: 4B LE] [time_cost: 4B LE]
/// [parallelism: 4B LE] [salt: 16B] [nonce: 12B] [ciphertext_len: 8B LE]
/// [ciphertext: variable]
/// ```
pub fn write_file(version: u16, sealed: &SealedPayload) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MIN_HEADER_SIZE + sealed.ciphertext.len());

    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&version.to_le_bytes());
    buf.extend_from_slice(&sealed.kdf_params.memory_cost.to_le_bytes());
    buf.extend_from_slice(&sealed.kdf_params.time_cost.to_le_bytes());
    buf.extend_from_slice(&sealed.kdf_params.parallelism.to_le_bytes());
    buf.extend_from_slice(&sealed.salt);
    buf.extend_from_slice(&sealed.nonce);
    buf.extend_from_slice(&(sealed.ciphertext.len() as u64).to_le_bytes());
    buf.extend_from_slice(&sealed.ciphertext);

    buf
}

/// Parse the header from raw file bytes.
/// Returns the header and the ciphertext slice.
pub fn read_file(data: &[u8]) -> Result<(FileHeader, &[u8]), CoreError> {
    if data.len() < MIN_HEADER_SIZE {
        return Err(CoreError::InvalidFileFormat(
            "File too small to be a valid SMLA file".into(),
        ));
    }

    if &data[0..4] != MAGIC {
        return Err(CoreError::InvalidFileFormat(
            "Invalid magic bytes — not an SMLA file".into(),
        ));
    }

    let mut reader = FieldReader { data, offset: 4 };

    let version = u16::from_le_bytes(reader.take::<2>("version")?);
    if version == 0 || version > CURRENT_VERSION {
        return Err(CoreError::UnsupportedVersion(version));
    }

    let memory_cost = u32::from_le_bytes(reader.take::<4>("KDF memory_cost")?);
    let time_cost = u32::from_le_bytes(reader.take::<4>("KDF time_cost")?);
    let parallelism = u32::from_le_bytes(reader.take::<4>("KDF parallelism")?);

    // Validate KDF params to prevent resource-exhaustion attacks from
    // crafted files. memory_cost: 8 KiB..1 GiB; time_cost: 1..20
    // iterations; parallelism: 1..16 threads.
    if !(8..=1_048_576).contains(&memory_cost) {
        return Err(CoreError::InvalidFileFormat(format!(
            "KDF memory_cost out of safe range: {memory_cost} KiB (expected 8..1048576)"
        )));
    }
    if !(1..=20).contains(&time_cost) {
        return Err(CoreError::InvalidFileFormat(format!(
            "KDF time_cost out of safe range: {time_cost} (expected 1..20)"
        )));
    }
    if !(1..=16).contains(&parallelism) {
        return Err(CoreError::InvalidFileFormat(format!(
            "KDF parallelism out of safe range: {parallelism} (expected 1..16)"
        )));
    }

    let salt = reader.take::<16>("salt")?;
    let nonce = reader.take::<12>("nonce")?;
    let ciphertext_len = u64::from_le_bytes(reader.take::<8>("ciphertext length")?);

    let offset = reader.offset;
    let expected_end = offset + ciphertext_len as usize;
    if data.len() < expected_end {
        return Err(CoreError::InvalidFileFormat(format!(
            "File truncated: expected {} bytes of ciphertext, got {}",
            ciphertext_len,
            data.len() - offset
        )));
    }

    let header = FileHeader {
        version,
        kdf_params: KdfParams {
            memory_cost,
            time_cost,
            parallelism,
        },
        salt,
        nonce,
        ciphertext_len,
    };

    Ok((header, &data[offset..expected_end]))
}

/// Sequential fixed-width field reader over the header bytes.
struct FieldReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl FieldReader<'_> {
    fn take<const N: usize>(&mut self, field: &str) -> Result<[u8; N], CoreError> {
        let end = self.offset + N;
        let bytes: [u8; N] = self
            .data
            .get(self.offset..end)
            .and_then(|slice| slice.try_into().ok())
            .ok_or_else(|| CoreError::InvalidFileFormat(format!("Failed to read {field}")))?;
        self.offset = end;
        Ok(bytes)
    }
}

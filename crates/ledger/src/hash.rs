//! Content hashing of artifacts.

use crate::LedgerError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// SHA-256 of a byte slice, `0x`-prefixed lowercase hex.
pub fn hash_bytes(data: &[u8]) -> String {
    format!("0x{}", hex::encode(Sha256::digest(data)))
}

/// SHA-256 of a file's raw bytes.
pub fn hash_file(path: &Path) -> Result<String, LedgerError> {
    let data = std::fs::read(path)?;
    Ok(hash_bytes(&data))
}

//! Device id parsing and unique id synthesis.

use crate::config::IdentityConfig;
use crate::error::{RegistryError, Result};

/// Parse a device id. Ids are positive decimal integers.
pub fn parse_id(id: &str) -> Result<u32> {
    let trimmed = id.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RegistryError::InvalidId { id: id.to_string() });
    }
    match trimmed.parse::<u32>() {
        Ok(0) | Err(_) => Err(RegistryError::InvalidId { id: id.to_string() }),
        Ok(n) => Ok(n),
    }
}

/// Synthesize the pseudo hardware address for a device id.
///
/// The id is encoded as a minimal two's-complement big-endian integer
/// (`5` -> `05`, `128` -> `0080`, `256` -> `0100`) and the uppercase hex
/// appears twice after the vendor prefix.
pub fn unique_id_for(id: u32) -> String {
    let hex = hex::encode_upper(minimal_signed_bytes(id));
    format!("{}{}-{}", IdentityConfig::UNIQUE_ID_PREFIX, hex, hex)
}

/// The id following the largest of `ids`, never below the first id.
pub fn next_id_after(ids: impl IntoIterator<Item = u32>) -> u32 {
    ids.into_iter()
        .max()
        .map(|max| max.saturating_add(1))
        .unwrap_or(IdentityConfig::FIRST_ID)
        .max(IdentityConfig::FIRST_ID)
}

fn minimal_signed_bytes(value: u32) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let first = bytes
        .iter()
        .position(|&b| b != 0)
        .unwrap_or(bytes.len() - 1);
    let mut out = Vec::with_capacity(bytes.len() + 1);
    // Keep the value positive when read back as a signed integer.
    if bytes[first] & 0x80 != 0 {
        out.push(0);
    }
    out.extend_from_slice(&bytes[first..]);
    out
}

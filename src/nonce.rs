//! Per-chunk nonce derivation for streaming containers.
//!
//! Every chunk of a container is sealed under the same key and the same
//! random base nonce. The chunk index is XORed into the last four bytes
//! (read as a little-endian `u32`) so that each index gets a distinct nonce.
//! That only holds while indices fit in 32 bits, so callers go through
//! [`chunk_nonce`] which refuses index 2^32 and above.

use crate::types::{ChunkCryptError, NONCE_LEN};

/// Largest number of chunks a single container may hold.
pub const MAX_CHUNKS: u64 = 1 << 32;

/// Derive the nonce for `chunk_index` from `base_nonce`.
pub fn derive_chunk_nonce(base_nonce: &[u8; NONCE_LEN], chunk_index: u32) -> [u8; NONCE_LEN] {
    let mut nonce = *base_nonce;
    let mut tail = [0u8; 4];
    tail.copy_from_slice(&nonce[NONCE_LEN - 4..]);
    let mixed = u32::from_le_bytes(tail) ^ chunk_index;
    nonce[NONCE_LEN - 4..].copy_from_slice(&mixed.to_le_bytes());
    nonce
}

/// Checked variant used by the streaming engine.
pub(crate) fn chunk_nonce(
    base_nonce: &[u8; NONCE_LEN],
    chunk_index: u64,
) -> Result<[u8; NONCE_LEN], ChunkCryptError> {
    let idx = u32::try_from(chunk_index).map_err(|_| ChunkCryptError::ChunkLimitExceeded)?;
    Ok(derive_chunk_nonce(base_nonce, idx))
}

//! Keyfile records: a random AES-256 key packaged as JSON.
//!
//! ```json
//! { "version": 1, "algorithm": "AES-256-GCM", "key": "<base64>", "createdAt": 1700000000000 }
//! ```

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::crypto::random_bytes;
use crate::file::write_all_atomic;
use crate::types::{ChunkCryptError, Credential, KEY_LEN, KeyMaterial};

pub const KEYFILE_VERSION: u32 = 1;
pub const KEYFILE_ALGORITHM: &str = "AES-256-GCM";

/// A serialized raw key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyfileRecord {
    pub version: u32,
    pub algorithm: String,
    /// Base64 (standard alphabet) of the 32 key bytes.
    pub key: String,
    /// Unix time in milliseconds.
    #[serde(rename = "createdAt")]
    pub created_at: u64,
}

/// Same shape with every field optional, so missing fields get a precise error.
#[derive(Deserialize)]
struct RawRecord {
    version: Option<serde_json::Value>,
    algorithm: Option<serde_json::Value>,
    key: Option<serde_json::Value>,
    #[serde(rename = "createdAt")]
    created_at: Option<serde_json::Value>,
}

impl KeyfileRecord {
    /// Decode the key bytes.
    pub fn key_material(&self) -> Result<KeyMaterial, ChunkCryptError> {
        let mut raw = STANDARD
            .decode(self.key.trim())
            .map_err(|_| ChunkCryptError::InvalidKeyfile("key is not valid base64"))?;
        let res = KeyMaterial::from_slice(&raw)
            .map_err(|_| ChunkCryptError::InvalidKeyfile("key must decode to 32 bytes"));
        raw.zeroize();
        res
    }

    pub fn credential(&self) -> Result<Credential, ChunkCryptError> {
        Ok(Credential::key(self.key_material()?))
    }

    pub fn to_json(&self) -> Result<String, ChunkCryptError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl std::fmt::Debug for KeyfileRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyfileRecord")
            .field("version", &self.version)
            .field("algorithm", &self.algorithm)
            .field("key", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl Drop for KeyfileRecord {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Create a keyfile record holding a fresh random key.
pub fn generate_keyfile() -> Result<KeyfileRecord, ChunkCryptError> {
    let mut raw = random_bytes::<KEY_LEN>()?;
    let key = STANDARD.encode(raw);
    raw.zeroize();
    let created_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    tracing::debug!(created_at, "generated keyfile");
    Ok(KeyfileRecord {
        version: KEYFILE_VERSION,
        algorithm: KEYFILE_ALGORITHM.to_string(),
        key,
        created_at,
    })
}

/// Write `record` to `path` as JSON.
///
/// The bytes go to an owner-only temp file beside `path` (mode 0600 on unix)
/// which is then renamed into place, so the key is never readable by others
/// and an existing keyfile is only replaced whole. Refuses to overwrite
/// unless `force` is set.
pub fn write_keyfile(
    path: &Path,
    record: &KeyfileRecord,
    force: bool,
) -> Result<(), ChunkCryptError> {
    let mut json = record.to_json()?;
    let res = write_all_atomic(path, json.as_bytes(), force);
    json.zeroize();
    res?;
    tracing::debug!(path = %path.display(), "wrote keyfile");
    Ok(())
}

/// Parse and validate a keyfile's JSON text.
pub fn parse_keyfile(text: &str) -> Result<KeyfileRecord, ChunkCryptError> {
    let raw: RawRecord = serde_json::from_str(text)
        .map_err(|_| ChunkCryptError::InvalidKeyfile("not a JSON object"))?;

    let (Some(version), Some(algorithm), Some(key), Some(created_at)) =
        (raw.version, raw.algorithm, raw.key, raw.created_at)
    else {
        return Err(ChunkCryptError::InvalidKeyfile(
            "version, algorithm, key and createdAt are all required",
        ));
    };

    if version.as_u64() != Some(u64::from(KEYFILE_VERSION)) {
        return Err(ChunkCryptError::InvalidKeyfile("unsupported version"));
    }
    if algorithm.as_str() != Some(KEYFILE_ALGORITHM) {
        return Err(ChunkCryptError::InvalidKeyfile("unsupported algorithm"));
    }
    let key = match key {
        serde_json::Value::String(s) if !s.is_empty() => s,
        _ => return Err(ChunkCryptError::InvalidKeyfile("key must be a non-empty string")),
    };

    Ok(KeyfileRecord {
        version: KEYFILE_VERSION,
        algorithm: KEYFILE_ALGORITHM.to_string(),
        key,
        created_at: created_at.as_u64().unwrap_or(0),
    })
}

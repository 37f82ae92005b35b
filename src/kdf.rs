//! Key derivation and key import.
//!
//! Password credentials are stretched with PBKDF2-HMAC-SHA256 against the
//! per-container salt. Keyfile credentials are imported verbatim. Both paths
//! end in a [`SessionKey`], which is the only form the cipher layer accepts.
//!
//! # Security Guidelines
//!
//! - Passwords stay wrapped in `SecretString` until the moment of derivation
//! - Derived keys are zeroized when the `SessionKey` is dropped
//! - Salts must be fresh per container; they are stored in the header in the clear

use hmac::Hmac;
use pbkdf2::pbkdf2;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::types::{
    ChunkCryptError, Credential, KEY_LEN, KeyMaterial, PBKDF2_ITERATIONS, SALT_LEN,
};

/// A 256-bit AES key bound to one container. Zeroized on drop.
pub struct SessionKey {
    bytes: [u8; KEY_LEN],
}

impl SessionKey {
    pub(crate) fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive a 32-byte key from a password using PBKDF2-HMAC-SHA256.
///
/// The iteration count is fixed at [`PBKDF2_ITERATIONS`] because it is not
/// recorded in the container; changing it would orphan existing files.
pub fn derive_key(
    password: &SecretString,
    salt: &[u8; SALT_LEN],
) -> Result<SessionKey, ChunkCryptError> {
    derive_key_with_iterations(password, salt, PBKDF2_ITERATIONS)
}

pub(crate) fn derive_key_with_iterations(
    password: &SecretString,
    salt: &[u8; SALT_LEN],
    iterations: u32,
) -> Result<SessionKey, ChunkCryptError> {
    if iterations == 0 {
        return Err(ChunkCryptError::InvalidInput("kdf: iterations must be >= 1"));
    }

    let mut out = [0u8; KEY_LEN];
    pbkdf2::<Hmac<Sha256>>(
        password.expose_secret().as_bytes(),
        salt,
        iterations,
        &mut out,
    )
    .map_err(|_| ChunkCryptError::Crypto)?;

    tracing::trace!(iterations, "derived password key");
    Ok(SessionKey::from_bytes(out))
}

/// Import a raw 256-bit key without derivation.
pub fn import_key(raw: &[u8]) -> Result<SessionKey, ChunkCryptError> {
    let key = KeyMaterial::from_slice(raw)?;
    Ok(SessionKey::from_bytes(*key.as_bytes()))
}

/// Turn a credential into a session key. `salt` is required for passwords and
/// ignored for raw keys.
pub(crate) fn session_key(
    credential: &Credential,
    salt: Option<&[u8; SALT_LEN]>,
) -> Result<SessionKey, ChunkCryptError> {
    match (credential, salt) {
        (Credential::Password(pw), Some(salt)) => derive_key(pw, salt),
        (Credential::Password(_), None) => {
            Err(ChunkCryptError::InvalidInput("password credential needs a salt"))
        }
        (Credential::Key(key), _) => Ok(SessionKey::from_bytes(*key.as_bytes())),
    }
}

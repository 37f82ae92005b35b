//! Core encryption and decryption primitives.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use getrandom::fill as getrandom;
use sha2::{Digest, Sha256};

use crate::kdf::SessionKey;
use crate::types::{ChunkCryptError, NONCE_LEN, SALT_LEN};

/// Fill a fixed-size array from the OS CSPRNG.
pub fn random_bytes<const N: usize>() -> Result<[u8; N], ChunkCryptError> {
    let mut out = [0u8; N];
    getrandom(&mut out).map_err(|_| ChunkCryptError::Crypto)?;
    Ok(out)
}

/// Generate a cryptographically secure random nonce.
pub fn generate_nonce() -> Result<[u8; NONCE_LEN], ChunkCryptError> {
    random_bytes::<NONCE_LEN>()
}

/// Generate a cryptographically secure random salt.
pub fn generate_salt() -> Result<[u8; SALT_LEN], ChunkCryptError> {
    random_bytes::<SALT_LEN>()
}

/// SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Create an AES-256-GCM cipher instance for a session key.
pub fn create_cipher(key: &SessionKey) -> Result<Aes256Gcm, ChunkCryptError> {
    Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| ChunkCryptError::Crypto)
}

/// Encrypt plaintext with AES-256-GCM.
///
/// # Returns
///
/// Ciphertext with the 16-byte authentication tag appended.
pub fn aead_encrypt(
    cipher: &Aes256Gcm,
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>, ChunkCryptError> {
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| ChunkCryptError::Crypto)
}

/// Decrypt and authenticate `ciphertext || tag`.
///
/// Returns `None` when authentication fails. The caller decides which error
/// that maps to: a wrong credential and tampered bytes look identical here.
pub fn aead_decrypt(
    cipher: &Aes256Gcm,
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
) -> Option<Vec<u8>> {
    cipher.decrypt(Nonce::from_slice(nonce), ciphertext).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::import_key;
    use crate::types::TAG_LEN;

    fn cipher(byte: u8) -> Aes256Gcm {
        create_cipher(&import_key(&[byte; 32]).unwrap()).unwrap()
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let c = cipher(0);
        let nonce = [1u8; NONCE_LEN];
        let ct = aead_encrypt(&c, &nonce, b"Hello, World!").unwrap();
        assert_eq!(ct.len(), 13 + TAG_LEN);
        assert_eq!(aead_decrypt(&c, &nonce, &ct).unwrap(), b"Hello, World!");
    }

    #[test]
    fn wrong_key_fails() {
        let nonce = [1u8; NONCE_LEN];
        let ct = aead_encrypt(&cipher(1), &nonce, b"secret").unwrap();
        assert!(aead_decrypt(&cipher(2), &nonce, &ct).is_none());
    }

    #[test]
    fn wrong_nonce_fails() {
        let c = cipher(3);
        let ct = aead_encrypt(&c, &[1u8; NONCE_LEN], b"secret").unwrap();
        assert!(aead_decrypt(&c, &[2u8; NONCE_LEN], &ct).is_none());
    }

    #[test]
    fn random_values_differ() {
        assert_ne!(generate_nonce().unwrap(), generate_nonce().unwrap());
        assert_ne!(generate_salt().unwrap(), generate_salt().unwrap());
    }

    #[test]
    fn sha256_abc() {
        let d = sha256(b"abc");
        assert_eq!(
            d[..4],
            [0xba, 0x78, 0x16, 0xbf],
            "FIPS 180-2 test vector prefix"
        );
    }
}

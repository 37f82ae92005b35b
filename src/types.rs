//! Core types and enums for chunkcrypt.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use secrecy::SecretString;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Symmetric key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Password salt length in bytes.
pub const SALT_LEN: usize = 16;

/// AEAD authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// PBKDF2-HMAC-SHA256 iteration count for password-derived keys.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Default plaintext chunk size for streaming (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Default payload size at which `encrypt_auto` switches to streaming (64 MiB).
pub const DEFAULT_STREAM_THRESHOLD: u64 = 64 * 1024 * 1024;

/// A raw 256-bit key supplied by the caller (e.g. from a keyfile). Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial([u8; KEY_LEN]);

impl KeyMaterial {
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Build from a slice, which must be exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ChunkCryptError> {
        let arr: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| ChunkCryptError::InvalidInput("key must be exactly 32 bytes"))?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMaterial([REDACTED])")
    }
}

/// Which kind of credential a container needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    Password,
    Key,
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialKind::Password => f.write_str("password"),
            CredentialKind::Key => f.write_str("key"),
        }
    }
}

/// The secret used to encrypt or decrypt one container.
///
/// Passwords are stretched with PBKDF2 against a per-container salt; raw keys
/// are used as-is. Either way the credential is only borrowed for the single
/// operation that consumes it.
#[derive(Clone, Debug)]
pub enum Credential {
    Password(SecretString),
    Key(KeyMaterial),
}

impl Credential {
    pub fn password(pw: impl Into<String>) -> Self {
        Credential::Password(SecretString::from(pw.into()))
    }

    pub fn key(key: KeyMaterial) -> Self {
        Credential::Key(key)
    }

    pub fn kind(&self) -> CredentialKind {
        match self {
            Credential::Password(_) => CredentialKind::Password,
            Credential::Key(_) => CredentialKind::Key,
        }
    }
}

/// Options for encryption.
#[derive(Debug, Clone)]
pub struct EncryptOptions {
    /// Always produce a streaming container, regardless of payload size.
    pub stream: bool,
    /// Plaintext bytes per chunk in streaming mode. `0` selects the default.
    pub chunk_size: usize,
    /// Payloads of at least this many bytes are streamed even if `stream == false`.
    pub stream_threshold: u64,
}

impl Default for EncryptOptions {
    fn default() -> Self {
        Self {
            stream: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            stream_threshold: DEFAULT_STREAM_THRESHOLD,
        }
    }
}

impl EncryptOptions {
    /// Force streaming with the given chunk size.
    pub fn streaming(chunk_size: usize) -> Self {
        Self {
            stream: true,
            chunk_size,
            ..Default::default()
        }
    }
}

/// Stage a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    Encrypting,
    Decrypting,
    Complete,
}

/// Snapshot reported to progress callbacks during streaming operations.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub phase: ProgressPhase,
    /// Plaintext bytes consumed (encrypt) or container bytes consumed (decrypt).
    pub processed_bytes: u64,
    pub processed_chunks: u64,
    pub total_bytes: Option<u64>,
    /// Fraction in `[0, 1]`, only known when `total_bytes` is.
    pub progress: Option<f64>,
}

/// Progress callback accepted by the streaming engine.
pub type ProgressFn<'p> = Box<dyn FnMut(&ProgressEvent) + 'p>;

/// Shared flag that asks a streaming driver to stop before its next read.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Library error type (no panics for expected failures).
#[derive(Error, Debug)]
pub enum ChunkCryptError {
    #[error("I/O error")]
    Io(#[from] std::io::Error),
    #[error("a {0} is required for this container")]
    CredentialMissing(CredentialKind),
    #[error("wrong password or key, or the data was tampered with")]
    WrongCredential,
    #[error("chunk {chunk} failed authentication")]
    DataCorruption { chunk: u64 },
    #[error("malformed container: {0}")]
    MalformedContainer(&'static str),
    #[error("unsupported container marker 0x{0:02x}")]
    UnknownMarker(u8),
    #[error("unsupported stream format version {0}")]
    UnsupportedVersion(u8),
    #[error("invalid argument: {0}")]
    InvalidInput(&'static str),
    #[error("stream exceeds the maximum number of chunks")]
    ChunkLimitExceeded,
    #[error("operation cancelled")]
    Cancelled,
    #[error("invalid keyfile: {0}")]
    InvalidKeyfile(&'static str),
    #[error("keyfile serialization error")]
    Json(#[from] serde_json::Error),
    #[error("encryption failure")]
    Crypto,
}

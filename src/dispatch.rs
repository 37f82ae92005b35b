//! Container routing by marker byte.
//!
//! `decrypt_any` is the one decryption entry point: it looks at the first
//! byte and hands the container to the whole-buffer codec or replays it
//! through the streaming decryptor. `encrypt_auto` is its counterpart on the
//! encrypt side and promotes large payloads to the streaming format.

use tracing::debug;

use crate::format::Marker;
use crate::streaming::{decrypt_bytes_streaming, encrypt_bytes_streaming};
use crate::types::{ChunkCryptError, Credential, EncryptOptions};
use crate::whole::{decrypt_whole, encrypt_whole};

/// Credential family of a container, as read from its marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Password,
    Keyfile,
    Unknown,
}

/// Classification of a container by its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerInfo {
    pub kind: ContainerKind,
    pub is_streaming: bool,
}

/// Classify a container from its leading marker byte only.
pub fn identify(container: &[u8]) -> ContainerInfo {
    match container.first().copied().and_then(Marker::from_byte) {
        Some(Marker::PasswordWhole) => ContainerInfo {
            kind: ContainerKind::Password,
            is_streaming: false,
        },
        Some(Marker::KeyfileWhole) => ContainerInfo {
            kind: ContainerKind::Keyfile,
            is_streaming: false,
        },
        Some(Marker::PasswordStream) => ContainerInfo {
            kind: ContainerKind::Password,
            is_streaming: true,
        },
        Some(Marker::KeyfileStream) => ContainerInfo {
            kind: ContainerKind::Keyfile,
            is_streaming: true,
        },
        None => ContainerInfo {
            kind: ContainerKind::Unknown,
            is_streaming: false,
        },
    }
}

/// Decrypt any supported container with a single call.
pub fn decrypt_any(
    container: &[u8],
    credential: &Credential,
) -> Result<Vec<u8>, ChunkCryptError> {
    let &first = container
        .first()
        .ok_or(ChunkCryptError::MalformedContainer("empty input"))?;
    let marker = Marker::from_byte(first).ok_or(ChunkCryptError::UnknownMarker(first))?;
    debug!(marker = ?marker, len = container.len(), "dispatching container");
    if marker.is_streaming() {
        decrypt_bytes_streaming(container, credential)
    } else {
        decrypt_whole(container, credential)
    }
}

/// Whether a payload of `len` bytes should use the streaming format.
pub fn should_stream(len: u64, opts: &EncryptOptions) -> bool {
    opts.stream || len >= opts.stream_threshold
}

/// Encrypt with the whole-buffer codec, or the streaming format when the
/// options ask for it or the payload reaches `stream_threshold`.
pub fn encrypt_auto(
    plaintext: &[u8],
    credential: &Credential,
    opts: &EncryptOptions,
) -> Result<Vec<u8>, ChunkCryptError> {
    if should_stream(plaintext.len() as u64, opts) {
        debug!(len = plaintext.len(), "using streaming format");
        encrypt_bytes_streaming(plaintext, credential, opts.chunk_size)
    } else {
        encrypt_whole(plaintext, credential)
    }
}

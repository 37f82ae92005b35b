#![forbid(unsafe_code)]
//! # chunkcrypt - authenticated encryption for files of any size.
//!
//! `chunkcrypt` encrypts byte payloads with AES-256-GCM under either a password
//! (PBKDF2-HMAC-SHA256, 100,000 iterations) or a raw 256-bit keyfile key, and
//! produces a self-describing container that can be decrypted later without
//! any out-of-band metadata.
//!
//! ## Features
//! - **Whole-buffer containers** for small payloads (one AEAD call)
//! - **Streaming containers** for large payloads: fixed-size chunks, each
//!   sealed under its own derived nonce, in bounded memory
//! - **One decrypt entry point** that routes on the container's marker byte
//! - **Keyfiles** packaged as JSON
//! - **Progress callbacks and cancellation** for streaming operations
//!
//! ## Example: Encrypt and decrypt a byte array
//! ```no_run
//! use chunkcrypt::{Credential, EncryptOptions, decrypt_bytes, encrypt_bytes};
//!
//! let pw = Credential::password("mypassword");
//! let ct = encrypt_bytes(b"Hello, world!", &pw, &EncryptOptions::default()).unwrap();
//! let pt = decrypt_bytes(&ct, &pw).unwrap();
//! assert_eq!(pt, b"Hello, world!");
//! ```
//!
//! ## Example: Stream a reader into a writer
//! ```no_run
//! use chunkcrypt::{Credential, EncryptOptions, StreamOptions, encrypt_stream, generate_keyfile};
//!
//! let keyfile = generate_keyfile().unwrap();
//! let cred = keyfile.credential().unwrap();
//! let input = std::io::Cursor::new(vec![0u8; 1 << 20]);
//! let mut output = Vec::new();
//! encrypt_stream(input, &mut output, &cred, &EncryptOptions::streaming(0), &StreamOptions::default(), None).unwrap();
//! ```
//!
//! Safety notes
//! - The crate is not audited or reviewed! Protects data at rest. Does not defend against compromised hosts/side channels.
//! - Streaming decryption hands out plaintext chunk by chunk. A failure on a
//!   later chunk does not retract earlier output.

mod types;
mod format;
mod kdf;
mod crypto;
mod nonce;
mod whole;
mod streaming;
mod dispatch;
mod keyfile;
mod file;

pub use types::*;
pub use format::{Header, Marker, STREAM_VERSION, MAX_CHUNK_SIZE};
pub use kdf::{SessionKey, derive_key, import_key};
pub use crypto::sha256;
pub use nonce::{derive_chunk_nonce, MAX_CHUNKS};
pub use whole::{encrypt_whole, decrypt_whole};
pub use streaming::{
    StreamDecryptor, StreamEncryptor, StreamOptions, StreamSummary, decrypt_bytes_streaming,
    decrypt_stream, encrypt_bytes_streaming, encrypt_stream,
};
pub use dispatch::{ContainerInfo, ContainerKind, decrypt_any, encrypt_auto, identify};
pub use keyfile::{KeyfileRecord, generate_keyfile, parse_keyfile, write_keyfile};
pub use file::{
    decrypt_file, default_decrypt_output_path, default_encrypt_output_path, encrypt_file,
};

/// Encrypt a buffer, promoting to the streaming format per `opts`.
pub fn encrypt_bytes(
    plaintext: &[u8],
    credential: &Credential,
    opts: &EncryptOptions,
) -> Result<Vec<u8>, ChunkCryptError> {
    encrypt_auto(plaintext, credential, opts)
}

/// Decrypt any container produced by this crate.
pub fn decrypt_bytes(
    container: &[u8],
    credential: &Credential,
) -> Result<Vec<u8>, ChunkCryptError> {
    decrypt_any(container, credential)
}

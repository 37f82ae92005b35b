//! Single-shot encryption of an in-memory buffer.

use tracing::debug;

use crate::crypto::{aead_decrypt, aead_encrypt, create_cipher, generate_nonce, generate_salt};
use crate::format::{Header, Marker};
use crate::kdf::session_key;
use crate::types::{ChunkCryptError, Credential, CredentialKind};

/// Encrypt `plaintext` into a whole (non-streaming) container.
pub fn encrypt_whole(
    plaintext: &[u8],
    credential: &Credential,
) -> Result<Vec<u8>, ChunkCryptError> {
    let nonce = generate_nonce()?;
    let header = match credential.kind() {
        CredentialKind::Password => Header::PasswordWhole {
            salt: generate_salt()?,
            nonce,
        },
        CredentialKind::Key => Header::KeyfileWhole { nonce },
    };

    let key = session_key(credential, header.salt())?;
    let cipher = create_cipher(&key)?;
    let ct = aead_encrypt(&cipher, header.nonce(), plaintext)?;

    let mut out = Vec::with_capacity(header.encoded_len() + ct.len());
    header.write_to(&mut out);
    out.extend_from_slice(&ct);
    debug!(marker = ?header.marker(), len = out.len(), "encrypted whole container");
    Ok(out)
}

/// Decrypt a whole (non-streaming) container.
///
/// Size and credential checks run before any key derivation. Authentication
/// failure is always `WrongCredential`: with a single tag there is no way to
/// tell a bad key from altered bytes.
pub fn decrypt_whole(
    container: &[u8],
    credential: &Credential,
) -> Result<Vec<u8>, ChunkCryptError> {
    let &first = container
        .first()
        .ok_or(ChunkCryptError::MalformedContainer("empty input"))?;
    let marker = Marker::from_byte(first).ok_or(ChunkCryptError::UnknownMarker(first))?;
    if marker.is_streaming() {
        return Err(ChunkCryptError::InvalidInput(
            "streaming container passed to whole-buffer decrypt",
        ));
    }
    if container.len() < marker.min_container_len() {
        return Err(ChunkCryptError::MalformedContainer(
            "container shorter than minimum size",
        ));
    }
    if credential.kind() != marker.credential_kind() {
        return Err(ChunkCryptError::CredentialMissing(marker.credential_kind()));
    }

    let (header, used) = Header::parse(container)?
        .ok_or(ChunkCryptError::MalformedContainer("truncated header"))?;
    let key = session_key(credential, header.salt())?;
    let cipher = create_cipher(&key)?;
    let pt = aead_decrypt(&cipher, header.nonce(), &container[used..])
        .ok_or(ChunkCryptError::WrongCredential)?;
    debug!(marker = ?marker, len = pt.len(), "decrypted whole container");
    Ok(pt)
}

use chunkcrypt::{
    ChunkCryptError, Credential, EncryptOptions, KeyMaterial, decrypt_bytes, encrypt_bytes,
};

fn key(b: u8) -> Credential {
    Credential::key(KeyMaterial::new([b; 32]))
}

/// Flip one byte in the ciphertext body and expect an authentication failure.
#[test]
fn tamper_whole_ciphertext_fails() {
    let cred = key(1);
    let mut ct = encrypt_bytes(b"message to protect", &cred, &EncryptOptions::default()).unwrap();
    if let Some(last) = ct.last_mut() {
        *last ^= 0x01;
    }
    let res = decrypt_bytes(&ct, &cred);
    assert!(matches!(res, Err(ChunkCryptError::WrongCredential)));
}

/// Flip a nonce byte: the tag no longer verifies.
#[test]
fn tamper_whole_nonce_fails() {
    let cred = key(2);
    let mut ct = encrypt_bytes(b"nonce tamper", &cred, &EncryptOptions::default()).unwrap();
    ct[3] ^= 0xFF;
    assert!(matches!(
        decrypt_bytes(&ct, &cred),
        Err(ChunkCryptError::WrongCredential)
    ));
}

/// Corrupt the marker byte and expect an unsupported-format error.
#[test]
fn tamper_marker_fails() {
    let cred = key(3);
    let mut ct = encrypt_bytes(b"header tamper", &cred, &EncryptOptions::default()).unwrap();
    ct[0] = 0x7E;
    assert!(matches!(
        decrypt_bytes(&ct, &cred),
        Err(ChunkCryptError::UnknownMarker(0x7E))
    ));
}

/// Switching a keyfile marker to the password marker demands the other credential.
#[test]
fn tamper_marker_to_other_kind_fails() {
    let cred = key(4);
    let mut ct = encrypt_bytes(&[0u8; 64], &cred, &EncryptOptions::default()).unwrap();
    ct[0] = 0x01;
    assert!(matches!(
        decrypt_bytes(&ct, &cred),
        Err(ChunkCryptError::CredentialMissing(_))
    ));
}

/// Wrong password must fail even if ciphertext is intact.
#[test]
fn wrong_password_still_fails() {
    let ct = encrypt_bytes(
        b"not so secret",
        &Credential::password("right"),
        &EncryptOptions::default(),
    )
    .unwrap();
    let res = decrypt_bytes(&ct, &Credential::password("wrong"));
    assert!(matches!(res, Err(ChunkCryptError::WrongCredential)));
}

/// Corruption in chunk 0 reads as a credential problem; later chunks as corruption.
#[test]
fn streaming_chunk_position_decides_error_kind() {
    let cred = key(5);
    let opts = EncryptOptions::streaming(32);
    let ct = encrypt_bytes(&[0xAB; 256], &cred, &opts).unwrap();

    // keyfile stream header is 18 bytes; each frame is 4 + 32 + 16
    let frame = 4 + 32 + 16;
    let in_chunk = |i: usize| 18 + i * frame + 4 + 10;

    let mut first = ct.clone();
    first[in_chunk(0)] ^= 0x01;
    assert!(matches!(
        decrypt_bytes(&first, &cred),
        Err(ChunkCryptError::WrongCredential)
    ));

    let mut third = ct.clone();
    third[in_chunk(2)] ^= 0x01;
    assert!(matches!(
        decrypt_bytes(&third, &cred),
        Err(ChunkCryptError::DataCorruption { chunk: 2 })
    ));
}

/// Swapping two chunks breaks their nonce binding.
#[test]
fn reordered_chunks_fail() {
    let cred = key(6);
    let ct = encrypt_bytes(&[0x11; 96], &cred, &EncryptOptions::streaming(32)).unwrap();
    let frame = 4 + 32 + 16;
    let (head, body) = ct.split_at(18);
    let mut swapped = head.to_vec();
    swapped.extend_from_slice(&body[frame..2 * frame]);
    swapped.extend_from_slice(&body[..frame]);
    swapped.extend_from_slice(&body[2 * frame..]);
    assert!(decrypt_bytes(&swapped, &cred).is_err());
}

use assert_fs::prelude::*;
use std::fs;

use chunkcrypt::{
    ChunkCryptError, Credential, EncryptOptions, Header, KeyMaterial, Marker, decrypt_bytes,
    decrypt_file, encrypt_file,
};

fn cred() -> Credential {
    Credential::key(KeyMaterial::new([0x33; 32]))
}

/// Build a small streaming ciphertext on disk and return its bytes.
fn make_stream_ct() -> (assert_fs::TempDir, std::path::PathBuf, Vec<u8>) {
    let td = assert_fs::TempDir::new().unwrap();
    let input = td.child("in.bin");
    input.write_binary(b"some streaming input").unwrap();

    let ct_path = td.child("ct.enc");
    let out = encrypt_file(
        input.path(),
        Some(ct_path.path()),
        &cred(),
        &EncryptOptions::streaming(65536),
        false,
        None,
    )
    .unwrap();
    let bytes = fs::read(&out).unwrap();
    (td, out, bytes)
}

fn set_chunk_size(mut bytes: Vec<u8>, chunk: u32) -> Vec<u8> {
    bytes[2..6].copy_from_slice(&chunk.to_le_bytes());
    bytes
}

#[test]
fn header_parses_back_from_file() {
    let (_td, _path, bytes) = make_stream_ct();
    let (header, used) = Header::parse(&bytes).unwrap().expect("complete header");
    assert_eq!(header.marker(), Marker::KeyfileStream);
    assert_eq!(header.chunk_size(), Some(65536));
    assert_eq!(used, Marker::KeyfileStream.header_len());
}

#[test]
fn zero_chunk_size_in_header_is_rejected() {
    let (td, path, bytes) = make_stream_ct();
    fs::write(&path, set_chunk_size(bytes, 0)).unwrap();

    let out = td.child("out.bin");
    let res = decrypt_file(&path, Some(out.path()), &cred(), false, None);
    assert!(
        matches!(res, Err(ChunkCryptError::MalformedContainer(_))),
        "got {res:?}"
    );
    out.assert(predicates::path::missing());
}

#[test]
fn shrunken_chunk_size_rejects_oversized_frame() {
    let (_td, _path, bytes) = make_stream_ct();
    // The single frame holds 20 plaintext bytes; a declared size of 4 cannot fit it.
    let res = decrypt_bytes(&set_chunk_size(bytes, 4), &cred());
    assert!(
        matches!(res, Err(ChunkCryptError::MalformedContainer(_))),
        "got {res:?}"
    );
}

#[test]
fn unsupported_version_is_rejected() {
    let (_td, _path, mut bytes) = make_stream_ct();
    bytes[1] = 0x02;
    assert!(matches!(
        decrypt_bytes(&bytes, &cred()),
        Err(ChunkCryptError::UnsupportedVersion(0x02))
    ));
}

#[test]
fn truncated_header_is_malformed() {
    let (_td, _path, bytes) = make_stream_ct();
    for cut in [1, 2, 6, 17] {
        let res = decrypt_bytes(&bytes[..cut], &cred());
        assert!(
            matches!(res, Err(ChunkCryptError::MalformedContainer(_))),
            "cut={cut} got {res:?}"
        );
    }
}

#[test]
fn truncated_frame_is_malformed() {
    let (_td, _path, bytes) = make_stream_ct();
    let res = decrypt_bytes(&bytes[..bytes.len() - 1], &cred());
    assert!(
        matches!(res, Err(ChunkCryptError::MalformedContainer(_))),
        "got {res:?}"
    );
}

#[test]
fn failed_decrypt_leaves_no_output_file() {
    let (td, path, mut bytes) = make_stream_ct();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x80;
    fs::write(&path, bytes).unwrap();

    let out = td.child("plain.bin");
    assert!(decrypt_file(&path, Some(out.path()), &cred(), false, None).is_err());
    out.assert(predicates::path::missing());
}

#[test]
fn truncation_is_caught_only_inside_a_frame() {
    let data = [0x5Au8; 256];
    let ct = chunkcrypt::encrypt_bytes(&data, &cred(), &EncryptOptions::streaming(32)).unwrap();
    let frame = 4 + 32 + 16;

    // A cut inside the last frame is rejected.
    assert!(matches!(
        decrypt_bytes(&ct[..ct.len() - 1], &cred()),
        Err(ChunkCryptError::MalformedContainer(_))
    ));

    // A cut on a frame boundary cannot be told apart from a shorter payload.
    let shorter = decrypt_bytes(&ct[..ct.len() - frame], &cred()).unwrap();
    assert_eq!(shorter, &data[..224]);
}

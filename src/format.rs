//! Container format structures and constants.
//!
//! All integers are little-endian.
//!
//! ```text
//! password, whole:      0x01 | salt(16) | nonce(12) | ct+tag
//! keyfile,  whole:      0x02 | nonce(12) | ct+tag
//! password, streaming:  0x11 | ver(1) | chunk_size(4) | salt(16) | base_nonce(12) | frame*
//! keyfile,  streaming:  0x12 | ver(1) | chunk_size(4) | base_nonce(12) | frame*
//! frame:                len(4) | ct+tag
//! ```

use crate::types::{ChunkCryptError, CredentialKind, NONCE_LEN, SALT_LEN, TAG_LEN};

/// Streaming format version written by this crate.
pub const STREAM_VERSION: u8 = 1;

/// Size of a chunk frame's length prefix.
pub const FRAME_LEN_SIZE: usize = 4;

/// Leading byte of every container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Marker {
    PasswordWhole = 0x01,
    KeyfileWhole = 0x02,
    PasswordStream = 0x11,
    KeyfileStream = 0x12,
}

impl Marker {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Marker::PasswordWhole),
            0x02 => Some(Marker::KeyfileWhole),
            0x11 => Some(Marker::PasswordStream),
            0x12 => Some(Marker::KeyfileStream),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn is_streaming(self) -> bool {
        matches!(self, Marker::PasswordStream | Marker::KeyfileStream)
    }

    pub fn credential_kind(self) -> CredentialKind {
        match self {
            Marker::PasswordWhole | Marker::PasswordStream => CredentialKind::Password,
            Marker::KeyfileWhole | Marker::KeyfileStream => CredentialKind::Key,
        }
    }

    pub fn for_parts(kind: CredentialKind, streaming: bool) -> Self {
        match (kind, streaming) {
            (CredentialKind::Password, false) => Marker::PasswordWhole,
            (CredentialKind::Key, false) => Marker::KeyfileWhole,
            (CredentialKind::Password, true) => Marker::PasswordStream,
            (CredentialKind::Key, true) => Marker::KeyfileStream,
        }
    }

    /// Fixed header length for this variant, marker byte included.
    pub fn header_len(self) -> usize {
        let salt = match self.credential_kind() {
            CredentialKind::Password => SALT_LEN,
            CredentialKind::Key => 0,
        };
        if self.is_streaming() {
            1 + 1 + 4 + salt + NONCE_LEN
        } else {
            1 + salt + NONCE_LEN
        }
    }

    /// Smallest valid container for this variant.
    ///
    /// A whole container always carries at least a tag; an empty stream is
    /// header-only.
    pub fn min_container_len(self) -> usize {
        if self.is_streaming() {
            self.header_len()
        } else {
            self.header_len() + TAG_LEN
        }
    }
}

/// Parsed container header. Each variant carries only the fields it has on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header {
    PasswordWhole {
        salt: [u8; SALT_LEN],
        nonce: [u8; NONCE_LEN],
    },
    KeyfileWhole {
        nonce: [u8; NONCE_LEN],
    },
    PasswordStream {
        chunk_size: u32,
        salt: [u8; SALT_LEN],
        base_nonce: [u8; NONCE_LEN],
    },
    KeyfileStream {
        chunk_size: u32,
        base_nonce: [u8; NONCE_LEN],
    },
}

impl Header {
    pub fn marker(&self) -> Marker {
        match self {
            Header::PasswordWhole { .. } => Marker::PasswordWhole,
            Header::KeyfileWhole { .. } => Marker::KeyfileWhole,
            Header::PasswordStream { .. } => Marker::PasswordStream,
            Header::KeyfileStream { .. } => Marker::KeyfileStream,
        }
    }

    pub fn salt(&self) -> Option<&[u8; SALT_LEN]> {
        match self {
            Header::PasswordWhole { salt, .. } | Header::PasswordStream { salt, .. } => Some(salt),
            _ => None,
        }
    }

    /// Nonce for whole containers, base nonce for streams.
    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        match self {
            Header::PasswordWhole { nonce, .. } | Header::KeyfileWhole { nonce } => nonce,
            Header::PasswordStream { base_nonce, .. } | Header::KeyfileStream { base_nonce, .. } => {
                base_nonce
            }
        }
    }

    pub fn chunk_size(&self) -> Option<u32> {
        match self {
            Header::PasswordStream { chunk_size, .. } | Header::KeyfileStream { chunk_size, .. } => {
                Some(*chunk_size)
            }
            _ => None,
        }
    }

    pub fn encoded_len(&self) -> usize {
        self.marker().header_len()
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.reserve(self.encoded_len());
        out.push(self.marker().as_byte());
        if let Some(cs) = self.chunk_size() {
            out.push(STREAM_VERSION);
            out.extend_from_slice(&cs.to_le_bytes());
        }
        if let Some(salt) = self.salt() {
            out.extend_from_slice(salt);
        }
        out.extend_from_slice(self.nonce());
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(self.encoded_len());
        self.write_to(&mut v);
        v
    }

    /// Parse a header from the front of `data`.
    ///
    /// Returns `Ok(None)` when more bytes are needed to finish the header.
    /// The marker and version are validated as soon as they are available, so
    /// garbage is rejected without waiting for a full header.
    pub fn parse(data: &[u8]) -> Result<Option<(Header, usize)>, ChunkCryptError> {
        let Some(&first) = data.first() else {
            return Ok(None);
        };
        let marker = Marker::from_byte(first).ok_or(ChunkCryptError::UnknownMarker(first))?;

        if marker.is_streaming() {
            if let Some(&version) = data.get(1) {
                if version != STREAM_VERSION {
                    return Err(ChunkCryptError::UnsupportedVersion(version));
                }
            }
        }

        let len = marker.header_len();
        if data.len() < len {
            return Ok(None);
        }

        let mut r = Cursor::new(&data[1..len]);
        let header = match marker {
            Marker::PasswordWhole => Header::PasswordWhole {
                salt: r.array(),
                nonce: r.array(),
            },
            Marker::KeyfileWhole => Header::KeyfileWhole { nonce: r.array() },
            Marker::PasswordStream => {
                r.skip(1);
                Header::PasswordStream {
                    chunk_size: u32::from_le_bytes(r.array()),
                    salt: r.array(),
                    base_nonce: r.array(),
                }
            }
            Marker::KeyfileStream => {
                r.skip(1);
                Header::KeyfileStream {
                    chunk_size: u32::from_le_bytes(r.array()),
                    base_nonce: r.array(),
                }
            }
        };

        if header.chunk_size() == Some(0) {
            return Err(ChunkCryptError::MalformedContainer("chunk size of zero in header"));
        }
        Ok(Some((header, len)))
    }
}

/// Fixed-width reader over a slice already checked to be long enough.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn skip(&mut self, n: usize) {
        self.pos += n;
    }

    fn array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }
}

/// Append one chunk frame (`len || ct+tag`) to `out`.
pub fn write_frame(out: &mut Vec<u8>, sealed: &[u8]) -> Result<(), ChunkCryptError> {
    let len = u32::try_from(sealed.len())
        .map_err(|_| ChunkCryptError::InvalidInput("chunk too large for 32-bit frame"))?;
    out.reserve(FRAME_LEN_SIZE + sealed.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(sealed);
    Ok(())
}

/// Read a frame's declared sealed length, if the prefix is complete.
pub fn peek_frame_len(data: &[u8]) -> Option<usize> {
    let prefix: [u8; FRAME_LEN_SIZE] = data.get(..FRAME_LEN_SIZE)?.try_into().ok()?;
    Some(u32::from_le_bytes(prefix) as usize)
}

/// Largest plaintext chunk whose sealed form still fits a 32-bit frame length.
pub const MAX_CHUNK_SIZE: usize = u32::MAX as usize - TAG_LEN;

/// Validate and normalize a streaming chunk size (`0` means default).
pub fn effective_chunk_size(requested: usize) -> Result<usize, ChunkCryptError> {
    if requested == 0 {
        return Ok(crate::types::DEFAULT_CHUNK_SIZE);
    }
    if requested > MAX_CHUNK_SIZE {
        return Err(ChunkCryptError::InvalidInput(
            "chunk_size too large for 32-bit frame",
        ));
    }
    Ok(requested)
}

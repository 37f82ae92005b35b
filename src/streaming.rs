//! Streaming encryption and decryption for large payloads.
//!
//! [`StreamEncryptor`] and [`StreamDecryptor`] are push-based state machines:
//! feed them fragments of any size with `update`, then call `finish`. They
//! hold at most one chunk of pending input, so memory stays bounded no matter
//! how large the payload is. [`encrypt_stream`] and [`decrypt_stream`] drive
//! them from a `Read` into a `Write`.
//!
//! Chunks are processed strictly in order. Plaintext already handed out
//! before a later chunk fails authentication is not retracted; callers that
//! need all-or-nothing output should write to a temporary location, as
//! [`crate::file`] does.
//!
//! The format has no final-chunk flag and no total length. A container cut
//! exactly on a frame boundary therefore still decrypts, to a prefix of the
//! original plaintext. Only a cut inside a frame is detected.

use std::io::{ErrorKind, Read, Write};

use aes_gcm::Aes256Gcm;
use bytes::{Buf, BytesMut};
use tracing::{debug, trace};
use zeroize::Zeroize;

use crate::crypto::{aead_decrypt, aead_encrypt, create_cipher, generate_nonce, generate_salt};
use crate::format::{
    FRAME_LEN_SIZE, Header, Marker, effective_chunk_size, peek_frame_len, write_frame,
};
use crate::kdf::session_key;
use crate::nonce::chunk_nonce;
use crate::types::{
    CancelToken, ChunkCryptError, Credential, CredentialKind, EncryptOptions, NONCE_LEN,
    ProgressEvent, ProgressFn, ProgressPhase, TAG_LEN,
};

/// Default size of the read buffer used by the reader/writer drivers.
pub const DEFAULT_READ_BUFFER: usize = 64 * 1024;

/// Driver settings that do not affect the container bytes.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Bytes requested per `read` call. Independent of the chunk size.
    pub read_buffer_size: usize,
    /// Size of the input, if known, for progress fractions.
    pub total_bytes: Option<u64>,
    pub cancel: Option<CancelToken>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER,
            total_bytes: None,
            cancel: None,
        }
    }
}

/// Byte and chunk counts for a completed driver run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub chunks: u64,
}

struct Progress<'p> {
    callback: Option<ProgressFn<'p>>,
    phase: ProgressPhase,
    processed_bytes: u64,
    processed_chunks: u64,
    total_bytes: Option<u64>,
}

impl<'p> Progress<'p> {
    fn new(phase: ProgressPhase) -> Self {
        Self {
            callback: None,
            phase,
            processed_bytes: 0,
            processed_chunks: 0,
            total_bytes: None,
        }
    }

    fn advance(&mut self, bytes: u64, chunks: u64) {
        self.processed_bytes += bytes;
        self.processed_chunks += chunks;
        let fraction = self.total_bytes.map(|t| {
            if t == 0 {
                1.0
            } else {
                (self.processed_bytes as f64 / t as f64).min(1.0)
            }
        });
        self.emit(self.phase, fraction);
    }

    fn complete(&mut self) {
        self.emit(ProgressPhase::Complete, Some(1.0));
    }

    fn emit(&mut self, phase: ProgressPhase, progress: Option<f64>) {
        if let Some(cb) = self.callback.as_mut() {
            cb(&ProgressEvent {
                phase,
                processed_bytes: self.processed_bytes,
                processed_chunks: self.processed_chunks,
                total_bytes: self.total_bytes,
                progress,
            });
        }
    }
}

/// Incremental encryptor producing a streaming container.
pub struct StreamEncryptor<'p> {
    cipher: Aes256Gcm,
    /// Present until the header has been emitted.
    header: Option<Header>,
    base_nonce: [u8; NONCE_LEN],
    chunk_size: usize,
    pending: BytesMut,
    chunk_index: u64,
    progress: Progress<'p>,
    poisoned: bool,
}

impl<'p> StreamEncryptor<'p> {
    /// Start a new container. Derives the key once (PBKDF2 for passwords).
    ///
    /// `chunk_size == 0` selects the default chunk size.
    pub fn new(credential: &Credential, chunk_size: usize) -> Result<Self, ChunkCryptError> {
        let chunk_size = effective_chunk_size(chunk_size)?;
        let base_nonce = generate_nonce()?;
        // effective_chunk_size bounds the value below u32::MAX
        let declared = chunk_size as u32;
        let header = match credential.kind() {
            CredentialKind::Password => Header::PasswordStream {
                chunk_size: declared,
                salt: generate_salt()?,
                base_nonce,
            },
            CredentialKind::Key => Header::KeyfileStream {
                chunk_size: declared,
                base_nonce,
            },
        };
        let key = session_key(credential, header.salt())?;
        let cipher = create_cipher(&key)?;
        debug!(marker = ?header.marker(), chunk_size, "stream encryptor ready");

        Ok(Self {
            cipher,
            header: Some(header),
            base_nonce,
            chunk_size,
            pending: BytesMut::new(),
            chunk_index: 0,
            progress: Progress::new(ProgressPhase::Encrypting),
            poisoned: false,
        })
    }

    pub fn with_progress(mut self, callback: impl FnMut(&ProgressEvent) + 'p) -> Self {
        self.progress.callback = Some(Box::new(callback));
        self
    }

    /// Plaintext size, if known, so progress events carry a fraction.
    pub fn with_total_bytes(mut self, total: Option<u64>) -> Self {
        self.progress.total_bytes = total;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunks_emitted(&self) -> u64 {
        self.chunk_index
    }

    /// Consume a plaintext fragment, appending any completed frames to `out`.
    pub fn update(&mut self, fragment: &[u8], out: &mut Vec<u8>) -> Result<(), ChunkCryptError> {
        if self.poisoned {
            return Err(ChunkCryptError::InvalidInput("stream is no longer usable"));
        }
        let res = self.update_inner(fragment, out);
        self.poisoned = res.is_err();
        res
    }

    fn update_inner(
        &mut self,
        mut fragment: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<(), ChunkCryptError> {
        self.emit_header(out);

        // Top up a partial chunk first.
        if !self.pending.is_empty() {
            let want = self.chunk_size - self.pending.len();
            let take = want.min(fragment.len());
            self.pending.extend_from_slice(&fragment[..take]);
            fragment = &fragment[take..];
            if self.pending.len() < self.chunk_size {
                return Ok(());
            }
            let mut chunk = self.pending.split_to(self.chunk_size);
            let res = self.seal(&chunk, out);
            chunk[..].zeroize();
            res?;
        }

        // Full chunks straight from the caller's slice.
        while fragment.len() >= self.chunk_size {
            let (chunk, rest) = fragment.split_at(self.chunk_size);
            self.seal(chunk, out)?;
            fragment = rest;
        }

        self.pending.extend_from_slice(fragment);
        Ok(())
    }

    /// Seal the trailing partial chunk (if any) and emit the final progress event.
    ///
    /// Returns the total number of chunks in the container.
    pub fn finish(mut self, out: &mut Vec<u8>) -> Result<u64, ChunkCryptError> {
        if self.poisoned {
            return Err(ChunkCryptError::InvalidInput("stream is no longer usable"));
        }
        self.emit_header(out);
        if !self.pending.is_empty() {
            let mut rest = self.pending.split();
            let res = self.seal(&rest, out);
            rest[..].zeroize();
            res?;
        }
        debug!(chunks = self.chunk_index, "stream encryption finished");
        self.progress.complete();
        Ok(self.chunk_index)
    }

    fn emit_header(&mut self, out: &mut Vec<u8>) {
        if let Some(header) = self.header.take() {
            header.write_to(out);
        }
    }

    fn seal(&mut self, plaintext: &[u8], out: &mut Vec<u8>) -> Result<(), ChunkCryptError> {
        let nonce = chunk_nonce(&self.base_nonce, self.chunk_index)?;
        let sealed = aead_encrypt(&self.cipher, &nonce, plaintext)?;
        write_frame(out, &sealed)?;
        trace!(chunk = self.chunk_index, len = plaintext.len(), "sealed chunk");
        self.chunk_index += 1;
        self.progress.advance(plaintext.len() as u64, 1);
        Ok(())
    }
}

impl Drop for StreamEncryptor<'_> {
    fn drop(&mut self) {
        self.pending[..].zeroize();
    }
}

struct Body {
    cipher: Aes256Gcm,
    base_nonce: [u8; NONCE_LEN],
    chunk_size: u32,
    /// Set once a chunk shorter than `chunk_size` has been opened; it must be the last.
    saw_final: bool,
}

enum DecryptState {
    AwaitingHeader(Credential),
    Body(Body),
    Failed,
}

/// Incremental decryptor for streaming containers.
pub struct StreamDecryptor<'p> {
    state: DecryptState,
    pending: BytesMut,
    chunk_index: u64,
    progress: Progress<'p>,
}

impl<'p> StreamDecryptor<'p> {
    /// The credential is held until the header arrives and is dropped once the
    /// session key has been derived.
    pub fn new(credential: &Credential) -> Self {
        Self {
            state: DecryptState::AwaitingHeader(credential.clone()),
            pending: BytesMut::new(),
            chunk_index: 0,
            progress: Progress::new(ProgressPhase::Decrypting),
        }
    }

    pub fn with_progress(mut self, callback: impl FnMut(&ProgressEvent) + 'p) -> Self {
        self.progress.callback = Some(Box::new(callback));
        self
    }

    /// Container size, if known, so progress events carry a fraction.
    pub fn with_total_bytes(mut self, total: Option<u64>) -> Self {
        self.progress.total_bytes = total;
        self
    }

    pub fn header_parsed(&self) -> bool {
        matches!(self.state, DecryptState::Body(_))
    }

    pub fn chunks_opened(&self) -> u64 {
        self.chunk_index
    }

    /// Consume a container fragment, appending recovered plaintext to `out`.
    pub fn update(&mut self, fragment: &[u8], out: &mut Vec<u8>) -> Result<(), ChunkCryptError> {
        if matches!(self.state, DecryptState::Failed) {
            return Err(ChunkCryptError::InvalidInput("stream is no longer usable"));
        }
        self.pending.extend_from_slice(fragment);
        let res = self.parse_header().and_then(|()| self.open_frames(out));
        if res.is_err() {
            self.state = DecryptState::Failed;
        }
        res
    }

    /// Check that the input ended on a frame boundary. Returns the number of chunks opened.
    pub fn finish(mut self) -> Result<u64, ChunkCryptError> {
        match self.state {
            DecryptState::Failed => {
                return Err(ChunkCryptError::InvalidInput("stream is no longer usable"));
            }
            DecryptState::AwaitingHeader(_) if self.pending.is_empty() => {
                return Err(ChunkCryptError::MalformedContainer("empty input"));
            }
            DecryptState::AwaitingHeader(_) => {
                return Err(ChunkCryptError::MalformedContainer(
                    "container shorter than minimum size",
                ));
            }
            DecryptState::Body(_) => {}
        }
        if !self.pending.is_empty() {
            return Err(ChunkCryptError::MalformedContainer("truncated chunk frame"));
        }
        debug!(chunks = self.chunk_index, "stream decryption finished");
        self.progress.complete();
        Ok(self.chunk_index)
    }

    fn parse_header(&mut self) -> Result<(), ChunkCryptError> {
        let DecryptState::AwaitingHeader(credential) = &self.state else {
            return Ok(());
        };
        let Some((header, used)) = Header::parse(&self.pending)? else {
            return Ok(());
        };
        let marker = header.marker();
        let Some(chunk_size) = header.chunk_size() else {
            return Err(ChunkCryptError::InvalidInput(
                "whole-buffer container passed to stream decrypt",
            ));
        };
        if credential.kind() != marker.credential_kind() {
            return Err(ChunkCryptError::CredentialMissing(marker.credential_kind()));
        }

        let key = session_key(credential, header.salt())?;
        let cipher = create_cipher(&key)?;
        self.pending.advance(used);
        debug!(marker = ?marker, chunk_size, "parsed stream header");

        self.state = DecryptState::Body(Body {
            cipher,
            base_nonce: *header.nonce(),
            chunk_size,
            saw_final: false,
        });
        self.progress.advance(used as u64, 0);
        Ok(())
    }

    fn open_frames(&mut self, out: &mut Vec<u8>) -> Result<(), ChunkCryptError> {
        let DecryptState::Body(body) = &mut self.state else {
            return Ok(());
        };
        let max_sealed = u64::from(body.chunk_size) + TAG_LEN as u64;

        while let Some(sealed_len) = peek_frame_len(&self.pending) {
            if body.saw_final {
                return Err(ChunkCryptError::MalformedContainer(
                    "chunk follows a short final chunk",
                ));
            }
            if sealed_len < TAG_LEN || sealed_len as u64 > max_sealed {
                return Err(ChunkCryptError::MalformedContainer(
                    "chunk length out of range",
                ));
            }
            if self.pending.len() < FRAME_LEN_SIZE + sealed_len {
                break;
            }

            let nonce = chunk_nonce(&body.base_nonce, self.chunk_index)?;
            self.pending.advance(FRAME_LEN_SIZE);
            let sealed = self.pending.split_to(sealed_len);
            let index = self.chunk_index;
            let mut plaintext =
                aead_decrypt(&body.cipher, &nonce, &sealed).ok_or_else(|| match index {
                    0 => ChunkCryptError::WrongCredential,
                    chunk => ChunkCryptError::DataCorruption { chunk },
                })?;

            if (plaintext.len() as u64) < u64::from(body.chunk_size) {
                body.saw_final = true;
            }
            trace!(chunk = self.chunk_index, len = plaintext.len(), "opened chunk");
            out.extend_from_slice(&plaintext);
            plaintext.zeroize();

            self.chunk_index += 1;
            self.progress
                .advance((FRAME_LEN_SIZE + sealed_len) as u64, 1);
        }
        Ok(())
    }
}

impl Drop for StreamDecryptor<'_> {
    fn drop(&mut self) {
        self.pending[..].zeroize();
    }
}

fn read_some<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, ChunkCryptError> {
    loop {
        match reader.read(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

fn check_cancel(cancel: Option<&CancelToken>) -> Result<(), ChunkCryptError> {
    match cancel {
        Some(c) if c.is_cancelled() => {
            debug!("stream cancelled");
            Err(ChunkCryptError::Cancelled)
        }
        _ => Ok(()),
    }
}

/// Encrypt everything `reader` yields into a streaming container on `writer`.
pub fn encrypt_stream<R: Read, W: Write>(
    mut reader: R,
    mut writer: W,
    credential: &Credential,
    opts: &EncryptOptions,
    stream_opts: &StreamOptions,
    progress: Option<ProgressFn<'_>>,
) -> Result<StreamSummary, ChunkCryptError> {
    let mut enc = StreamEncryptor::new(credential, opts.chunk_size)?
        .with_total_bytes(stream_opts.total_bytes);
    if let Some(cb) = progress {
        enc = enc.with_progress(cb);
    }

    let mut buf = vec![0u8; stream_opts.read_buffer_size.max(1)];
    let mut out = Vec::new();
    let mut summary = StreamSummary::default();

    let res = (|| {
        loop {
            check_cancel(stream_opts.cancel.as_ref())?;
            let n = read_some(&mut reader, &mut buf)?;
            if n == 0 {
                break;
            }
            summary.bytes_in += n as u64;
            enc.update(&buf[..n], &mut out)?;
            writer.write_all(&out)?;
            summary.bytes_out += out.len() as u64;
            out.clear();
        }
        Ok::<(), ChunkCryptError>(())
    })();
    buf.zeroize();
    res?;

    summary.chunks = enc.finish(&mut out)?;
    writer.write_all(&out)?;
    writer.flush()?;
    summary.bytes_out += out.len() as u64;
    Ok(summary)
}

/// Decrypt a streaming container from `reader`, writing plaintext to `writer`.
///
/// Plaintext for chunks that authenticated before a failure has already been
/// written when the error is returned.
pub fn decrypt_stream<R: Read, W: Write>(
    mut reader: R,
    mut writer: W,
    credential: &Credential,
    stream_opts: &StreamOptions,
    progress: Option<ProgressFn<'_>>,
) -> Result<StreamSummary, ChunkCryptError> {
    let mut dec = StreamDecryptor::new(credential).with_total_bytes(stream_opts.total_bytes);
    if let Some(cb) = progress {
        dec = dec.with_progress(cb);
    }

    let mut buf = vec![0u8; stream_opts.read_buffer_size.max(1)];
    let mut out = Vec::new();
    let mut summary = StreamSummary::default();

    let res = (|| {
        loop {
            check_cancel(stream_opts.cancel.as_ref())?;
            let n = read_some(&mut reader, &mut buf)?;
            if n == 0 {
                break;
            }
            summary.bytes_in += n as u64;
            let step = dec.update(&buf[..n], &mut out);
            let written = writer.write_all(&out);
            summary.bytes_out += out.len() as u64;
            out.zeroize();
            step?;
            written?;
        }
        Ok::<(), ChunkCryptError>(())
    })();
    res?;

    summary.chunks = dec.finish()?;
    writer.flush()?;
    Ok(summary)
}

/// Stream-encrypt an in-memory payload.
pub fn encrypt_bytes_streaming(
    plaintext: &[u8],
    credential: &Credential,
    chunk_size: usize,
) -> Result<Vec<u8>, ChunkCryptError> {
    let mut enc = StreamEncryptor::new(credential, chunk_size)?;
    let chunk_size = enc.chunk_size();
    let chunks = plaintext.len().div_ceil(chunk_size);
    let mut out = Vec::with_capacity(
        Marker::PasswordStream.header_len() + plaintext.len() + chunks * (FRAME_LEN_SIZE + TAG_LEN),
    );
    enc.update(plaintext, &mut out)?;
    enc.finish(&mut out)?;
    Ok(out)
}

/// Decrypt a complete streaming container held in memory.
///
/// The container is replayed through [`StreamDecryptor`] as one fragment.
pub fn decrypt_bytes_streaming(
    container: &[u8],
    credential: &Credential,
) -> Result<Vec<u8>, ChunkCryptError> {
    let mut dec = StreamDecryptor::new(credential);
    let mut out = Vec::with_capacity(container.len());
    let res = dec.update(container, &mut out).and_then(|()| dec.finish());
    if let Err(e) = res {
        out.zeroize();
        return Err(e);
    }
    Ok(out)
}

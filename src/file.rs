//! File I/O operations for encryption and decryption.

use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};
use zeroize::Zeroize;

use crate::dispatch::should_stream;
use crate::format::Marker;
use crate::streaming::{StreamOptions, decrypt_stream, encrypt_stream};
use crate::types::{ChunkCryptError, Credential, EncryptOptions, ProgressFn};
use crate::whole::{decrypt_whole, encrypt_whole};

/// Atomically write data to a file using a temporary file.
///
/// # Errors
///
/// Returns `ChunkCryptError::Io` for I/O failures or `ChunkCryptError::InvalidInput` for invalid paths.
pub fn write_all_atomic(path: &Path, data: &[u8], force: bool) -> Result<(), ChunkCryptError> {
    let mut tmp = temp_beside(path)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;
    persist_tempfile_atomic(tmp, path, force)?;
    Ok(())
}

fn temp_beside(path: &Path) -> Result<NamedTempFile, ChunkCryptError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        Some(_) => Path::new("."),
        None => return Err(ChunkCryptError::InvalidInput("output path has no parent")),
    };
    fs::create_dir_all(parent)?;
    Ok(NamedTempFile::new_in(parent)?)
}

/// Atomically persist a tempfile to the target path, honoring the force overwrite policy.
pub fn persist_tempfile_atomic(
    tmp: NamedTempFile,
    out: &Path,
    force: bool,
) -> Result<PathBuf, ChunkCryptError> {
    let tmp_path = tmp.into_temp_path();

    if out.exists() {
        if force {
            fs::remove_file(out)?;
        } else {
            return Err(ChunkCryptError::InvalidInput(
                "output exists; use --force to overwrite",
            ));
        }
    }

    tmp_path
        .persist(out)
        .map_err(|e| ChunkCryptError::Io(e.error))?;
    Ok(out.to_path_buf())
}

/// Default encrypted output path: `.enc` is appended to the input name.
pub fn default_encrypt_output_path(in_path: &Path) -> PathBuf {
    let mut name = in_path
        .file_name()
        .unwrap_or_else(|| OsStr::new("out"))
        .to_os_string();
    name.push(".enc");
    in_path.with_file_name(name)
}

/// Determine the default output path for decryption operations.
///
/// - If the input file ends with ".enc", strip that extension
/// - Otherwise, append ".dec"
pub fn default_decrypt_output_path(in_path: &Path) -> PathBuf {
    let parent = in_path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = in_path.file_name().unwrap_or_else(|| OsStr::new("out"));

    if let Some(name) = file_name.to_str() {
        if let Some(stripped) = name.strip_suffix(".enc") {
            if !stripped.is_empty() {
                return parent.join(stripped);
            }
        }
        return parent.join(format!("{name}.dec"));
    }

    let mut os = file_name.to_os_string();
    os.push(".dec");
    parent.join(os)
}

fn refuse_existing(out: &Path, force: bool) -> Result<(), ChunkCryptError> {
    if out.exists() && !force {
        return Err(ChunkCryptError::InvalidInput(
            "output exists; use --force to overwrite",
        ));
    }
    Ok(())
}

/// Encrypt a file on disk.
///
/// Files at or above `opts.stream_threshold` (or any file when `opts.stream`
/// is set) are written in the streaming format in constant memory.
pub fn encrypt_file(
    input: &Path,
    output: Option<&Path>,
    credential: &Credential,
    opts: &EncryptOptions,
    force: bool,
    progress: Option<ProgressFn<'_>>,
) -> Result<PathBuf, ChunkCryptError> {
    let out_path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_encrypt_output_path(input));
    refuse_existing(&out_path, force)?;

    let size = fs::metadata(input)?.len();
    if should_stream(size, opts) {
        debug!(size, "encrypting file in streaming mode");
        let mut tmp = temp_beside(&out_path)?;
        {
            let reader = BufReader::new(File::open(input)?);
            let writer = BufWriter::new(tmp.as_file_mut());
            let sopts = StreamOptions {
                total_bytes: Some(size),
                ..Default::default()
            };
            encrypt_stream(reader, writer, credential, opts, &sopts, progress)?;
        }
        tmp.as_file_mut().sync_all()?;
        let out = persist_tempfile_atomic(tmp, &out_path, force)?;
        info!(path = %out.display(), "wrote streaming container");
        Ok(out)
    } else {
        let mut data = Vec::new();
        File::open(input)?.read_to_end(&mut data)?;
        let res = encrypt_whole(&data, credential);
        data.zeroize();
        write_all_atomic(&out_path, &res?, force)?;
        info!(path = %out_path.display(), "wrote container");
        Ok(out_path)
    }
}

/// Decrypt a file on disk, choosing the path from the container's marker.
///
/// Plaintext is staged in a temporary file and only moved into place once
/// every chunk has authenticated, so a failure leaves nothing behind.
pub fn decrypt_file(
    input: &Path,
    output: Option<&Path>,
    credential: &Credential,
    force: bool,
    progress: Option<ProgressFn<'_>>,
) -> Result<PathBuf, ChunkCryptError> {
    let out_path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_decrypt_output_path(input));
    refuse_existing(&out_path, force)?;

    let mut file = File::open(input)?;
    let size = file.metadata()?.len();
    let mut first = [0u8; 1];
    let marker = match file.read(&mut first)? {
        0 => return Err(ChunkCryptError::MalformedContainer("empty input")),
        _ => Marker::from_byte(first[0]).ok_or(ChunkCryptError::UnknownMarker(first[0]))?,
    };

    if marker.is_streaming() {
        debug!(size, "decrypting streaming container");
        let mut tmp = temp_beside(&out_path)?;
        {
            let reader = BufReader::new(first.as_slice().chain(file));
            let writer = BufWriter::new(tmp.as_file_mut());
            let sopts = StreamOptions {
                total_bytes: Some(size),
                ..Default::default()
            };
            decrypt_stream(reader, writer, credential, &sopts, progress)?;
        }
        tmp.as_file_mut().sync_all()?;
        let out = persist_tempfile_atomic(tmp, &out_path, force)?;
        info!(path = %out.display(), "wrote plaintext");
        Ok(out)
    } else {
        let mut data = first.to_vec();
        file.read_to_end(&mut data)?;
        let mut pt = decrypt_whole(&data, credential)?;
        let res = write_all_atomic(&out_path, &pt, force);
        pt.zeroize();
        res?;
        info!(path = %out_path.display(), "wrote plaintext");
        Ok(out_path)
    }
}

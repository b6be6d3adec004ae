//! Merge finished chunk files into the destination.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::control::ControlToken;
use crate::error::EngineError;

/// `<dest>.part`, the staging file used while merging.
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Concatenates `chunk_paths` in order into `dest`.
///
/// Bytes go to `<dest>.part` first and are renamed into place only when every
/// chunk was copied and the length matches `expected_len` (if given). Chunk
/// files are removed after the rename. On failure the staging file is removed,
/// chunk files stay for another attempt and `dest` is left untouched.
///
/// A signal on `token` stops the merge between chunks and before the rename;
/// that is reported as a `MergeFailed` with `ErrorKind::Interrupted`.
pub fn merge_chunks(
    chunk_paths: &[PathBuf],
    dest: &Path,
    expected_len: Option<u64>,
    token: &ControlToken,
) -> Result<u64, EngineError> {
    let part = part_path(dest);
    let written = match concat_into(chunk_paths, &part, expected_len, token) {
        Ok(n) => n,
        Err(e) => {
            let _ = fs::remove_file(&part);
            return Err(EngineError::MergeFailed(e));
        }
    };
    if token.signal().is_some() {
        let _ = fs::remove_file(&part);
        return Err(EngineError::MergeFailed(interrupted()));
    }
    if let Err(e) = fs::rename(&part, dest) {
        let _ = fs::remove_file(&part);
        return Err(EngineError::MergeFailed(e));
    }

    for path in chunk_paths {
        if let Err(e) = fs::remove_file(path) {
            tracing::debug!(path = %path.display(), "could not remove chunk file: {}", e);
        }
    }
    Ok(written)
}

fn interrupted() -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, "merge interrupted")
}

fn concat_into(
    chunk_paths: &[PathBuf],
    part: &Path,
    expected_len: Option<u64>,
    token: &ControlToken,
) -> io::Result<u64> {
    let mut out = BufWriter::new(File::create(part)?);
    let mut written = 0u64;
    for path in chunk_paths {
        if token.signal().is_some() {
            return Err(interrupted());
        }
        let mut chunk = File::open(path)
            .map_err(|e| io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))?;
        written += io::copy(&mut chunk, &mut out)?;
    }
    out.flush()?;
    out.into_inner().map_err(|e| e.into_error())?.sync_all()?;

    if let Some(expected) = expected_len {
        if written != expected {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("merged {} bytes, expected {}", written, expected),
            ));
        }
    }
    Ok(written)
}

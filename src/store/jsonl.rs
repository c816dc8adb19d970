//! File primitives shared by every on-disk structure.
//!
//! Two write shapes exist and nothing else touches the files:
//!
//! - **append**: one complete JSON document plus `\n` in a single `write_all`
//!   on an `O_APPEND` handle, so interleaved writers never split a line;
//! - **atomic rewrite**: the new content goes to a uniquely named temp file in
//!   the same directory and is `rename`d over the target.
//!
//! Readers skip any line that fails to parse.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;

use crate::error::{StorageError, StorageResult};

/// Append one value as a single JSON line, creating parent directories lazily.
pub fn append_line<T: Serialize + ?Sized>(path: &Path, value: &T) -> StorageResult<()> {
    ensure_parent(path)?;
    let mut line = serde_json::to_string(value)?;
    line.push('\n');

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Read every non-empty line of a file. A missing file reads as empty.
///
/// The file is read as bytes and split on `\n`; lines that are not valid
/// UTF-8 are skipped like any other malformed line.
pub fn read_lines(path: &Path) -> StorageResult<Vec<String>> {
    Ok(split_lines(path)?.1)
}

/// Count of raw non-empty lines alongside the ones that decode as UTF-8.
fn split_lines(path: &Path) -> StorageResult<(usize, Vec<String>)> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok((0, Vec::new())),
        Err(e) => return Err(e.into()),
    };

    let mut total = 0;
    let mut lines = Vec::new();
    for raw in bytes.split(|b| *b == b'\n') {
        if raw.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        total += 1;
        match std::str::from_utf8(raw) {
            Ok(line) => lines.push(line.trim_end_matches('\r').to_string()),
            Err(_) => trace!(path = %path.display(), "Skipping non-UTF-8 line"),
        }
    }
    Ok((total, lines))
}

/// Scan from the end of the file backward, returning up to `limit` parsed
/// values accepted by `keep`, most recent first.
pub fn scan_rev<T, F>(path: &Path, limit: usize, mut keep: F) -> StorageResult<Vec<T>>
where
    T: DeserializeOwned,
    F: FnMut(&T) -> bool,
{
    let mut out = Vec::new();
    if limit == 0 {
        return Ok(out);
    }
    for line in read_lines(path)?.iter().rev() {
        let value: T = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(_) => {
                trace!(path = %path.display(), "Skipping malformed line");
                continue;
            }
        };
        if keep(&value) {
            out.push(value);
            if out.len() >= limit {
                break;
            }
        }
    }
    Ok(out)
}

/// Parse every valid line in append order.
pub fn read_all<T: DeserializeOwned>(path: &Path) -> StorageResult<Vec<T>> {
    Ok(read_lines(path)?
        .iter()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}

/// Keep only the most recent `max_entries` valid JSON lines.
///
/// Undecodable lines count toward the cap and are dropped on rewrite.
/// Returns `true` when the file was rewritten.
pub fn rotate(path: &Path, max_entries: usize) -> StorageResult<bool> {
    let (total, lines) = split_lines(path)?;
    if total <= max_entries {
        return Ok(false);
    }

    let valid: Vec<&String> = lines
        .iter()
        .filter(|l| serde_json::from_str::<serde_json::Value>(l).is_ok())
        .collect();
    let start = valid.len().saturating_sub(max_entries);

    let mut content = String::new();
    for line in &valid[start..] {
        content.push_str(line);
        content.push('\n');
    }
    write_atomic(path, content.as_bytes())?;
    Ok(true)
}

/// Replace `path` with `bytes` via temp file and rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    ensure_parent(path)?;
    let tmp = temp_path(path)?;
    if let Err(e) = fs::write(&tmp, bytes).and_then(|_| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> StorageResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes)
}

/// Read a whole-file JSON document. A missing file reads as `None`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> StorageResult<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Delete a file, treating "already gone" as success.
pub fn remove(path: &Path) -> StorageResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn ensure_parent(path: &Path) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn temp_path(path: &Path) -> StorageResult<PathBuf> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StorageError::InvalidPath {
            path: path.display().to_string(),
        })?;
    Ok(path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple())))
}

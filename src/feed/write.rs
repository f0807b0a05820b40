use std::fs::{File, OpenOptions, TryLockError};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use file_rotate::{ContentLimit, FileRotate, compression::Compression, suffix::AppendCount};
use serde::Serialize;

use crate::config::Persistence;

use super::model::PersistError;
use super::paths::ensure_dir;

#[derive(Debug, Clone, Copy)]
pub(crate) struct LockPolicy {
    pub(crate) attempts: u32,
    pub(crate) delay: Duration,
    pub(crate) durable: bool,
}

impl LockPolicy {
    pub(crate) fn from_config(persistence: &Persistence) -> Self {
        Self {
            attempts: persistence.lock_retry_attempts.max(1),
            delay: Duration::from_millis(persistence.lock_retry_delay_ms),
            durable: persistence.durable_writes,
        }
    }
}

/// Takes the advisory lock within the retry budget; never blocks indefinitely.
fn lock_with_retry(file: &File, path: &Path, policy: LockPolicy) -> Result<(), PersistError> {
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        match file.try_lock() {
            Ok(()) => return Ok(()),
            Err(TryLockError::WouldBlock) => {
                if attempt < attempts {
                    thread::sleep(policy.delay);
                }
            }
            Err(TryLockError::Error(source)) => return Err(PersistError::io(path, source)),
        }
    }

    Err(PersistError::LockTimeout {
        path: path.display().to_string(),
        attempts,
    })
}

fn open_with_parent(path: &Path, options: &OpenOptions) -> Result<File, PersistError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        ensure_dir(parent).map_err(|source| PersistError::io(parent, source))?;
    }
    options
        .open(path)
        .map_err(|source| PersistError::io(path, source))
}

fn write_all_synced(file: &mut File, bytes: &[u8], durable: bool) -> Result<(), std::io::Error> {
    file.write_all(bytes)?;
    if durable {
        file.sync_data()?;
    }
    Ok(())
}

pub(crate) fn append_json_line<T: Serialize>(
    path: &Path,
    value: &T,
    policy: LockPolicy,
) -> Result<(), PersistError> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');

    let mut file = open_with_parent(path, OpenOptions::new().create(true).append(true))?;
    lock_with_retry(&file, path, policy)?;
    let result = write_all_synced(&mut file, &line, policy.durable)
        .map_err(|source| PersistError::io(path, source));
    let _ = file.unlock();
    result
}

/// Appends one JSON line and keeps only the newest `keep` lines of the file.
pub(crate) fn append_bounded_json_line<T: Serialize>(
    path: &Path,
    value: &T,
    keep: usize,
    policy: LockPolicy,
) -> Result<(), PersistError> {
    let line = serde_json::to_string(value)?;

    let mut file = open_with_parent(
        path,
        OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false),
    )?;
    lock_with_retry(&file, path, policy)?;
    let result = rewrite_tail(&mut file, line, keep.max(1), policy.durable)
        .map_err(|source| PersistError::io(path, source));
    let _ = file.unlock();
    result
}

fn rewrite_tail(
    file: &mut File,
    line: String,
    keep: usize,
    durable: bool,
) -> Result<(), std::io::Error> {
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    let mut lines = String::from_utf8_lossy(&bytes)
        .lines()
        .filter(|existing| !existing.trim().is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();
    lines.push(line);
    if lines.len() > keep {
        lines.drain(0..(lines.len() - keep));
    }

    let mut content = lines.join("\n");
    content.push('\n');

    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    write_all_synced(file, content.as_bytes(), durable)
}

pub(crate) fn append_human_line(
    path: &Path,
    line: &str,
    max_bytes: u64,
    keep: u16,
) -> Result<(), PersistError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent).map_err(|source| PersistError::io(parent, source))?;
    }

    let max_bytes = usize::try_from(max_bytes).unwrap_or(usize::MAX);
    let mut writer = FileRotate::new(
        path,
        AppendCount::new(usize::from(keep.max(1))),
        ContentLimit::BytesSurpassed(max_bytes),
        Compression::None,
        None,
    );

    writer
        .write_all(line.as_bytes())
        .and_then(|_| writer.write_all(b"\n"))
        .map_err(|source| PersistError::io(path, source))
}

/// Last-resort append: no lock, no JSON, just the text.
pub(crate) fn append_raw_text(path: &Path, text: &str) -> Result<(), PersistError> {
    let mut file = open_with_parent(path, OpenOptions::new().create(true).append(true))?;
    file.write_all(text.as_bytes())
        .and_then(|_| file.write_all(b"\n"))
        .map_err(|source| PersistError::io(path, source))
}

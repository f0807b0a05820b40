use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
#[cfg(test)]
use std::path::PathBuf;

use serde::de::DeserializeOwned;

/// Newest-first entries from the daily monitoring files in `json_dir`.
#[cfg(test)]
pub(crate) fn recent_entries<T: DeserializeOwned>(json_dir: &Path, limit: usize) -> Vec<T> {
    if limit == 0 {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(limit);
    for file_path in newest_monitoring_files(json_dir) {
        let remaining = limit.saturating_sub(out.len());
        if remaining == 0 {
            break;
        }

        let Ok(lines) = read_tail_lines(&file_path, remaining) else {
            continue;
        };

        for line in lines.into_iter().rev() {
            let Ok(entry) = serde_json::from_str::<T>(&line) else {
                continue;
            };
            out.push(entry);
            if out.len() >= limit {
                break;
            }
        }
    }

    out
}

/// Oldest-first records from a bounded JSONL file; unreadable lines are skipped.
pub(crate) fn tail_records<T: DeserializeOwned>(path: &Path, limit: usize) -> Vec<T> {
    match read_tail_lines(path, limit) {
        Ok(lines) => lines
            .iter()
            .filter_map(|line| serde_json::from_str::<T>(line).ok())
            .collect(),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(error) => {
            log::warn!("feed_read_failed path={} error={}", path.display(), error);
            Vec::new()
        }
    }
}

#[cfg(test)]
fn newest_monitoring_files(json_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(json_dir) else {
        return Vec::new();
    };

    let mut files = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("monitoring-") && name.ends_with(".jsonl"))
        })
        .collect::<Vec<_>>();

    // The date is embedded in the name, so lexical order is chronological.
    files.sort_by(|left, right| right.cmp(left));
    files
}

fn read_tail_lines(path: &Path, max_lines: usize) -> Result<Vec<String>, std::io::Error> {
    let mut file = File::open(path)?;
    let file_len = file.seek(SeekFrom::End(0))?;
    if file_len == 0 || max_lines == 0 {
        return Ok(Vec::new());
    }

    const CHUNK_SIZE: u64 = 4096;
    let mut pos = file_len;
    let mut bytes = Vec::new();
    let mut newline_count = 0usize;

    while pos > 0 && newline_count <= max_lines {
        let read_size = CHUNK_SIZE.min(pos);
        pos -= read_size;

        file.seek(SeekFrom::Start(pos))?;
        let mut chunk = vec![0u8; read_size as usize];
        file.read_exact(&mut chunk)?;
        newline_count += chunk.iter().filter(|&&byte| byte == b'\n').count();

        chunk.extend_from_slice(&bytes);
        bytes = chunk;
    }

    let mut lines = String::from_utf8_lossy(&bytes)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();
    if lines.len() > max_lines {
        lines.drain(0..(lines.len() - max_lines));
    }

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::Value;

    use super::{recent_entries, tail_records};

    #[test]
    fn recent_entries_walk_files_newest_first() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(
            dir.path().join("monitoring-2026-01-01.jsonl"),
            "{\"n\":1}\n{\"n\":2}\n",
        )
        .expect("write day one");
        fs::write(
            dir.path().join("monitoring-2026-01-02.jsonl"),
            "{\"n\":3}\nnot json\n{\"n\":4}\n",
        )
        .expect("write day two");
        fs::write(dir.path().join("other.jsonl"), "{\"n\":99}\n").expect("write other");

        let entries = recent_entries::<Value>(dir.path(), 3);
        let values = entries.iter().map(|entry| entry["n"].clone()).collect::<Vec<_>>();
        assert_eq!(values, vec![Value::from(4), Value::from(3), Value::from(2)]);
    }

    #[test]
    fn tail_records_of_missing_file_is_empty() {
        let dir = tempfile::tempdir().expect("temp dir");
        let records = tail_records::<Value>(&dir.path().join("absent.jsonl"), 10);
        assert!(records.is_empty());
    }

    #[test]
    fn tail_records_keep_file_order() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("history.jsonl");
        let content = (0..12).map(|n| format!("{{\"n\":{}}}\n", n)).collect::<String>();
        fs::write(&path, content).expect("write history");

        let records = tail_records::<Value>(&path, 10);
        assert_eq!(records.len(), 10);
        assert_eq!(records[0]["n"], 2);
        assert_eq!(records[9]["n"], 11);
    }
}

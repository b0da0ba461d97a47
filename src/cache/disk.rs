//! On-disk shard store: `CACHE_PATH/shard_<i>` files.
//!
//! Each file is a length-prefixed stream of `(key, created_at, ttl, len,
//! bytes)` tuples. Writes go to a `.tmp` file, then an atomic rename commits
//! them. A shard that fails to parse is quarantined by renaming it to
//! `shard_<i>.corrupt-<timestamp>` and treated as empty from then on:
//! log and swallow, the memory tier stays authoritative.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiskError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt shard file: {0}")]
    Corrupt(String),
}

/// One raw record as stored on disk, independent of the payload's own
/// encoding (the codec layer owns (de)serialization of the value itself).
#[derive(Debug, Clone)]
pub struct RawEntry {
    pub created_at: u64,
    pub ttl_secs: u64,
    pub bytes: Vec<u8>,
}

/// A single on-disk shard file.
pub struct DiskShard {
    path: PathBuf,
}

impl DiskShard {
    pub fn new(dir: &Path, index: usize) -> Self {
        DiskShard {
            path: dir.join(format!("shard_{index}")),
        }
    }

    /// Load all entries, quarantining the file on any parse failure and
    /// returning an empty map rather than propagating the error upward.
    pub fn load_or_quarantine(&self) -> HashMap<String, RawEntry> {
        match self.try_load() {
            Ok(entries) => entries,
            Err(DiskError::Io(e)) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                tracing::warn!(shard = %self.path.display(), error = %err, "quarantining corrupt shard");
                self.quarantine();
                HashMap::new()
            }
        }
    }

    fn try_load(&self) -> Result<HashMap<String, RawEntry>, DiskError> {
        let mut file = std::fs::File::open(&self.path)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        parse_entries(&buf)
    }

    fn quarantine(&self) {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let target = self.path.with_file_name(format!(
            "{}.corrupt-{ts}",
            self.path.file_name().unwrap_or_default().to_string_lossy()
        ));
        if let Err(e) = std::fs::rename(&self.path, &target) {
            tracing::warn!(error = %e, "failed to quarantine corrupt shard file");
        }
    }

    /// Atomically replace this shard's file with the given entries: write
    /// to a `.tmp` sibling, then rename over the real path.
    pub fn write_all(&self, entries: &HashMap<String, RawEntry>) -> Result<(), DiskError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp = std::fs::File::create(&tmp_path)?;
            let buf = encode_entries(entries);
            tmp.write_all(&buf)?;
            tmp.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

fn encode_entries(entries: &HashMap<String, RawEntry>) -> Vec<u8> {
    let mut buf = Vec::new();
    for (key, entry) in entries {
        let key_bytes = key.as_bytes();
        buf.extend_from_slice(&(key_bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(key_bytes);
        buf.extend_from_slice(&entry.created_at.to_le_bytes());
        buf.extend_from_slice(&entry.ttl_secs.to_le_bytes());
        buf.extend_from_slice(&(entry.bytes.len() as u64).to_le_bytes());
        buf.extend_from_slice(&entry.bytes);
    }
    buf
}

fn parse_entries(buf: &[u8]) -> Result<HashMap<String, RawEntry>, DiskError> {
    let mut out = HashMap::new();
    let mut cursor = 0usize;
    while cursor < buf.len() {
        let key_len = read_u32(buf, &mut cursor)? as usize;
        let key_bytes = read_bytes(buf, &mut cursor, key_len)?;
        let key = String::from_utf8(key_bytes)
            .map_err(|e| DiskError::Corrupt(format!("invalid utf8 key: {e}")))?;
        let created_at = read_u64(buf, &mut cursor)?;
        let ttl_secs = read_u64(buf, &mut cursor)?;
        let len = read_u64(buf, &mut cursor)? as usize;
        let bytes = read_bytes(buf, &mut cursor, len)?;
        out.insert(
            key,
            RawEntry {
                created_at,
                ttl_secs,
                bytes,
            },
        );
    }
    Ok(out)
}

fn read_u32(buf: &[u8], cursor: &mut usize) -> Result<u32, DiskError> {
    let bytes = read_bytes(buf, cursor, 4)?;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}

fn read_u64(buf: &[u8], cursor: &mut usize) -> Result<u64, DiskError> {
    let bytes = read_bytes(buf, cursor, 8)?;
    Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
}

fn read_bytes(buf: &[u8], cursor: &mut usize, len: usize) -> Result<Vec<u8>, DiskError> {
    let end = cursor
        .checked_add(len)
        .ok_or_else(|| DiskError::Corrupt("length overflow".to_string()))?;
    if end > buf.len() {
        return Err(DiskError::Corrupt("truncated record".to_string()));
    }
    let slice = buf[*cursor..end].to_vec();
    *cursor = end;
    Ok(slice)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_load_roundtrips() {
        let dir = std::env::temp_dir().join(format!("meshsearch-disk-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let shard = DiskShard::new(&dir, 0);

        let mut entries = HashMap::new();
        entries.insert(
            "k1".to_string(),
            RawEntry {
                created_at: 1000,
                ttl_secs: 60,
                bytes: vec![1, 2, 3, 4],
            },
        );
        shard.write_all(&entries).unwrap();

        let loaded = shard.load_or_quarantine();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["k1"].bytes, vec![1, 2, 3, 4]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = std::env::temp_dir().join(format!("meshsearch-disk-missing-{}", std::process::id()));
        let shard = DiskShard::new(&dir, 7);
        assert!(shard.load_or_quarantine().is_empty());
    }

    #[test]
    fn corrupt_file_is_quarantined_and_loads_empty() {
        let dir = std::env::temp_dir().join(format!("meshsearch-disk-corrupt-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let shard = DiskShard::new(&dir, 0);
        std::fs::write(dir.join("shard_0"), b"not a valid frame stream \xff\xff").unwrap();

        let loaded = shard.load_or_quarantine();
        assert!(loaded.is_empty());
        let has_quarantine = std::fs::read_dir(&dir)
            .unwrap()
            .any(|e| e.unwrap().file_name().to_string_lossy().contains("corrupt-"));
        assert!(has_quarantine);

        let _ = std::fs::remove_dir_all(&dir);
    }
}

//! Save-state persistence.
//!
//! A [`SaveStore`] is an async key-value store of opaque blobs. Keys come from
//! [`CoreKind::state_key`](crate::abi::CoreKind::state_key). A missing key is a normal outcome,
//! not an error.

use std::collections::HashMap;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::Result;

pub const SAVE_MAGIC: [u8; 4] = *b"NBSV";
pub const SAVE_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 8 + 4;
const FILE_EXTENSION: &str = "nbsv";

/// A stored blob and when it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRecord {
    pub data: Vec<u8>,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
}

impl SaveRecord {
    /// Stamp `data` with the current time.
    pub fn now(data: Vec<u8>) -> Self {
        Self {
            data,
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }

    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp_ms)
    }
}

#[allow(async_fn_in_trait)]
pub trait SaveStore {
    async fn put(&mut self, key: &str, data: &[u8]) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<SaveRecord>>;
}

/// In-memory store, for tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemorySaveStore {
    records: HashMap<String, SaveRecord>,
}

impl MemorySaveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl SaveStore for MemorySaveStore {
    async fn put(&mut self, key: &str, data: &[u8]) -> Result<()> {
        self.records
            .insert(key.to_string(), SaveRecord::now(data.to_vec()));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<SaveRecord>> {
        Ok(self.records.get(key).cloned())
    }
}

/// One file per key under a directory.
///
/// Layout, all integers little-endian: magic `NBSV`, `u32` version, `i64` timestamp in
/// milliseconds, `u32` length, then the blob. Files that do not parse read as absent.
#[derive(Debug, Clone)]
pub struct FileSaveStore {
    dir: PathBuf,
}

impl FileSaveStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`. Characters outside `[A-Za-z0-9_-]` become `_`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.{FILE_EXTENSION}"))
    }
}

pub fn encode_record(record: &SaveRecord) -> io::Result<Vec<u8>> {
    let len = u32::try_from(record.data.len()).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, "save data exceeds 4 GiB")
    })?;
    let mut out = Vec::with_capacity(HEADER_LEN + record.data.len());
    out.extend_from_slice(&SAVE_MAGIC);
    out.extend_from_slice(&SAVE_VERSION.to_le_bytes());
    out.extend_from_slice(&record.timestamp_ms.to_le_bytes());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&record.data);
    Ok(out)
}

/// Parse a save file. `None` for anything malformed.
pub fn decode_record(bytes: &[u8]) -> Option<SaveRecord> {
    let (header, data) = bytes.split_at_checked(HEADER_LEN)?;
    let (magic, rest) = header.split_at(4);
    if magic != SAVE_MAGIC {
        return None;
    }
    let (version, rest) = rest.split_at(4);
    if u32::from_le_bytes(version.try_into().ok()?) != SAVE_VERSION {
        return None;
    }
    let (timestamp, len) = rest.split_at(8);
    let timestamp_ms = i64::from_le_bytes(timestamp.try_into().ok()?);
    let len = u32::from_le_bytes(len.try_into().ok()?) as usize;
    if data.len() != len {
        return None;
    }
    Some(SaveRecord {
        data: data.to_vec(),
        timestamp_ms,
    })
}

impl SaveStore for FileSaveStore {
    async fn put(&mut self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        let bytes = encode_record(&SaveRecord::now(data.to_vec()))?;

        fs::create_dir_all(&self.dir).await?;
        let mut tmp_name = OsString::from(path.file_name().unwrap_or_default());
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);

        fs::write(&tmp_path, &bytes).await?;
        #[cfg(windows)]
        {
            if fs::try_exists(&path).await? {
                // Windows rename fails if destination exists.
                fs::remove_file(&path).await?;
            }
        }
        fs::rename(&tmp_path, &path).await?;

        debug!(key, path = %path.display(), bytes = data.len(), "save written");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<SaveRecord>> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record = decode_record(&bytes);
        if record.is_none() {
            warn!(key, path = %path.display(), "ignoring unreadable save file");
        }
        Ok(record)
    }
}

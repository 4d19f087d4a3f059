//! Key/value persistence with a reversible value encoding.
//!
//! Values are serialized with `postcard` and wrapped in a magic/version/
//! checksum envelope before they reach the backend, so a corrupt entry
//! decodes to "absent" instead of garbage. When a write hits the
//! backend's capacity, the store evicts the oldest autosave entry once
//! and retries before surfacing the failure.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::version::{VALUE_BINARY_MAGIC, VALUE_FORMAT_VERSION};

/// Key prefix shared by rotating autosave slots; quota eviction targets
/// these.
pub const AUTOSAVE_KEY_PREFIX: &str = "autosave";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage capacity exceeded")]
    CapacityExceeded,
    #[error("storage io error: {0}")]
    Io(String),
    #[error("value encoding error: {0}")]
    Encoding(String),
}

impl From<std::io::Error> for StorageError {
    fn from(value: std::io::Error) -> Self {
        StorageError::Io(value.to_string())
    }
}

/// Where encoded values live. Implementations only see opaque bytes.
pub trait StorageBackend {
    fn read(&self, key: &str) -> Option<Vec<u8>>;
    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> bool;
    fn keys(&self) -> Vec<String>;
}

/// In-memory backend with an optional byte quota.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: BTreeMap<String, Vec<u8>>,
    quota_bytes: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            quota_bytes: Some(quota_bytes),
        }
    }

    fn used_bytes(&self) -> usize {
        self.entries
            .iter()
            .map(|(key, value)| key.len() + value.len())
            .sum()
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        if let Some(quota) = self.quota_bytes {
            let existing = self.entries.get(key).map_or(0, Vec::len);
            let projected = self.used_bytes() - existing + key.len() + bytes.len();
            if projected > quota {
                return Err(StorageError::CapacityExceeded);
            }
        }
        self.entries.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

/// Directory backend: one file per key, written atomically via a
/// temporary file and rename.
#[derive(Debug)]
pub struct DirBackend {
    root: PathBuf,
}

impl DirBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{safe}.snkv"))
    }
}

impl StorageBackend for DirBackend {
    fn read(&self, key: &str) -> Option<Vec<u8>> {
        fs::read(self.path_for(key)).ok()
    }

    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;
        let path = self.path_for(key);
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, bytes)?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> bool {
        fs::remove_file(self.path_for(key)).is_ok()
    }

    fn keys(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut keys: Vec<String> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("snkv") {
                    return None;
                }
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(str::to_string)
            })
            .collect();
        keys.sort();
        keys
    }
}

/// The persistence surface the engine and hosts use.
pub struct PersistenceStore {
    backend: Box<dyn StorageBackend>,
    prefix: String,
}

impl std::fmt::Debug for PersistenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl PersistenceStore {
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            backend,
            prefix: "snengine_".to_string(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryBackend::new()))
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Encodes and stores a value. On a capacity failure the oldest
    /// autosave entry is evicted once and the write retried.
    pub fn set<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), StorageError> {
        let bytes = encode_value(value)?;
        let full_key = self.full_key(key);
        match self.backend.write(&full_key, &bytes) {
            Ok(()) => Ok(()),
            Err(StorageError::CapacityExceeded) => {
                if self.evict_oldest_autosave() {
                    tracing::warn!(key, "storage full, evicted oldest autosave and retried");
                    self.backend.write(&full_key, &bytes)
                } else {
                    Err(StorageError::CapacityExceeded)
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Reads and decodes a value. Missing or corrupt entries are absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.backend.read(&self.full_key(key))?;
        match decode_value(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(key, %err, "discarding corrupt stored value");
                None
            }
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.backend.read(&self.full_key(key)).is_some()
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.backend.remove(&self.full_key(key))
    }

    /// Store keys (without the prefix), sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .backend
            .keys()
            .into_iter()
            .filter_map(|key| key.strip_prefix(&self.prefix).map(str::to_string))
            .collect();
        keys.sort();
        keys
    }

    /// Removes every entry except settings and achievements (the
    /// "clear game data" operation).
    pub fn clear_session_data(&mut self) {
        for key in self.keys() {
            if key != "settings" && key != "achievements" {
                self.remove(&key);
            }
        }
    }

    fn evict_oldest_autosave(&mut self) -> bool {
        let mut autosaves: Vec<String> = self
            .keys()
            .into_iter()
            .filter(|key| key.starts_with(AUTOSAVE_KEY_PREFIX))
            .collect();
        autosaves.sort();
        match autosaves.first() {
            Some(oldest) => {
                let oldest = oldest.clone();
                self.remove(&oldest)
            }
            None => false,
        }
    }
}

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    let payload =
        postcard::to_allocvec(value).map_err(|err| StorageError::Encoding(err.to_string()))?;
    let checksum = crc32fast::hash(&payload);
    let payload_len =
        u32::try_from(payload.len()).map_err(|_| StorageError::Encoding("value too large".into()))?;
    let mut output = Vec::with_capacity(4 + 2 + 4 + 4 + payload.len());
    output.extend_from_slice(&VALUE_BINARY_MAGIC);
    output.extend_from_slice(&VALUE_FORMAT_VERSION.to_le_bytes());
    output.extend_from_slice(&checksum.to_le_bytes());
    output.extend_from_slice(&payload_len.to_le_bytes());
    output.extend_from_slice(&payload);
    Ok(output)
}

fn decode_value<T: DeserializeOwned>(input: &[u8]) -> Result<T, StorageError> {
    if input.len() < 14 {
        return Err(StorageError::Encoding("value envelope too small".into()));
    }
    if input[0..4] != VALUE_BINARY_MAGIC {
        return Err(StorageError::Encoding("missing value magic bytes".into()));
    }
    let version = u16::from_le_bytes([input[4], input[5]]);
    if version != VALUE_FORMAT_VERSION {
        return Err(StorageError::Encoding(format!(
            "unsupported value version {version}"
        )));
    }
    let checksum = u32::from_le_bytes([input[6], input[7], input[8], input[9]]);
    let payload_len = u32::from_le_bytes([input[10], input[11], input[12], input[13]]) as usize;
    let payload = input
        .get(14..)
        .ok_or_else(|| StorageError::Encoding("missing value payload".into()))?;
    if payload.len() != payload_len {
        return Err(StorageError::Encoding("value length mismatch".into()));
    }
    if crc32fast::hash(payload) != checksum {
        return Err(StorageError::Encoding("value checksum mismatch".into()));
    }
    postcard::from_bytes(payload).map_err(|err| StorageError::Encoding(err.to_string()))
}

#[cfg(test)]
#[path = "tests/storage_tests.rs"]
mod tests;

//! On-disk cache storage.
//!
//! Layout under the storage root:
//!
//! ```text
//! <root>/<cache name>/<sha256(key)>.entry
//! ```
//!
//! An entry file is one line of JSON metadata followed by the raw response
//! body. Every write goes to its own uniquely named temporary file in the
//! store directory and is persisted over the entry path, so overlapping
//! writes to one key never mix and the last rename wins.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::{debug, warn};
use url::Url;

use super::{CacheStorage, CachedResponse, StorageError};

const ENTRY_EXT: &str = "entry";

/// Cache names never start with a dot, so trash directories can't collide
const TRASH_PREFIX: &str = ".deleted-";

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    key: String,
    url: Url,
    status: u16,
    status_text: String,
    headers: Vec<(String, String)>,
    cached_at: DateTime<Utc>,
}

pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn cache_dir(&self, cache: &str) -> Result<PathBuf, StorageError> {
        let valid = !cache.is_empty()
            && !cache.starts_with('.')
            && cache
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(StorageError::InvalidName(cache.to_string()));
        }
        Ok(self.root.join(cache))
    }

    fn entry_path(dir: &Path, key: &str) -> PathBuf {
        dir.join(format!("{:x}.{}", Sha256::digest(key.as_bytes()), ENTRY_EXT))
    }

    /// Compact JSON never contains a raw newline, so it terminates the header.
    fn encode(meta: &EntryMeta, body: &[u8]) -> Result<Vec<u8>, StorageError> {
        let mut contents = serde_json::to_vec(meta)?;
        contents.push(b'\n');
        contents.extend_from_slice(body);
        Ok(contents)
    }

    fn decode(contents: Vec<u8>) -> Result<(EntryMeta, Vec<u8>), StorageError> {
        let split = contents
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| StorageError::Corrupt("missing entry header".to_string()))?;
        let meta: EntryMeta = serde_json::from_slice(&contents[..split])?;
        let body = contents[split + 1..].to_vec();
        Ok((meta, body))
    }

    async fn read_entry(path: &Path) -> Result<Option<(EntryMeta, Vec<u8>)>, StorageError> {
        match fs::read(path).await {
            Ok(contents) => Self::decode(contents).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write into a fresh temp file inside `dir`, then rename it over `path`.
    /// Fails with `MissingCache` when `dir` no longer exists.
    async fn persist(
        cache: &str,
        dir: PathBuf,
        path: PathBuf,
        contents: Vec<u8>,
    ) -> Result<(), StorageError> {
        let result = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(&contents)?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::new(ErrorKind::Other, e)))?;

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::MissingCache(cache.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, cache: &str) -> Result<(), StorageError> {
        let dir = self.cache_dir(cache)?;
        fs::create_dir_all(&dir).await?;
        Ok(())
    }

    async fn has(&self, cache: &str) -> Result<bool, StorageError> {
        let dir = self.cache_dir(cache)?;
        Ok(fs::metadata(&dir).await.map(|m| m.is_dir()).unwrap_or(false))
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            match entry.file_name().to_str() {
                Some(name) if !name.starts_with('.') => names.push(name.to_string()),
                _ => {}
            }
        }
        names.sort();
        Ok(names)
    }

    /// The store is first renamed into a hidden trash directory, so a
    /// concurrent `put` either lands before the rename or fails with
    /// `MissingCache`; it never sees a half-removed store.
    async fn delete(&self, cache: &str) -> Result<bool, StorageError> {
        let dir = self.cache_dir(cache)?;
        let root = self.root.clone();

        let deleted = tokio::task::spawn_blocking(move || -> std::io::Result<bool> {
            let trash = match tempfile::Builder::new().prefix(TRASH_PREFIX).tempdir_in(&root) {
                Ok(trash) => trash,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
                Err(e) => return Err(e),
            };
            match std::fs::rename(&dir, trash.path().join("store")) {
                Ok(()) => {
                    trash.close()?;
                    Ok(true)
                }
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::new(ErrorKind::Other, e)))??;

        if deleted {
            debug!(cache, "Deleted cache directory");
        }
        Ok(deleted)
    }

    async fn put(&self, cache: &str, key: &str, entry: CachedResponse) -> Result<(), StorageError> {
        let dir = self.cache_dir(cache)?;
        let path = Self::entry_path(&dir, key);

        let meta = EntryMeta {
            key: key.to_string(),
            url: entry.url,
            status: entry.status,
            status_text: entry.status_text,
            headers: entry.headers,
            cached_at: entry.cached_at,
        };
        let contents = Self::encode(&meta, &entry.body)?;

        Self::persist(cache, dir, path, contents).await
    }

    async fn get(&self, cache: &str, key: &str) -> Result<Option<CachedResponse>, StorageError> {
        let dir = self.cache_dir(cache)?;

        let (meta, body) = match Self::read_entry(&Self::entry_path(&dir, key)).await? {
            Some(entry) => entry,
            None => return Ok(None),
        };
        if meta.key != key {
            warn!(cache, key, stored = %meta.key, "Cache entry key mismatch, ignoring");
            return Ok(None);
        }

        Ok(Some(CachedResponse {
            url: meta.url,
            status: meta.status,
            status_text: meta.status_text,
            headers: meta.headers,
            body,
            cached_at: meta.cached_at,
        }))
    }

    async fn entries(&self, cache: &str) -> Result<Vec<String>, StorageError> {
        let dir = self.cache_dir(cache)?;
        let mut keys = Vec::new();
        let mut read_dir = match fs::read_dir(&dir).await {
            Ok(d) => d,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT) {
                continue;
            }
            match Self::read_entry(&path).await {
                Ok(Some((meta, _))) => keys.push(meta.key),
                Ok(None) => {}
                Err(e) => debug!(path = ?path, error = %e, "Skipping unreadable cache entry"),
            }
        }
        keys.sort();
        Ok(keys)
    }
}

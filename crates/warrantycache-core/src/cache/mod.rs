//! Cache storage for asset generations.
//!
//! Storage is organised as named stores (one per generation), each holding
//! response snapshots keyed by normalized request URL. Two backends are
//! provided:
//! - `MemoryStorage`: process-local, used by tests and short-lived hosts
//! - `DiskStorage`: one directory per store, survives restarts
//!
//! Writes to a single key are atomic; the last write for a key wins.

pub mod disk;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use url::Url;

use crate::http::{Response, ResponseSource};

pub use disk::DiskStorage;
pub use memory::MemoryStorage;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cache entry: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),

    #[error("Cache does not exist: {0}")]
    MissingCache(String),

    #[error("Invalid cache name: {0}")]
    InvalidName(String),
}

#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the named store if it does not exist yet
    async fn open(&self, cache: &str) -> Result<(), StorageError>;

    async fn has(&self, cache: &str) -> Result<bool, StorageError>;

    /// Names of every store
    async fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Delete a store and everything in it. Returns false if it did not exist.
    async fn delete(&self, cache: &str) -> Result<bool, StorageError>;

    /// Store an entry, replacing any previous entry for the key.
    /// Fails with `MissingCache` if the store was never opened or has been
    /// deleted; a write never brings a store back.
    async fn put(&self, cache: &str, key: &str, entry: CachedResponse) -> Result<(), StorageError>;

    /// Look up an entry. A missing store is a miss, not an error.
    async fn get(&self, cache: &str, key: &str) -> Result<Option<CachedResponse>, StorageError>;

    /// Keys held by a store
    async fn entries(&self, cache: &str) -> Result<Vec<String>, StorageError>;
}

/// A response snapshot as held in cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub url: Url,
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub cached_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn from_response(response: &Response) -> Self {
        Self {
            url: response.url.clone(),
            status: response.status,
            status_text: response.status_text.clone(),
            headers: response.headers.clone(),
            body: response.body.clone(),
            cached_at: Utc::now(),
        }
    }

    pub fn into_response(self, source: ResponseSource) -> Response {
        Response {
            url: self.url,
            status: self.status,
            status_text: self.status_text,
            headers: self.headers,
            body: self.body,
            source,
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    /// Coarse age label for listings, rounded to the nearest unit.
    pub fn age_display(&self) -> String {
        const HOUR: i64 = 60;
        const DAY: i64 = 24 * HOUR;

        match self.age_minutes() {
            // Future timestamps from clock skew count as fresh
            m if m < 1 => "just now".to_string(),
            m if m < HOUR => format!("{}m ago", m),
            m if m < DAY => format!("{}h ago", (m + HOUR / 2) / HOUR),
            m => format!("{}d ago", (m + DAY / 2) / DAY),
        }
    }
}

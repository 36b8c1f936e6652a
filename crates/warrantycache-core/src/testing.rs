//! Test doubles for the network and cache seams.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::cache::{CacheStorage, CachedResponse, MemoryStorage, StorageError};
use crate::http::{Request, Response};
use crate::net::{FetchError, Fetcher};

pub const ORIGIN: &str = "https://warranty.example/";

#[derive(Debug, Clone)]
pub enum Scripted {
    Respond { status: u16, body: String },
    /// Responds once a permit is added to the gate
    Held { status: u16, body: String, gate: Arc<Semaphore> },
    /// Body `"{prefix} #{n}"` with an `x-fetch: n` header, n counting calls
    Numbered { prefix: String },
    Fail,
    /// Never resolves
    Hang,
}

/// Fetcher that answers from a table of URL -> scripted result.
/// Unknown URLs fail like an unreachable host.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    routes: Mutex<HashMap<String, Scripted>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, body: &str) {
        self.routes.lock().unwrap().insert(
            url.to_string(),
            Scripted::Respond {
                status,
                body: body.to_string(),
            },
        );
    }

    pub fn script(&self, url: &str, result: Scripted) {
        self.routes.lock().unwrap().insert(url.to_string(), result);
    }

    /// Respond to `url` only after the returned gate gets a permit
    pub fn hold(&self, url: &str, status: u16, body: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.script(
            url,
            Scripted::Held {
                status,
                body: body.to_string(),
                gate: Arc::clone(&gate),
            },
        );
        gate
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Unavailable("offline".to_string()));
        }
        let scripted = self.routes.lock().unwrap().get(request.url.as_str()).cloned();
        match scripted {
            Some(Scripted::Respond { status, body }) => {
                Ok(Response::new(request.url.clone(), status, body))
            }
            Some(Scripted::Held { status, body, gate }) => {
                let _permit = gate
                    .acquire()
                    .await
                    .map_err(|_| FetchError::Unavailable("gate closed".to_string()))?;
                Ok(Response::new(request.url.clone(), status, body))
            }
            Some(Scripted::Numbered { prefix }) => {
                Ok(Response::new(request.url.clone(), 200, format!("{} #{}", prefix, call))
                    .with_header("x-fetch", call.to_string()))
            }
            Some(Scripted::Hang) => std::future::pending().await,
            Some(Scripted::Fail) | None => {
                Err(FetchError::Unavailable(format!("no route to {}", request.url)))
            }
        }
    }
}

/// Memory storage that counts reads and writes and can be told to fail writes.
#[derive(Debug, Default)]
pub struct CountingStorage {
    inner: MemoryStorage,
    gets: AtomicUsize,
    puts: AtomicUsize,
    fail_puts: AtomicBool,
}

impl CountingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl CacheStorage for CountingStorage {
    async fn open(&self, cache: &str) -> Result<(), StorageError> {
        self.inner.open(cache).await
    }

    async fn has(&self, cache: &str) -> Result<bool, StorageError> {
        self.inner.has(cache).await
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.inner.keys().await
    }

    async fn delete(&self, cache: &str) -> Result<bool, StorageError> {
        self.inner.delete(cache).await
    }

    async fn put(&self, cache: &str, key: &str, entry: CachedResponse) -> Result<(), StorageError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.inner.put(cache, key, entry).await
    }

    async fn get(&self, cache: &str, key: &str) -> Result<Option<CachedResponse>, StorageError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(cache, key).await
    }

    async fn entries(&self, cache: &str) -> Result<Vec<String>, StorageError> {
        self.inner.entries(cache).await
    }
}

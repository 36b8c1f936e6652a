//! The offline cache manager.
//!
//! One manager owns one generation (the cache store named by
//! `CacheConfig::cache_name`). Its lifecycle:
//!
//! 1. `install`: fetch every manifest asset and store them all, or nothing
//! 2. `activate`: delete every other generation and claim all open pages
//! 3. `handle_fetch`: serve GET requests stale-while-revalidate
//!
//! During fetch handling the network request always runs in its own task.
//! A cache hit is returned right away and the network result only refreshes
//! the cache; on a miss the caller waits for the network, falling back to
//! the cached root document for navigations when the network fails.

use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::clients::ClientRegistry;
use super::state::WorkerState;
use crate::cache::{CacheStorage, CachedResponse, DiskStorage, StorageError};
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::http::{cache_key, is_same_origin, Method, Request, Response, ResponseSource};
use crate::net::{FetchError, Fetcher, HttpFetcher};

/// What the manager did with an intercepted request
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not handled; the caller performs the request itself
    PassThrough,
    Respond(Response),
}

impl FetchOutcome {
    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchOutcome::PassThrough => None,
            FetchOutcome::Respond(response) => Some(response),
        }
    }
}

type NetworkResult = std::result::Result<Response, FetchError>;

pub struct OfflineCacheManager {
    config: CacheConfig,
    cache_name: String,
    fallback_key: String,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    clients: ClientRegistry,
    state: RwLock<WorkerState>,
    /// Background network refreshes not yet awaited by `flush`
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl OfflineCacheManager {
    pub fn new(
        config: CacheConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        let fallback_url = config.offline_document_url()?;

        Ok(Self {
            cache_name: config.cache_name(),
            fallback_key: cache_key(&fallback_url),
            config,
            storage,
            fetcher,
            clients: ClientRegistry::new(),
            state: RwLock::new(WorkerState::Parsed),
            pending: Mutex::new(Vec::new()),
        })
    }

    /// Manager backed by the on-disk store and the reqwest fetcher
    pub fn from_config(config: CacheConfig) -> anyhow::Result<Self> {
        let storage = DiskStorage::new(config.storage_dir()?);
        let fetcher = HttpFetcher::with_timeout(std::time::Duration::from_secs(
            config.request_timeout_secs,
        ))?;
        Ok(Self::new(config, Arc::new(storage), Arc::new(fetcher))?)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    async fn set_state(&self, state: WorkerState) {
        let mut current = self.state.write().await;
        debug!(cache = %self.cache_name, from = %*current, to = %state, "Worker state change");
        *current = state;
    }

    // ===== Install =====

    /// Populate this generation from the manifest.
    ///
    /// Every asset must fetch with a 2xx status or nothing is stored. On
    /// success the worker is ready to activate immediately.
    pub async fn install(&self) -> Result<usize> {
        {
            let mut state = self.state.write().await;
            if !state.can_install() {
                return Err(Error::State(format!("cannot install from state {}", *state)));
            }
            *state = WorkerState::Installing;
        }

        let existed = self.storage.has(&self.cache_name).await.unwrap_or(false);

        match self.populate().await {
            Ok(count) => {
                self.set_state(WorkerState::Installed).await;
                info!(cache = %self.cache_name, assets = count, "Generation installed");
                Ok(count)
            }
            Err(e) => {
                warn!(cache = %self.cache_name, error = %e, "Install failed");
                if !existed {
                    if let Err(del) = self.storage.delete(&self.cache_name).await {
                        debug!(cache = %self.cache_name, error = %del, "Failed to remove store after failed install");
                    }
                }
                self.set_state(WorkerState::Redundant).await;
                Err(e)
            }
        }
    }

    async fn populate(&self) -> Result<usize> {
        let urls = self.config.manifest.resolve(&self.config.origin)?;
        self.storage.open(&self.cache_name).await?;

        let fetches = urls.into_iter().map(|url| {
            let request = Request::get(url);
            async move {
                let response = self
                    .fetcher
                    .fetch(&request)
                    .await
                    .map_err(|e| self.install_error(&request.url, e))?;
                if !response.is_ok() {
                    let err = FetchError::BadStatus {
                        url: request.url.to_string(),
                        status: response.status,
                    };
                    return Err(self.install_error(&request.url, err));
                }
                Ok::<_, Error>((request.cache_key(), response))
            }
        });
        let responses = try_join_all(fetches).await?;

        for (key, response) in &responses {
            self.storage
                .put(&self.cache_name, key, CachedResponse::from_response(response))
                .await?;
        }
        Ok(responses.len())
    }

    fn install_error(&self, url: &Url, err: FetchError) -> Error {
        Error::Install {
            cache: self.cache_name.clone(),
            reason: format!("{}: {}", url, err),
        }
    }

    // ===== Activate =====

    /// Take over: delete every other generation and claim all open pages.
    /// Returns the names of the deleted generations.
    pub async fn activate(&self) -> Result<Vec<String>> {
        {
            let mut state = self.state.write().await;
            if !state.can_activate() {
                return Err(Error::State(format!("cannot activate from state {}", *state)));
            }
            *state = WorkerState::Activating;
        }

        let deleted = match self.delete_other_generations().await {
            Ok(deleted) => deleted,
            Err(e) => {
                self.set_state(WorkerState::Installed).await;
                return Err(e);
            }
        };

        let claimed = self.clients.claim(&self.cache_name).await;
        self.set_state(WorkerState::Activated).await;
        info!(
            cache = %self.cache_name,
            deleted = deleted.len(),
            claimed,
            "Generation activated"
        );
        Ok(deleted)
    }

    async fn delete_other_generations(&self) -> Result<Vec<String>> {
        let mut deleted = Vec::new();
        for name in self.storage.keys().await? {
            if name == self.cache_name {
                continue;
            }
            if self.storage.delete(&name).await? {
                debug!(cache = %name, "Deleted stale generation");
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    /// Pick up a generation activated by an earlier run.
    /// Returns false when this generation has no store yet and needs installing.
    pub async fn resume(&self) -> Result<bool> {
        let mut state = self.state.write().await;
        if *state != WorkerState::Parsed {
            return Ok(state.is_active());
        }
        if !self.storage.has(&self.cache_name).await? {
            return Ok(false);
        }
        *state = WorkerState::Activated;
        drop(state);

        self.clients.claim(&self.cache_name).await;
        debug!(cache = %self.cache_name, "Resumed active generation");
        Ok(true)
    }

    /// Register an open page. Pages opened while a generation is active are controlled by it.
    pub async fn register_client(&self, url: Url) -> String {
        let controller = self
            .state()
            .await
            .is_active()
            .then(|| self.cache_name.clone());
        self.clients.register(url, controller).await
    }

    // ===== Fetch interception =====

    /// Handle a request issued by a page.
    ///
    /// Non-GET requests, and any request arriving before activation, pass
    /// through without touching the cache or the network.
    pub async fn handle_fetch(&self, request: Request) -> Result<FetchOutcome> {
        if request.method != Method::GET {
            debug!(method = %request.method, url = %request.url, "Passing through non-GET request");
            return Ok(FetchOutcome::PassThrough);
        }
        if !self.state().await.is_active() {
            debug!(url = %request.url, "Worker not active, passing through");
            return Ok(FetchOutcome::PassThrough);
        }

        let key = request.cache_key();

        let (tx, rx) = oneshot::channel();
        let network = tokio::spawn(Self::revalidate(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.storage),
            self.cache_name.clone(),
            self.config.origin.clone(),
            request.clone(),
            key.clone(),
            tx,
        ));
        self.track(network).await;

        let cached = match self.storage.get(&self.cache_name, &key).await {
            Ok(cached) => cached,
            Err(e) => {
                debug!(url = %request.url, error = %e, "Cache lookup failed, treating as miss");
                None
            }
        };

        if let Some(entry) = cached {
            debug!(url = %request.url, age = %entry.age_display(), "Serving from cache");
            return Ok(FetchOutcome::Respond(entry.into_response(ResponseSource::Cache)));
        }

        let result = rx.await.unwrap_or_else(|_| {
            Err(FetchError::Unavailable(
                "network task ended without a result".to_string(),
            ))
        });

        match result {
            Ok(response) => Ok(FetchOutcome::Respond(response)),
            Err(e) => self.offline_fallback(&request, e).await,
        }
    }

    /// Fetch from network, hand the result to the waiting caller (if any),
    /// then refresh the cache when the response qualifies.
    async fn revalidate(
        fetcher: Arc<dyn Fetcher>,
        storage: Arc<dyn CacheStorage>,
        cache_name: String,
        origin: Url,
        request: Request,
        key: String,
        tx: oneshot::Sender<NetworkResult>,
    ) {
        let mut response = match fetcher.fetch(&request).await {
            Ok(response) => response,
            Err(e) => {
                debug!(url = %request.url, error = %e, "Network fetch failed");
                let _ = tx.send(Err(e));
                return;
            }
        };
        response.source = ResponseSource::Network;

        let snapshot = Self::should_cache(&origin, &request, &response)
            .then(|| CachedResponse::from_response(&response));

        // Receiver is gone when the cache already answered
        let _ = tx.send(Ok(response));

        let Some(entry) = snapshot else {
            return;
        };

        // `put` refuses a store that a newer generation has deleted meanwhile
        match storage.put(&cache_name, &key, entry).await {
            Ok(()) => debug!(cache = %cache_name, key = %key, "Refreshed cache entry"),
            Err(StorageError::MissingCache(_)) => {
                debug!(cache = %cache_name, key = %key, "Generation gone, skipping cache refresh")
            }
            Err(e) => debug!(cache = %cache_name, key = %key, error = %e, "Failed to refresh cache entry"),
        }
    }

    /// Only same-origin 200 responses for page resources are written at runtime
    fn should_cache(origin: &Url, request: &Request, response: &Response) -> bool {
        response.status == 200
            && is_same_origin(origin, &response.url)
            && request.destination.is_cacheable()
    }

    async fn offline_fallback(&self, request: &Request, err: FetchError) -> Result<FetchOutcome> {
        if request.is_navigation() {
            match self.storage.get(&self.cache_name, &self.fallback_key).await {
                Ok(Some(entry)) => {
                    info!(url = %request.url, "Network failed, serving offline document");
                    return Ok(FetchOutcome::Respond(
                        entry.into_response(ResponseSource::OfflineFallback),
                    ));
                }
                Ok(None) => {}
                Err(e) => debug!(error = %e, "Offline document lookup failed"),
            }
        }
        Err(Error::Network(err))
    }

    async fn track(&self, handle: JoinHandle<()>) {
        let mut pending = self.pending.lock().await;
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Wait for every background refresh started so far.
    /// A host calls this before shutting down so cache writes are not lost.
    pub async fn flush(&self) {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.pending.lock().await);
        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!(error = %e, "Background refresh task failed");
            }
        }
    }

    // ===== Inspection =====

    /// Names of every generation in storage
    pub async fn generations(&self) -> Result<Vec<String>> {
        Ok(self.storage.keys().await?)
    }

    /// Entries of the current generation
    pub async fn entries(&self) -> Result<Vec<(String, CachedResponse)>> {
        let mut entries = Vec::new();
        for key in self.storage.entries(&self.cache_name).await? {
            if let Some(entry) = self.storage.get(&self.cache_name, &key).await? {
                entries.push((key, entry));
            }
        }
        Ok(entries)
    }

    /// Delete every generation, including the current one.
    /// The worker returns to `Parsed` and must install again.
    pub async fn clear(&self) -> Result<usize> {
        self.flush().await;
        let mut count = 0;
        for name in self.storage.keys().await? {
            if self.storage.delete(&name).await? {
                count += 1;
            }
        }
        self.set_state(WorkerState::Parsed).await;
        info!(deleted = count, "Cleared all generations");
        Ok(count)
    }
}

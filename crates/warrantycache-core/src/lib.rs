//! Offline asset cache for the warranty tracker web application.
//!
//! The cache keeps one *generation* of static assets per deployment
//! version. A generation is populated from a fixed manifest at install
//! time, serves page requests with a stale-while-revalidate policy once
//! activated, and deletes every older generation as it takes over.
//!
//! The main entry point is [`OfflineCacheManager`]. Network access and
//! cache persistence sit behind the [`Fetcher`] and [`CacheStorage`]
//! traits so the manager can run against reqwest and the local disk, or
//! against in-memory doubles in tests.

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod manifest;
pub mod net;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheStorage, CachedResponse, DiskStorage, MemoryStorage, StorageError};
pub use config::CacheConfig;
pub use error::{Error, Result};
pub use http::{Destination, Method, Request, RequestMode, Response, ResponseSource};
pub use manifest::AssetManifest;
pub use net::{FetchError, Fetcher, HttpFetcher};
pub use worker::{Client, ClientRegistry, FetchOutcome, OfflineCacheManager, WorkerState};

//! Network access for the cache manager.
//!
//! The manager only talks to the network through the [`Fetcher`] trait.
//! [`HttpFetcher`] is the production implementation on top of reqwest.

pub mod client;
pub mod error;

use async_trait::async_trait;

use crate::http::{Request, Response};

pub use client::HttpFetcher;
pub use error::FetchError;

/// Performs a real network request.
///
/// Any HTTP status is a successful fetch; only transport-level failures
/// (DNS, refused connection, timeout, offline) are errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

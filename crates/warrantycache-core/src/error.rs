use thiserror::Error;

use crate::cache::StorageError;
use crate::net::FetchError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(#[from] FetchError),

    #[error("Cache storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Install failed for {cache}: {reason}")]
    Install { cache: String, reason: String },

    #[error("Invalid worker state: {0}")]
    State(String),

    #[error("Invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True when the failure came from the network rather than the cache or lifecycle
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network(_))
    }
}

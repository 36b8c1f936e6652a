//! The offline cache worker.
//!
//! - `OfflineCacheManager`: install / fetch interception / activation
//! - `ClientRegistry`: pages controlled by the active generation
//! - `WorkerState`: lifecycle of one generation's worker

pub mod clients;
pub mod manager;
pub mod state;

pub use clients::{Client, ClientRegistry};
pub use manager::{FetchOutcome, OfflineCacheManager};
pub use state::WorkerState;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

/// An open page of the origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: String,
    pub url: Url,
    /// Cache name of the generation controlling this page, if any
    pub controller: Option<String>,
}

/// Pages currently open against the origin.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, Client>>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open page and return its id
    pub async fn register(&self, url: Url, controller: Option<String>) -> String {
        let id = format!("client-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let client = Client {
            id: id.clone(),
            url,
            controller,
        };
        self.clients.write().await.insert(id.clone(), client);
        id
    }

    pub async fn remove(&self, id: &str) -> Option<Client> {
        self.clients.write().await.remove(id)
    }

    pub async fn get(&self, id: &str) -> Option<Client> {
        self.clients.read().await.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<Client> {
        let mut clients: Vec<Client> = self.clients.read().await.values().cloned().collect();
        clients.sort_by(|a, b| a.id.cmp(&b.id));
        clients
    }

    /// Make `cache` the controller of every open page. Returns how many changed controller.
    pub async fn claim(&self, cache: &str) -> usize {
        let mut clients = self.clients.write().await;
        let mut changed = 0;
        for client in clients.values_mut() {
            if client.controller.as_deref() != Some(cache) {
                client.controller = Some(cache.to_string());
                changed += 1;
            }
        }
        debug!(cache, changed, total = clients.len(), "Claimed clients");
        changed
    }
}

//! The asset manifest: URLs proactively cached when a generation installs.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Assets the warranty tracker pages need to render offline.
/// Stylesheets and scripts carry the `?v=` cache-busting query they are linked with.
const DEFAULT_ASSETS: &[&str] = &[
    "/",
    "/index.html",
    "/login.html",
    "/register.html",
    "/reset-password.html",
    "/settings-new.html",
    "/status.html",
    "/about.html",
    "/style.css?v=20250119001",
    "/settings-styles.css?v=20250119001",
    "/header-fix.css?v=20250119001",
    "/mobile-header.css?v=20250119001",
    "/script.js?v=20250119001",
    "/auth.js?v=20250119001",
    "/settings-new.js?v=20250119001",
    "/status.js?v=20250119001",
    "/theme-loader.js?v=20250119001",
    "/footer-content.js?v=20250119001",
    "/mobile-header.js?v=20250119001",
    "/favicon.png",
    "/img/favicon-16x16.png",
    "/img/favicon-32x32.png",
    "/img/favicon-512x512.png",
    "/manifest.json",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetManifest {
    entries: Vec<String>,
}

impl Default for AssetManifest {
    fn default() -> Self {
        Self::new(DEFAULT_ASSETS.iter().map(|s| s.to_string()))
    }
}

impl AssetManifest {
    pub fn new(entries: impl IntoIterator<Item = String>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve every entry against the origin. Duplicates after resolution are dropped.
    pub fn resolve(&self, origin: &Url) -> Result<Vec<Url>> {
        let mut urls: Vec<Url> = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let url = origin.join(entry).map_err(|source| Error::InvalidUrl {
                url: entry.clone(),
                source,
            })?;
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
        Ok(urls)
    }
}

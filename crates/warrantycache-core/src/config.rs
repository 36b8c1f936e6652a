//! Cache configuration.
//!
//! Holds the current generation version, the origin the assets are served
//! from, the asset manifest, and where cache stores live on disk.
//!
//! Configuration is stored at `~/.config/warrantycache/config.json`. A
//! missing file yields the defaults. `WARRANTYCACHE_ORIGIN` and
//! `WARRANTYCACHE_VERSION` override the stored values.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;
use crate::manifest::AssetManifest;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "warrantycache";

const CONFIG_FILE: &str = "config.json";

const DEFAULT_CACHE_PREFIX: &str = "warranty-tracker";

/// Bump on every deployment that changes cached assets
const DEFAULT_VERSION: &str = "v3";

const DEFAULT_ORIGIN: &str = "http://localhost:8080/";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const ORIGIN_ENV: &str = "WARRANTYCACHE_ORIGIN";
pub const VERSION_ENV: &str = "WARRANTYCACHE_VERSION";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub cache_prefix: String,
    pub version: String,
    pub origin: Url,
    pub manifest: AssetManifest,
    /// Served for navigations when both network and cache miss
    pub offline_document: String,
    pub request_timeout_secs: u64,
    /// Overrides the platform cache directory
    pub storage_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_prefix: DEFAULT_CACHE_PREFIX.to_string(),
            version: DEFAULT_VERSION.to_string(),
            origin: Url::parse(DEFAULT_ORIGIN).expect("DEFAULT_ORIGIN is a valid URL"),
            manifest: AssetManifest::default(),
            offline_document: "/".to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            storage_dir: None,
        }
    }
}

impl CacheConfig {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply `WARRANTYCACHE_ORIGIN` / `WARRANTYCACHE_VERSION` from the environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(std::env::var(ORIGIN_ENV).ok(), std::env::var(VERSION_ENV).ok())
    }

    pub fn apply_overrides(&mut self, origin: Option<String>, version: Option<String>) -> Result<()> {
        if let Some(origin) = origin.filter(|s| !s.trim().is_empty()) {
            self.origin = Url::parse(origin.trim())
                .with_context(|| format!("Invalid {}: {}", ORIGIN_ENV, origin))?;
        }
        if let Some(version) = version.filter(|s| !s.trim().is_empty()) {
            self.version = version.trim().to_string();
        }
        Ok(())
    }

    /// Name of the cache store holding the current generation
    pub fn cache_name(&self) -> String {
        format!("{}-{}", self.cache_prefix, self.version)
    }

    /// Document served to navigations when neither network nor cache can answer
    pub fn offline_document_url(&self) -> crate::Result<Url> {
        self.origin
            .join(&self.offline_document)
            .map_err(|source| Error::InvalidUrl {
                url: self.offline_document.clone(),
                source,
            })
    }

    pub fn storage_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.storage_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_name_combines_prefix_and_version() {
        let config = CacheConfig::default();
        assert_eq!(config.cache_name(), "warranty-tracker-v3");
    }

    #[test]
    fn test_overrides() {
        let mut config = CacheConfig::default();
        config
            .apply_overrides(Some("https://warranty.example".to_string()), Some(" v4 ".to_string()))
            .unwrap();
        assert_eq!(config.origin.as_str(), "https://warranty.example/");
        assert_eq!(config.cache_name(), "warranty-tracker-v4");

        assert!(config
            .apply_overrides(Some("not a url".to_string()), None)
            .is_err());
    }

    #[test]
    fn test_blank_overrides_are_ignored() {
        let mut config = CacheConfig::default();
        config.apply_overrides(Some("  ".to_string()), Some(String::new())).unwrap();
        assert_eq!(config.version, "v3");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = CacheConfig::load_from(&tmp.path().join("config.json")).unwrap();
        assert_eq!(config.offline_document, "/");
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_load_full_and_partial_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");

        let mut config = CacheConfig::default();
        config.version = "v9".to_string();
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
        assert_eq!(CacheConfig::load_from(&path).unwrap().version, "v9");

        std::fs::write(&path, r#"{"version": "v10"}"#).unwrap();
        let partial = CacheConfig::load_from(&path).unwrap();
        assert_eq!(partial.version, "v10");
        assert_eq!(partial.cache_prefix, "warranty-tracker");
    }

    #[test]
    fn test_offline_document_url() {
        let mut config = CacheConfig::default();
        config.origin = Url::parse("https://warranty.example/").unwrap();
        assert_eq!(
            config.offline_document_url().unwrap().as_str(),
            "https://warranty.example/"
        );

        config.offline_document = "//[bad".to_string();
        assert!(matches!(
            config.offline_document_url(),
            Err(Error::InvalidUrl { .. })
        ));
    }
}

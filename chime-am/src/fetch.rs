//! Resource fetching
//!
//! Resolves a clip identifier to its raw bytes. Identifiers are either
//! local paths (absolute, relative to a base directory, or `file://`) or
//! `http(s)://` URLs.

use crate::config::FetchConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Source of raw clip bytes
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, id: &str) -> Result<Vec<u8>>;
}

/// URL scheme of an identifier, if it has one
pub fn scheme(id: &str) -> Option<&str> {
    let (scheme, _) = id.split_once("://")?;
    let valid = !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(scheme)
}

/// Local filesystem path for an identifier, or None for remote identifiers
pub fn local_path(id: &str, base_dir: Option<&Path>) -> Option<PathBuf> {
    let raw = match scheme(id) {
        None => id,
        Some(s) if s.eq_ignore_ascii_case("file") => &id[s.len() + 3..],
        Some(_) => return None,
    };

    let path = PathBuf::from(raw);
    if path.is_absolute() {
        return Some(path);
    }
    Some(match base_dir {
        Some(base) => base.join(path),
        None => path,
    })
}

/// Reads identifiers from the local filesystem
#[derive(Debug, Clone, Default)]
pub struct FileFetcher {
    base_dir: Option<PathBuf>,
}

impl FileFetcher {
    pub fn new(base_dir: Option<PathBuf>) -> Self {
        Self { base_dir }
    }
}

#[async_trait]
impl ResourceFetcher for FileFetcher {
    async fn fetch(&self, id: &str) -> Result<Vec<u8>> {
        let path = local_path(id, self.base_dir.as_deref())
            .ok_or_else(|| Error::fetch(id, "not a local path"))?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::fetch(id, format!("{}: {}", path.display(), e)))?;
        debug!("Read {} bytes from {}", bytes.len(), path.display());
        Ok(bytes)
    }
}

/// Fetches identifiers over HTTP(S). Single attempt, no retries.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, id: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(id)
            .send()
            .await
            .map_err(|e| Error::fetch(id, e))?
            .error_for_status()
            .map_err(|e| Error::fetch(id, e))?;

        let bytes = response.bytes().await.map_err(|e| Error::fetch(id, e))?;
        debug!("Downloaded {} bytes from {}", bytes.len(), id);
        Ok(bytes.to_vec())
    }
}

/// Dispatches on the identifier scheme
#[derive(Debug, Clone)]
pub struct RoutingFetcher {
    file: FileFetcher,
    http: HttpFetcher,
}

impl RoutingFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        Ok(Self {
            file: FileFetcher::new(config.base_dir.clone()),
            http: HttpFetcher::new(config)?,
        })
    }
}

#[async_trait]
impl ResourceFetcher for RoutingFetcher {
    async fn fetch(&self, id: &str) -> Result<Vec<u8>> {
        match scheme(id).map(str::to_ascii_lowercase).as_deref() {
            None | Some("file") => self.file.fetch(id).await,
            Some("http") | Some("https") => self.http.fetch(id).await,
            Some(other) => Err(Error::fetch(id, format!("unsupported scheme '{}'", other))),
        }
    }
}

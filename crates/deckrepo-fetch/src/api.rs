//! Catalog retrieval with a network-first, cache-fallback contract.

use std::path::PathBuf;

use reqwest::{Client, Url};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::FetchError;
use crate::types::{CatalogDocument, CatalogSnapshot, SnapshotSource};

pub(crate) const USER_AGENT: &str = concat!("deckrepo-fetch/", env!("CARGO_PKG_VERSION"));

/// Catalog listing path on the remote service.
const POSTS_PATH: &str = "/api/posts/all";

/// Build the per-item download endpoint, which answers with a redirect to
/// the actual asset URL.
pub fn download_endpoint(base_url: &str, post_id: &str) -> String {
    format!("{}/post/download/{}", base_url.trim_end_matches('/'), post_id)
}

/// Client for the remote catalog service.
pub struct RepoApi {
    base_url: String,
    cache_file: PathBuf,
    client: Client,
}

impl RepoApi {
    pub fn new(config: &Config) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();

        Self {
            base_url: config.base_url.clone(),
            cache_file: config.cache_file.clone(),
            client,
        }
    }

    /// Fetch the full catalog.
    ///
    /// Policy, in order:
    /// 1. When `force_refresh` is set or no cache file exists, try the
    ///    network; on success persist the body verbatim to the cache and
    ///    return a snapshot tagged [`SnapshotSource::Network`]. Failures are
    ///    remembered and fall through.
    /// 2. Otherwise try the cache file; a corrupt cache is discarded
    ///    silently.
    /// 3. With no data from either source, a remembered network error
    ///    surfaces as [`FetchError::CatalogUnavailable`]; with nothing even
    ///    attempted (first run) the snapshot is simply empty.
    ///
    /// A successful network response always wins, even when it carries zero
    /// posts; the cache is never consulted once the network call succeeds.
    pub async fn fetch_catalog(&self, force_refresh: bool) -> Result<CatalogSnapshot, FetchError> {
        let mut network_error: Option<FetchError> = None;

        if force_refresh || !self.cache_file.exists() {
            match self.fetch_from_network().await {
                Ok((doc, body)) => {
                    // Cache persistence is best-effort; the snapshot is
                    // already in hand.
                    if let Err(e) = self.write_cache(&body) {
                        warn!(path = %self.cache_file.display(), error = %e, "failed to write catalog cache");
                    }
                    info!(posts = doc.posts.len(), "catalog fetched from network");
                    return Ok(CatalogSnapshot::new(doc.posts, SnapshotSource::Network));
                }
                Err(e) => {
                    warn!(error = %e, "catalog network fetch failed");
                    network_error = Some(e);
                }
            }
        }

        if self.cache_file.exists() {
            match self.load_cache() {
                Ok(doc) => {
                    info!(posts = doc.posts.len(), "catalog loaded from cache");
                    return Ok(CatalogSnapshot::new(doc.posts, SnapshotSource::Cache));
                }
                Err(e) => debug!(error = %e, "discarding corrupt catalog cache"),
            }
        }

        match network_error {
            Some(e) => Err(FetchError::CatalogUnavailable {
                message: e.to_string(),
            }),
            None => Ok(CatalogSnapshot::empty(SnapshotSource::Network)),
        }
    }

    /// Resolve the direct asset URL for a post by probing the download
    /// endpoint, HEAD first with a GET fallback. Returns `None` when both
    /// probes fail.
    pub async fn resolve_download_url(&self, post_id: &str) -> Option<Url> {
        let url = download_endpoint(&self.base_url, post_id);

        match self.client.head(&url).send().await {
            Ok(resp) if resp.status().is_success() => return Some(resp.url().clone()),
            Ok(resp) => debug!(status = %resp.status(), "HEAD probe rejected; retrying with GET"),
            Err(e) => debug!(error = %e, "HEAD probe failed; retrying with GET"),
        }

        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => Some(resp.url().clone()),
            _ => None,
        }
    }

    async fn fetch_from_network(&self) -> Result<(CatalogDocument, String), FetchError> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), POSTS_PATH);
        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let doc: CatalogDocument = serde_json::from_str(&body)?;
        Ok((doc, body))
    }

    fn write_cache(&self, body: &str) -> Result<(), FetchError> {
        if let Some(parent) = self.cache_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.cache_file, body)?;
        Ok(())
    }

    fn load_cache(&self) -> Result<CatalogDocument, FetchError> {
        let data = std::fs::read_to_string(&self.cache_file)?;
        Ok(serde_json::from_str(&data)?)
    }
}

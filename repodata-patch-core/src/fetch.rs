//! Index retrieval: local clone first, channel download otherwise.

use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::config::ChannelConfig;
use crate::contract::{IndexProvider, ProviderError};
use crate::repodata::Repodata;
use crate::subdir::Subdir;

pub const CACHE_FILE_NAME: &str = "repodata-clone.json";

/// Loads `<base_dir>/<subdir>/repodata-clone.json` when present. Otherwise
/// downloads `<alias>/<channel>/<subdir>/repodata.json` and saves the clone
/// (sorted keys, two-space indent) for the next run.
pub struct CachedIndexProvider {
    base_dir: PathBuf,
    channel: ChannelConfig,
    client: reqwest::Client,
}

impl CachedIndexProvider {
    pub fn new(base_dir: PathBuf, channel: ChannelConfig) -> Self {
        Self {
            base_dir,
            channel,
            client: reqwest::Client::new(),
        }
    }

    pub fn cache_path(&self, subdir: Subdir) -> PathBuf {
        self.base_dir.join(subdir.as_str()).join(CACHE_FILE_NAME)
    }

    pub fn index_url(&self, subdir: Subdir) -> String {
        format!(
            "{}/{}/{}/repodata.json",
            self.channel.alias.trim_end_matches('/'),
            self.channel.name,
            subdir
        )
    }

    async fn download(&self, subdir: Subdir, cache_path: &Path) -> Result<Value, ProviderError> {
        let url = self.index_url(subdir);
        tracing::info!(%subdir, url = %url, "Downloading index");

        let response = self.client.get(&url).send().await.map_err(|e| {
            tracing::error!(%subdir, url = %url, error = ?e, "Index request failed");
            e
        })?;
        let response = response.error_for_status().map_err(|e| {
            tracing::error!(%subdir, url = %url, status = ?e.status(), "Index request returned an error status");
            e
        })?;
        let raw: Value = response.json().await?;

        if let Some(parent) = cache_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_string_pretty(&raw)?;
        fs::write(cache_path, body).await?;
        tracing::debug!(%subdir, path = %cache_path.display(), "Saved index clone");
        Ok(raw)
    }
}

#[async_trait::async_trait]
impl IndexProvider for CachedIndexProvider {
    async fn fetch_index(&self, subdir: Subdir) -> Result<Repodata, ProviderError> {
        let cache_path = self.cache_path(subdir);

        let raw = if fs::try_exists(&cache_path).await? {
            tracing::info!(%subdir, path = %cache_path.display(), "Loading cached index");
            let content = fs::read_to_string(&cache_path).await?;
            serde_json::from_str::<Value>(&content).map_err(|e| {
                tracing::error!(%subdir, path = %cache_path.display(), error = ?e, "Cached index is not valid JSON");
                e
            })?
        } else {
            self.download(subdir, &cache_path).await?
        };

        let repodata: Repodata = serde_json::from_value(raw)?;
        tracing::debug!(%subdir, packages = repodata.packages.len(), "Index ready");
        Ok(repodata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_channel_urls_and_cache_paths() {
        let provider = CachedIndexProvider::new(
            PathBuf::from("/tmp/pro"),
            ChannelConfig {
                name: "pro".to_string(),
                alias: "https://repo.anaconda.com/pkgs/".to_string(),
            },
        );
        assert_eq!(
            provider.index_url(Subdir::LinuxPpc64le),
            "https://repo.anaconda.com/pkgs/pro/linux-ppc64le/repodata.json"
        );
        assert_eq!(
            provider.cache_path(Subdir::Noarch),
            PathBuf::from("/tmp/pro/noarch/repodata-clone.json")
        );
    }
}

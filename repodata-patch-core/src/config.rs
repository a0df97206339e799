use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::subdir::Subdir;

pub const DEFAULT_CHANNEL_NAME: &str = "pro";
pub const DEFAULT_CHANNEL_ALIAS: &str = "https://repo.anaconda.com/pkgs";

/// The channel whose indexes are patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelConfig {
    pub name: String,
    /// Base URL the channel name is appended to.
    pub alias: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_CHANNEL_NAME.to_string(),
            alias: DEFAULT_CHANNEL_ALIAS.to_string(),
        }
    }
}

/// Everything one generate run needs besides the rule tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateConfig {
    /// Holds `<subdir>/repodata-clone.json` caches and `<subdir>/patch_instructions.json` output.
    pub base_dir: PathBuf,
    pub channel: ChannelConfig,
    pub subdirs: Vec<Subdir>,
}

impl GenerateConfig {
    pub fn trace_loaded(&self) {
        info!(
            base_dir = %self.base_dir.display(),
            channel = %self.channel.name,
            subdirs_count = self.subdirs.len(),
            "Loaded GenerateConfig"
        );
        debug!(?self, "GenerateConfig loaded (full debug)");
    }
}

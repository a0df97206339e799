//! `load_config` module: loads the optional YAML run configuration for the CLI.
//!
//! This is the only place the run configuration file is parsed. Every key is
//! optional; anything left out falls back to CLI flags or built-in defaults
//! when [`CliConfig`] is resolved into a [`GenerateConfig`].
//!
//! # Accepted schema
//! ```yaml
//! channel:
//!   name: pro
//!   alias: https://repo.anaconda.com/pkgs
//! base_dir: ./pro
//! subdirs: [noarch, linux-64]
//! rules: ./rules.yaml
//! ```
//!
//! A relative `rules` path is resolved against the directory of the config file.
//!
//! # Errors
//! All errors use `anyhow::Error` for context-rich diagnostics, surfaced at the CLI boundary.
use anyhow::{Context, Result};
use repodata_patch_core::config::{ChannelConfig, GenerateConfig};
use repodata_patch_core::rules::{load_rules, RuleTables};
use repodata_patch_core::subdir::Subdir;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub channel: Option<ChannelConfig>,
    pub base_dir: Option<PathBuf>,
    pub subdirs: Option<Vec<Subdir>>,
    pub rules: Option<PathBuf>,
}

impl CliConfig {
    /// Merges flags over file values over defaults. `base_dir` defaults to `./<channel name>`.
    pub fn resolve(&self, base_dir: Option<PathBuf>, subdirs: Vec<Subdir>) -> GenerateConfig {
        let channel = self.channel.clone().unwrap_or_default();
        let base_dir = base_dir
            .or_else(|| self.base_dir.clone())
            .unwrap_or_else(|| PathBuf::from(".").join(&channel.name));
        let subdirs = if subdirs.is_empty() {
            self.subdirs.clone().unwrap_or_else(|| Subdir::ALL.to_vec())
        } else {
            subdirs
        };
        GenerateConfig {
            base_dir,
            channel,
            subdirs,
        }
    }

    /// Rule tables from the flag, else the config file, else the built-in R channel tables.
    pub fn rule_tables(&self, rules_flag: Option<PathBuf>) -> Result<RuleTables> {
        match rules_flag.or_else(|| self.rules.clone()) {
            Some(path) => load_rules(&path)
                .with_context(|| format!("Invalid rules file {}", path.display())),
            None => {
                info!("Using built-in R channel rule tables");
                RuleTables::r_channel().context("Built-in rule tables are invalid")
            }
        }
    }
}

/// Loads a YAML run configuration file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mut config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if let (Some(rules), Some(dir)) = (&config.rules, path_ref.parent()) {
        if rules.is_relative() {
            config.rules = Some(dir.join(rules));
        }
    }

    Ok(config)
}

use std::path::PathBuf;

use crate::subdir::UnknownSubdir;

/// Error type for the index/instructions I/O boundary. Retrieval failures are opaque to the engine.
pub type ProviderError = Box<dyn std::error::Error + Send + Sync>;

/// Faults found while computing one subdir's instructions.
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("malformed record {identifier}: {reason}")]
    MalformedRecord { identifier: String, reason: String },
}

/// Faults found while loading rule tables. Raised before any subdir is processed.
#[derive(Debug, thiserror::Error)]
pub enum RulesError {
    #[error("{table}: {source}")]
    UnknownSubdir {
        table: &'static str,
        #[source]
        source: UnknownSubdir,
    },
    #[error("{table}[{key}]: invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        table: &'static str,
        key: String,
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("failed to read rules file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse rules YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

//! # contract: I/O boundaries around the patch engine
//!
//! The engine itself is pure. Getting a subdir's index in and the finished
//! instructions out goes through the two traits below, so the pipeline can run
//! against the real channel, a local cache, or `mockall` mocks in tests.
//!
//! - [`IndexProvider`]: "given a subdir, obtain its index".
//! - [`InstructionsStore`]: "given a subdir and its instructions, persist them".
//!
//! Both return the opaque [`ProviderError`]; the pipeline reports these per
//! subdir and never retries.

use async_trait::async_trait;
use std::path::PathBuf;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

pub use crate::error::ProviderError;
use crate::patch::PatchInstructions;
use crate::repodata::Repodata;
use crate::subdir::Subdir;

/// Supplies the raw index of a subdir, from cache or from the channel.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait IndexProvider: Send + Sync {
    async fn fetch_index(&self, subdir: Subdir) -> Result<Repodata, ProviderError>;
}

/// Persists a subdir's patch instructions, returning where they were written.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait InstructionsStore: Send + Sync {
    async fn store(
        &self,
        subdir: Subdir,
        instructions: &PatchInstructions,
    ) -> Result<PathBuf, ProviderError>;
}

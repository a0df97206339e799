//! High-level pipeline: fetch → compute → store for every requested subdir.
//!
//! Each subdir is independent: its index is fetched through an
//! [`IndexProvider`], turned into instructions by
//! [`compute_instructions`](crate::patch::compute_instructions), and handed to an
//! [`InstructionsStore`]. Subdirs run concurrently and share only the
//! read-only [`RuleTables`].
//!
//! # Error Handling
//! A failing step stops that subdir only; nothing is written for it. Other
//! subdirs carry on and their output stays valid. Every failure is recorded in
//! the [`GenerateReport`] with the stage it happened in, so the caller can tell
//! the user which subdir failed and why.

use futures::future::join_all;
use std::fmt;
use std::path::PathBuf;
use tracing::{error, info};

use crate::contract::{IndexProvider, InstructionsStore};
use crate::patch::compute_instructions;
use crate::rules::RuleTables;
use crate::subdir::Subdir;

#[derive(Debug)]
pub struct GenerateReport {
    pub written: Vec<SubdirReport>,
    pub failures: Vec<SubdirFailure>,
}

impl GenerateReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug)]
pub struct SubdirReport {
    pub subdir: Subdir,
    pub path: PathBuf,
    pub patched: usize,
    pub revoked: usize,
    pub removed: usize,
}

#[derive(Debug)]
pub struct SubdirFailure {
    pub subdir: Subdir,
    pub stage: Stage,
    pub message: String,
}

/// Pipeline step a subdir failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Compute,
    Store,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Fetch => "fetch",
            Stage::Compute => "compute",
            Stage::Store => "store",
        })
    }
}

impl fmt::Display for SubdirFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed at {}: {}", self.subdir, self.stage, self.message)
    }
}

pub async fn generate<P, S>(
    subdirs: &[Subdir],
    rules: &RuleTables,
    provider: &P,
    store: &S,
) -> GenerateReport
where
    P: IndexProvider + ?Sized,
    S: InstructionsStore + ?Sized,
{
    info!(subdirs = subdirs.len(), "[GENERATE] Starting patch instruction generation");

    let outcomes = join_all(
        subdirs
            .iter()
            .map(|&subdir| generate_subdir(subdir, rules, provider, store)),
    )
    .await;

    let mut report = GenerateReport {
        written: Vec::new(),
        failures: Vec::new(),
    };
    for outcome in outcomes {
        match outcome {
            Ok(written) => report.written.push(written),
            Err(failure) => report.failures.push(failure),
        }
    }

    info!(
        written = report.written.len(),
        failed = report.failures.len(),
        "[GENERATE] Finished"
    );
    report
}

async fn generate_subdir<P, S>(
    subdir: Subdir,
    rules: &RuleTables,
    provider: &P,
    store: &S,
) -> Result<SubdirReport, SubdirFailure>
where
    P: IndexProvider + ?Sized,
    S: InstructionsStore + ?Sized,
{
    let fail = |stage: Stage, message: String| {
        error!(%subdir, %stage, error = %message, "[GENERATE][ERROR] Subdir failed");
        SubdirFailure {
            subdir,
            stage,
            message,
        }
    };

    let repodata = provider
        .fetch_index(subdir)
        .await
        .map_err(|e| fail(Stage::Fetch, e.to_string()))?;

    let instructions = compute_instructions(&repodata, subdir, rules)
        .map_err(|e| fail(Stage::Compute, e.to_string()))?;

    let path = store
        .store(subdir, &instructions)
        .await
        .map_err(|e| fail(Stage::Store, e.to_string()))?;

    info!(%subdir, path = %path.display(), "[GENERATE] Subdir done");
    Ok(SubdirReport {
        subdir,
        path,
        patched: instructions.packages.len(),
        revoked: instructions.revoke.len(),
        removed: instructions.remove.len(),
    })
}

//! This module implements the CLI for repodata-patch: command parsing, config
//! resolution and the user-visible summary of a run.
//!
//! All rule logic, the index model and the fetch/compute/store pipeline live in
//! the [`repodata-patch-core`] crate. This module is strictly CLI glue.
//!
//! ## How To Use
//! - For command-line users: run the `repodata-patch` binary with `--help`.
//! - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
//!
//! [`repodata-patch-core`]: ../../repodata-patch-core/
use crate::load_config::{load_config, CliConfig};
use anyhow::Result;
use clap::{Parser, Subcommand};
use repodata_patch_core::fetch::CachedIndexProvider;
use repodata_patch_core::generate::generate;
use repodata_patch_core::store::FileInstructionsStore;
use repodata_patch_core::subdir::Subdir;
use std::path::PathBuf;

/// CLI for repodata-patch: generate repodata patch instructions for the R channel.
#[derive(Parser)]
#[clap(
    name = "repodata-patch",
    version,
    about = "Generate patch_instructions.json for every subdir of the R package channel"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch (or load cached) repodata per subdir and write its patch instructions
    Generate {
        /// Path to the YAML run config file
        #[clap(long)]
        config: Option<PathBuf>,
        /// Directory holding repodata clones and patch instructions, one folder per subdir
        #[clap(long)]
        base_dir: Option<PathBuf>,
        /// Only process these subdirs (repeatable)
        #[clap(long = "subdir")]
        subdirs: Vec<Subdir>,
        /// YAML rules file replacing the built-in tables
        #[clap(long)]
        rules: Option<PathBuf>,
    },
    /// Validate and print the effective rule tables as YAML
    Rules {
        /// Path to the YAML run config file
        #[clap(long)]
        config: Option<PathBuf>,
        /// YAML rules file replacing the built-in tables
        #[clap(long)]
        rules: Option<PathBuf>,
    },
}

fn cli_config(path: Option<PathBuf>) -> Result<CliConfig> {
    match path {
        Some(path) => load_config(path),
        None => Ok(CliConfig::default()),
    }
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Generate {
            config,
            base_dir,
            subdirs,
            rules,
        } => {
            let file_config = cli_config(config)?;
            let rules = file_config.rule_tables(rules)?;
            let config = file_config.resolve(base_dir, subdirs);
            config.trace_loaded();

            tracing::info!(command = "generate", "Starting patch instruction generation");
            let provider =
                CachedIndexProvider::new(config.base_dir.clone(), config.channel.clone());
            let store = FileInstructionsStore::new(config.base_dir.clone());
            let report = generate(&config.subdirs, &rules, &provider, &store).await;

            for written in &report.written {
                println!(
                    "{}: {} patched, {} revoked, {} removed -> {}",
                    written.subdir,
                    written.patched,
                    written.revoked,
                    written.removed,
                    written.path.display()
                );
            }
            if report.is_success() {
                tracing::info!(command = "generate", ?report, "Generation complete");
                return Ok(());
            }

            for failure in &report.failures {
                tracing::error!(command = "generate", subdir = %failure.subdir, stage = %failure.stage, error = %failure.message, "Subdir failed");
                eprintln!("{failure}");
            }
            Err(anyhow::anyhow!(
                "{} of {} subdirs failed",
                report.failures.len(),
                config.subdirs.len()
            ))
        }
        Commands::Rules { config, rules } => {
            let file_config = cli_config(config)?;
            let tables = file_config.rule_tables(rules)?;
            print!("{}", serde_yaml::to_string(&tables.to_config())?);
            Ok(())
        }
    }
}

/// CLI glue for wiki-mirror: command parsing, config loading, summary output.
///
/// All pipeline logic lives in `wiki-mirror-core`; this module only wires a
/// loaded [`SyncConfig`](wiki_mirror_core::config::SyncConfig) to a
/// [`WikiClient`] and reports the outcome.
///
/// A one-line summary is always printed to stdout. [`run`] returns an error
/// (non-zero exit) for configuration, authentication and discovery failures;
/// per-document failures only show up in the summary.
use crate::load_config::{apply_overrides, load_config};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use wiki_mirror_core::client::WikiClient;
use wiki_mirror_core::synchronise::{synchronise, SyncReport};

/// CLI for wiki-mirror: mirror a remote wiki tree into markdown files.
#[derive(Parser)]
#[command(
    name = "wiki-mirror",
    version,
    about = "Incrementally mirror a remote wiki tree into markdown files with front matter"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synchronise the wiki tree into the output directory using the given config file
    Sync {
        /// Path to the YAML config file
        #[arg(long)]
        config: PathBuf,
        /// Fetch every document regardless of its edit time
        #[arg(long)]
        full: bool,
        /// Freshness window in days (overrides the config and environment)
        #[arg(long)]
        days: Option<u32>,
    },
}

pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync { config, full, days } => {
            let loaded = match load_config(&config) {
                Ok(loaded) => loaded,
                Err(e) => {
                    println!("Sync aborted: {e:#}");
                    return Err(e);
                }
            };
            let mut sync_config = loaded.sync;
            apply_overrides(&mut sync_config, full, days);
            sync_config.trace_loaded();

            let Some(credentials) = loaded.credentials else {
                let report = SyncReport::skipped();
                tracing::info!(command = "sync", %report, "Synchronisation skipped");
                println!("{report}");
                return Ok(());
            };

            tracing::info!(command = "sync", "Starting synchronisation process");
            let client = WikiClient::new(
                sync_config.transport.clone(),
                credentials,
                sync_config.space_id.clone(),
            )?;
            match synchronise(&sync_config, &client).await {
                Ok(report) => {
                    tracing::info!(command = "sync", ?report, "Synchronisation complete");
                    println!("{report}");
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "sync", error = %e, "Synchronisation failed");
                    println!("Sync aborted: {e}");
                    Err(e.into())
                }
            }
        }
    }
}

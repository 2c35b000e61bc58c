//! # eelc CLI interface
//!
//! Command parsing and the async [`run`] entrypoint shared by `main` and the
//! integration tests. The pipeline itself lives in `eelc-core`; this module
//! loads the config and credentials, builds the HTTP clients and hands them to
//! [`eelc_core::synchronise::synchronise`].
//!
//! ## Commands
//! - `export`: extract footprints, skip tiles already in the bucket, submit and
//!   track the remaining export jobs.
//! - `footprints`: extract (or load) footprints and write the cache only.
use crate::auth::{ServiceAccountKey, TokenProvider};
use crate::earth_engine::EarthEngineClient;
use crate::load_config::load_config;
use crate::storage::GcsClient;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use eelc_core::cache::load_or_extract;
use eelc_core::config::Config;
use eelc_core::synchronise::{synchronise, SynchroniseConfig};
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_SOURCE_DIR: &str = "/media/nsteiner/data1/sen12ms/ROIs1970_fall_s1";
pub const DEFAULT_CONFIG: &str = "config.yaml";
pub const DEFAULT_LOG_FILE: &str = "eelc.log";

/// CLI for eelc: export land-cover chips for satellite tile footprints.
#[derive(Parser)]
#[clap(
    name = "eelc",
    version,
    about = "Export land-cover chips for satellite tile footprints through Earth Engine into Cloud Storage"
)]
pub struct Cli {
    /// Append log lines to this file as well as the console
    #[clap(long, global = true, default_value = DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Export a land-cover chip for every tile not yet in the bucket
    Export {
        /// Directory of source tiles
        #[clap(long, default_value = DEFAULT_SOURCE_DIR)]
        path: PathBuf,
        /// Path to the YAML config file
        #[clap(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
        /// Dry run: only submit the first few jobs
        #[clap(long)]
        test: bool,
    },
    /// Extract tile footprints and write the footprint cache
    Footprints {
        /// Directory of source tiles
        #[clap(long, default_value = DEFAULT_SOURCE_DIR)]
        path: PathBuf,
        /// Path to the YAML config file
        #[clap(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
}

fn synchronise_config(config: &Config, source_dir: PathBuf, test: bool) -> SynchroniseConfig {
    SynchroniseConfig {
        source_dir,
        cache_dir: config.cache_dir.clone(),
        bucket: config.gcs.bucket_name.clone(),
        export: config.export.clone(),
        schedule: config.schedule.to_schedule(test),
    }
}

async fn export(config: Config, source_dir: PathBuf, test: bool) -> Result<()> {
    let key = ServiceAccountKey::from_file(&config.gcs.private_key)?;
    key.check_identity(&config.gcs.service_account);
    let project = config
        .gcs
        .project
        .clone()
        .or_else(|| key.project_id.clone())
        .context("no Earth Engine project: set gcs.project or use a key file with project_id")?;

    let http = reqwest::Client::new();
    let tokens = Arc::new(TokenProvider::new(http.clone(), key));
    let compute = EarthEngineClient::new(http.clone(), tokens.clone(), project);
    let store = GcsClient::new(http, tokens, config.gcs.bucket_name.clone());

    let sync_config = synchronise_config(&config, source_dir, test);
    let report = synchronise(&sync_config, &compute, &store).await?;
    tracing::info!(
        command = "export",
        tiles = report.tiles,
        already_exported = report.already_exported,
        submitted = report.schedule.submitted,
        completed = report.schedule.completed,
        failed = report.schedule.failed,
        abandoned = report.schedule.abandoned.len(),
        "Export complete"
    );
    Ok(())
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    let result = match cli.command {
        Commands::Export { path, config, test } => {
            let config = load_config(config)?;
            tracing::info!(command = "export", source_dir = %path.display(), test, "Starting export");
            export(config, path, test).await
        }
        Commands::Footprints { path, config } => {
            let config = load_config(config)?;
            tracing::info!(command = "footprints", source_dir = %path.display(), "Extracting footprints");
            let records = load_or_extract(&config.cache_dir, &path)?;
            tracing::info!(command = "footprints", tiles = records.len(), "Footprint cache ready");
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Command failed");
    }
    result
}

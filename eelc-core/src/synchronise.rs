//! High-level pipeline: footprints -> remote-state filter -> export scheduling.
//!
//! This is the single orchestration routine behind the CLI's `export`
//! command. For one source directory it:
//!   - loads the footprint table from the cache, or extracts and caches it
//!   - drops records whose key repeats an earlier record
//!   - lists the destination bucket and drops tiles already exported
//!   - builds one export request per remaining tile and hands the queue to the
//!     [`Scheduler`](crate::scheduler::Scheduler)
//!
//! # Error Handling
//! Footprint, cache and listing failures abort the run before anything is
//! submitted. Once scheduling starts, per-job failures are recorded in the
//! report instead of aborting.

use std::collections::HashSet;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::cache::load_or_extract;
use crate::contract::{ComputeService, ExportRequest, ObjectStore};
use crate::error::SyncError;
use crate::export::{build_request, ExportSettings};
use crate::filter::filter_against_store;
use crate::scheduler::{run_exports, ScheduleConfig, ScheduleReport};
use crate::tile::TileRecord;

/// The top-level synchronise configuration.
#[derive(Debug, Clone)]
pub struct SynchroniseConfig {
    pub source_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub bucket: String,
    pub export: ExportSettings,
    pub schedule: ScheduleConfig,
}

#[derive(Debug)]
pub struct SynchroniseReport {
    /// Tiles in the footprint table.
    pub tiles: usize,
    /// Records dropped because their key repeated an earlier record.
    pub duplicates: usize,
    /// Tiles whose export already exists in the bucket.
    pub already_exported: usize,
    pub schedule: ScheduleReport,
}

/// Keep the first record for each key.
pub fn dedupe_keys(records: Vec<TileRecord>, key_prefix: &str) -> (Vec<TileRecord>, usize) {
    let mut seen = HashSet::new();
    let mut duplicates = 0;
    let unique = records
        .into_iter()
        .filter(|r| {
            let key = r.file_prefix(key_prefix);
            if seen.insert(key.clone()) {
                true
            } else {
                warn!(key = %key, source = %r.source.display(), "Duplicate tile key, skipping");
                duplicates += 1;
                false
            }
        })
        .collect();
    (unique, duplicates)
}

/// Export requests for records not yet in the bucket.
pub async fn plan_exports<S>(
    records: Vec<TileRecord>,
    store: &S,
    bucket: &str,
    settings: &ExportSettings,
) -> Result<(Vec<ExportRequest>, usize, usize), SyncError>
where
    S: ObjectStore + ?Sized,
{
    let (unique, duplicates) = dedupe_keys(records, &settings.prefix);
    let before = unique.len();
    let pending = filter_against_store(store, unique, &settings.prefix).await?;
    let already_exported = before - pending.len();
    let requests = pending
        .iter()
        .map(|r| build_request(r, settings, bucket))
        .collect();
    Ok((requests, duplicates, already_exported))
}

/// Run the pipeline over an already loaded footprint table.
pub async fn synchronise_records<C, S>(
    records: Vec<TileRecord>,
    config: &SynchroniseConfig,
    compute: &C,
    store: &S,
) -> Result<SynchroniseReport, SyncError>
where
    C: ComputeService + ?Sized,
    S: ObjectStore + ?Sized,
{
    let tiles = records.len();
    let (requests, duplicates, already_exported) =
        plan_exports(records, store, &config.bucket, &config.export).await?;
    info!(
        tiles,
        duplicates,
        already_exported,
        to_submit = requests.len(),
        "[SYNC] Export plan ready"
    );
    let schedule = run_exports(compute, config.schedule.clone(), requests).await;
    Ok(SynchroniseReport {
        tiles,
        duplicates,
        already_exported,
        schedule,
    })
}

/// Entrypoint: synchronise the bucket with the tiles under `config.source_dir`.
pub async fn synchronise<C, S>(
    config: &SynchroniseConfig,
    compute: &C,
    store: &S,
) -> Result<SynchroniseReport, SyncError>
where
    C: ComputeService + ?Sized,
    S: ObjectStore + ?Sized,
{
    info!(source_dir = %config.source_dir.display(), "[SYNC] Starting export pipeline");
    let records = load_or_extract(&config.cache_dir, &config.source_dir)?;
    synchronise_records(records, config, compute, store).await
}

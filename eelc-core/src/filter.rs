//! Remote-state filter: drop tiles whose export already sits in the bucket.

use std::collections::HashSet;

use tracing::info;

use crate::contract::ObjectStore;
use crate::error::SyncError;
use crate::tile::TileRecord;

/// Strip the extension from the last path component of an object name,
/// e.g. `chips/lc_glob_2017_1_2_3.tif` -> `chips/lc_glob_2017_1_2_3`.
pub fn strip_extension(name: &str) -> &str {
    let file_start = name.rfind('/').map_or(0, |i| i + 1);
    match name[file_start..].rfind('.') {
        Some(0) | None => name,
        Some(dot) => &name[..file_start + dot],
    }
}

/// Extension-stripped object names, ready for key lookups.
pub fn existing_keys<I, S>(object_names: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    object_names
        .into_iter()
        .map(|n| strip_extension(n.as_ref()).to_string())
        .collect()
}

/// Keep only records whose key is absent from `existing`, preserving order.
pub fn filter_pending(
    records: Vec<TileRecord>,
    existing: &HashSet<String>,
    key_prefix: &str,
) -> Vec<TileRecord> {
    records
        .into_iter()
        .filter(|r| !existing.contains(&r.file_prefix(key_prefix)))
        .collect()
}

/// List the bucket and filter `records` against it.
pub async fn filter_against_store<S>(
    store: &S,
    records: Vec<TileRecord>,
    key_prefix: &str,
) -> Result<Vec<TileRecord>, SyncError>
where
    S: ObjectStore + ?Sized,
{
    let names = store.list_object_names().await.map_err(SyncError::Listing)?;
    let existing = existing_keys(&names);
    let total = records.len();
    let pending = filter_pending(records, &existing, key_prefix);
    info!(
        remote_objects = names.len(),
        tiles = total,
        already_exported = total - pending.len(),
        pending = pending.len(),
        "Filtered tiles against remote bucket"
    );
    Ok(pending)
}

//! On-disk footprint cache.
//!
//! Footprint extraction opens every tile, so the table is memoised as a
//! GeoJSON FeatureCollection named after the source directory. A present and
//! readable cache short-circuits extraction; a broken one is logged and
//! rebuilt.

use std::fs;
use std::path::{Path, PathBuf};

use geo::Polygon;
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, JsonValue, Value};
use tracing::{info, warn};

use crate::error::{CacheError, SyncError};
use crate::footprint::extract_footprints;
use crate::tile::{TileName, TileRecord};

/// Cache file path for a source directory: `<cache_dir>/<dir name>.geojson`.
pub fn cache_path(cache_dir: &Path, source_dir: &Path) -> PathBuf {
    let name = source_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "footprints".to_string());
    cache_dir.join(format!("{name}.geojson"))
}

fn to_feature(record: &TileRecord) -> Feature {
    let mut properties = JsonObject::new();
    for (key, value) in [
        ("roi", &record.name.roi),
        ("season", &record.name.season),
        ("sensor", &record.name.sensor),
        ("scene", &record.name.scene),
        ("patch", &record.name.patch),
        ("crs", &record.crs),
    ] {
        properties.insert(key.to_string(), JsonValue::from(value.as_str()));
    }
    properties.insert(
        "source".to_string(),
        JsonValue::from(record.source.to_string_lossy().into_owned()),
    );
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::from(&record.footprint))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn from_feature(path: &Path, feature: Feature) -> Result<TileRecord, CacheError> {
    let malformed = |reason: String| CacheError::Malformed {
        path: path.to_path_buf(),
        reason,
    };
    let props = feature
        .properties
        .ok_or_else(|| malformed("feature without properties".to_string()))?;
    let field = |key: &str| -> Result<String, CacheError> {
        props
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| malformed(format!("missing property `{key}`")))
    };
    let geometry = feature
        .geometry
        .ok_or_else(|| malformed("feature without geometry".to_string()))?;
    let footprint = Polygon::<f64>::try_from(geometry.value)
        .map_err(|e| malformed(format!("geometry is not a polygon: {e}")))?;

    Ok(TileRecord {
        name: TileName {
            roi: field("roi")?,
            season: field("season")?,
            sensor: field("sensor")?,
            scene: field("scene")?,
            patch: field("patch")?,
        },
        crs: field("crs")?,
        footprint,
        source: PathBuf::from(field("source")?),
    })
}

/// Write the footprint table, creating the cache directory if needed.
pub fn write_cache(path: &Path, records: &[TileRecord]) -> Result<(), CacheError> {
    let io_err = |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let collection = FeatureCollection {
        bbox: None,
        features: records.iter().map(to_feature).collect(),
        foreign_members: None,
    };
    fs::write(path, GeoJson::from(collection).to_string()).map_err(io_err)?;
    info!(path = %path.display(), records = records.len(), "Wrote footprint cache");
    Ok(())
}

/// Read a footprint table. `Ok(None)` when no cache exists yet.
pub fn read_cache(path: &Path) -> Result<Option<Vec<TileRecord>>, CacheError> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(CacheError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let geojson: GeoJson = content.parse().map_err(|e| CacheError::Malformed {
        path: path.to_path_buf(),
        reason: format!("{e}"),
    })?;
    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(CacheError::Malformed {
            path: path.to_path_buf(),
            reason: "expected a FeatureCollection".to_string(),
        });
    };
    collection
        .features
        .into_iter()
        .map(|f| from_feature(path, f))
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// Return cached footprints for `source_dir`, extracting and caching them
/// when the cache is absent or unusable.
pub fn load_or_extract(cache_dir: &Path, source_dir: &Path) -> Result<Vec<TileRecord>, SyncError> {
    let path = cache_path(cache_dir, source_dir);
    match read_cache(&path) {
        Ok(Some(records)) => {
            info!(path = %path.display(), records = records.len(), "Loaded footprints from cache");
            return Ok(records);
        }
        Ok(None) => info!(path = %path.display(), "No footprint cache, extracting"),
        Err(e) => warn!(error = %e, "Ignoring unusable footprint cache"),
    }
    let records = extract_footprints(source_dir)?;
    write_cache(&path, &records)?;
    Ok(records)
}

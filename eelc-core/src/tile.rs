//! Tile identity: what a source raster is called and where it sits on the ground.

use std::path::{Path, PathBuf};

use geo::Polygon;
use serde::{Deserialize, Serialize};

use crate::error::FootprintError;

/// Key prefix used when no other prefix is configured.
pub const DEFAULT_KEY_PREFIX: &str = "lc_glob_2017";

/// Identifying fields encoded in a tile file name such as
/// `ROIs1970_fall_s1_13_p100.tif`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileName {
    pub roi: String,
    pub season: String,
    pub sensor: String,
    pub scene: String,
    pub patch: String,
}

impl TileName {
    /// Parse the first five `_`-delimited segments of the file stem.
    /// `ROIs` is stripped from the region and `p` from the patch.
    pub fn parse(file_name: &str) -> Result<Self, FootprintError> {
        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| FootprintError::InvalidFileName(file_name.to_string()))?;

        let segments: Vec<&str> = stem.split('_').collect();
        if segments.len() < 5 || segments[..5].iter().any(|s| s.is_empty()) {
            return Err(FootprintError::InvalidFileName(file_name.to_string()));
        }

        let roi = segments[0].strip_prefix("ROIs").unwrap_or(segments[0]);
        let patch = segments[4].strip_prefix('p').unwrap_or(segments[4]);

        Ok(Self {
            roi: roi.to_string(),
            season: segments[1].to_string(),
            sensor: segments[2].to_string(),
            scene: segments[3].to_string(),
            patch: patch.to_string(),
        })
    }

    /// Deterministic key used both as the remote object name and the
    /// de-duplication key.
    pub fn file_prefix(&self, prefix: &str) -> String {
        format!("{}_{}_{}_{}", prefix, self.roi, self.scene, self.patch)
    }
}

/// One row of the footprint table.
#[derive(Debug, Clone, PartialEq)]
pub struct TileRecord {
    pub name: TileName,
    /// Source CRS as `EPSG:<code>`.
    pub crs: String,
    /// Tile bounds reprojected to EPSG:4326 (lon, lat).
    pub footprint: Polygon<f64>,
    pub source: PathBuf,
}

impl TileRecord {
    pub fn file_prefix(&self, prefix: &str) -> String {
        self.name.file_prefix(prefix)
    }
}

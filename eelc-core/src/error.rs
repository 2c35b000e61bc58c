//! Error types for the core crate.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while turning raster tiles into footprint records.
#[derive(Debug, Error)]
pub enum FootprintError {
    /// I/O error reading a tile or walking the source directory.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TIFF decoding error.
    #[error("TIFF decode error in {path}: {source}")]
    TiffDecode {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },

    /// The raster lacks the tags needed to georeference it.
    #[error("Invalid GeoTIFF {path}: {reason}")]
    InvalidGeoTiff { path: PathBuf, reason: String },

    /// The file name does not follow `region_season_sensor_scene_patch`.
    #[error("Invalid tile file name: {0}")]
    InvalidFileName(String),

    /// EPSG code we cannot reproject from.
    #[error("Unsupported coordinate reference system EPSG:{0}")]
    UnsupportedCrs(u32),

    /// Failed to walk the source directory.
    #[error("Failed to walk {root}: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Errors raised by the on-disk footprint cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error on cache file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed cache file {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

/// Error returned by [`crate::contract::ComputeService`] and
/// [`crate::contract::ObjectStore`] implementors.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ServiceError {
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Configuration loading errors. Each failure mode is its own variant so the
/// CLI can tell a missing file apart from a broken one.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "Configuration not found at {path}; create it with your service account credentials \
         (gcs.service_account, gcs.private_key, gcs.bucket_name) before running"
    )]
    Missing { path: PathBuf },

    #[error("Failed to read configuration {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed configuration {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Configuration is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("Invalid configuration value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Top-level pipeline error.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Footprint(#[from] FootprintError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Failed to list remote objects: {0}")]
    Listing(#[source] ServiceError),
}

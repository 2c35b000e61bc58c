//! Footprint extraction: walk a tile directory, read each GeoTIFF's
//! georeferencing and turn its bounding box into an EPSG:4326 polygon.
//!
//! Only tags are decoded; pixel data is never read. An unreadable or
//! malformed tile aborts the whole extraction with an error naming the file.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use geo::{LineString, Polygon};
use tiff::decoder::Decoder;
use tiff::tags::Tag;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::FootprintError;
use crate::projection::Crs;
use crate::tile::{TileName, TileRecord};

const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;
const RASTER_PIXEL_IS_POINT: u16 = 2;

/// Axis-aligned bounds in the raster's own CRS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

/// Georeferencing read from a GeoTIFF.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Georef {
    pub epsg: u32,
    pub bounds: Bounds,
}

/// The subset of the GeoKeyDirectory we care about.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct GeoKeys {
    projected: Option<u16>,
    geographic: Option<u16>,
    pixel_is_point: bool,
}

impl GeoKeys {
    fn epsg(&self) -> Option<u32> {
        self.projected.or(self.geographic).map(u32::from)
    }
}

/// Parse inline SHORT values out of a GeoKeyDirectory. Keys stored in other
/// tags (double or ASCII params) are skipped since none of the ones we read
/// live there.
fn parse_geo_keys(directory: &[u16]) -> GeoKeys {
    let mut keys = GeoKeys::default();
    if directory.len() < 4 {
        return keys;
    }
    let count = usize::from(directory[3]);
    for entry in directory[4..].chunks_exact(4).take(count) {
        let (key_id, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 {
            continue;
        }
        match key_id {
            PROJECTED_CS_TYPE_KEY => keys.projected = Some(value),
            GEOGRAPHIC_TYPE_KEY => keys.geographic = Some(value),
            GT_RASTER_TYPE_KEY => keys.pixel_is_point = value == RASTER_PIXEL_IS_POINT,
            _ => {}
        }
    }
    keys
}

/// Compute raster bounds from either tiepoint + pixel scale or an affine
/// model transformation. Rotated transformations are not supported.
fn bounds_from_tags(
    width: u32,
    height: u32,
    tiepoint: Option<&[f64]>,
    scale: Option<&[f64]>,
    transform: Option<&[f64]>,
    pixel_is_point: bool,
) -> Option<Bounds> {
    let (mut left, mut top, sx, sy) = match (tiepoint, scale, transform) {
        (Some(tp), Some(sc), _) if tp.len() >= 6 && sc.len() >= 2 => {
            // Tiepoint is [i, j, k, x, y, z]: raster (i, j) maps to model (x, y).
            let (sx, sy) = (sc[0], sc[1]);
            (tp[3] - tp[0] * sx, tp[4] + tp[1] * sy, sx, sy)
        }
        (_, _, Some(t)) if t.len() >= 16 && t[1] == 0.0 && t[4] == 0.0 => (t[3], t[7], t[0], -t[5]),
        _ => return None,
    };
    if pixel_is_point {
        left -= sx / 2.0;
        top += sy / 2.0;
    }
    Some(Bounds {
        left,
        bottom: top - f64::from(height) * sy,
        right: left + f64::from(width) * sx,
        top,
    })
}

/// Read CRS and bounds from a GeoTIFF's tags.
pub fn read_georef(path: &Path) -> Result<Georef, FootprintError> {
    let file = File::open(path).map_err(|source| FootprintError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let decode_err = |source| FootprintError::TiffDecode {
        path: path.to_path_buf(),
        source,
    };
    let mut decoder = Decoder::new(BufReader::new(file)).map_err(decode_err)?;
    let (width, height) = decoder.dimensions().map_err(decode_err)?;

    let keys = decoder
        .get_tag_u16_vec(Tag::GeoKeyDirectoryTag)
        .map(|dir| parse_geo_keys(&dir))
        .map_err(|_| FootprintError::InvalidGeoTiff {
            path: path.to_path_buf(),
            reason: "missing GeoKeyDirectory".to_string(),
        })?;
    let epsg = keys.epsg().ok_or_else(|| FootprintError::InvalidGeoTiff {
        path: path.to_path_buf(),
        reason: "no EPSG code in GeoKeyDirectory".to_string(),
    })?;

    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).ok();
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag).ok();
    let transform = decoder
        .get_tag_f64_vec(Tag::ModelTransformationTag)
        .ok();

    let bounds = bounds_from_tags(
        width,
        height,
        tiepoint.as_deref(),
        scale.as_deref(),
        transform.as_deref(),
        keys.pixel_is_point,
    )
    .ok_or_else(|| FootprintError::InvalidGeoTiff {
        path: path.to_path_buf(),
        reason: "no usable tiepoint/pixel scale or model transformation".to_string(),
    })?;

    Ok(Georef { epsg, bounds })
}

/// Four-corner polygon (top-left, bottom-left, bottom-right, top-right),
/// each corner reprojected from `crs` to EPSG:4326.
pub fn corner_polygon(bounds: &Bounds, crs: Crs) -> Polygon<f64> {
    let corners = [
        (bounds.left, bounds.top),
        (bounds.left, bounds.bottom),
        (bounds.right, bounds.bottom),
        (bounds.right, bounds.top),
    ];
    let ring: Vec<(f64, f64)> = corners
        .iter()
        .map(|&(x, y)| crs.to_wgs84(x, y))
        .collect();
    Polygon::new(LineString::from(ring), vec![])
}

/// Build the footprint record for a single tile.
pub fn extract_boundaries(path: &Path) -> Result<TileRecord, FootprintError> {
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| FootprintError::InvalidFileName(path.display().to_string()))?;
    let name = TileName::parse(file_name)?;
    let georef = read_georef(path)?;
    let crs = Crs::from_epsg(georef.epsg)?;
    let footprint = corner_polygon(&georef.bounds, crs);
    debug!(path = %path.display(), crs = %crs, "Extracted tile footprint");
    Ok(TileRecord {
        name,
        crs: crs.to_string(),
        footprint,
        source: path.to_path_buf(),
    })
}

fn is_tile(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
        .unwrap_or(false)
}

/// Recursively list raster tiles under `root`, sorted for stable output.
pub fn find_tiles(root: &Path) -> Result<Vec<PathBuf>, FootprintError> {
    let mut tiles = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|source| FootprintError::Walk {
            root: root.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() && is_tile(entry.path()) {
            tiles.push(entry.into_path());
        }
    }
    tiles.sort();
    Ok(tiles)
}

/// Extract one footprint record per tile under `root`.
pub fn extract_footprints(root: &Path) -> Result<Vec<TileRecord>, FootprintError> {
    let tiles = find_tiles(root)?;
    info!(root = %root.display(), tiles = tiles.len(), "Extracting tile footprints");
    tiles.iter().map(|p| extract_boundaries(p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn geo_keys_prefer_projected_code() {
        let dir = [
            1, 1, 0, 3, //
            1024, 0, 1, 1, //
            2048, 0, 1, 4326, //
            3072, 0, 1, 32631,
        ];
        let keys = parse_geo_keys(&dir);
        assert_eq!(keys.epsg(), Some(32631));
        assert!(!keys.pixel_is_point);
    }

    #[test]
    fn geo_keys_fall_back_to_geographic() {
        let dir = [1, 1, 0, 2, 2048, 0, 1, 4326, 1025, 0, 1, 2];
        let keys = parse_geo_keys(&dir);
        assert_eq!(keys.epsg(), Some(4326));
        assert!(keys.pixel_is_point);
    }

    #[test]
    fn geo_keys_skip_values_stored_elsewhere() {
        // Location 34737 means the value lives in the ASCII params tag.
        let dir = [1, 1, 0, 1, 3072, 34737, 5, 0];
        assert_eq!(parse_geo_keys(&dir).epsg(), None);
        assert_eq!(parse_geo_keys(&[1, 1]).epsg(), None);
    }

    #[test]
    fn bounds_from_tiepoint_and_scale() {
        let tp = [0.0, 0.0, 0.0, 300_000.0, 5_000_000.0, 0.0];
        let sc = [10.0, 10.0, 0.0];
        let b = bounds_from_tags(256, 128, Some(&tp[..]), Some(&sc[..]), None, false).unwrap();
        assert_eq!(
            b,
            Bounds {
                left: 300_000.0,
                bottom: 4_998_720.0,
                right: 302_560.0,
                top: 5_000_000.0,
            }
        );
    }

    #[test]
    fn bounds_from_offset_tiepoint() {
        let tp = [10.0, 20.0, 0.0, 1000.0, 2000.0, 0.0];
        let sc = [2.0, 2.0, 0.0];
        let b = bounds_from_tags(100, 100, Some(&tp[..]), Some(&sc[..]), None, false).unwrap();
        assert_abs_diff_eq!(b.left, 980.0);
        assert_abs_diff_eq!(b.top, 2040.0);
    }

    #[test]
    fn bounds_from_transformation_and_point_raster() {
        #[rustfmt::skip]
        let t = [
            10.0, 0.0, 0.0, 500_000.0,
            0.0, -10.0, 0.0, 100.0,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        let b = bounds_from_tags(10, 10, None, None, Some(&t[..]), true).unwrap();
        assert_abs_diff_eq!(b.left, 499_995.0);
        assert_abs_diff_eq!(b.top, 105.0);
        assert_abs_diff_eq!(b.right, 500_095.0);
        assert_abs_diff_eq!(b.bottom, 5.0);
    }

    #[test]
    fn missing_georeferencing_yields_none() {
        assert!(bounds_from_tags(1, 1, None, None, None, false).is_none());
        let rotated = [1.0, 0.5, 0.0, 0.0, 0.5, -1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0];
        assert!(bounds_from_tags(1, 1, None, None, Some(&rotated[..]), false).is_none());
    }

    #[test]
    fn corner_polygon_is_closed_and_ordered() {
        let b = Bounds {
            left: 0.0,
            bottom: -1.0,
            right: 2.0,
            top: 1.0,
        };
        let poly = corner_polygon(&b, Crs::Wgs84);
        let coords: Vec<(f64, f64)> = poly.exterior().points().map(|p| p.x_y()).collect();
        assert_eq!(
            coords,
            vec![(0.0, 1.0), (0.0, -1.0), (2.0, -1.0), (2.0, 1.0), (0.0, 1.0)]
        );
    }

    #[test]
    fn only_tif_extensions_are_tiles() {
        assert!(is_tile(Path::new("a/b/ROIs1_fall_s1_1_p1.tif")));
        assert!(is_tile(Path::new("X.TIFF")));
        assert!(!is_tile(Path::new("x.tif.aux.xml")));
        assert!(!is_tile(Path::new("x")));
    }
}

#![allow(dead_code)]

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

/// A north-up raster in `epsg` with its top-left corner at (`left`, `top`).
pub struct Fixture {
    pub epsg: u16,
    pub left: f64,
    pub top: f64,
    pub pixel: f64,
    pub size: u32,
}

impl Fixture {
    pub fn utm31n() -> Self {
        Self {
            epsg: 32631,
            left: 400_000.0,
            top: 5_000_000.0,
            pixel: 10.0,
            size: 256,
        }
    }
}

/// Write a minimal single-band GeoTIFF carrying tiepoint, pixel scale and
/// GeoKeyDirectory tags.
pub fn write_geotiff(path: &Path, fixture: &Fixture) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let file = File::create(path).unwrap();
    let mut tiff = TiffEncoder::new(file).unwrap();
    let mut image = tiff
        .new_image::<colortype::Gray8>(fixture.size, fixture.size)
        .unwrap();

    let geographic = fixture.epsg == 4326;
    let (model_type, crs_key) = if geographic { (2, 2048) } else { (1, 3072) };
    let geo_keys: [u16; 12] = [1, 1, 0, 2, 1024, 0, 1, model_type, crs_key, 0, 1, fixture.epsg];

    let encoder = image.encoder();
    encoder
        .write_tag(Tag::ModelPixelScaleTag, &[fixture.pixel, fixture.pixel, 0.0][..])
        .unwrap();
    encoder
        .write_tag(
            Tag::ModelTiepointTag,
            &[0.0, 0.0, 0.0, fixture.left, fixture.top, 0.0][..],
        )
        .unwrap();
    encoder.write_tag(Tag::GeoKeyDirectoryTag, &geo_keys[..]).unwrap();

    let pixels = vec![0u8; (fixture.size * fixture.size) as usize];
    image.write_data(&pixels).unwrap();
}

/// Lay out `ROIs1970_fall/s1_<scene>/ROIs1970_fall_s1_<scene>_p<patch>.tif`
/// tiles under `root`, one per (scene, patch) pair, each shifted east so the
/// footprints do not overlap.
pub fn write_scene(root: &Path, tiles: &[(u32, u32)]) -> Vec<PathBuf> {
    tiles
        .iter()
        .enumerate()
        .map(|(i, (scene, patch))| {
            let path = root
                .join(format!("s1_{scene}"))
                .join(format!("ROIs1970_fall_s1_{scene}_p{patch}.tif"));
            let mut fixture = Fixture::utm31n();
            fixture.left += i as f64 * 3_000.0;
            write_geotiff(&path, &fixture);
            path
        })
        .collect()
}

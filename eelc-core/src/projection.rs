//! Coordinate reference systems we can reproject tile bounds from.
//!
//! Tiles in the datasets we process are stored in UTM zones (occasionally in
//! geographic or Web Mercator coordinates). Everything is reprojected to
//! EPSG:4326 longitude/latitude in degrees. UTM uses the Krüger series to
//! third order in the third flattening, which is accurate to well under a
//! millimetre inside a zone.

use crate::error::FootprintError;

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const UTM_K0: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;
const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// A supported source coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crs {
    /// EPSG:4326, already longitude/latitude.
    Wgs84,
    /// EPSG:3857, spherical Web Mercator in metres.
    WebMercator,
    /// EPSG:326zz (north) / EPSG:327zz (south).
    Utm { zone: u8, north: bool },
}

impl Crs {
    pub fn from_epsg(code: u32) -> Result<Self, FootprintError> {
        match code {
            4326 => Ok(Crs::Wgs84),
            3857 => Ok(Crs::WebMercator),
            32601..=32660 => Ok(Crs::Utm {
                zone: (code - 32600) as u8,
                north: true,
            }),
            32701..=32760 => Ok(Crs::Utm {
                zone: (code - 32700) as u8,
                north: false,
            }),
            other => Err(FootprintError::UnsupportedCrs(other)),
        }
    }

    pub fn epsg(&self) -> u32 {
        match self {
            Crs::Wgs84 => 4326,
            Crs::WebMercator => 3857,
            Crs::Utm { zone, north: true } => 32600 + u32::from(*zone),
            Crs::Utm { zone, north: false } => 32700 + u32::from(*zone),
        }
    }

    /// Source coordinates to (lon, lat) degrees.
    pub fn to_wgs84(&self, x: f64, y: f64) -> (f64, f64) {
        match *self {
            Crs::Wgs84 => (x, y),
            Crs::WebMercator => {
                let lon = (x / WGS84_A).to_degrees();
                let lat = (y / WGS84_A).sinh().atan().to_degrees();
                (lon, lat)
            }
            Crs::Utm { zone, north } => utm_inverse(zone, north, x, y),
        }
    }

    /// (lon, lat) degrees to source coordinates.
    pub fn from_wgs84(&self, lon: f64, lat: f64) -> (f64, f64) {
        match *self {
            Crs::Wgs84 => (lon, lat),
            Crs::WebMercator => {
                let x = WGS84_A * lon.to_radians();
                let y = WGS84_A * lat.to_radians().tan().asinh();
                (x, y)
            }
            Crs::Utm { zone, north } => utm_forward(zone, north, lon, lat),
        }
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

struct KruegerSeries {
    /// Rectifying radius scaled by k0.
    k0a: f64,
    alpha: [f64; 3],
    beta: [f64; 3],
    delta: [f64; 3],
    /// 2 sqrt(n) / (1 + n), the eccentricity term of the conformal latitude.
    e_term: f64,
}

fn krueger() -> KruegerSeries {
    let n = WGS84_F / (2.0 - WGS84_F);
    let n2 = n * n;
    let n3 = n2 * n;
    let a = WGS84_A / (1.0 + n) * (1.0 + n2 / 4.0 + n2 * n2 / 64.0);
    KruegerSeries {
        k0a: UTM_K0 * a,
        alpha: [
            n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0,
            13.0 * n2 / 48.0 - 3.0 * n3 / 5.0,
            61.0 * n3 / 240.0,
        ],
        beta: [
            n / 2.0 - 2.0 * n2 / 3.0 + 37.0 * n3 / 96.0,
            n2 / 48.0 + n3 / 15.0,
            17.0 * n3 / 480.0,
        ],
        delta: [
            2.0 * n - 2.0 * n2 / 3.0 - 2.0 * n3,
            7.0 * n2 / 3.0 - 8.0 * n3 / 5.0,
            56.0 * n3 / 15.0,
        ],
        e_term: 2.0 * n.sqrt() / (1.0 + n),
    }
}

fn central_meridian(zone: u8) -> f64 {
    (f64::from(zone) * 6.0 - 183.0).to_radians()
}

fn utm_forward(zone: u8, north: bool, lon: f64, lat: f64) -> (f64, f64) {
    let k = krueger();
    let phi = lat.to_radians();
    let dlambda = lon.to_radians() - central_meridian(zone);

    let t = (phi.sin().atanh() - k.e_term * (k.e_term * phi.sin()).atanh()).sinh();
    let xi_p = t.atan2(dlambda.cos());
    let eta_p = (dlambda.sin() / (1.0 + t * t).sqrt()).atanh();

    let mut xi = xi_p;
    let mut eta = eta_p;
    for (j, alpha) in k.alpha.iter().enumerate() {
        let m = 2.0 * (j as f64 + 1.0);
        xi += alpha * (m * xi_p).sin() * (m * eta_p).cosh();
        eta += alpha * (m * xi_p).cos() * (m * eta_p).sinh();
    }

    let easting = UTM_FALSE_EASTING + k.k0a * eta;
    let false_northing = if north { 0.0 } else { UTM_FALSE_NORTHING_SOUTH };
    let northing = false_northing + k.k0a * xi;
    (easting, northing)
}

fn utm_inverse(zone: u8, north: bool, easting: f64, northing: f64) -> (f64, f64) {
    let k = krueger();
    let false_northing = if north { 0.0 } else { UTM_FALSE_NORTHING_SOUTH };
    let xi = (northing - false_northing) / k.k0a;
    let eta = (easting - UTM_FALSE_EASTING) / k.k0a;

    let mut xi_p = xi;
    let mut eta_p = eta;
    for (j, beta) in k.beta.iter().enumerate() {
        let m = 2.0 * (j as f64 + 1.0);
        xi_p -= beta * (m * xi).sin() * (m * eta).cosh();
        eta_p -= beta * (m * xi).cos() * (m * eta).sinh();
    }

    let chi = (xi_p.sin() / eta_p.cosh()).asin();
    let mut phi = chi;
    for (j, delta) in k.delta.iter().enumerate() {
        let m = 2.0 * (j as f64 + 1.0);
        phi += delta * (m * chi).sin();
    }
    let lambda = central_meridian(zone) + eta_p.sinh().atan2(xi_p.cos());

    (lambda.to_degrees(), phi.to_degrees())
}

//! Export request construction: land-cover image clipped to a tile footprint.

use geo::Polygon;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::contract::ExportRequest;
use crate::tile::{TileRecord, DEFAULT_KEY_PREFIX};

/// What to render for each footprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Prefix of every object key.
    pub prefix: String,
    /// Image asset id of the land-cover product.
    pub dataset: String,
    /// Band to export.
    pub band: String,
    pub width: u32,
    pub height: u32,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_KEY_PREFIX.to_string(),
            dataset: "COPERNICUS/Landcover/100m/Proba-V-C3/Global/2019".to_string(),
            band: "discrete_classification".to_string(),
            width: 256,
            height: 256,
        }
    }
}

fn invocation(function: &str, arguments: Value) -> Value {
    json!({
        "functionInvocationValue": {
            "functionName": function,
            "arguments": arguments,
        }
    })
}

fn constant(value: Value) -> Value {
    json!({ "constantValue": value })
}

fn polygon_coordinates(polygon: &Polygon<f64>) -> Value {
    let ring: Vec<[f64; 2]> = polygon.exterior().coords().map(|c| [c.x, c.y]).collect();
    json!([ring])
}

/// Serialized expression for
/// `Image.load(dataset).select([band]).clipToBoundsAndScale(footprint, width, height)`.
pub fn image_expression(settings: &ExportSettings, footprint: &Polygon<f64>) -> Value {
    let image = invocation(
        "Image.load",
        json!({ "id": constant(json!(settings.dataset)) }),
    );
    let selected = invocation(
        "Image.select",
        json!({
            "input": image,
            "bandSelectors": constant(json!([settings.band])),
        }),
    );
    let geometry = invocation(
        "GeometryConstructors.Polygon",
        json!({ "coordinates": constant(polygon_coordinates(footprint)) }),
    );
    let clipped = invocation(
        "Image.clipToBoundsAndScale",
        json!({
            "input": selected,
            "geometry": geometry,
            "width": constant(json!(settings.width)),
            "height": constant(json!(settings.height)),
        }),
    );
    json!({ "result": "0", "values": { "0": clipped } })
}

/// Build the export request for one tile record.
pub fn build_request(record: &TileRecord, settings: &ExportSettings, bucket: &str) -> ExportRequest {
    ExportRequest {
        key: record.file_prefix(&settings.prefix),
        bucket: bucket.to_string(),
        expression: image_expression(settings, &record.footprint),
    }
}

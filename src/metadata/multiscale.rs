//! OME-NGFF multiscale attributes (`.zattrs`).

use serde::{Deserialize, Serialize};

use crate::array::{downsample_factor, PyramidDescriptor};

use super::PhysicalSize;

/// NGFF version written by this crate.
pub const NGFF_VERSION: &str = "0.4";

/// Top-level `.zattrs` document of an image group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiscaleAttributes {
    pub multiscales: Vec<Multiscale>,
}

/// One multiscale image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Multiscale {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub axes: Vec<Axis>,
    pub datasets: Vec<Dataset>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// One resolution level.
///
/// `shape` and `chunks` are informational extensions; readers that follow
/// the NGFF schema ignore them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub path: String,
    #[serde(
        rename = "coordinateTransformations",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub coordinate_transformations: Vec<CoordinateTransformation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Vec<u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks: Option<Vec<u64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CoordinateTransformation {
    Identity,
    Scale { scale: Vec<f64> },
    Translation { translation: Vec<f64> },
}

impl MultiscaleAttributes {
    /// Describe every level of `descriptor` with a `2^level` scale on the
    /// spatial axes.
    pub fn for_pyramid(
        descriptor: &PyramidDescriptor,
        name: &str,
        pixel_size: Option<&PhysicalSize>,
        method: Option<&str>,
    ) -> Self {
        let unit = pixel_size.map(|p| p.unit.clone());
        let space_axis = |name: &str| Axis {
            name: name.to_string(),
            kind: Some("space".to_string()),
            unit: unit.clone(),
        };
        let axes = vec![
            Axis {
                name: "c".to_string(),
                kind: Some("channel".to_string()),
                unit: None,
            },
            space_axis("z"),
            space_axis("y"),
            space_axis("x"),
        ];

        let (pz, py, px) = pixel_size.map(|p| (p.z, p.y, p.x)).unwrap_or((1.0, 1.0, 1.0));
        let chunk = descriptor.chunk_shape();
        let datasets = (0..descriptor.level_count())
            .map(|level| {
                let factor = downsample_factor(level) as f64;
                Dataset {
                    path: level.to_string(),
                    coordinate_transformations: vec![CoordinateTransformation::Scale {
                        scale: vec![1.0, pz * factor, py * factor, px * factor],
                    }],
                    shape: descriptor.level_dims(level).map(|d| d.to_vec()),
                    chunks: Some(vec![1, chunk.z, chunk.y, chunk.x]),
                }
            })
            .collect();

        let metadata = method.map(|m| serde_json::json!({ "method": m }));

        Self {
            multiscales: vec![Multiscale {
                version: Some(NGFF_VERSION.to_string()),
                name: Some(name.to_string()),
                axes,
                datasets,
                kind: method.map(|m| m.to_string()),
                metadata,
            }],
        }
    }

    /// Dataset paths of the first multiscale, in level order.
    pub fn dataset_paths(&self) -> Vec<String> {
        self.multiscales
            .first()
            .map(|m| m.datasets.iter().map(|d| d.path.clone()).collect())
            .unwrap_or_default()
    }
}

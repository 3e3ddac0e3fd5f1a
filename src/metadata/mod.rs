//! Metadata documents describing a pyramid.
//!
//! - [`zarr`]: `.zarray` and `.zgroup` documents
//! - [`multiscale`]: NGFF multiscale `.zattrs`
//! - [`ome`]: OME-XML sidecar with channel and pixel metadata

pub mod multiscale;
pub mod ome;
pub mod zarr;

use serde::{Deserialize, Serialize};

pub use multiscale::{CoordinateTransformation, Dataset, Multiscale, MultiscaleAttributes};
pub use ome::OmeMetadata;
pub use zarr::{ArrayMetadata, GroupMetadata, ZARRAY, ZATTRS, ZGROUP};

/// File name of the OME-XML sidecar at the output root.
pub const OME_XML: &str = "METADATA.ome.xml";

/// Physical size of one level-0 voxel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalSize {
    pub z: f64,
    pub y: f64,
    pub x: f64,
    /// Unit name as used in NGFF axes (e.g. `micrometer`).
    #[serde(default = "default_unit")]
    pub unit: String,
}

fn default_unit() -> String {
    "micrometer".to_string()
}

impl PhysicalSize {
    /// Sizes in micrometers.
    pub fn new(z: f64, y: f64, x: f64) -> Self {
        Self {
            z,
            y,
            x,
            unit: default_unit(),
        }
    }

    /// OME-XML unit symbol for this unit.
    pub fn ome_unit(&self) -> &str {
        match self.unit.as_str() {
            "micrometer" => "µm",
            "nanometer" => "nm",
            "millimeter" => "mm",
            "meter" => "m",
            other => other,
        }
    }
}

/// Serialize a document as pretty JSON bytes.
pub fn to_json_bytes<T: Serialize>(value: &T) -> Result<bytes::Bytes, serde_json::Error> {
    serde_json::to_vec_pretty(value).map(bytes::Bytes::from)
}

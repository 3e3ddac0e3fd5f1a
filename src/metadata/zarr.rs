//! zarr v2 array and group metadata documents.

use serde::{Deserialize, Serialize};

use crate::array::PyramidDescriptor;

/// Name of the array metadata document.
pub const ZARRAY: &str = ".zarray";
/// Name of the group marker document.
pub const ZGROUP: &str = ".zgroup";
/// Name of the attributes document.
pub const ZATTRS: &str = ".zattrs";

/// Contents of a `.zarray` document.
///
/// Only the fields needed for raw C-order chunks are interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayMetadata {
    pub zarr_format: u8,
    pub shape: Vec<u64>,
    pub chunks: Vec<u64>,
    pub dtype: String,
    #[serde(default)]
    pub compressor: Option<serde_json::Value>,
    #[serde(default)]
    pub fill_value: serde_json::Value,
    #[serde(default = "default_order")]
    pub order: String,
    #[serde(default)]
    pub filters: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_separator: Option<String>,
}

fn default_order() -> String {
    "C".to_string()
}

impl ArrayMetadata {
    /// Metadata for one level of `descriptor` as a 4-D `(c, z, y, x)`
    /// array with `/`-separated chunk keys.
    pub fn for_level(descriptor: &PyramidDescriptor, level: usize) -> Option<Self> {
        let dims = descriptor.level_dims(level)?;
        let chunk = descriptor.chunk_shape();
        Some(Self {
            zarr_format: 2,
            shape: dims.to_vec(),
            chunks: vec![1, chunk.z, chunk.y, chunk.x],
            dtype: descriptor.dtype().zarr_str().to_string(),
            compressor: None,
            fill_value: serde_json::Value::from(0),
            order: default_order(),
            filters: None,
            dimension_separator: Some("/".to_string()),
        })
    }

    /// Chunk key separator (`.` when unspecified, per zarr v2).
    pub fn separator(&self) -> &str {
        self.dimension_separator.as_deref().unwrap_or(".")
    }
}

/// Contents of a `.zgroup` document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMetadata {
    pub zarr_format: u8,
}

impl Default for GroupMetadata {
    fn default() -> Self {
        Self { zarr_format: 2 }
    }
}

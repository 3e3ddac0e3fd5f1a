//! Validated composition maps.
//!
//! A composition map assigns source pyramids to places in the output. Each
//! entry names a destination channel, a source path, the channel to read
//! from that source, and where the source lands:
//!
//! ```json
//! {"entries": [
//!   {"channel": 0, "source": "a", "placement": {"offset": {"y": 0, "x": 0}}},
//!   {"channel": 0, "source": "b", "placement": {"offset": {"y": 0, "x": 512}}}
//! ]}
//! ```
//!
//! Structural checks happen here, before any source is opened. Checks that
//! need source metadata (dtype, extents, level count) happen in
//! [`PyramidCompositor::set_composition`](super::PyramidCompositor::set_composition).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::CompositionError;

/// Where a source lands in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    /// Level-0 pixel offset of the source's top-left corner.
    Offset { y: u64, x: u64 },
    /// Cell of a regular grid whose cells all have the source image shape.
    Grid { row: u64, col: u64 },
}

impl Placement {
    fn kind(&self) -> &'static str {
        match self {
            Placement::Offset { .. } => "offset",
            Placement::Grid { .. } => "grid",
        }
    }
}

/// One source placed into one destination channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionEntry {
    /// Destination channel.
    pub channel: u32,
    /// Path of the source pyramid.
    pub source: String,
    /// Channel read from the source.
    #[serde(default)]
    pub source_channel: u32,
    pub placement: Placement,
}

impl CompositionEntry {
    pub fn offset(channel: u32, source: impl Into<String>, y: u64, x: u64) -> Self {
        Self {
            channel,
            source: source.into(),
            source_channel: 0,
            placement: Placement::Offset { y, x },
        }
    }

    pub fn grid(channel: u32, source: impl Into<String>, row: u64, col: u64) -> Self {
        Self {
            channel,
            source: source.into(),
            source_channel: 0,
            placement: Placement::Grid { row, col },
        }
    }

    pub fn with_source_channel(mut self, source_channel: u32) -> Self {
        self.source_channel = source_channel;
        self
    }
}

/// A structurally valid composition map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompositionMap {
    entries: Vec<CompositionEntry>,
}

#[derive(Deserialize)]
struct RawCompositionMap {
    entries: Vec<CompositionEntry>,
}

impl CompositionMap {
    /// Validate entries into a map.
    ///
    /// Rejects an empty map, empty source paths, two entries with the same
    /// destination channel and placement, and maps mixing offset and grid
    /// placements.
    pub fn new(entries: Vec<CompositionEntry>) -> Result<Self, CompositionError> {
        let invalid = |reason: String| CompositionError::InvalidComposition { reason };

        let Some(first) = entries.first() else {
            return Err(invalid("composition map is empty".to_string()));
        };
        let kind = first.placement.kind();

        let mut destinations = HashSet::new();
        for (i, entry) in entries.iter().enumerate() {
            if entry.source.trim().is_empty() {
                return Err(invalid(format!("entry {} has an empty source path", i)));
            }
            if entry.placement.kind() != kind {
                return Err(invalid(format!(
                    "entry {} uses {} placement but entry 0 uses {} placement",
                    i,
                    entry.placement.kind(),
                    kind
                )));
            }
            if !destinations.insert((entry.channel, entry.placement)) {
                return Err(invalid(format!(
                    "entry {} collides with an earlier entry at channel {} {:?}",
                    i, entry.channel, entry.placement
                )));
            }
        }

        Ok(Self { entries })
    }

    /// Parse and validate a JSON map (`{"entries": [...]}`).
    pub fn from_json(json: &str) -> Result<Self, CompositionError> {
        let raw: RawCompositionMap =
            serde_json::from_str(json).map_err(|e| CompositionError::InvalidComposition {
                reason: format!("malformed composition map: {}", e),
            })?;
        Self::new(raw.entries)
    }

    /// Build a grid map from `(x, y, c) -> path` cells: `x` is the grid
    /// column, `y` the grid row and `c` the destination channel.
    pub fn from_grid(cells: HashMap<(u32, u32, u32), String>) -> Result<Self, CompositionError> {
        let mut cells: Vec<_> = cells.into_iter().collect();
        // Deterministic order: channel, row, column
        cells.sort_by_key(|((x, y, c), _)| (*c, *y, *x));
        let entries = cells
            .into_iter()
            .map(|((x, y, c), path)| CompositionEntry::grid(c, path, u64::from(y), u64::from(x)))
            .collect();
        Self::new(entries)
    }

    pub fn entries(&self) -> &[CompositionEntry] {
        &self.entries
    }

    /// Output channel count: highest destination channel plus one.
    pub fn channels(&self) -> u32 {
        self.entries.iter().map(|e| e.channel).max().unwrap_or(0) + 1
    }

    /// Whether entries use grid placement.
    pub fn is_grid(&self) -> bool {
        matches!(
            self.entries.first().map(|e| e.placement),
            Some(Placement::Grid { .. })
        )
    }

    /// Distinct source paths in order of first appearance.
    pub fn source_paths(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .map(|e| e.source.as_str())
            .filter(|path| seen.insert(*path))
            .collect()
    }
}

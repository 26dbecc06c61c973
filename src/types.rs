//! Record model and engine configuration.
//!
//! Input records carry a species name and a geometry tag. Geometry kind is a
//! sum type checked once at insertion, so the tree only ever stores points.

use crate::error::{BinningError, Result};
use geo::Point;
use serde::{Deserialize, Serialize};

/// Geometry of an input record.
///
/// The engine bins point records only. Anything else is carried as
/// [`Geometry::Unsupported`] until insertion, where it is reported and dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// A longitude/latitude point.
    Point(Point<f64>),
    /// Any other geometry kind, identified by its GeoJSON type name.
    Unsupported(String),
}

/// A species occurrence record as handed to the engine by a loader.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Species name, the grouping key for per-cell statistics.
    pub name: String,
    pub geometry: Geometry,
}

impl Record {
    /// Create a point record from raw longitude/latitude coordinates.
    pub fn point(name: impl Into<String>, lon: f64, lat: f64) -> Self {
        Self {
            name: name.into(),
            geometry: Geometry::Point(Point::new(lon, lat)),
        }
    }

    /// Convert a GeoJSON feature into a record.
    ///
    /// This is a thin adapter, not a loader: the species name is read from the
    /// `name` property and non-point geometries become [`Geometry::Unsupported`]
    /// so they flow through the engine's normal skip path.
    pub fn from_geojson(feature: &geojson::Feature) -> Result<Self> {
        let name = feature
            .properties
            .as_ref()
            .and_then(|props| props.get("name"))
            .and_then(|value| value.as_str())
            .ok_or(BinningError::MissingName)?
            .to_string();

        let geometry = match &feature.geometry {
            Some(geometry) => match &geometry.value {
                geojson::Value::Point(coords) if coords.len() >= 2 => {
                    Geometry::Point(Point::new(coords[0], coords[1]))
                }
                other => Geometry::Unsupported(other.type_name().to_string()),
            },
            None => Geometry::Unsupported("None".to_string()),
        };

        Ok(Self { name, geometry })
    }
}

/// A validated point occurrence held by the tree.
///
/// Shared via `Rc` between the binner's retained record list, the leaf that
/// owns the point, and any ancestor a patch pass copies it into.
#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence {
    pub name: String,
    pub point: Point<f64>,
}

/// Patch pass applied before extraction.
///
/// The two passes are mutually exclusive caller intents: filling visual
/// coverage gaps versus suppressing sparse noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PatchMode {
    /// No aggregation; extraction sees the raw leaves.
    None,
    /// Fill internal nodes that have empty quadrants.
    PartiallyEmpty,
    /// Merge sparse cells upward instead of exposing them individually.
    #[default]
    Sparse,
}

/// Binning configuration.
///
/// Designed to be serializable and loadable from JSON while keeping
/// complexity minimal.
///
/// # Example
///
/// ```rust
/// use geobin::Config;
///
/// let json = r#"{
///     "max_cell_size_log2": 2,
///     "min_cell_size_log2": 0,
///     "node_capacity": 16
/// }"#;
/// let config: Config = serde_json::from_str(json).unwrap();
/// assert_eq!(config.node_capacity, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Largest cell size, as log2 of the cell width in binning units.
    /// Cells above this size always subdivide.
    #[serde(default = "Config::default_max_cell_size_log2")]
    pub max_cell_size_log2: i32,

    /// Smallest cell size, the resolution floor. Cells at or below this size
    /// never subdivide and grow without bound.
    #[serde(default = "Config::default_min_cell_size_log2")]
    pub min_cell_size_log2: i32,

    /// Records a leaf may hold before it is forced to subdivide.
    #[serde(default = "Config::default_node_capacity")]
    pub node_capacity: usize,

    /// Minimum record count for a cell to appear in the extracted output.
    #[serde(default = "Config::default_lower_threshold")]
    pub lower_threshold: usize,

    /// Multiplier mapping input degrees into binning-space units.
    #[serde(default = "Config::default_scale")]
    pub scale: f64,

    /// Patch pass run by [`cells`](crate::QuadtreeGeoBinner::cells).
    #[serde(default)]
    pub patch_mode: PatchMode,
}

impl Config {
    const fn default_max_cell_size_log2() -> i32 {
        4
    }

    const fn default_min_cell_size_log2() -> i32 {
        0
    }

    const fn default_node_capacity() -> usize {
        100
    }

    const fn default_lower_threshold() -> usize {
        1
    }

    const fn default_scale() -> f64 {
        1.0
    }

    pub fn with_cell_size_log2(mut self, min: i32, max: i32) -> Self {
        self.min_cell_size_log2 = min;
        self.max_cell_size_log2 = max;
        self
    }

    pub fn with_node_capacity(mut self, capacity: usize) -> Self {
        self.node_capacity = capacity;
        self
    }

    pub fn with_lower_threshold(mut self, threshold: usize) -> Self {
        self.lower_threshold = threshold;
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_patch_mode(mut self, mode: PatchMode) -> Self {
        self.patch_mode = mode;
        self
    }

    /// Reject configurations the engine cannot bin with.
    pub fn validate(&self) -> Result<()> {
        if self.node_capacity == 0 {
            return Err(BinningError::InvalidConfig(
                "node capacity must be at least 1".to_string(),
            ));
        }
        if self.min_cell_size_log2 > self.max_cell_size_log2 {
            return Err(BinningError::InvalidConfig(format!(
                "min cell size log2 ({}) exceeds max cell size log2 ({})",
                self.min_cell_size_log2, self.max_cell_size_log2
            )));
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(BinningError::InvalidConfig(format!(
                "scale must be finite and positive, got {}",
                self.scale
            )));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_cell_size_log2: Self::default_max_cell_size_log2(),
            min_cell_size_log2: Self::default_min_cell_size_log2(),
            node_capacity: Self::default_node_capacity(),
            lower_threshold: Self::default_lower_threshold(),
            scale: Self::default_scale(),
            patch_mode: PatchMode::default(),
        }
    }
}

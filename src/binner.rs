//! The adaptive quadtree binner.
//!
//! [`QuadtreeGeoBinner`] owns the tree, the retained source records, and the
//! configuration. Configuration changes are compare-and-set: an unchanged
//! value is a no-op, anything else invalidates the whole tree, which is
//! rebuilt from the retained records on the next read. Adding a record to an
//! already-built tree only invalidates the extracted cell list.

use crate::cell::{BinParams, GeoCell};
use crate::error::{BinningError, Result};
use crate::stats::{CellArea, CellSummary, SphericalArea};
use crate::types::{Config, Geometry, Occurrence, PatchMode, Record};
use geo::{Rect, coord};
use serde::Serialize;
use std::rc::Rc;

/// Absolute coordinate bound of unprojected world data, in degrees.
const WORLD_BOUND_DEGREES: f64 = 180.0;

/// Adaptive geospatial quadtree binner.
///
/// Aggregates point occurrence records into variable-resolution grid cells:
/// dense regions subdivide down to the configured resolution floor, sparse
/// regions are patched upward, and cells below the significance threshold are
/// pruned from the output.
///
/// Single-threaded by design; wrap externally if cross-thread access is
/// needed.
pub struct QuadtreeGeoBinner {
    extent: Option<Rect<f64>>,
    min_cell_size_log2: i32,
    max_cell_size_log2: i32,
    node_capacity: usize,
    lower_threshold: usize,
    scale: f64,
    patch_mode: PatchMode,
    area_model: Box<dyn CellArea>,
    records: Vec<Rc<Occurrence>>,
    dropped_records: u64,
    root: Option<GeoCell>,
    cells_cache: Vec<CellSummary>,
    tree_need_update: bool,
    cells_need_update: bool,
    tree_builds: u64,
}

/// Summary counters for diagnostics, reported without triggering a rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinnerStats {
    pub records: usize,
    pub dropped_records: u64,
    pub cells: usize,
    pub tree_builds: u64,
    pub tree_depth: usize,
}

impl QuadtreeGeoBinner {
    /// Create a binner with the default [`Config`].
    pub fn new() -> Self {
        // The default configuration is always valid.
        Self::from_config(Config::default())
    }

    /// Create a binner from a configuration.
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    fn from_config(config: Config) -> Self {
        Self {
            extent: None,
            min_cell_size_log2: config.min_cell_size_log2,
            max_cell_size_log2: config.max_cell_size_log2,
            node_capacity: config.node_capacity,
            lower_threshold: config.lower_threshold,
            scale: config.scale,
            patch_mode: config.patch_mode,
            area_model: Box::new(SphericalArea),
            records: Vec::new(),
            dropped_records: 0,
            root: None,
            cells_cache: Vec::new(),
            tree_need_update: true,
            cells_need_update: true,
            tree_builds: 0,
        }
    }

    /// Set the binning extent, squarifying it: the shorter side is extended
    /// to match the longer, so width always equals height. Inverted bounds
    /// are normalized, never rejected. Non-finite bounds are ignored; the
    /// root extent derivation doubles until it covers the bound and must
    /// terminate.
    pub fn set_extent(&mut self, bbox: [f64; 4]) -> &mut Self {
        if bbox.iter().any(|value| !value.is_finite()) {
            log::warn!("ignoring extent with non-finite bounds {bbox:?}");
            return self;
        }
        let squarified = squarify(bbox);
        if self.extent != Some(squarified) {
            self.extent = Some(squarified);
            self.tree_need_update = true;
        }
        self
    }

    pub fn set_min_cell_size_log2(&mut self, size_log2: i32) -> &mut Self {
        if self.min_cell_size_log2 != size_log2 {
            self.min_cell_size_log2 = size_log2;
            self.tree_need_update = true;
        }
        self
    }

    pub fn set_max_cell_size_log2(&mut self, size_log2: i32) -> &mut Self {
        if self.max_cell_size_log2 != size_log2 {
            self.max_cell_size_log2 = size_log2;
            self.tree_need_update = true;
        }
        self
    }

    /// Set the lower threshold: the minimum record count for a cell to be
    /// significant enough to appear in the output.
    pub fn set_min_cell_capacity(&mut self, lower_threshold: usize) -> &mut Self {
        if self.lower_threshold != lower_threshold {
            self.lower_threshold = lower_threshold;
            // Patching depends on the threshold, so the patched tree is stale.
            self.tree_need_update = true;
        }
        self
    }

    /// Set the node capacity: the record count that forces a leaf to
    /// subdivide.
    pub fn set_max_cell_capacity(&mut self, node_capacity: usize) -> &mut Self {
        if self.node_capacity != node_capacity {
            self.node_capacity = node_capacity;
            self.tree_need_update = true;
        }
        self
    }

    pub fn set_scale(&mut self, scale: f64) -> &mut Self {
        if self.scale != scale {
            self.scale = scale;
            self.tree_need_update = true;
        }
        self
    }

    pub fn set_patch_mode(&mut self, mode: PatchMode) -> &mut Self {
        if self.patch_mode != mode {
            self.patch_mode = mode;
            self.tree_need_update = true;
        }
        self
    }

    /// Replace the surface-area collaborator used for cell statistics.
    pub fn set_area_model(&mut self, model: Box<dyn CellArea>) -> &mut Self {
        self.area_model = model;
        self.cells_need_update = true;
        self
    }

    /// Number of retained point records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Add a single record.
    ///
    /// A record with an unsupported geometry kind is dropped with a typed
    /// error and the tree is left untouched. When the tree is already built
    /// the record is inserted incrementally and only the extracted cell list
    /// is invalidated.
    pub fn add_feature(&mut self, record: Record) -> Result<()> {
        let Record { name, geometry } = record;
        let point = match geometry {
            Geometry::Point(point) => point,
            Geometry::Unsupported(kind) => {
                self.dropped_records += 1;
                log::warn!("dropping record '{name}': unsupported geometry kind '{kind}'");
                return Err(BinningError::UnsupportedGeometry { kind });
            }
        };

        let occurrence = Rc::new(Occurrence { name, point });
        if !self.tree_need_update {
            let params = self.bin_params();
            if let Some(root) = self.root.as_mut() {
                root.add(Rc::clone(&occurrence), &params);
            }
        }
        self.records.push(occurrence);
        self.cells_need_update = true;
        Ok(())
    }

    /// Add a batch of records, skipping unsupported geometries.
    ///
    /// Returns the number of records actually added; skipped records are
    /// logged and counted in [`stats`](Self::stats).
    pub fn add_features(&mut self, records: impl IntoIterator<Item = Record>) -> usize {
        let mut added = 0;
        for record in records {
            if self.add_feature(record).is_ok() {
                added += 1;
            }
        }
        added
    }

    /// Drop all records and the tree.
    pub fn clear(&mut self) {
        self.records.clear();
        self.dropped_records = 0;
        self.root = None;
        self.cells_cache.clear();
        self.tree_need_update = true;
        self.cells_need_update = true;
    }

    /// Rebuild the tree from scratch over the retained records.
    ///
    /// The root extent is derived by doubling a power-of-two cell size,
    /// starting at the configured maximum cell size, until it covers the
    /// coordinate bound: the squarified configured extent if one was set,
    /// otherwise the whole world at the configured scale.
    pub fn generate_tree(&mut self) {
        let bound = match &self.extent {
            Some(extent) => {
                let min = extent.min();
                let max = extent.max();
                min.x.abs().max(min.y.abs()).max(max.x.abs()).max(max.y.abs())
            }
            None => WORLD_BOUND_DEGREES * self.scale,
        };

        let mut half_size = 2_f64.powi(self.max_cell_size_log2);
        let mut half_size_log2 = self.max_cell_size_log2;
        while half_size < bound {
            half_size *= 2.0;
            half_size_log2 += 1;
        }

        let extent = Rect::new(
            coord! { x: -half_size, y: -half_size },
            coord! { x: half_size, y: half_size },
        );
        let mut root = GeoCell::new(extent, half_size_log2 + 1, "0".to_string());
        let params = self.bin_params();
        for record in &self.records {
            root.add(Rc::clone(record), &params);
        }
        log::debug!(
            "rebuilt quadtree over {} records, root width 2^{}",
            self.records.len(),
            half_size_log2 + 1
        );

        self.root = Some(root);
        self.tree_builds += 1;
        self.tree_need_update = false;
        self.cells_need_update = true;
    }

    /// Run the configured patch pass (unless `patch` is false), then extract
    /// the threshold-pruned, ordered cell list into the cache.
    pub fn generate_cells(&mut self, patch: bool) {
        if patch {
            if let Some(root) = self.root.as_mut() {
                match self.patch_mode {
                    PatchMode::None => {}
                    PatchMode::PartiallyEmpty => {
                        root.patch_partially_empty_nodes(self.max_cell_size_log2);
                    }
                    PatchMode::Sparse => {
                        root.patch_sparse_nodes(self.max_cell_size_log2, self.lower_threshold);
                    }
                }
            }
        }

        let mut cells = Vec::new();
        if let Some(root) = self.root.as_ref() {
            let area_model = self.area_model.as_ref();
            let scale = self.scale;
            root.visit_extracted(self.lower_threshold, &mut |cell| {
                cells.push(CellSummary::from_cell(cell, area_model, scale));
            });
        }
        log::debug!("extracted {} cells", cells.len());
        self.cells_cache = cells;
        self.cells_need_update = false;
    }

    /// The extracted cell list, in the order the clustering collaborator
    /// correlates with.
    ///
    /// Lazily rebuilds the tree and re-extracts when configuration or records
    /// changed; repeated reads with no intervening mutation return the cache
    /// untouched.
    pub fn cells(&mut self) -> &[CellSummary] {
        if self.tree_need_update {
            self.generate_tree();
        }
        if self.cells_need_update {
            self.generate_cells(true);
        }
        &self.cells_cache
    }

    /// Diagnostic counters over the current state; never triggers a rebuild.
    pub fn stats(&self) -> BinnerStats {
        BinnerStats {
            records: self.records.len(),
            dropped_records: self.dropped_records,
            cells: self.cells_cache.len(),
            tree_builds: self.tree_builds,
            tree_depth: self.root.as_ref().map(GeoCell::depth).unwrap_or(0),
        }
    }

    pub(crate) fn cells_cache_mut(&mut self) -> &mut [CellSummary] {
        &mut self.cells_cache
    }

    pub(crate) fn root_mut(&mut self) -> Option<&mut GeoCell> {
        self.root.as_mut()
    }

    /// Root of the current tree, if one has been built.
    pub fn root(&self) -> Option<&GeoCell> {
        self.root.as_ref()
    }

    fn bin_params(&self) -> BinParams {
        BinParams {
            max_size_log2: self.max_cell_size_log2,
            min_size_log2: self.min_cell_size_log2,
            capacity: self.node_capacity,
            scale: self.scale,
        }
    }
}

impl Default for QuadtreeGeoBinner {
    fn default() -> Self {
        Self::new()
    }
}

fn squarify(bbox: [f64; 4]) -> Rect<f64> {
    // Rect::new normalizes inverted bounds.
    let rect = Rect::new(
        coord! { x: bbox[0], y: bbox[1] },
        coord! { x: bbox[2], y: bbox[3] },
    );
    let side = rect.width().max(rect.height());
    let min = rect.min();
    Rect::new(min, coord! { x: min.x + side, y: min.y + side })
}

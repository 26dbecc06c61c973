//! Quadtree cell nodes and recursive insertion.
//!
//! A [`GeoCell`] is one node of the adaptive quadtree: a square extent, the
//! occurrence records held directly by this cell, and up to four lazily
//! created children. Insertion descends the tree one record at a time,
//! subdividing on size bounds and on leaf capacity.

use crate::stats::TopListCache;
use crate::types::Occurrence;
use geo::{Coord, Point, Rect, coord};
use std::cell::RefCell;
use std::rc::Rc;

/// Insertion thresholds, fixed for the lifetime of one tree build.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BinParams {
    /// Cells above this size always subdivide, regardless of occupancy.
    pub max_size_log2: i32,
    /// Cells at or below this size never subdivide; growth is unbounded.
    pub min_size_log2: i32,
    /// Exact record count that triggers subdivision of a leaf.
    pub capacity: usize,
    /// Degrees-to-binning-units multiplier applied to record coordinates.
    pub scale: f64,
}

/// One quadtree node covering a square region at some resolution.
///
/// Child slots are indexed by quadrant: bit 0 set for the right half,
/// bit 1 set for the lower half. A node is internal iff it has at least one
/// child; internal nodes keep an empty own feature list until a patch pass
/// copies descendant features up into them.
#[derive(Debug)]
pub struct GeoCell {
    pub(crate) extent: Rect<f64>,
    /// Log2 of the extent width, tracked as an integer so repeated halving
    /// compares exactly against the configured bounds.
    pub(crate) size_log2: i32,
    /// Path id: the root's digit followed by one quadrant digit per level.
    pub(crate) id: String,
    pub(crate) features: Vec<Rc<Occurrence>>,
    pub(crate) children: [Option<Box<GeoCell>>; 4],
    /// Cluster id written back by the external community-detection step.
    pub(crate) bioregion_id: Option<u32>,
    /// Bumped on every feature mutation; invalidates the statistics cache.
    pub(crate) generation: u64,
    pub(crate) top_list_cache: RefCell<TopListCache>,
}

impl GeoCell {
    pub(crate) fn new(extent: Rect<f64>, size_log2: i32, id: String) -> Self {
        Self {
            extent,
            size_log2,
            id,
            features: Vec::new(),
            children: Default::default(),
            bioregion_id: None,
            generation: 0,
            top_list_cache: RefCell::new(TopListCache::default()),
        }
    }

    /// Extent of this cell in binning-space units.
    pub fn extent(&self) -> Rect<f64> {
        self.extent
    }

    /// Log2 of this cell's width in binning-space units.
    pub fn size_log2(&self) -> i32 {
        self.size_log2
    }

    /// Path id correlating this cell with external clustering node ids.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Records held directly by this cell.
    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.iter().all(|child| child.is_none())
    }

    pub fn bioregion_id(&self) -> Option<u32> {
        self.bioregion_id
    }

    pub(crate) fn push_feature(&mut self, record: Rc<Occurrence>) {
        self.features.push(record);
        self.generation += 1;
    }

    pub(crate) fn set_features(&mut self, features: Vec<Rc<Occurrence>>) {
        self.features = features;
        self.generation += 1;
    }

    /// Insert one record at or below this cell.
    ///
    /// Callers must insert one record at a time: the capacity check is an
    /// exact equality, so bulk paths that bypass it would miss the
    /// subdivision trigger.
    pub(crate) fn add(&mut self, record: Rc<Occurrence>, params: &BinParams) {
        if !self.is_leaf() {
            return self.add_child(record, params);
        }
        if self.size_log2 > params.max_size_log2 {
            return self.add_child(record, params);
        }
        if self.size_log2 <= params.min_size_log2 {
            return self.push_feature(record);
        }
        if self.features.len() == params.capacity {
            let held = std::mem::take(&mut self.features);
            self.generation += 1;
            for feature in held {
                self.add_child(feature, params);
            }
            return self.add_child(record, params);
        }
        self.push_feature(record);
    }

    /// Route a record into the matching quadrant, creating the child if needed.
    fn add_child(&mut self, record: Rc<Occurrence>, params: &BinParams) {
        let quadrant = self.quadrant_of(record.point, params.scale);
        if self.children[quadrant].is_none() {
            let mut id = self.id.clone();
            id.push(char::from(b'0' + quadrant as u8));
            let child = GeoCell::new(self.child_extent(quadrant), self.size_log2 - 1, id);
            self.children[quadrant] = Some(Box::new(child));
        }
        if let Some(child) = self.children[quadrant].as_deref_mut() {
            child.add(record, params);
        }
    }

    /// Quadrant index for a point, with `>=` midpoint comparisons so points
    /// exactly on the midpoint always resolve to the same half.
    fn quadrant_of(&self, point: Point<f64>, scale: f64) -> usize {
        let mid = self.extent.center();
        let right = point.x() * scale >= mid.x;
        let upper = point.y() * scale >= mid.y;
        usize::from(!upper) * 2 + usize::from(right)
    }

    fn child_extent(&self, quadrant: usize) -> Rect<f64> {
        let min = self.extent.min();
        let max = self.extent.max();
        let mid: Coord<f64> = self.extent.center();
        let (x1, x2) = if quadrant & 1 == 1 {
            (mid.x, max.x)
        } else {
            (min.x, mid.x)
        };
        let (y1, y2) = if quadrant & 2 == 2 {
            (min.y, mid.y)
        } else {
            (mid.y, max.y)
        };
        Rect::new(coord! { x: x1, y: y1 }, coord! { x: x2, y: y2 })
    }

    /// Locate a cell by its path id, skipping this cell's own digit.
    pub(crate) fn find_mut(&mut self, id: &str) -> Option<&mut GeoCell> {
        let rest = id.strip_prefix(self.id.as_str())?;
        let mut node = self;
        for digit in rest.bytes() {
            let quadrant = usize::from(digit.checked_sub(b'0')?);
            node = node.children.get_mut(quadrant)?.as_deref_mut()?;
        }
        Some(node)
    }

    /// Maximum depth below this cell, counting this cell as 1.
    pub(crate) fn depth(&self) -> usize {
        1 + self
            .children
            .iter()
            .flatten()
            .map(|child| child.depth())
            .max()
            .unwrap_or(0)
    }

    /// Sum of feature counts over all leaves below this cell.
    #[cfg(test)]
    pub(crate) fn leaf_feature_total(&self) -> usize {
        if self.is_leaf() {
            return self.features.len();
        }
        self.children
            .iter()
            .flatten()
            .map(|child| child.leaf_feature_total())
            .sum()
    }
}

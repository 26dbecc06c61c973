//! Per-cell statistics and extracted cell views.
//!
//! Statistics are lazy: each cell caches its species ranking together with
//! the generation it was computed at, and recomputes on the first read after
//! a feature mutation. Surface area comes from a pluggable [`CellArea`]
//! collaborator so renderers can swap in their own model.

use crate::cell::GeoCell;
use geo::{ChamberlainDuquetteArea, Rect, coord};
use rustc_hash::FxHashMap;
use serde::Serialize;
use smallvec::SmallVec;

/// One species with its occurrence count inside a cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeciesCount {
    pub name: String,
    pub count: u32,
}

/// Species of a cell ranked by descending occurrence count.
///
/// Most cells rank only a handful of species, hence the inline buffer.
pub type SpeciesTopList = SmallVec<[SpeciesCount; 8]>;

/// Cached ranking plus the cell generation it was computed at.
#[derive(Debug, Default)]
pub(crate) struct TopListCache {
    generation: u64,
    list: SpeciesTopList,
}

impl GeoCell {
    /// Species held by this cell, ranked by descending count.
    ///
    /// Ties are broken by species name so the ranking is deterministic.
    /// The result is cached until the next feature mutation.
    pub fn species_top_list(&self) -> SpeciesTopList {
        let mut cache = self.top_list_cache.borrow_mut();
        if cache.generation != self.generation {
            cache.list = compute_top_list(self);
            cache.generation = self.generation;
        }
        cache.list.clone()
    }
}

fn compute_top_list(cell: &GeoCell) -> SpeciesTopList {
    let mut counts: FxHashMap<&str, u32> = FxHashMap::default();
    for feature in &cell.features {
        *counts.entry(feature.name.as_str()).or_insert(0) += 1;
    }
    let mut list: SpeciesTopList = counts
        .into_iter()
        .map(|(name, count)| SpeciesCount {
            name: name.to_string(),
            count,
        })
        .collect();
    list.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    list
}

/// Approximate surface area of a cell extent, in square meters.
///
/// The engine consumes this as an external collaborator; [`SphericalArea`] is
/// the default implementation.
pub trait CellArea {
    /// Area of an extent given in degrees.
    fn cell_area(&self, extent: &Rect<f64>) -> f64;
}

/// Spherical-earth area model backed by the Chamberlain–Duquette formula.
///
/// Extents reaching beyond the valid latitude range (oversized root cells do)
/// are clamped to ±90° before evaluation. Geodesic-exact area is explicitly
/// out of scope.
#[derive(Debug, Clone, Copy, Default)]
pub struct SphericalArea;

impl CellArea for SphericalArea {
    fn cell_area(&self, extent: &Rect<f64>) -> f64 {
        let min = extent.min();
        let max = extent.max();
        // Clamp before building the Rect: Rect::new reorders inverted bounds,
        // which would fold a fully out-of-band extent back into the valid
        // band instead of leaving it degenerate.
        let (x1, x2) = (min.x.max(-180.0), max.x.min(180.0));
        let (y1, y2) = (min.y.max(-90.0), max.y.min(90.0));
        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }
        Rect::new(coord! { x: x1, y: y1 }, coord! { x: x2, y: y2 })
            .to_polygon()
            .chamberlain_duquette_unsigned_area()
    }
}

/// Snapshot of one extracted cell, ordered as produced by
/// [`cells`](crate::QuadtreeGeoBinner::cells).
///
/// This is the hand-off format for both the clustering collaborator and the
/// renderer; the positional order is the correlation contract with the
/// clustering result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellSummary {
    /// Path id of the underlying tree cell.
    pub id: String,
    /// Bounding box `[x1, y1, x2, y2]` in binning-space units.
    pub extent: [f64; 4],
    pub size_log2: i32,
    /// Number of records aggregated at this cell.
    pub count: usize,
    /// Approximate surface area in square meters.
    pub area: f64,
    /// Record density for heatmap coloring.
    pub records_per_area: f64,
    pub species_top_list: SpeciesTopList,
    /// Cluster id assigned by the external community-detection step.
    pub bioregion_id: Option<u32>,
}

impl CellSummary {
    pub(crate) fn from_cell(cell: &GeoCell, area_model: &dyn CellArea, scale: f64) -> Self {
        let min = cell.extent.min();
        let max = cell.extent.max();
        let degrees = Rect::new(
            coord! { x: min.x / scale, y: min.y / scale },
            coord! { x: max.x / scale, y: max.y / scale },
        );
        let area = area_model.cell_area(&degrees);
        let count = cell.features.len();
        let records_per_area = if area > 0.0 { count as f64 / area } else { 0.0 };
        Self {
            id: cell.id.clone(),
            extent: [min.x, min.y, max.x, max.y],
            size_log2: cell.size_log2,
            count,
            area,
            records_per_area,
            species_top_list: cell.species_top_list(),
            bioregion_id: cell.bioregion_id,
        }
    }

    /// Closed 5-point polygon ring for rendering, counter-clockwise from the
    /// minimum corner.
    pub fn polygon_ring(&self) -> [(f64, f64); 5] {
        let [x1, y1, x2, y2] = self.extent;
        [(x1, y1), (x2, y1), (x2, y2), (x1, y2), (x1, y1)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Occurrence;
    use geo::{Point, Rect};
    use std::rc::Rc;

    fn cell_with(names: &[&str]) -> GeoCell {
        let extent = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 1.0 });
        let mut cell = GeoCell::new(extent, 0, "0".to_string());
        for name in names {
            cell.push_feature(Rc::new(Occurrence {
                name: name.to_string(),
                point: Point::new(0.5, 0.5),
            }));
        }
        cell
    }

    #[test]
    fn test_top_list_ranks_by_count_then_name() {
        let cell = cell_with(&["wren", "stork", "wren", "heron", "stork", "wren"]);
        let list = cell.species_top_list();
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].name, "wren");
        assert_eq!(list[0].count, 3);
        assert_eq!(list[1].name, "stork");
        assert_eq!(list[1].count, 2);
        assert_eq!(list[2].name, "heron");
        assert_eq!(list[2].count, 1);
    }

    #[test]
    fn test_top_list_cache_invalidated_on_mutation() {
        let mut cell = cell_with(&["stork"]);
        assert_eq!(cell.species_top_list().len(), 1);

        cell.push_feature(Rc::new(Occurrence {
            name: "heron".to_string(),
            point: Point::new(0.5, 0.5),
        }));
        let list = cell.species_top_list();
        assert_eq!(list.len(), 2);

        // Repeated reads with no mutation return the cached ranking.
        assert_eq!(cell.species_top_list(), list);
    }

    #[test]
    fn test_spherical_area_is_positive_for_world_cells() {
        let area = SphericalArea;
        let extent = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 1.0 });
        let one_degree = area.cell_area(&extent);
        // A 1-degree cell at the equator is roughly 110 km x 111 km.
        assert!(one_degree > 1.0e10 && one_degree < 2.0e10);

        // Higher latitudes shrink the cell.
        let extent = Rect::new(coord! { x: 0.0, y: 60.0 }, coord! { x: 1.0, y: 61.0 });
        assert!(area.cell_area(&extent) < one_degree);
    }

    #[test]
    fn test_spherical_area_clamps_oversized_extents() {
        let area = SphericalArea;
        let world = Rect::new(
            coord! { x: -180.0, y: -90.0 },
            coord! { x: 180.0, y: 90.0 },
        );
        let oversized = Rect::new(
            coord! { x: -256.0, y: -256.0 },
            coord! { x: 256.0, y: 256.0 },
        );
        assert_eq!(area.cell_area(&oversized), area.cell_area(&world));
    }

    #[test]
    fn test_spherical_area_is_zero_outside_the_valid_band() {
        let area = SphericalArea;
        let north = Rect::new(coord! { x: 0.0, y: 91.0 }, coord! { x: 1.0, y: 92.0 });
        assert_eq!(area.cell_area(&north), 0.0);

        let south = Rect::new(coord! { x: 0.0, y: -92.0 }, coord! { x: 1.0, y: -91.0 });
        assert_eq!(area.cell_area(&south), 0.0);

        let east = Rect::new(coord! { x: 181.0, y: 0.0 }, coord! { x: 182.0, y: 1.0 });
        assert_eq!(area.cell_area(&east), 0.0);
    }

    #[test]
    fn test_summary_density_and_ring() {
        let cell = cell_with(&["stork", "stork"]);
        let summary = CellSummary::from_cell(&cell, &SphericalArea, 1.0);
        assert_eq!(summary.count, 2);
        assert!(summary.area > 0.0);
        assert!((summary.records_per_area - 2.0 / summary.area).abs() < f64::EPSILON);

        let ring = summary.polygon_ring();
        assert_eq!(ring[0], ring[4]);
        assert_eq!(ring[2], (1.0, 1.0));
    }
}

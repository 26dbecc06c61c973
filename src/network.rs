//! Bipartite species-cell network export and cluster write-back.
//!
//! The extracted cell list is the correlation contract with the external
//! community-detection step: edges are emitted in cell order, and the
//! resulting cluster ids are written back positionally.

use crate::binner::QuadtreeGeoBinner;
use crate::error::{BinningError, Result};
use serde::Serialize;

/// One species-to-cell link with its occurrence count as weight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BipartiteEdge {
    pub species: String,
    /// Path id of the cell, stable across re-extractions of the same tree.
    pub cell_id: String,
    pub count: u32,
}

impl QuadtreeGeoBinner {
    /// Export the species-cell network for community detection.
    ///
    /// Edges are grouped by cell in extraction order, each cell's species
    /// ranked by descending count.
    pub fn bipartite_edges(&mut self) -> Vec<BipartiteEdge> {
        let mut edges = Vec::new();
        for cell in self.cells() {
            for species in &cell.species_top_list {
                edges.push(BipartiteEdge {
                    species: species.name.clone(),
                    cell_id: cell.id.clone(),
                    count: species.count,
                });
            }
        }
        edges
    }

    /// Write cluster ids back onto the extracted cells, one id per cell in
    /// extraction order.
    ///
    /// Ids land both on the cached summaries and on the underlying tree
    /// cells, so they survive a re-extraction that does not rebuild the tree.
    pub fn assign_bioregions(&mut self, bioregion_ids: &[u32]) -> Result<()> {
        let expected = self.cells().len();
        if bioregion_ids.len() != expected {
            return Err(BinningError::AssignmentMismatch {
                expected,
                got: bioregion_ids.len(),
            });
        }

        let paths: Vec<String> = self
            .cells_cache_mut()
            .iter_mut()
            .zip(bioregion_ids)
            .map(|(summary, &id)| {
                summary.bioregion_id = Some(id);
                summary.id.clone()
            })
            .collect();

        if let Some(root) = self.root_mut() {
            for (path, &id) in paths.iter().zip(bioregion_ids) {
                if let Some(cell) = root.find_mut(path) {
                    cell.bioregion_id = Some(id);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Record;

    fn binner_with_two_cells() -> QuadtreeGeoBinner {
        let mut binner = QuadtreeGeoBinner::new();
        binner
            .set_extent([-4.0, -4.0, 4.0, 4.0])
            .set_max_cell_size_log2(2)
            .set_min_cell_size_log2(0)
            .set_max_cell_capacity(2)
            .set_min_cell_capacity(1)
            .set_patch_mode(crate::types::PatchMode::None);
        binner.add_features([
            Record::point("stork", 0.5, 0.5),
            Record::point("stork", 0.6, 0.6),
            Record::point("heron", 3.5, 3.5),
        ]);
        binner
    }

    #[test]
    fn test_bipartite_edges_follow_cell_order() {
        let mut binner = binner_with_two_cells();
        let edges = binner.bipartite_edges();
        assert_eq!(edges.len(), 2);

        let cell_ids: Vec<&str> = binner.cells().iter().map(|cell| cell.id.as_str()).collect();
        assert_eq!(edges[0].cell_id, cell_ids[0]);
        assert_eq!(edges[1].cell_id, cell_ids[1]);

        let stork = edges.iter().find(|edge| edge.species == "stork").unwrap();
        assert_eq!(stork.count, 2);
        let heron = edges.iter().find(|edge| edge.species == "heron").unwrap();
        assert_eq!(heron.count, 1);
    }

    #[test]
    fn test_assign_bioregions_positionally() {
        let mut binner = binner_with_two_cells();
        assert_eq!(binner.cells().len(), 2);

        binner.assign_bioregions(&[7, 3]).unwrap();
        let cells = binner.cells();
        assert_eq!(cells[0].bioregion_id, Some(7));
        assert_eq!(cells[1].bioregion_id, Some(3));
    }

    #[test]
    fn test_assign_bioregions_survives_re_extraction() {
        let mut binner = binner_with_two_cells();
        binner.cells();
        binner.assign_bioregions(&[7, 3]).unwrap();

        // A new record in a fresh quadrant invalidates the cell cache but
        // not the tree; the ids written into the tree come back on the
        // untouched cells.
        binner.add_feature(Record::point("wren", -3.5, 3.5)).unwrap();
        let cells = binner.cells();
        assert_eq!(cells.len(), 3);
        assert!(cells.iter().any(|cell| cell.bioregion_id == Some(7)));
        assert!(cells.iter().any(|cell| cell.bioregion_id == Some(3)));
        assert!(cells.iter().any(|cell| cell.bioregion_id.is_none()));
    }

    #[test]
    fn test_assign_bioregions_length_mismatch() {
        let mut binner = binner_with_two_cells();
        assert_eq!(
            binner.assign_bioregions(&[1]),
            Err(BinningError::AssignmentMismatch {
                expected: 2,
                got: 1
            })
        );
    }
}

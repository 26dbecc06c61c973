//! Aggregation passes and threshold-pruned extraction.
//!
//! Both patch passes walk the tree post-order and return the feature set
//! aggregated at or below each node, so a parent can aggregate further no
//! matter whether the node itself was patched. Patched features are copied
//! upward (shared `Rc`s), never removed from the descendants that hold them.

use crate::cell::GeoCell;
use crate::types::Occurrence;
use std::rc::Rc;

impl GeoCell {
    /// Fill internal nodes that have empty quadrants.
    ///
    /// An internal node whose own feature list is still empty, whose size is
    /// at most `max_size_log2`, and which has fewer than four non-empty
    /// children becomes a filled pseudo-leaf holding the union of its
    /// descendants' features. Removes visual coverage gaps at the target
    /// resolution. Idempotent.
    pub(crate) fn patch_partially_empty_nodes(
        &mut self,
        max_size_log2: i32,
    ) -> Vec<Rc<Occurrence>> {
        // A threshold of zero can never mark a child as sparse.
        self.patch(max_size_log2, 0)
    }

    /// Merge sparse cells upward instead of exposing them individually.
    ///
    /// Patches under the same conditions as
    /// [`patch_partially_empty_nodes`](Self::patch_partially_empty_nodes) and
    /// additionally when at least one non-empty leaf child holds fewer than
    /// `lower_threshold` features. Idempotent.
    pub(crate) fn patch_sparse_nodes(
        &mut self,
        max_size_log2: i32,
        lower_threshold: usize,
    ) -> Vec<Rc<Occurrence>> {
        self.patch(max_size_log2, lower_threshold)
    }

    fn patch(&mut self, max_size_log2: i32, lower_threshold: usize) -> Vec<Rc<Occurrence>> {
        if self.is_leaf() {
            return self.features.clone();
        }

        let mut aggregated: Vec<Rc<Occurrence>> = Vec::new();
        let mut non_empty_children = 0;
        let mut has_sparse_leaf = false;
        for child in self.children.iter_mut().flatten() {
            if child.is_leaf()
                && !child.features.is_empty()
                && child.features.len() < lower_threshold
            {
                has_sparse_leaf = true;
            }
            let below = child.patch(max_size_log2, lower_threshold);
            if !below.is_empty() {
                non_empty_children += 1;
            }
            aggregated.extend(below);
        }

        // An already-patched node keeps its features; re-patching would
        // double-count nothing but churn the cache.
        let do_patch = self.features.is_empty()
            && self.size_log2 <= max_size_log2
            && (non_empty_children < 4 || has_sparse_leaf);
        if do_patch {
            self.set_features(aggregated.clone());
        }

        aggregated
    }

    /// Depth-first pre-order visit over cells with non-empty own features.
    ///
    /// A visited cell below `lower_threshold` is skipped together with its
    /// entire subtree; density is taken as non-increasing with depth after
    /// patching. Un-patched internal cells are passed through without being
    /// visited.
    pub(crate) fn visit_extracted<'a>(
        &'a self,
        lower_threshold: usize,
        visit: &mut dyn FnMut(&'a GeoCell),
    ) {
        if !self.features.is_empty() {
            if self.features.len() < lower_threshold {
                return;
            }
            visit(self);
        }
        for child in self.children.iter().flatten() {
            child.visit_extracted(lower_threshold, visit);
        }
    }
}

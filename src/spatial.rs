//! Bounded R-tree spatial index (C2).
//!
//! Grounded on the teacher's `database::spatial_index::{SpatialBBox, SpatialEntity,
//! RTreeIndex}`, trimmed from 3D CAD volumes to 2D element bounds and wrapped with
//! the memory cap the spec requires (`rstar`'s tree itself has no eviction policy).

use parking_lot::RwLock;
use rstar::{RTreeObject, AABB};
use std::collections::VecDeque;

use crate::operation::{Bounds, ElementId};

#[derive(Debug, Clone, PartialEq)]
struct IndexedElement {
    id: ElementId,
    bounds: Bounds,
}

impl RTreeObject for IndexedElement {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.bounds.x, self.bounds.y],
            [self.bounds.x + self.bounds.w, self.bounds.y + self.bounds.h],
        )
    }
}

/// A capacity-bounded R-tree mapping element ids to their current bounding box,
/// used by the spatial conflict detector to prune candidates before the O(n^2)
/// pairwise overlap check (spec §4.5: "spatial index narrows candidates").
pub struct SpatialIndex {
    inner: RwLock<Inner>,
    capacity: usize,
}

struct Inner {
    tree: rstar::RTree<IndexedElement>,
    /// Touch order, oldest first, for capacity eviction. Duplicates are
    /// tolerated and skipped lazily on eviction (cheaper than removing from
    /// the middle of a deque on every touch).
    touch_order: VecDeque<ElementId>,
}

impl SpatialIndex {
    /// Build an index capped at `capacity` distinct elements.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                tree: rstar::RTree::new(),
                touch_order: VecDeque::new(),
            }),
            capacity,
        }
    }

    /// Insert or update an element's bounds. Evicts the least-recently-touched
    /// entry if this insertion would exceed capacity.
    pub fn upsert(&self, id: &ElementId, bounds: Bounds) {
        let mut inner = self.inner.write();
        inner.remove_by_id(id);
        inner.tree.insert(IndexedElement {
            id: id.clone(),
            bounds,
        });
        inner.touch_order.push_back(id.clone());

        while inner.tree.size() > self.capacity {
            let Some(oldest) = inner.touch_order.pop_front() else {
                break;
            };
            inner.remove_by_id(&oldest);
        }
    }

    /// Remove an element from the index (on delete).
    pub fn remove(&self, id: &ElementId) {
        let mut inner = self.inner.write();
        inner.remove_by_id(id);
    }

    /// All element ids whose bounds overlap `bounds`, excluding `exclude` itself.
    pub fn nearby(&self, bounds: &Bounds, exclude: &ElementId) -> Vec<ElementId> {
        let inner = self.inner.read();
        let query = AABB::from_corners(
            [bounds.x, bounds.y],
            [bounds.x + bounds.w, bounds.y + bounds.h],
        );
        inner
            .tree
            .locate_in_envelope_intersecting(&query)
            .filter(|e| &e.id != exclude)
            .map(|e| e.id.clone())
            .collect()
    }

    /// Number of distinct elements currently indexed.
    pub fn len(&self) -> usize {
        self.inner.read().tree.size()
    }

    /// Whether the index holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Inner {
    fn remove_by_id(&mut self, id: &ElementId) {
        let found = self
            .tree
            .iter()
            .find(|e| &e.id == id)
            .cloned();
        if let Some(element) = found {
            self.tree.remove(&element);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(x: f64, y: f64, w: f64, h: f64) -> Bounds {
        Bounds { x, y, w, h }
    }

    #[test]
    fn finds_overlapping_neighbors() {
        let index = SpatialIndex::new(100);
        index.upsert(&"a".to_string(), b(0.0, 0.0, 10.0, 10.0));
        index.upsert(&"b".to_string(), b(5.0, 5.0, 10.0, 10.0));
        index.upsert(&"c".to_string(), b(100.0, 100.0, 10.0, 10.0));

        let hits = index.nearby(&b(0.0, 0.0, 10.0, 10.0), &"a".to_string());
        assert_eq!(hits, vec!["b".to_string()]);
    }

    #[test]
    fn remove_drops_element() {
        let index = SpatialIndex::new(100);
        index.upsert(&"a".to_string(), b(0.0, 0.0, 10.0, 10.0));
        index.remove(&"a".to_string());
        assert!(index.is_empty());
    }

    #[test]
    fn upsert_moves_without_leaving_a_stale_envelope() {
        let index = SpatialIndex::new(100);
        index.upsert(&"a".to_string(), b(0.0, 0.0, 10.0, 10.0));
        index.upsert(&"a".to_string(), b(1000.0, 1000.0, 10.0, 10.0));
        assert_eq!(index.len(), 1);
        let hits = index.nearby(&b(0.0, 0.0, 10.0, 10.0), &"nobody".to_string());
        assert!(hits.is_empty());
    }

    #[test]
    fn capacity_evicts_oldest_touch() {
        let index = SpatialIndex::new(2);
        index.upsert(&"a".to_string(), b(0.0, 0.0, 1.0, 1.0));
        index.upsert(&"b".to_string(), b(10.0, 10.0, 1.0, 1.0));
        index.upsert(&"c".to_string(), b(20.0, 20.0, 1.0, 1.0));
        assert_eq!(index.len(), 2);
        let hits = index.nearby(&b(0.0, 0.0, 1.0, 1.0), &"nobody".to_string());
        assert!(hits.is_empty(), "a should have been evicted");
    }
}

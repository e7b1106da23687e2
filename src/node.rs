//! Recursive octree node: box geometry, tight data bounds, leaf id lists,
//! and the subdivision policy.

use glam::DVec3;

use crate::bounds::{octant_index, Aabb};
use crate::points::PointStore;

/// One octant of the tree; either a leaf holding point ids or an internal
/// node exclusively owning eight children.
#[derive(Debug, Clone)]
pub(crate) struct OctreeNode {
    bounds: Aabb,
    /// Cached box center, the split plane for child selection.
    mid: DVec3,
    /// Tight box around every point under this node; meaningless while
    /// `num_points == 0`.
    data_bounds: Aabb,
    num_points: usize,
    shape: NodeShape,
}

#[derive(Debug, Clone)]
enum NodeShape {
    Leaf(Vec<usize>),
    Internal(Box<[OctreeNode; 8]>),
}

impl OctreeNode {
    pub(crate) fn new_leaf(bounds: Aabb) -> Self {
        Self {
            mid: bounds.center(),
            data_bounds: Aabb::empty(),
            num_points: 0,
            shape: NodeShape::Leaf(Vec::new()),
            bounds,
        }
    }

    #[inline]
    pub(crate) fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    #[inline]
    pub(crate) fn data_bounds(&self) -> &Aabb {
        &self.data_bounds
    }

    #[inline]
    pub(crate) fn num_points(&self) -> usize {
        self.num_points
    }

    #[inline]
    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self.shape, NodeShape::Leaf(_))
    }

    /// The eight children of an internal node, `None` for a leaf.
    pub(crate) fn children(&self) -> Option<&[OctreeNode; 8]> {
        match &self.shape {
            NodeShape::Internal(children) => Some(children),
            NodeShape::Leaf(_) => None,
        }
    }

    /// The id list of a leaf, `None` for an internal node.
    pub(crate) fn point_ids(&self) -> Option<&[usize]> {
        match &self.shape {
            NodeShape::Leaf(ids) => Some(ids),
            NodeShape::Internal(_) => None,
        }
    }

    #[inline]
    pub(crate) fn contains_point(&self, p: DVec3) -> bool {
        self.bounds.contains(p)
    }

    /// Containment against the tight data box; an empty node contains
    /// nothing.
    #[inline]
    pub(crate) fn contains_point_by_data(&self, p: DVec3) -> bool {
        self.num_points > 0 && self.data_bounds.contains(p)
    }

    #[inline]
    pub(crate) fn child_index(&self, p: DVec3) -> usize {
        octant_index(self.mid, p)
    }

    /// Descend to the leaf whose box contains `p`. The root box is widened
    /// at construction so every admissible point has a container.
    pub(crate) fn leaf_containing(&self, p: DVec3) -> &OctreeNode {
        let mut node = self;
        while let NodeShape::Internal(children) = &node.shape {
            node = &children[octant_index(node.mid, p)];
        }
        node
    }

    /// Insert point `id` with coordinates `p` into the subtree, updating
    /// counts and data bounds along the descent path. `min_side` is the
    /// smallest box side that may still be subdivided; an overfull leaf at
    /// that floor simply keeps growing, which is what coincident points
    /// require to terminate.
    pub(crate) fn insert_point(
        &mut self,
        store: &PointStore,
        p: DVec3,
        id: usize,
        max_points_per_leaf: usize,
        min_side: f64,
    ) {
        self.num_points += 1;
        self.data_bounds.expand_to(p);
        let mid = self.mid;
        let reached_leaf = match &mut self.shape {
            NodeShape::Internal(children) => {
                children[octant_index(mid, p)]
                    .insert_point(store, p, id, max_points_per_leaf, min_side);
                false
            }
            NodeShape::Leaf(ids) => {
                ids.push(id);
                true
            }
        };
        if reached_leaf {
            self.maybe_subdivide(store, max_points_per_leaf, min_side);
        }
    }

    /// Split an overfull leaf into eight child leaves, scattering its ids by
    /// octant. A child that swallowed everything is re-checked, so the leaf
    /// capacity holds everywhere above the `min_side` floor.
    fn maybe_subdivide(&mut self, store: &PointStore, max_points_per_leaf: usize, min_side: f64) {
        let overfull = match &self.shape {
            NodeShape::Leaf(ids) => ids.len() > max_points_per_leaf,
            NodeShape::Internal(_) => return,
        };
        if !overfull || !self.subdividable(min_side) {
            return;
        }

        let mut children = Box::new(std::array::from_fn::<OctreeNode, 8, _>(|octant| {
            OctreeNode::new_leaf(self.octant_bounds(octant))
        }));
        let ids = match std::mem::replace(&mut self.shape, NodeShape::Leaf(Vec::new())) {
            NodeShape::Leaf(ids) => ids,
            NodeShape::Internal(_) => unreachable!("only leaves subdivide"),
        };
        for id in ids {
            let p = store.get(id);
            let child = &mut children[octant_index(self.mid, p)];
            child.num_points += 1;
            child.data_bounds.expand_to(p);
            match &mut child.shape {
                NodeShape::Leaf(child_ids) => child_ids.push(id),
                NodeShape::Internal(_) => unreachable!("fresh children are leaves"),
            }
        }
        for child in children.iter_mut() {
            child.maybe_subdivide(store, max_points_per_leaf, min_side);
        }
        self.shape = NodeShape::Internal(children);
    }

    fn subdividable(&self, min_side: f64) -> bool {
        let side = self.bounds.max - self.bounds.min;
        side.x >= min_side && side.y >= min_side && side.z >= min_side
    }

    /// Box of one child octant; shared faces reuse the parent coordinates
    /// bit-exactly, which the inner-boundary face test relies on.
    fn octant_bounds(&self, octant: usize) -> Aabb {
        let (min_x, max_x) = if octant & 1 != 0 {
            (self.mid.x, self.bounds.max.x)
        } else {
            (self.bounds.min.x, self.mid.x)
        };
        let (min_y, max_y) = if octant & 2 != 0 {
            (self.mid.y, self.bounds.max.y)
        } else {
            (self.bounds.min.y, self.mid.y)
        };
        let (min_z, max_z) = if octant & 4 != 0 {
            (self.mid.z, self.bounds.max.z)
        } else {
            (self.bounds.min.z, self.mid.z)
        };
        Aabb::new(
            DVec3::new(min_x, min_y, min_z),
            DVec3::new(max_x, max_y, max_z),
        )
    }

    /// Squared distance from `p` to this node's geometric box, or to its
    /// data box when `use_data` is set (`f64::MAX` for an empty node; the
    /// caller skips that sentinel). Zero when `p` is inside the chosen box.
    ///
    /// An axis contribution is dropped when `p` projects beyond the root's
    /// face on that side: nothing lies outside the domain, so nodes hugging
    /// the boundary must not be pushed away from points at or past it.
    pub(crate) fn distance2_to_boundary(&self, p: DVec3, root: &OctreeNode, use_data: bool) -> f64 {
        if use_data && self.num_points == 0 {
            return f64::MAX;
        }
        let b = if use_data {
            &self.data_bounds
        } else {
            &self.bounds
        };
        let mut dist2 = 0.0;
        for i in 0..3 {
            if p[i] < b.min[i] {
                if p[i] > root.bounds.min[i] {
                    let d = b.min[i] - p[i];
                    dist2 += d * d;
                }
            } else if p[i] > b.max[i] {
                if p[i] < root.bounds.max[i] {
                    let d = p[i] - b.max[i];
                    dist2 += d * d;
                }
            }
        }
        dist2
    }

    /// Squared distance from an inside point to the nearest face of this box
    /// that is not shared with the root. Faces on the domain boundary have
    /// no neighbor leaves behind them and are skipped; `f64::MAX` when every
    /// face is a root face (the root itself is still a leaf).
    ///
    /// Face sharing is detected by exact coordinate equality: child boxes
    /// inherit their parent's boundary coordinates bit-for-bit.
    pub(crate) fn distance2_to_inner_boundary(&self, p: DVec3, root: &OctreeNode) -> f64 {
        let mut min_dist = f64::MAX;
        for i in 0..3 {
            if self.bounds.min[i] != root.bounds.min[i] {
                min_dist = min_dist.min(p[i] - self.bounds.min[i]);
            }
            if self.bounds.max[i] != root.bounds.max[i] {
                min_dist = min_dist.min(self.bounds.max[i] - p[i]);
            }
        }
        if min_dist == f64::MAX {
            min_dist
        } else {
            min_dist * min_dist
        }
    }

    /// Append every point id beneath this node in depth-first order.
    pub(crate) fn export_point_ids(&self, out: &mut Vec<usize>) {
        match &self.shape {
            NodeShape::Leaf(ids) => out.extend_from_slice(ids),
            NodeShape::Internal(children) => {
                for child in children.iter() {
                    child.export_point_ids(out);
                }
            }
        }
    }

    /// Walk the subtree asserting the structural invariants: leaf ids lie in
    /// their box, counters sum up, and data bounds are exactly the union of
    /// the children's.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self, store: &PointStore) {
        match &self.shape {
            NodeShape::Leaf(ids) => {
                assert_eq!(ids.len(), self.num_points, "leaf count mismatch");
                for &id in ids {
                    let p = store.get(id);
                    assert!(self.bounds.contains(p), "point {id} escapes its leaf box");
                    // the data box is closed on both sides
                    assert!(
                        p.cmpge(self.data_bounds.min).all() && p.cmple(self.data_bounds.max).all(),
                        "point {id} outside leaf data bounds"
                    );
                }
            }
            NodeShape::Internal(children) => {
                let sum: usize = children.iter().map(|c| c.num_points).sum();
                assert_eq!(self.num_points, sum, "internal count mismatch");
                let mut union = Aabb::empty();
                for child in children.iter() {
                    if child.num_points > 0 {
                        union.expand_to(child.data_bounds.min);
                        union.expand_to(child.data_bounds.max);
                    }
                    child.check_invariants(store);
                }
                if self.num_points > 0 {
                    assert_eq!(self.data_bounds.min, union.min, "data bounds min mismatch");
                    assert_eq!(self.data_bounds.max, union.max, "data bounds max mismatch");
                }
            }
        }
        if self.num_points > 0 {
            assert!(
                self.data_bounds.min.cmpge(self.bounds.min).all()
                    && self.data_bounds.max.cmple(self.bounds.max).all(),
                "data bounds escape the geometric box"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::points::{PointStore, Precision};

    fn insert_all(node: &mut OctreeNode, store: &PointStore, max_per_leaf: usize) {
        for id in 0..store.len() {
            node.insert_point(store, store.get(id), id, max_per_leaf, 2.0e-5);
        }
    }

    fn filled_store(points: &[DVec3]) -> PointStore {
        let mut store = PointStore::new(Precision::F64);
        for &p in points {
            store.append(p);
        }
        store
    }

    #[test]
    fn leaf_absorbs_until_capacity() {
        let store = filled_store(&[
            DVec3::splat(0.25),
            DVec3::splat(0.75),
            DVec3::new(0.25, 0.75, 0.25),
        ]);
        let mut root = OctreeNode::new_leaf(Aabb::new(DVec3::splat(-1e-5), DVec3::ONE));
        insert_all(&mut root, &store, 8);
        assert!(root.is_leaf());
        assert_eq!(root.num_points(), 3);
        assert_eq!(root.point_ids(), Some(&[0, 1, 2][..]));
        root.check_invariants(&store);
    }

    #[test]
    fn overfull_leaf_subdivides_and_scatters() {
        let store = filled_store(&[
            DVec3::splat(0.25),
            DVec3::splat(0.75),
            DVec3::new(0.75, 0.25, 0.25),
        ]);
        let mut root = OctreeNode::new_leaf(Aabb::new(DVec3::splat(-1e-5), DVec3::ONE));
        insert_all(&mut root, &store, 2);
        assert!(!root.is_leaf());
        assert_eq!(root.num_points(), 3);
        let children = root.children().unwrap();
        let occupied: Vec<usize> = (0..8).filter(|&i| children[i].num_points() > 0).collect();
        assert_eq!(occupied.len(), 3);
        root.check_invariants(&store);
    }

    #[test]
    fn clustered_points_subdivide_recursively() {
        // all points in one octant: the first split dumps everything into a
        // single child, which must split again on its own
        let store = filled_store(&[
            DVec3::new(0.1, 0.1, 0.1),
            DVec3::new(0.2, 0.1, 0.1),
            DVec3::new(0.1, 0.2, 0.1),
        ]);
        let mut root = OctreeNode::new_leaf(Aabb::new(DVec3::splat(-1e-5), DVec3::ONE));
        insert_all(&mut root, &store, 2);
        assert!(!root.is_leaf());
        let low = &root.children().unwrap()[0];
        assert_eq!(low.num_points(), 3);
        assert!(!low.is_leaf(), "crowded child must split again");
        root.check_invariants(&store);
    }

    #[test]
    fn coincident_points_overflow_without_subdividing() {
        let p = DVec3::splat(0.5);
        let store = filled_store(&[p, p, p, p, p]);
        let mut root = OctreeNode::new_leaf(Aabb::new(DVec3::splat(-1e-5), DVec3::ONE));
        // a large floor forbids any split of the unit box
        for id in 0..store.len() {
            root.insert_point(&store, store.get(id), id, 2, 2.0);
        }
        assert!(root.is_leaf());
        assert_eq!(root.num_points(), 5);
        root.check_invariants(&store);
    }

    #[test]
    fn leaf_containing_descends_by_octant() {
        let store = filled_store(&[
            DVec3::splat(0.25),
            DVec3::splat(0.75),
            DVec3::new(0.75, 0.25, 0.25),
        ]);
        let mut root = OctreeNode::new_leaf(Aabb::new(DVec3::splat(-1e-5), DVec3::ONE));
        insert_all(&mut root, &store, 2);
        for id in 0..store.len() {
            let leaf = root.leaf_containing(store.get(id));
            assert!(leaf.point_ids().unwrap().contains(&id));
        }
    }

    #[test]
    fn inner_boundary_skips_root_faces() {
        let store = filled_store(&[
            DVec3::splat(0.25),
            DVec3::splat(0.75),
            DVec3::new(0.75, 0.25, 0.25),
        ]);
        let mut root = OctreeNode::new_leaf(Aabb::new(DVec3::ZERO, DVec3::ONE));
        insert_all(&mut root, &store, 2);
        let p = DVec3::new(0.1, 0.1, 0.1);
        let leaf = root.leaf_containing(p);
        // the only non-root faces of the low corner leaf are the mid planes
        let d2 = leaf.distance2_to_inner_boundary(p, &root);
        assert!((d2 - 0.4 * 0.4).abs() < 1e-12);
    }

    #[test]
    fn distance_to_empty_data_box_is_sentinel() {
        let root = OctreeNode::new_leaf(Aabb::new(DVec3::ZERO, DVec3::ONE));
        assert_eq!(
            root.distance2_to_boundary(DVec3::splat(2.0), &root, true),
            f64::MAX
        );
        // the geometric box still measures normally
        assert!(root.distance2_to_boundary(DVec3::splat(0.5), &root, false) == 0.0);
    }
}

//! Top-level locator: configuration, incremental insertion, and the spatial
//! queries.

use std::collections::VecDeque;

use glam::DVec3;

use crate::bounds::Aabb;
use crate::error::LocatorError;
use crate::node::OctreeNode;
use crate::points::{PointStore, SharedPoints};
use crate::sorter::NearestSorter;

/// Tuning knobs for an [`OctreeLocator`].
#[derive(Debug, Clone, Copy)]
pub struct LocatorOptions {
    /// Leaf capacity before subdivision.
    pub max_points_per_leaf: usize,
    /// Expand the root box to a cube so every octant is cubic too.
    pub build_cubic_octree: bool,
    /// Merge radius for duplicate detection; zero means exact coordinate
    /// matching at the store's precision.
    pub tolerance: f64,
}

impl Default for LocatorOptions {
    fn default() -> Self {
        Self {
            max_points_per_leaf: 128,
            build_cubic_octree: false,
            tolerance: 0.0,
        }
    }
}

/// Which bound admits children during the pruned sphere descent.
#[derive(Clone, Copy)]
enum RefBound {
    /// Compare against a fixed radius (duplicate detection under tolerance).
    Fixed(f64),
    /// Compare against the shrinking best distance found so far.
    TrackMin,
}

/// Incremental octree point locator.
///
/// Owns the octree and shares an external [`PointStore`] with the caller.
/// Points are added one at a time, optionally deduplicated under a
/// tolerance, and closest-point, radius, and k-nearest queries stay
/// available between insertions; there is no global rebuild.
pub struct OctreeLocator {
    // field order drops the tree before releasing the container handle
    root: Option<OctreeNode>,
    points: Option<SharedPoints>,
    options: LocatorOptions,
    tolerance2: f64,
    max_dim_size: f64,
    fudge_factor: f64,
}

impl Default for OctreeLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl OctreeLocator {
    pub fn new() -> Self {
        Self::with_options(LocatorOptions::default())
    }

    pub fn with_options(options: LocatorOptions) -> Self {
        Self {
            root: None,
            points: None,
            tolerance2: options.tolerance * options.tolerance,
            options,
            max_dim_size: 0.0,
            fudge_factor: 0.0,
        }
    }

    pub fn options(&self) -> &LocatorOptions {
        &self.options
    }

    /// Leaf capacity used by subsequent insertions.
    pub fn set_max_points_per_leaf(&mut self, capacity: usize) {
        self.options.max_points_per_leaf = capacity;
    }

    /// Takes effect at the next [`OctreeLocator::init_insertion`].
    pub fn set_build_cubic_octree(&mut self, cubic: bool) {
        self.options.build_cubic_octree = cubic;
    }

    pub fn set_tolerance(&mut self, tolerance: f64) {
        self.options.tolerance = tolerance;
        self.tolerance2 = tolerance * tolerance;
    }

    pub fn tolerance(&self) -> f64 {
        self.options.tolerance
    }

    /// Number of points indexed by the tree.
    pub fn num_points(&self) -> usize {
        self.root.as_ref().map_or(0, OctreeNode::num_points)
    }

    /// The root box, including the fudge and anti-slab adjustments applied
    /// by [`OctreeLocator::init_insertion`].
    pub fn bounds(&self) -> Option<Aabb> {
        self.root.as_ref().map(|root| *root.bounds())
    }

    /// The shared point container, if insertion has been initialized.
    pub fn points(&self) -> Option<SharedPoints> {
        self.points.clone()
    }

    pub(crate) fn root_node(&self) -> Option<&OctreeNode> {
        self.root.as_ref()
    }

    /// Prepare for insertion: drop any existing tree, attach `points`, and
    /// build the root box from the caller's world `bounds`.
    ///
    /// The box is optionally expanded to a cube, any axis thinner than a
    /// tenth of the longest one is inflated to that thickness (so a flat
    /// slab of input still yields usable octants), and the remaining low
    /// faces are pulled back by the fudge factor so boundary inputs pass
    /// the half-open containment test.
    pub fn init_insertion(
        &mut self,
        points: SharedPoints,
        bounds: Aabb,
    ) -> Result<(), LocatorError> {
        if !bounds.min.is_finite()
            || !bounds.max.is_finite()
            || !bounds.min.cmple(bounds.max).all()
        {
            return Err(LocatorError::InvalidBounds {
                min: bounds.min.to_array(),
                max: bounds.max.to_array(),
            });
        }

        // tree first, then swap the container handle
        self.root = None;
        self.points = Some(points);
        self.tolerance2 = self.options.tolerance * self.options.tolerance;

        let mut min = bounds.min;
        let mut max = bounds.max;
        let mut dim = max - min;
        self.max_dim_size = dim.max_element();

        if self.options.build_cubic_octree {
            for i in 0..3 {
                if dim[i] != self.max_dim_size {
                    let delta = self.max_dim_size - dim[i];
                    min[i] -= 0.5 * delta;
                    max[i] += 0.5 * delta;
                    dim[i] = self.max_dim_size;
                }
            }
        }

        self.fudge_factor = self.max_dim_size * 1.0e-5;
        let min_side = self.max_dim_size * 1.0e-1;
        for i in 0..3 {
            if dim[i] < min_side {
                // a flat slab: push both faces out to the minimum thickness
                let lo = min[i];
                min[i] = max[i] - min_side;
                max[i] = lo + min_side;
            } else {
                min[i] -= self.fudge_factor;
            }
        }

        self.root = Some(OctreeNode::new_leaf(Aabb::new(min, max)));
        Ok(())
    }

    /// Append `p` to the point container and file its id under the
    /// containing leaf, skipping any duplicate check. The bulk-build path.
    pub fn insert_point_without_checking(&mut self, p: DVec3) -> Option<usize> {
        let (Some(root), Some(points)) = (self.root.as_mut(), self.points.as_ref()) else {
            log::warn!("insert_point_without_checking called before init_insertion");
            return None;
        };
        let id = points.borrow_mut().append(p);
        let store = points.borrow();
        root.insert_point(
            &store,
            p,
            id,
            self.options.max_points_per_leaf,
            2.0 * self.fudge_factor,
        );
        Some(id)
    }

    /// Id of an already-inserted point matching `p`, or `None`.
    ///
    /// With zero tolerance only the containing leaf is scanned, comparing
    /// coordinates exactly at the store's precision. With a tolerance the
    /// containing leaf is scanned for the closest point first; when a shared
    /// face lies within the tolerance of `p`, neighboring leaves may hold a
    /// closer point and a masked sphere search covers the rest of the tree.
    pub fn is_inserted_point(&self, p: DVec3) -> Option<usize> {
        let (root, points) = self.ready()?;
        let store = points.borrow();
        if self.tolerance2 == 0.0 {
            let leaf = root.leaf_containing(p);
            let ids = leaf.point_ids().unwrap_or(&[]);
            ids.iter().copied().find(|&id| store.matches_exactly(id, p))
        } else {
            let leaf = root.leaf_containing(p);
            let (mut best, mut min_dist2) = Self::closest_in_leaf(&store, leaf, p);
            if min_dist2 == 0.0 {
                return best;
            }
            if leaf.distance2_to_inner_boundary(p, root) < self.tolerance2 {
                let (ext_best, ext_dist2) =
                    self.closest_in_sphere_with_tolerance(&store, root, p, self.tolerance2, Some(leaf));
                if ext_dist2 < min_dist2 {
                    min_dist2 = ext_dist2;
                    best = ext_best;
                }
            }
            if min_dist2 <= self.tolerance2 {
                best
            } else {
                None
            }
        }
    }

    /// Insert `p` unless a matching point exists. Returns `(true, new_id)`
    /// on insertion, `(false, existing_id)` on a duplicate hit.
    pub fn insert_unique_point(&mut self, p: DVec3) -> Option<(bool, usize)> {
        if self.root.is_none() || self.points.is_none() {
            log::warn!("insert_unique_point called before init_insertion");
            return None;
        }
        if let Some(id) = self.is_inserted_point(p) {
            Some((false, id))
        } else {
            self.insert_point_without_checking(p).map(|id| (true, id))
        }
    }

    /// Closest indexed point to `p` and its squared distance.
    ///
    /// A query inside the root box scans its containing leaf and widens to a
    /// pruned sphere search only when a nearer point could hide behind one
    /// of the leaf's inner faces. A query outside is first projected onto
    /// the tight box of the data, nudged strictly inside the root, and then
    /// handled the same way from the leaf at the projection.
    pub fn find_closest_point(&self, p: DVec3) -> Option<(usize, f64)> {
        let (root, points) = self.ready()?;
        if root.num_points() == 0 {
            return None;
        }
        let store = points.borrow();
        let mut best = None;
        let mut min_dist2 = f64::MAX;

        if root.contains_point(p) {
            let leaf = root.leaf_containing(p);
            (best, min_dist2) = Self::closest_in_leaf(&store, leaf, p);
            if min_dist2 > 0.0 && leaf.distance2_to_inner_boundary(p, root) < min_dist2 {
                let (else_best, else_dist2) =
                    self.closest_in_sphere_without_tolerance(&store, root, p, min_dist2, Some(leaf));
                if else_dist2 < min_dist2 {
                    best = else_best;
                    min_dist2 = else_dist2;
                }
            }
        } else {
            let mut start = root.data_bounds().closest_point(p);
            for i in 0..3 {
                if start[i] <= root.bounds().min[i] {
                    start[i] = root.bounds().min[i] + self.fudge_factor;
                } else if start[i] >= root.bounds().max[i] {
                    start[i] = root.bounds().max[i] - self.fudge_factor;
                }
            }
            let leaf = root.leaf_containing(start);
            (best, min_dist2) = Self::closest_in_leaf(&store, leaf, p);
            let (else_best, else_dist2) =
                self.closest_in_sphere_without_tolerance(&store, root, p, min_dist2, Some(leaf));
            if else_dist2 < min_dist2 {
                best = else_best;
                min_dist2 = else_dist2;
            }
        }

        best.map(|id| (id, min_dist2))
    }

    /// Closest indexed point to a query already inside the root box.
    ///
    /// Unlike [`OctreeLocator::find_closest_point`] this answers `None` for
    /// an outside query instead of projecting it onto the domain.
    pub fn find_closest_inserted_point(&self, p: DVec3) -> Option<usize> {
        let (root, points) = self.ready()?;
        if root.num_points() == 0 || !root.contains_point(p) {
            return None;
        }
        let store = points.borrow();
        let leaf = root.leaf_containing(p);
        let (mut best, min_dist2) = Self::closest_in_leaf(&store, leaf, p);
        if min_dist2 > 0.0 && leaf.distance2_to_inner_boundary(p, root) < min_dist2 {
            let (else_best, else_dist2) =
                self.closest_in_sphere_without_tolerance(&store, root, p, min_dist2, Some(leaf));
            if else_dist2 < min_dist2 {
                best = else_best;
            }
        }
        best
    }

    /// Closest point within `radius` of `p`, with its squared distance.
    pub fn find_closest_point_within_radius(&self, radius: f64, p: DVec3) -> Option<(usize, f64)> {
        self.find_closest_point_within_squared_radius(radius * radius, p)
    }

    /// Closest point within the sphere of squared radius `radius2` around
    /// `p`, with its squared distance.
    pub fn find_closest_point_within_squared_radius(
        &self,
        radius2: f64,
        p: DVec3,
    ) -> Option<(usize, f64)> {
        let (root, points) = self.ready()?;
        let store = points.borrow();
        let (best, dist2) = self.closest_in_sphere_without_tolerance(&store, root, p, radius2, None);
        best.map(|id| (id, dist2))
    }

    /// Collect the ids of every point within `radius` of `p`.
    pub fn find_points_within_radius(&self, radius: f64, p: DVec3, out: &mut Vec<usize>) {
        self.find_points_within_squared_radius(radius * radius, p, out);
    }

    /// Collect the ids of every point with `|q - p|² <= radius2`.
    ///
    /// Subtrees entirely outside the sphere are pruned; subtrees entirely
    /// inside are dumped wholesale without per-point distance checks.
    pub fn find_points_within_squared_radius(&self, radius2: f64, p: DVec3, out: &mut Vec<usize>) {
        out.clear();
        let Some((root, points)) = self.ready() else {
            return;
        };
        let store = points.borrow();
        Self::collect_in_sphere(&store, root, radius2, p, out);
    }

    /// Collect the `n` points nearest to `p`, ascending by distance; ids at
    /// equal distance keep insertion order. `n` is clamped to the number of
    /// indexed points.
    pub fn find_closest_n_points(&self, n: usize, p: DVec3, out: &mut Vec<usize>) {
        out.clear();
        let Some((root, points)) = self.ready() else {
            return;
        };
        let total = root.num_points();
        let n = if n > total {
            log::warn!("requested {n} nearest points but only {total} are indexed");
            total
        } else {
            n
        };
        if n == 0 {
            return;
        }
        let store = points.borrow();

        // seed the sorter with everything under a compact starting subtree
        let start = Self::select_knn_start_node(root, p, n);
        let mut seed_ids = Vec::with_capacity(start.num_points());
        start.export_point_ids(&mut seed_ids);
        let mut sorter = NearestSorter::new(n);
        for &id in &seed_ids {
            sorter.insert(store.get(id).distance_squared(p), id);
        }

        // sweep the rest of the tree, pruning against the running n-th distance
        let mut pruning_dist2 = sorter.largest_dist2();
        let mut queue: VecDeque<&OctreeNode> = VecDeque::new();
        queue.push_back(root);
        while let Some(node) = queue.pop_front() {
            if std::ptr::eq(node, start) {
                continue;
            }
            if let Some(children) = node.children() {
                for child in children.iter() {
                    if child.contains_point_by_data(p)
                        || child.distance2_to_boundary(p, root, true) < pruning_dist2
                    {
                        queue.push_back(child);
                    }
                }
            } else if node.distance2_to_boundary(p, root, true) < pruning_dist2 {
                // the distance check passing means the leaf is non-empty
                for &id in node.point_ids().unwrap_or(&[]) {
                    sorter.insert(store.get(id).distance_squared(p), id);
                }
                pruning_dist2 = sorter.largest_dist2();
            }
        }

        sorter.write_ids_into(out);
    }

    // --- internals ---

    fn ready(&self) -> Option<(&OctreeNode, &SharedPoints)> {
        match (&self.root, &self.points) {
            (Some(root), Some(points)) => Some((root, points)),
            _ => {
                log::warn!("octree locator queried before init_insertion");
                None
            }
        }
    }

    /// Scan a leaf for the closest stored point; `(None, f64::MAX)` when the
    /// leaf is empty. Stops early on an exact hit.
    fn closest_in_leaf(store: &PointStore, leaf: &OctreeNode, p: DVec3) -> (Option<usize>, f64) {
        let mut best = None;
        let mut min_dist2 = f64::MAX;
        for &id in leaf.point_ids().unwrap_or(&[]) {
            let dist2 = store.get(id).distance_squared(p);
            if dist2 < min_dist2 {
                min_dist2 = dist2;
                best = Some(id);
                if dist2 == 0.0 {
                    break;
                }
            }
        }
        (best, min_dist2)
    }

    /// Pruned depth-first search over the whole tree for the closest point
    /// within `radius2` of `p`.
    ///
    /// `mask` excludes one leaf whose own scan already seeded `min_dist2`.
    /// Children are admitted when their tight data box lies within the
    /// reference bound or when they geometrically contain `p`; the walk
    /// stops as soon as the running best reaches zero.
    fn closest_point_in_sphere(
        store: &PointStore,
        root: &OctreeNode,
        p: DVec3,
        radius2: f64,
        mask: Option<&OctreeNode>,
        min_dist2: &mut f64,
        ref_bound: RefBound,
    ) -> Option<usize> {
        let mut best = None;
        let mut stack: Vec<&OctreeNode> = vec![root];
        while *min_dist2 > 0.0 {
            let Some(node) = stack.pop() else { break };
            if let Some(children) = node.children() {
                for child in children.iter() {
                    // 2·radius² stands in for the empty-node sentinel so such
                    // children fall out of the admission test below
                    let dist_to_data = if child.num_points() > 0 {
                        child.distance2_to_boundary(p, root, true)
                    } else {
                        radius2 + radius2
                    };
                    let reference = match ref_bound {
                        RefBound::Fixed(r2) => r2,
                        RefBound::TrackMin => *min_dist2,
                    };
                    let is_masked = mask.is_some_and(|m| std::ptr::eq(m, child));
                    if !is_masked && (dist_to_data <= reference || child.contains_point(p)) {
                        stack.push(child);
                    }
                }
            } else {
                let (leaf_best, leaf_dist2) = Self::closest_in_leaf(store, node, p);
                if leaf_dist2 < *min_dist2 {
                    *min_dist2 = leaf_dist2;
                    best = leaf_best;
                }
            }
        }
        if *min_dist2 <= radius2 {
            best
        } else {
            None
        }
    }

    /// Sphere search seeded for closest-point queries: the admission bound
    /// shrinks with the best distance found so far.
    fn closest_in_sphere_without_tolerance(
        &self,
        store: &PointStore,
        root: &OctreeNode,
        p: DVec3,
        radius2: f64,
        mask: Option<&OctreeNode>,
    ) -> (Option<usize>, f64) {
        // seeding with exactly radius2 risks equality pitfalls when the
        // radius itself is tiny, so start a notch above it
        let mut min_dist2 = radius2 * 1.1;
        let best = Self::closest_point_in_sphere(
            store,
            root,
            p,
            radius2,
            mask,
            &mut min_dist2,
            RefBound::TrackMin,
        );
        (best, min_dist2)
    }

    /// Sphere search for duplicate detection: children are admitted against
    /// the fixed tolerance radius no matter how good the current best is.
    fn closest_in_sphere_with_tolerance(
        &self,
        store: &PointStore,
        root: &OctreeNode,
        p: DVec3,
        radius2: f64,
        mask: Option<&OctreeNode>,
    ) -> (Option<usize>, f64) {
        let mut min_dist2 = self.max_dim_size * self.max_dim_size * 4.0;
        let best = Self::closest_point_in_sphere(
            store,
            root,
            p,
            radius2,
            mask,
            &mut min_dist2,
            RefBound::Fixed(radius2),
        );
        (best, min_dist2)
    }

    fn collect_in_sphere(
        store: &PointStore,
        node: &OctreeNode,
        radius2: f64,
        p: DVec3,
        out: &mut Vec<usize>,
    ) {
        let (min2, max2) = node.bounds().squared_distances_to(p);
        if min2 > radius2 {
            return;
        }
        if max2 <= radius2 {
            // the whole box sits inside the sphere
            node.export_point_ids(out);
            return;
        }
        if let Some(children) = node.children() {
            for child in children.iter() {
                Self::collect_in_sphere(store, child, radius2, p, out);
            }
        } else {
            for &id in node.point_ids().unwrap_or(&[]) {
                if store.get(id).distance_squared(p) <= radius2 {
                    out.push(id);
                }
            }
        }
    }

    /// Child with the smallest data-box distance to `p`; every non-empty
    /// parent has one below the empty-node sentinel.
    fn closest_data_child<'a>(
        children: &'a [OctreeNode; 8],
        p: DVec3,
        root: &OctreeNode,
    ) -> &'a OctreeNode {
        let mut closest = &children[0];
        let mut min_dist2 = closest.distance2_to_boundary(p, root, true);
        for child in &children[1..] {
            let dist2 = child.distance2_to_boundary(p, root, true);
            if dist2 < min_dist2 {
                min_dist2 = dist2;
                closest = child;
            }
        }
        closest
    }

    /// Walk down from the root to the most compact subtree still holding at
    /// least `n` points.
    ///
    /// Two descent regimes alternate on containment: inside a node, follow
    /// the octant of `p`; outside, follow the child with the closest data.
    /// Landing in an empty octant hops to its closest-data sibling and
    /// rejoins through the outside regime. A descent that undershoots `n`
    /// backs off one level.
    fn select_knn_start_node<'a>(root: &'a OctreeNode, p: DVec3, n: usize) -> &'a OctreeNode {
        let mut this = root;
        let mut parent = root;
        let mut num_points = this.num_points();
        loop {
            if this.contains_point(p) {
                while num_points > n {
                    let Some(children) = this.children() else { break };
                    parent = this;
                    this = &children[this.child_index(p)];
                    num_points = this.num_points();
                }
                if num_points > 0 {
                    return if num_points >= n { this } else { parent };
                }
                let siblings = parent.children().expect("empty octant has an internal parent");
                this = Self::closest_data_child(siblings, p, root);
            } else {
                while num_points > n {
                    let Some(children) = this.children() else { break };
                    parent = this;
                    this = Self::closest_data_child(children, p, root);
                    num_points = this.num_points();
                }
                return if num_points >= n { this } else { parent };
            }
            num_points = this.num_points();
        }
    }
}

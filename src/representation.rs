//! Polygonal dump of the tree structure for inspection and debugging.

use std::collections::VecDeque;

use glam::DVec3;

use crate::locator::OctreeLocator;
use crate::node::OctreeNode;

/// Quad soup describing octree node boxes: eight corners per node and six
/// quads referencing them.
#[derive(Debug, Clone, Default)]
pub struct QuadMesh {
    pub positions: Vec<DVec3>,
    pub quads: Vec<[u32; 4]>,
}

/// Corner numbering: bit 0 selects max x, bit 1 max y, bit 2 max z.
const NODE_FACES: [[u32; 4]; 6] = [
    [0, 1, 5, 4],
    [0, 4, 6, 2],
    [6, 7, 3, 2],
    [1, 3, 7, 5],
    [2, 3, 1, 0],
    [4, 5, 7, 6],
];

impl QuadMesh {
    fn push_node_box(&mut self, node: &OctreeNode) {
        let b = node.bounds();
        let base = self.positions.len() as u32;
        for corner in 0..8 {
            self.positions.push(DVec3::new(
                if corner & 1 != 0 { b.max.x } else { b.min.x },
                if corner & 2 != 0 { b.max.y } else { b.min.y },
                if corner & 4 != 0 { b.max.z } else { b.min.z },
            ));
        }
        for face in NODE_FACES {
            self.quads
                .push([base + face[0], base + face[1], base + face[2], base + face[3]]);
        }
    }
}

impl OctreeLocator {
    /// Emit the boxes of every node at tree depth `level` (the root is level
    /// zero) as a quad mesh. Levels deeper than the tree yield an empty
    /// mesh; an uninitialized locator yields `None`.
    pub fn generate_representation(&self, level: usize) -> Option<QuadMesh> {
        let Some(root) = self.root_node() else {
            log::warn!("generate_representation called before init_insertion");
            return None;
        };
        let mut mesh = QuadMesh::default();
        let mut queue = VecDeque::new();
        queue.push_back((root, 0usize));
        while let Some((node, depth)) = queue.pop_front() {
            if depth == level {
                mesh.push_node_box(node);
            } else if let Some(children) = node.children() {
                for child in children.iter() {
                    queue.push_back((child, depth + 1));
                }
            }
        }
        Some(mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Aabb;
    use crate::locator::LocatorOptions;
    use crate::points::{PointStore, Precision};

    #[test]
    fn level_zero_is_the_root_box() {
        let mut locator = OctreeLocator::new();
        locator
            .init_insertion(
                PointStore::shared(Precision::F64),
                Aabb::new(DVec3::ZERO, DVec3::ONE),
            )
            .expect("valid bounds");
        let mesh = locator.generate_representation(0).unwrap();
        assert_eq!(mesh.positions.len(), 8);
        assert_eq!(mesh.quads.len(), 6);
        for &[a, b, c, d] in &mesh.quads {
            for idx in [a, b, c, d] {
                assert!((idx as usize) < mesh.positions.len());
            }
        }
    }

    #[test]
    fn subdivided_tree_exposes_eight_children_at_level_one() {
        let mut locator = OctreeLocator::with_options(LocatorOptions {
            max_points_per_leaf: 2,
            ..Default::default()
        });
        locator
            .init_insertion(
                PointStore::shared(Precision::F64),
                Aabb::new(DVec3::ZERO, DVec3::ONE),
            )
            .expect("valid bounds");
        locator.insert_point_without_checking(DVec3::splat(0.25));
        locator.insert_point_without_checking(DVec3::splat(0.75));
        locator.insert_point_without_checking(DVec3::new(0.75, 0.25, 0.25));

        let level1 = locator.generate_representation(1).unwrap();
        assert_eq!(level1.positions.len(), 8 * 8);
        assert_eq!(level1.quads.len(), 8 * 6);
        // nothing lives two levels down yet
        let level2 = locator.generate_representation(2).unwrap();
        assert!(level2.positions.is_empty());
    }

    #[test]
    fn uninitialized_locator_has_no_representation() {
        let locator = OctreeLocator::new();
        assert!(locator.generate_representation(0).is_none());
    }
}

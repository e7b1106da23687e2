//! Incremental octree point locator.
//!
//! A spatial index for 3D points that supports incremental insertion with
//! optional deduplication under a merge tolerance, together with
//! closest-point, radius, and k-nearest-neighbor queries. Points are added
//! one at a time and every query stays available between insertions; the
//! tree never needs a global rebuild.
//!
//! Coordinates live in an external [`PointStore`] shared with the caller;
//! the tree itself only files point ids. Leaves split into eight octants
//! when they exceed a configurable capacity, and every query prunes with the
//! tight per-node bounding box of the data actually stored beneath it.
//!
//! # Example
//!
//! ```
//! use glam::DVec3;
//! use octree_locator::{Aabb, OctreeLocator, PointStore, Precision};
//!
//! let mut locator = OctreeLocator::new();
//! let points = PointStore::shared(Precision::F64);
//! locator
//!     .init_insertion(points.clone(), Aabb::new(DVec3::ZERO, DVec3::ONE))
//!     .expect("finite, ordered bounds");
//!
//! locator.insert_point_without_checking(DVec3::new(0.1, 0.1, 0.1));
//! locator.insert_point_without_checking(DVec3::new(0.9, 0.9, 0.9));
//! locator.insert_point_without_checking(DVec3::new(0.5, 0.5, 0.5));
//!
//! let (id, dist2) = locator
//!     .find_closest_point(DVec3::new(0.45, 0.45, 0.45))
//!     .unwrap();
//! assert_eq!(id, 2);
//! assert!(dist2 < 0.01);
//!
//! let mut within = Vec::new();
//! locator.find_points_within_radius(0.2, DVec3::new(0.5, 0.5, 0.5), &mut within);
//! assert_eq!(within, vec![2]);
//! ```

mod bounds;
mod error;
mod locator;
mod node;
mod points;
mod representation;
mod sorter;

pub use bounds::Aabb;
pub use error::LocatorError;
pub use locator::{LocatorOptions, OctreeLocator};
pub use points::{PointStore, Precision, SharedPoints};
pub use representation::QuadMesh;

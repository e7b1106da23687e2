//! Shared coordinate storage for the locator.

use std::cell::RefCell;
use std::rc::Rc;

use glam::{DVec3, Vec3};

/// Storage precision of a [`PointStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    F32,
    F64,
}

/// Refcounted handle to a [`PointStore`], shared between the locator and the
/// caller for the lifetime of the index.
pub type SharedPoints = Rc<RefCell<PointStore>>;

/// Append-only, densely indexed 3D point storage.
///
/// Coordinates are held in either `f32` or `f64`; queries always read them
/// back as `f64`. The precision also decides how exact-match duplicate
/// detection compares coordinates when the insertion tolerance is zero: an
/// `f32` store compares the query rounded to `f32`.
#[derive(Debug, Clone)]
pub struct PointStore {
    data: StoreData,
}

#[derive(Debug, Clone)]
enum StoreData {
    F32(Vec<Vec3>),
    F64(Vec<DVec3>),
}

impl PointStore {
    /// Create an empty store with the given precision.
    pub fn new(precision: Precision) -> Self {
        let data = match precision {
            Precision::F32 => StoreData::F32(Vec::new()),
            Precision::F64 => StoreData::F64(Vec::new()),
        };
        Self { data }
    }

    /// Create an empty store wrapped in a shared handle.
    pub fn shared(precision: Precision) -> SharedPoints {
        Rc::new(RefCell::new(Self::new(precision)))
    }

    pub fn precision(&self) -> Precision {
        match self.data {
            StoreData::F32(_) => Precision::F32,
            StoreData::F64(_) => Precision::F64,
        }
    }

    /// Append a point and return its id. An `f32` store rounds the
    /// coordinates on the way in.
    pub fn append(&mut self, p: DVec3) -> usize {
        match &mut self.data {
            StoreData::F32(v) => {
                v.push(p.as_vec3());
                v.len() - 1
            }
            StoreData::F64(v) => {
                v.push(p);
                v.len() - 1
            }
        }
    }

    /// Read a point back by id.
    ///
    /// Panics if `id` was never returned by [`PointStore::append`].
    pub fn get(&self, id: usize) -> DVec3 {
        match &self.data {
            StoreData::F32(v) => v[id].as_dvec3(),
            StoreData::F64(v) => v[id],
        }
    }

    /// Component-wise exact equality of `p` against the stored point `id`,
    /// compared at the store's own precision.
    pub(crate) fn matches_exactly(&self, id: usize, p: DVec3) -> bool {
        match &self.data {
            StoreData::F32(v) => v[id] == p.as_vec3(),
            StoreData::F64(v) => v[id] == p,
        }
    }

    pub fn len(&self) -> usize {
        match &self.data {
            StoreData::F32(v) => v.len(),
            StoreData::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_get_round_trip() {
        let mut store = PointStore::new(Precision::F64);
        let p = DVec3::new(0.1, 0.2, 0.3);
        assert_eq!(store.append(p), 0);
        assert_eq!(store.append(DVec3::ONE), 1);
        assert_eq!(store.get(0), p);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn f32_store_rounds_and_matches_at_storage_precision() {
        let mut store = PointStore::new(Precision::F32);
        let p = DVec3::new(0.1, 0.2, 0.3);
        let id = store.append(p);
        // 0.1 is not representable in f32, so the f64 read differs slightly
        assert_ne!(store.get(id), p);
        // but the exact-match comparison rounds the query the same way
        assert!(store.matches_exactly(id, p));
        assert!(!store.matches_exactly(id, DVec3::new(0.1, 0.2, 0.4)));
    }

    #[test]
    fn f64_store_matches_exactly() {
        let mut store = PointStore::new(Precision::F64);
        let id = store.append(DVec3::new(0.1, 0.2, 0.3));
        assert!(store.matches_exactly(id, DVec3::new(0.1, 0.2, 0.3)));
        assert!(!store.matches_exactly(id, DVec3::new(0.1, 0.2, 0.3 + 1e-15)));
    }
}

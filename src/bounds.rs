//! Axis-aligned box math shared by the octree node and the locator.

use glam::DVec3;

/// Axis-aligned box. Containment is half-open: `min` is exclusive and `max`
/// inclusive, so a point sitting exactly on a shared face belongs to exactly
/// one of two adjacent boxes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// A box that contains nothing and absorbs any point via
    /// [`Aabb::expand_to`].
    pub(crate) fn empty() -> Self {
        Self {
            min: DVec3::INFINITY,
            max: DVec3::NEG_INFINITY,
        }
    }

    /// Point-in-box test under the half-open convention `min < p <= max`.
    #[inline]
    pub fn contains(&self, p: DVec3) -> bool {
        p.x > self.min.x
            && p.x <= self.max.x
            && p.y > self.min.y
            && p.y <= self.max.y
            && p.z > self.min.z
            && p.z <= self.max.z
    }

    #[inline]
    pub fn center(&self) -> DVec3 {
        0.5 * (self.min + self.max)
    }

    /// Grow the box to include `p`.
    #[inline]
    pub fn expand_to(&mut self, p: DVec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Clamp `p` onto the box surface or interior.
    #[inline]
    pub fn closest_point(&self, p: DVec3) -> DVec3 {
        p.clamp(self.min, self.max)
    }

    /// Minimum and maximum squared distances from `p` to the box.
    ///
    /// The minimum is zero for a point inside. Both are accumulated per axis
    /// from the sign pattern of `p - min` and `max - p`, picking the near and
    /// far face on each axis.
    pub fn squared_distances_to(&self, p: DVec3) -> (f64, f64) {
        let mut min2 = 0.0;
        let mut max2 = 0.0;
        for i in 0..3 {
            let lo = p[i] - self.min[i];
            let hi = self.max[i] - p[i];
            if lo < 0.0 {
                min2 += lo * lo;
                max2 += hi * hi;
            } else if hi < 0.0 {
                min2 += hi * hi;
                max2 += lo * lo;
            } else if hi > lo {
                max2 += hi * hi;
            } else {
                max2 += lo * lo;
            }
        }
        (min2, max2)
    }
}

/// Octant of `p` relative to `mid`: bit 0 set when `x > mid.x`, bit 1 for y,
/// bit 2 for z. Points exactly on the midplane land in the lower octant,
/// consistent with the half-open box test.
#[inline]
pub(crate) fn octant_index(mid: DVec3, p: DVec3) -> usize {
    ((p.x > mid.x) as usize) | (((p.y > mid.y) as usize) << 1) | (((p.z > mid.z) as usize) << 2)
}

//! Axis-aligned bounding box in double precision world space

use crate::core::types::DVec3;

/// Axis-aligned bounding box defined by min and max corners
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    /// Create AABB from min and max corners
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Get center point
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Get size (max - min)
    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    /// Check if two AABBs overlap with a non-zero volume in the horizontal plane.
    /// Boxes that only share an edge do not overlap.
    pub fn overlaps_xz(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x && self.max.x > other.min.x &&
        self.min.z < other.max.z && self.max.z > other.min.z
    }

    /// Squared distance from `point` to the closest point of the box (0 inside)
    pub fn min_distance_sq(&self, point: DVec3) -> f64 {
        let d = (self.min - point).max(point - self.max).max(DVec3::ZERO);
        d.length_squared()
    }

    /// Squared distance from `point` to the farthest corner of the box
    pub fn max_distance_sq(&self, point: DVec3) -> f64 {
        let d = (point - self.min).abs().max((point - self.max).abs());
        d.length_squared()
    }

    /// Whether any part of the box lies within the sphere of squared radius `radius_sq`.
    ///
    /// Closest-point test, so it never misses a box that touches the sphere.
    pub fn intersects_sphere_sq(&self, center: DVec3, radius_sq: f64) -> bool {
        self.min_distance_sq(center) <= radius_sq
    }

    /// Get one horizontal quarter of the box, keeping the full height range.
    /// index: 0-3 (bit 0 = upper x half, bit 1 = upper z half)
    pub fn child_quadrant(&self, index: u8) -> Aabb {
        let mid = self.center();
        let (min_x, max_x) = if index & 1 != 0 { (mid.x, self.max.x) } else { (self.min.x, mid.x) };
        let (min_z, max_z) = if index & 2 != 0 { (mid.z, self.max.z) } else { (self.min.z, mid.z) };

        Aabb {
            min: DVec3::new(min_x, self.min.y, min_z),
            max: DVec3::new(max_x, self.max.y, max_z),
        }
    }
}

impl std::fmt::Display for Aabb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[({:.2}, {:.2}, {:.2}) - ({:.2}, {:.2}, {:.2})]",
            self.min.x, self.min.y, self.min.z, self.max.x, self.max.y, self.max.z
        )
    }
}

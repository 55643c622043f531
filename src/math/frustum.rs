//! View frustum for culling

use crate::core::types::{DMat4, DVec3, DVec4};
use super::aabb::Aabb;

/// Plane `normal . p + distance = 0`, normal pointing into the frustum
#[derive(Clone, Copy, Debug)]
pub struct Plane {
    pub normal: DVec3,
    pub distance: f64,
}

impl Plane {
    pub fn new(normal: DVec3, distance: f64) -> Self {
        Self { normal, distance }
    }

    /// Plane from `ax + by + cz + d` coefficients, normalized.
    /// A degenerate row gives a plane every point lies in front of.
    fn from_coefficients(c: DVec4) -> Self {
        let normal = c.truncate();
        let len = normal.length();
        if len == 0.0 {
            return Self::new(DVec3::ZERO, 0.0);
        }
        Self::new(normal / len, c.w / len)
    }

    /// Signed distance from point to plane (positive = in front)
    pub fn distance_to_point(&self, point: DVec3) -> f64 {
        self.normal.dot(point) + self.distance
    }

    /// Box corners farthest along the normal and farthest against it
    fn extreme_corners(&self, aabb: &Aabb) -> (DVec3, DVec3) {
        let along = self.normal.cmpge(DVec3::ZERO);
        (
            DVec3::select(along, aabb.max, aabb.min),
            DVec3::select(along, aabb.min, aabb.max),
        )
    }
}

/// Result of classifying a volume against the frustum
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intersection {
    /// Completely outside at least one plane
    Outside,
    /// Straddles one or more planes
    Intersecting,
    /// In front of all six planes
    Inside,
}

/// View frustum with 6 planes (Near, Far, Left, Right, Top, Bottom)
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract the planes of a view-projection matrix, in the order
    /// near, far, left, right, top, bottom.
    ///
    /// glam projections map depth to [0, 1], so the near plane is the depth
    /// row on its own rather than `w + z`.
    pub fn from_view_projection(vp: &DMat4) -> Self {
        let [x, y, depth, w] = [0, 1, 2, 3].map(|i| vp.row(i));
        let planes = [depth, w - depth, w + x, w - x, w - y, w + y].map(Plane::from_coefficients);
        Self { planes }
    }

    /// Classify an AABB as inside, intersecting or outside the frustum.
    ///
    /// Conservative: boxes near a frustum corner may be reported as
    /// intersecting although they are outside, never the other way round.
    pub fn classify_aabb(&self, aabb: &Aabb) -> Intersection {
        let mut result = Intersection::Inside;
        for plane in &self.planes {
            let (front, back) = plane.extreme_corners(aabb);
            if plane.distance_to_point(front) < 0.0 {
                return Intersection::Outside;
            }
            if plane.distance_to_point(back) < 0.0 {
                result = Intersection::Intersecting;
            }
        }
        result
    }
}

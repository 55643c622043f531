//! Geometry used by culling and LOD selection

pub mod aabb;
pub mod frustum;

pub use aabb::Aabb;
pub use frustum::{Frustum, Intersection, Plane};

//! CDLOD - continuous distance-dependent level of detail for heightmap terrain
//!
//! Builds a quadtree over a height raster and selects, per frame, the set of
//! terrain patches to draw at each LOD level together with the morph
//! parameters a renderer needs to blend between levels.

pub mod core;
pub mod math;
pub mod terrain;
pub mod lod;

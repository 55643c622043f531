//! Terrain inputs: settings, height rasters and procedural generation

pub mod config;
pub use config::TerrainSettings;

pub mod heightmap;
pub use heightmap::{Heightmap, RasterSource};

pub mod generator;
pub use generator::{TerrainGenerator, TerrainParams};

//! Error types for terrain building and LOD selection

use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Raster of {width}x{height} exceeds the 65535 cell addressing limit of the quadtree")]
    RasterTooLarge { width: u32, height: u32 },

    #[error(
        "Node of size {size} at level {level} breaks the tree layout: \
         leaf nodes have size {leaf_size} and sit at level {leaf_level}"
    )]
    LeafLevelMismatch {
        size: u32,
        level: u32,
        leaf_size: u32,
        leaf_level: u32,
    },

    #[error("Created {created} quadtree nodes but {expected} were pre-calculated")]
    NodeCountMismatch { created: usize, expected: usize },

    #[error("Quadtree node array of {capacity} slots is exhausted")]
    NodeArrayExhausted { capacity: usize },

    #[error("Heightmap error: {0}")]
    Heightmap(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Settings format error: {0}")]
    Settings(#[from] serde_json::Error),
}

//! Terrain and LOD settings.
//!
//! These replace compile-time constants: a [`TerrainSettings`] value is passed
//! explicitly to the quadtree build and to every selection context. Settings
//! can be loaded from JSON; missing fields take their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::{Result, UVec2};

/// Largest raster extent (per axis) the quadtree can address
pub const MAX_RASTER_EXTENT: u32 = 65535;

/// Upper bound for `lod_level_count`
pub const MAX_LOD_LEVEL_COUNT: u32 = 15;

/// Settings shared by quadtree construction and LOD selection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainSettings {
    /// Raster size of a leaf node. Power of two, 2..=1024.
    /// Together with the raster size and level count this determines the node count.
    pub leaf_node_size: u32,
    /// Number of quadtree levels, which is also the number of LOD levels (2..=15)
    pub lod_level_count: u32,
    /// Ratio between the widths of consecutive LOD distance bands (1.5..=16.0).
    /// 2.0 gives roughly the same triangle count on screen for every band.
    pub lod_level_distance_ratio: f64,
    /// Part of each band rendered at fixed resolution; the rest morphs
    /// towards the next coarser level.
    pub morph_start_ratio: f64,
    /// World units per raster cell along x and z
    pub raster_to_world: [f64; 2],
    /// World position of raster cell (0, 0) at height 0
    pub world_offset: [f64; 3],
    /// Multiplier from raw raster values to world heights
    pub height_factor: f64,
    /// Capacity of the selected node list. Nodes beyond it are not drawn.
    pub max_selected_nodes: usize,
    /// Sort the selection nearest first after each pass
    pub sort_by_distance: bool,
    /// Bound nodes by their four corner heights instead of scanning the footprint.
    /// Faster to build, boxes may miss peaks inside a node.
    pub fast_tree_generation: bool,
    /// Grid mesh resolution multiplier relative to the leaf size
    pub render_grid_resolution_mult: u32,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        Self {
            leaf_node_size: 64,
            lod_level_count: 5,
            lod_level_distance_ratio: 2.0,
            morph_start_ratio: 0.66,
            raster_to_world: [1.0, 1.0],
            world_offset: [0.0, 0.0, 0.0],
            height_factor: 1.0,
            max_selected_nodes: 1024,
            sort_by_distance: true,
            fast_tree_generation: false,
            render_grid_resolution_mult: 1,
        }
    }
}

impl TerrainSettings {
    /// Deepest quadtree level, the one holding leaf nodes. 0 for unvalidated
    /// settings without levels.
    pub fn deepest_level(&self) -> u32 {
        self.lod_level_count.saturating_sub(1)
    }

    /// Raster size of a root node
    pub fn root_node_size(&self) -> u32 {
        self.leaf_node_size << self.deepest_level()
    }

    /// Dimension of the grid mesh a renderer draws per node
    pub fn gridmesh_dimension(&self) -> u32 {
        self.leaf_node_size * self.render_grid_resolution_mult
    }

    /// Check the settings on their own
    pub fn validate(&self) -> Result<()> {
        let leaf = self.leaf_node_size;
        if !leaf.is_power_of_two() || !(2..=1024).contains(&leaf) {
            return Err(config_error(format!(
                "leaf_node_size must be a power of two between 2 and 1024, got {leaf}"
            )));
        }
        if !(2..=MAX_LOD_LEVEL_COUNT).contains(&self.lod_level_count) {
            return Err(config_error(format!(
                "lod_level_count must be between 2 and {MAX_LOD_LEVEL_COUNT}, got {}",
                self.lod_level_count
            )));
        }
        if !(1.5..=16.0).contains(&self.lod_level_distance_ratio) {
            return Err(config_error(format!(
                "lod_level_distance_ratio must be between 1.5 and 16.0, got {}",
                self.lod_level_distance_ratio
            )));
        }
        if !(0.0..1.0).contains(&self.morph_start_ratio) {
            return Err(config_error(format!(
                "morph_start_ratio must be in [0, 1), got {}",
                self.morph_start_ratio
            )));
        }
        if self.raster_to_world.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(config_error(format!(
                "raster_to_world factors must be positive, got {:?}",
                self.raster_to_world
            )));
        }
        if self.world_offset.iter().any(|o| !o.is_finite()) {
            return Err(config_error(format!(
                "world_offset must be finite, got {:?}",
                self.world_offset
            )));
        }
        if !self.height_factor.is_finite() || self.height_factor <= 0.0 {
            return Err(config_error(format!(
                "height_factor must be positive, got {}",
                self.height_factor
            )));
        }
        if self.max_selected_nodes == 0 {
            return Err(config_error("max_selected_nodes must be at least 1".to_string()));
        }
        let mult = self.render_grid_resolution_mult;
        if !mult.is_power_of_two() || mult >= leaf {
            return Err(config_error(format!(
                "render_grid_resolution_mult must be a power of two below leaf_node_size, got {mult}"
            )));
        }
        let grid = self.gridmesh_dimension();
        if !(8..=1024).contains(&grid) {
            return Err(config_error(format!(
                "gridmesh dimension (leaf_node_size * render_grid_resolution_mult) must be between 8 and 1024, got {grid}"
            )));
        }
        Ok(())
    }

    /// Check that the settings fit a raster of the given extent
    pub fn validate_for_extent(&self, extent: UVec2) -> Result<()> {
        if extent.x > MAX_RASTER_EXTENT || extent.y > MAX_RASTER_EXTENT {
            log::error!(
                "Heightmap of {}x{} is too large for the quad tree (limit {MAX_RASTER_EXTENT})",
                extent.x, extent.y
            );
            return Err(Error::RasterTooLarge { width: extent.x, height: extent.y });
        }
        if extent.x == 0 || extent.y == 0 {
            return Err(config_error(format!("raster extent {}x{} is empty", extent.x, extent.y)));
        }
        let span = u64::from(self.leaf_node_size) << self.lod_level_count;
        if span > u64::from(extent.x.max(extent.y)) {
            return Err(config_error(format!(
                "too many LOD levels ({}) for a {}x{} raster with leaf size {}",
                self.lod_level_count, extent.x, extent.y, self.leaf_node_size
            )));
        }
        Ok(())
    }

    /// Load settings from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&json)?;
        settings.validate()?;
        log::info!("Terrain settings loaded from '{}'", path.display());
        Ok(settings)
    }

    /// Save settings to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, json)?;
        Ok(())
    }
}

fn config_error(message: String) -> Error {
    log::error!("{message}");
    Error::Config(message)
}

//! LOD quadtree over a height raster

use crate::core::camera::CameraView;
use crate::core::error::Error;
use crate::core::types::{Result, UVec2};
use crate::terrain::config::TerrainSettings;
use crate::terrain::heightmap::RasterSource;

use super::node::{self, BuildContext, Node, NodeId};
use super::selection::SelectionContext;

/// Quadtree of terrain nodes.
///
/// The raster is tiled by a grid of root nodes of `root_size` cells; every
/// root owns a full subtree down to leaf size. All nodes live in one array
/// sized exactly to the node count the settings imply.
#[derive(Debug, Clone)]
pub struct Quadtree {
    settings: TerrainSettings,
    extent: UVec2,
    /// All nodes, each subtree in depth-first order
    nodes: Vec<Node>,
    /// Root grid, row major
    roots: Vec<NodeId>,
    root_size: u32,
    root_count_x: u32,
    root_count_z: u32,
}

impl Quadtree {
    /// Build the tree for `source`. Fails on invalid or inconsistent settings.
    pub fn build<R: RasterSource + ?Sized>(source: &R, settings: &TerrainSettings) -> Result<Self> {
        let start = std::time::Instant::now();
        settings.validate()?;
        let extent = source.extent();
        settings.validate_for_extent(extent)?;

        let root_size = settings.root_node_size();
        let root_count_x = extent.x.div_ceil(root_size);
        let root_count_z = extent.y.div_ceil(root_size);

        let expected = expected_node_count(extent, settings.leaf_node_size, settings.lod_level_count);
        let mut nodes = vec![Node::default(); expected];
        let mut roots = Vec::with_capacity((root_count_x * root_count_z) as usize);

        let ctx = BuildContext { source, settings };
        let mut next_free = 0;
        for rz in 0..root_count_z {
            for rx in 0..root_count_x {
                let slot = node::claim_slot(nodes.len(), &mut next_free)?;
                Node::create(slot, rx * root_size, rz * root_size, root_size, 0, &ctx, &mut nodes, &mut next_free)?;
                roots.push(NodeId(slot as u32));
            }
        }

        check_node_count(next_free, expected)?;

        let tree = Self {
            settings: settings.clone(),
            extent,
            nodes,
            roots,
            root_size,
            root_count_x,
            root_count_z,
        };

        log::info!(
            "Quadtree built for {}x{} raster: {} nodes, {}x{} roots of size {}, {:.1}kB, {:.2}ms",
            extent.x,
            extent.y,
            tree.nodes.len(),
            root_count_x,
            root_count_z,
            root_size,
            (tree.nodes.len() * std::mem::size_of::<Node>()) as f32 / 1024.0,
            start.elapsed().as_secs_f64() * 1000.0
        );
        if log::log_enabled!(log::Level::Trace) {
            for (i, node) in tree.nodes.iter().enumerate() {
                let (x, z) = node.raster_position();
                log::trace!(
                    "  node {i}: ({x}, {z}) size {} level {}{} box {}",
                    node.size(),
                    node.level(),
                    if node.is_leaf() { " leaf" } else { "" },
                    node.world_aabb()
                );
            }
        }
        Ok(tree)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// All nodes as a slice
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Raster size of a root node
    pub fn root_size(&self) -> u32 {
        self.root_size
    }

    /// Root grid dimensions (x, z)
    pub fn root_count(&self) -> (u32, u32) {
        (self.root_count_x, self.root_count_z)
    }

    /// Root nodes, row by row
    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.roots.iter().copied()
    }

    pub fn settings(&self) -> &TerrainSettings {
        &self.settings
    }

    /// Extent of the raster the tree was built for
    pub fn extent(&self) -> UVec2 {
        self.extent
    }

    /// Select the nodes to draw into `context`, which must have been reset for this pass
    pub fn lod_select(&self, context: &mut SelectionContext) {
        if context.visibility_ranges().len() != self.settings.lod_level_count as usize {
            log::error!(
                "Selection context has {} LOD levels, tree has {}",
                context.visibility_ranges().len(),
                self.settings.lod_level_count
            );
            return;
        }
        for &root in &self.roots {
            node::lod_select(&self.nodes, root, context, false);
        }
    }

    /// One full pass: reset `context` for `camera`, select, then sort
    pub fn select_frame<C: CameraView + ?Sized>(&self, context: &mut SelectionContext, camera: &C) {
        context.reset(camera);
        self.lod_select(context);
        context.sort_by_distance();
    }
}

/// Compare the nodes a build created with the pre-calculated count
fn check_node_count(created: usize, expected: usize) -> Result<()> {
    if created != expected {
        let err = Error::NodeCountMismatch { created, expected };
        log::error!("{err}");
        return Err(err);
    }
    Ok(())
}

/// Number of nodes a tree over `extent` holds: at every level, one node per
/// grid cell of that level's node size that starts inside the raster.
pub fn expected_node_count(extent: UVec2, leaf_node_size: u32, lod_level_count: u32) -> usize {
    (0..lod_level_count)
        .map(|i| {
            let size = leaf_node_size << i;
            extent.x.div_ceil(size) as usize * extent.y.div_ceil(size) as usize
        })
        .sum()
}

//! Quadtree nodes: construction over a raster and the recursive LOD selection walk.
//!
//! Nodes live in one flat array owned by the [`Quadtree`](super::Quadtree) and
//! refer to their children by [`NodeId`]. A node covers a square raster region
//! of `size` cells; its four children (where they exist) cover the quadrants
//! at half the size one level deeper.

use crate::core::error::Error;
use crate::core::types::{DVec3, Result};
use crate::math::{Aabb, Intersection};
use crate::terrain::config::TerrainSettings;
use crate::terrain::heightmap::RasterSource;

use super::selection::{SelectedNode, SelectionContext};

/// Index of a node inside the quadtree's node array
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One of a node's four children. Top is low z, left is low x.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Quadrant {
    TopLeft = 0,
    TopRight = 1,
    BottomLeft = 2,
    BottomRight = 3,
}

impl Quadrant {
    /// All quadrants in child creation order
    pub const ALL: [Quadrant; 4] = [
        Quadrant::TopLeft,
        Quadrant::TopRight,
        Quadrant::BottomLeft,
        Quadrant::BottomRight,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Raster offset of the quadrant's origin inside a parent with half size `half`
    fn offset(self, half: u32) -> (u32, u32) {
        match self {
            Quadrant::TopLeft => (0, 0),
            Quadrant::TopRight => (half, 0),
            Quadrant::BottomLeft => (0, half),
            Quadrant::BottomRight => (half, half),
        }
    }
}

/// Which quadrants of a selected node must be drawn
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct QuadrantMask(pub [bool; 4]);

impl QuadrantMask {
    pub const FULL: QuadrantMask = QuadrantMask([true; 4]);

    pub fn has(&self, quadrant: Quadrant) -> bool {
        self.0[quadrant.index()]
    }

    /// All four quadrants set; the node can be drawn in one go
    pub fn is_full(&self) -> bool {
        self.0.iter().all(|&q| q)
    }

    pub fn is_empty(&self) -> bool {
        !self.0.iter().any(|&q| q)
    }

    /// Quadrants that are set, in creation order
    pub fn iter(&self) -> impl Iterator<Item = Quadrant> + '_ {
        Quadrant::ALL.into_iter().filter(|q| self.has(*q))
    }
}

/// Outcome of selecting a node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectResult {
    /// Not evaluated (the child does not exist)
    Undefined,
    /// Node and everything below it is invisible
    Outside,
    /// Node is beyond its level's visibility range; its parent has to cover it
    OutOfRange,
    /// Node, or something below it, was added to the selection
    Selected,
}

/// A node of the LOD quadtree
#[derive(Clone, Debug, Default)]
pub struct Node {
    x: u32,
    z: u32,
    size: u32,
    level: u32,
    leaf: bool,
    min_height: f32,
    max_height: f32,
    world_aabb: Aabb,
    children: [Option<NodeId>; 4],
}

/// Read-only inputs shared by every node created during one build
pub(crate) struct BuildContext<'a, R: RasterSource + ?Sized> {
    pub source: &'a R,
    pub settings: &'a TerrainSettings,
}

impl Node {
    /// Fill `all_nodes[slot]` with the node at raster (x, z), then create its
    /// subtree depth first, claiming further slots through `next_free`.
    pub(crate) fn create<R: RasterSource + ?Sized>(
        slot: usize,
        x: u32,
        z: u32,
        size: u32,
        level: u32,
        ctx: &BuildContext<'_, R>,
        all_nodes: &mut [Node],
        next_free: &mut usize,
    ) -> Result<()> {
        let settings = ctx.settings;
        let extent = ctx.source.extent();
        let (min_height, max_height) =
            footprint_height_range(ctx.source, x, z, size, settings.fast_tree_generation);
        let world_aabb = world_box(settings, x, z, size, min_height, max_height);

        let leaf_level = settings.deepest_level();
        let leaf = size == settings.leaf_node_size;
        if leaf != (level == leaf_level) || level > leaf_level {
            let err = Error::LeafLevelMismatch {
                size,
                level,
                leaf_size: settings.leaf_node_size,
                leaf_level,
            };
            log::error!("{err}");
            return Err(err);
        }

        let mut children = [None; 4];
        if !leaf {
            let half = size / 2;
            for quadrant in Quadrant::ALL {
                let (dx, dz) = quadrant.offset(half);
                let (cx, cz) = (x + dx, z + dz);
                // Ragged edge: the top left child always exists, the others only inside the raster
                if cx >= extent.x || cz >= extent.y {
                    continue;
                }
                let child_slot = claim_slot(all_nodes.len(), next_free)?;
                Node::create(child_slot, cx, cz, half, level + 1, ctx, all_nodes, next_free)?;
                children[quadrant.index()] = Some(NodeId(child_slot as u32));
            }
        }

        all_nodes[slot] = Node {
            x,
            z,
            size,
            level,
            leaf,
            min_height,
            max_height,
            world_aabb,
            children,
        };
        Ok(())
    }

    /// Raster origin (x, z)
    pub fn raster_position(&self) -> (u32, u32) {
        (self.x, self.z)
    }

    /// Side length in raster cells
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Tree depth, 0 for root nodes
    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn is_leaf(&self) -> bool {
        self.leaf
    }

    /// Raw raster min/max height over the node's footprint
    pub fn min_max_height(&self) -> (f32, f32) {
        (self.min_height, self.max_height)
    }

    pub fn world_aabb(&self) -> &Aabb {
        &self.world_aabb
    }

    pub fn child(&self, quadrant: Quadrant) -> Option<NodeId> {
        self.children[quadrant.index()]
    }

    /// Existing children with their quadrant
    pub fn children(&self) -> impl Iterator<Item = (Quadrant, NodeId)> + '_ {
        Quadrant::ALL
            .into_iter()
            .filter_map(|q| self.children[q.index()].map(|id| (q, id)))
    }
}

/// Take the next free slot of an array with `capacity` slots
pub(crate) fn claim_slot(capacity: usize, next_free: &mut usize) -> Result<usize> {
    if *next_free >= capacity {
        log::error!("Quad tree node array of {capacity} slots is too small");
        return Err(Error::NodeArrayExhausted { capacity });
    }
    let slot = *next_free;
    *next_free += 1;
    Ok(slot)
}

/// Min/max height of a node footprint, including one cell of overlap with the
/// neighbours at the far edges so adjacent boxes share their seam heights.
fn footprint_height_range<R: RasterSource + ?Sized>(
    source: &R,
    x: u32,
    z: u32,
    size: u32,
    fast: bool,
) -> (f32, f32) {
    let extent = source.extent();
    let (min, max) = if fast {
        let limit_x = (x + size).min(extent.x - 1);
        let limit_z = (z + size).min(extent.y - 1);
        [
            source.height_at(x, z),
            source.height_at(limit_x, z),
            source.height_at(x, limit_z),
            source.height_at(limit_x, limit_z),
        ]
        .into_iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), h| (lo.min(h), hi.max(h)))
    } else {
        let limit_x = (x + size + 1).min(extent.x);
        let limit_z = (z + size + 1).min(extent.y);
        source.min_max_height_in_area(x, z, limit_x - x, limit_z - z)
    };

    if !min.is_finite() || !max.is_finite() || min > max {
        log::warn!(
            "Raster min/max query for node at ({x}, {z}) size {size} returned ({min}, {max}), using a flat box"
        );
        return (0.0, 0.0);
    }
    (min, max)
}

fn world_box(settings: &TerrainSettings, x: u32, z: u32, size: u32, min_height: f32, max_height: f32) -> Aabb {
    let [scale_x, scale_z] = settings.raster_to_world;
    let [offset_x, offset_y, offset_z] = settings.world_offset;
    let height_factor = settings.height_factor;

    Aabb::new(
        DVec3::new(
            offset_x + x as f64 * scale_x,
            offset_y + min_height as f64 * height_factor,
            offset_z + z as f64 * scale_z,
        ),
        DVec3::new(
            offset_x + (x + size) as f64 * scale_x,
            offset_y + max_height as f64 * height_factor,
            offset_z + (z + size) as f64 * scale_z,
        ),
    )
}

/// Select node `id` and its subtree into `context`.
///
/// A node is added with only those quadrants that no selected or invisible
/// child already accounts for, so no region is drawn twice.
pub(crate) fn lod_select(
    nodes: &[Node],
    id: NodeId,
    context: &mut SelectionContext,
    parent_completely_in_frustum: bool,
) -> SelectResult {
    let node = &nodes[id.index()];
    let aabb = &node.world_aabb;

    // Containment is inherited downwards
    let frustum_result = if parent_completely_in_frustum {
        Intersection::Inside
    } else {
        context.frustum().classify_aabb(aabb)
    };
    if frustum_result == Intersection::Outside {
        return SelectResult::Outside;
    }

    let camera = context.camera_position();
    let range = context.visibility_range(node.level);
    if !aabb.intersects_sphere_sq(camera, range * range) {
        return SelectResult::OutOfRange;
    }

    let mut child_results = [SelectResult::Undefined; 4];
    if node.level != context.stop_at_level() {
        let next_range = context.visibility_range(node.level + 1);
        if aabb.intersects_sphere_sq(camera, next_range * next_range) {
            let completely_inside = frustum_result == Intersection::Inside;
            for (quadrant, child) in node.children() {
                child_results[quadrant.index()] = lod_select(nodes, child, context, completely_inside);
            }
        }
    }

    // Selected or invisible children cover their own quadrant. Out of range
    // or missing children leave it to this node.
    let remove = child_results.map(|r| matches!(r, SelectResult::Outside | SelectResult::Selected));

    if context.is_full() {
        context.note_capacity_exhausted();
        return SelectResult::Outside;
    }

    if !remove.iter().all(|&r| r) {
        let lod_level = context.stop_at_level() - node.level;
        let mut selected = SelectedNode::new(id, lod_level, QuadrantMask(remove.map(|r| !r)));

        // The node reaches past the point where the next coarser level starts morphing
        if node.level != 0 {
            if let Some(morph_start) = context.morph_start().get(lod_level as usize + 1).copied() {
                if aabb.max_distance_sq(camera).sqrt() > morph_start {
                    selected.vis_dist_too_small = true;
                    context.note_vis_dist_too_small(node);
                }
            }
        }

        if context.sorts_by_distance() {
            selected.min_distance_to_camera = aabb.min_distance_sq(camera).sqrt();
        }
        context.push(selected);
        return SelectResult::Selected;
    }

    if child_results.contains(&SelectResult::Selected) {
        SelectResult::Selected
    } else {
        SelectResult::Outside
    }
}

//! Renderer-facing draw list built from a selection pass

use std::ops::Range;

use bytemuck::{Pod, Zeroable};

use crate::math::Aabb;

use super::gridmesh::GridMesh;
use super::node::{NodeId, QuadrantMask};
use super::quadtree::Quadtree;
use super::selection::SelectionContext;

/// Per-node parameters for the terrain vertex stage
/// Layout matches a uniform block of three vec4s (48 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct NodeDrawParams {
    /// World size (x, 0, z) of the node and its LOD level in w
    pub node_scale: [f32; 4],
    /// World position of the node's min corner, y at the middle of its height range
    pub node_offset: [f32; 4],
    /// Morph constants of the node's LOD level
    pub morph_consts: [f32; 4],
}

/// One node to draw
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawCommand {
    pub node: NodeId,
    pub lod_level: u32,
    /// Full mask: draw the whole grid mesh; otherwise one quarter mesh per set quadrant
    pub quadrants: QuadrantMask,
    pub params: NodeDrawParams,
}

impl DrawCommand {
    /// Index ranges of `mesh` to draw for this node. Adjacent quadrant runs
    /// are merged, so a full node is a single range over the whole mesh.
    pub fn index_ranges(&self, mesh: &GridMesh) -> Vec<Range<u32>> {
        let mut ranges: Vec<Range<u32>> = Vec::with_capacity(4);
        for quadrant in self.quadrants.iter() {
            let range = mesh.quadrant_range(quadrant);
            match ranges.last_mut() {
                Some(last) if last.end == range.start => last.end = range.end,
                _ => ranges.push(range),
            }
        }
        ranges
    }
}

/// Patch and triangle counts of a draw list
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Whole nodes and quarter nodes drawn
    pub patches: usize,
    pub triangles: usize,
}

/// Draw commands of one pass, grouped by LOD level from finest to coarsest
#[derive(Clone, Debug, Default)]
pub struct DrawList {
    commands: Vec<DrawCommand>,
    gridmesh_dimension: u32,
}

impl DrawList {
    /// Collect the current selection of `context` level by level
    pub fn build(tree: &Quadtree, context: &SelectionContext) -> Self {
        let mut commands = Vec::with_capacity(context.len());
        if !context.is_empty() {
            for lod_level in context.min_selected_level()..=context.max_selected_level() {
                let morph_consts = context.morph_consts(lod_level).to_array();
                for selected in context.nodes_at_level(lod_level) {
                    let aabb = tree.node(selected.node).world_aabb();
                    let size = aabb.size();
                    commands.push(DrawCommand {
                        node: selected.node,
                        lod_level,
                        quadrants: selected.quadrants,
                        params: NodeDrawParams {
                            node_scale: [size.x as f32, 0.0, size.z as f32, lod_level as f32],
                            node_offset: [
                                aabb.min.x as f32,
                                ((aabb.min.y + aabb.max.y) * 0.5) as f32,
                                aabb.min.z as f32,
                                0.0,
                            ],
                            morph_consts,
                        },
                    });
                }
            }
        }

        Self {
            commands,
            gridmesh_dimension: tree.settings().gridmesh_dimension(),
        }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Runs of commands sharing a LOD level
    pub fn levels(&self) -> impl Iterator<Item = &[DrawCommand]> + '_ {
        self.commands.chunk_by(|a, b| a.lod_level == b.lod_level)
    }

    /// Patches and triangles for a grid mesh of `gridmesh_dimension` quads per side
    pub fn stats(&self) -> RenderStats {
        let full_triangles = 2 * (self.gridmesh_dimension as usize).pow(2);
        self.commands.iter().fold(RenderStats::default(), |mut stats, command| {
            if command.quadrants.is_full() {
                stats.patches += 1;
                stats.triangles += full_triangles;
            } else {
                let quarters = command.quadrants.iter().count();
                stats.patches += quarters;
                stats.triangles += quarters * full_triangles / 4;
            }
            stats
        })
    }

    /// Every command with the index ranges it draws from `mesh`
    pub fn index_ranges<'a>(
        &'a self,
        mesh: &'a GridMesh,
    ) -> impl Iterator<Item = (&'a DrawCommand, Vec<Range<u32>>)> + 'a {
        self.commands.iter().map(move |command| (command, command.index_ranges(mesh)))
    }

    /// World boxes of every drawn region: whole nodes or single quadrants
    pub fn quadrant_boxes<'a>(&'a self, tree: &'a Quadtree) -> impl Iterator<Item = Aabb> + 'a {
        self.commands.iter().flat_map(move |command| {
            let aabb = *tree.node(command.node).world_aabb();
            let boxes: Vec<Aabb> = if command.quadrants.is_full() {
                vec![aabb]
            } else {
                command
                    .quadrants
                    .iter()
                    .map(|q| aabb.child_quadrant(q.index() as u8))
                    .collect()
            };
            boxes
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DVec3;
    use crate::lod::test_view::TestView;
    use crate::terrain::config::TerrainSettings;
    use crate::terrain::heightmap::Heightmap;

    const LEAF: u32 = 16;

    fn tree(map: &Heightmap) -> Quadtree {
        let settings = TerrainSettings { leaf_node_size: LEAF, lod_level_count: 4, ..Default::default() };
        Quadtree::build(map, &settings).unwrap()
    }

    /// How often each leaf cell is drawn
    fn coverage(tree: &Quadtree, list: &DrawList) -> Vec<Vec<u32>> {
        let cells = (256 / LEAF) as usize;
        let mut counts = vec![vec![0u32; cells]; cells];
        for aabb in list.quadrant_boxes(tree) {
            let x0 = (aabb.min.x / LEAF as f64).round() as usize;
            let x1 = (aabb.max.x / LEAF as f64).round() as usize;
            let z0 = (aabb.min.z / LEAF as f64).round() as usize;
            let z1 = (aabb.max.z / LEAF as f64).round() as usize;
            assert!(x1 > x0 && z1 > z0, "drawn region smaller than a leaf: {aabb}");
            for row in &mut counts[z0..z1] {
                for count in &mut row[x0..x1] {
                    *count += 1;
                }
            }
        }
        counts
    }

    #[test]
    fn test_drawn_quadrants_tile_terrain_in_range() {
        let map = Heightmap::from_fn(256, 256, |x, z| ((x * 3 + z * 5) % 17) as f32);
        let tree = tree(&map);
        // The far root (128..256, 128..256) lies beyond the far plane
        let view = TestView::everything(DVec3::new(24.0, 5.0, 24.0), 1.0, 140.0);
        let mut ctx = SelectionContext::new(tree.settings(), &view);
        tree.select_frame(&mut ctx, &view);
        assert!(!ctx.is_capacity_exhausted());

        let list = DrawList::build(&tree, &ctx);
        assert!(list.commands().iter().any(|c| !c.quadrants.is_full()));

        let counts = coverage(&tree, &list);
        for (z, row) in counts.iter().enumerate() {
            for (x, &count) in row.iter().enumerate() {
                let far_root = x >= 8 && z >= 8;
                assert_eq!(count, if far_root { 0 } else { 1 }, "leaf cell ({x}, {z})");
            }
        }
    }

    #[test]
    fn test_coverage_with_everything_in_range() {
        let tree = tree(&Heightmap::flat(256, 256, 2.0));
        let view = TestView::everything(DVec3::new(200.0, 30.0, 60.0), 0.5, 1000.0);
        let mut ctx = SelectionContext::new(tree.settings(), &view);
        tree.select_frame(&mut ctx, &view);

        let list = DrawList::build(&tree, &ctx);
        for row in coverage(&tree, &list) {
            assert!(row.iter().all(|&count| count == 1));
        }
    }

    #[test]
    fn test_commands_grouped_by_level() {
        let tree = tree(&Heightmap::flat(256, 256, 0.0));
        let view = TestView::everything(DVec3::new(64.0, 3.0, 64.0), 1.0, 300.0);
        let mut ctx = SelectionContext::new(tree.settings(), &view);
        tree.select_frame(&mut ctx, &view);

        let list = DrawList::build(&tree, &ctx);
        assert_eq!(list.len(), ctx.len());
        for pair in list.commands().windows(2) {
            assert!(pair[0].lod_level <= pair[1].lod_level);
        }

        let levels: Vec<u32> = list.levels().map(|run| run[0].lod_level).collect();
        assert_eq!(levels.first().copied(), Some(ctx.min_selected_level()));
        assert_eq!(levels.last().copied(), Some(ctx.max_selected_level()));
        for run in list.levels() {
            assert_eq!(run.len(), ctx.nodes_at_level(run[0].lod_level).count());
        }
    }

    #[test]
    fn test_node_params() {
        let map = Heightmap::from_fn(256, 256, |x, _| if x < 16 { 10.0 } else { 30.0 });
        let tree = tree(&map);
        let view = TestView::looking_down(DVec3::new(8.0, 40.0, 8.0), 4.0, 1.0, 1000.0);
        let mut ctx = SelectionContext::new(tree.settings(), &view);
        tree.select_frame(&mut ctx, &view);

        let list = DrawList::build(&tree, &ctx);
        let command = list.commands()[0];
        let node = tree.node(command.node);
        let aabb = node.world_aabb();

        assert_eq!(command.params.node_scale, [aabb.size().x as f32, 0.0, aabb.size().z as f32, command.lod_level as f32]);
        assert_eq!(command.params.node_offset[0], aabb.min.x as f32);
        assert_eq!(command.params.node_offset[1], ((aabb.min.y + aabb.max.y) * 0.5) as f32);
        assert_eq!(command.params.morph_consts, ctx.morph_consts(command.lod_level).to_array());
        assert_eq!(bytemuck::bytes_of(&command.params).len(), 48);
    }

    #[test]
    fn test_stats() {
        let tree = tree(&Heightmap::flat(256, 256, 0.0));
        let view = TestView::looking_down(DVec3::new(8.0, 1.0, 8.0), 12.0, 1.0, 20.0);
        let mut ctx = SelectionContext::new(tree.settings(), &view);
        tree.select_frame(&mut ctx, &view);

        // First leaf drawn whole, its parent draws the other three quadrants
        let list = DrawList::build(&tree, &ctx);
        assert_eq!(list.len(), 2);
        let stats = list.stats();
        assert_eq!(stats.patches, 4);
        let full = 2 * 16 * 16;
        assert_eq!(stats.triangles, full + 3 * full / 4);
    }

    #[test]
    fn test_index_ranges_follow_quadrants() {
        let tree = tree(&Heightmap::flat(256, 256, 0.0));
        let mesh = GridMesh::for_settings(tree.settings()).unwrap();
        let view = TestView::looking_down(DVec3::new(8.0, 1.0, 8.0), 12.0, 1.0, 20.0);
        let mut ctx = SelectionContext::new(tree.settings(), &view);
        tree.select_frame(&mut ctx, &view);

        let list = DrawList::build(&tree, &ctx);
        let ranges: Vec<_> = list.index_ranges(&mesh).map(|(_, ranges)| ranges).collect();
        let sub = mesh.submesh_index_count();
        // Leaf drawn whole, parent draws TR, BL and BR as one run
        assert_eq!(ranges, vec![vec![0..mesh.index_count()], vec![sub..4 * sub]]);

        let drawn: u32 = ranges.iter().flatten().map(|r| r.len() as u32).sum();
        assert_eq!(drawn as usize, list.stats().triangles * 3);
    }

    #[test]
    fn test_split_quadrants_give_separate_ranges() {
        let mesh = GridMesh::new(8).unwrap();
        let command = DrawCommand {
            node: NodeId(0),
            lod_level: 1,
            quadrants: QuadrantMask([false, true, true, false]),
            params: NodeDrawParams::default(),
        };
        let sub = mesh.submesh_index_count();
        assert_eq!(command.index_ranges(&mesh), vec![sub..3 * sub]);

        let command = DrawCommand { quadrants: QuadrantMask([true, false, false, true]), ..command };
        assert_eq!(command.index_ranges(&mesh), vec![0..sub, 3 * sub..4 * sub]);

        let command = DrawCommand { quadrants: QuadrantMask::default(), ..command };
        assert!(command.index_ranges(&mesh).is_empty());
    }

    #[test]
    fn test_empty_selection() {
        let tree = tree(&Heightmap::flat(256, 256, 0.0));
        let view = TestView::everything(DVec3::new(1.0e6, 0.0, 1.0e6), 1.0, 100.0);
        let mut ctx = SelectionContext::new(tree.settings(), &view);
        tree.select_frame(&mut ctx, &view);

        let list = DrawList::build(&tree, &ctx);
        assert!(list.is_empty());
        assert_eq!(list.levels().count(), 0);
        assert_eq!(list.stats(), RenderStats::default());
    }
}

//! Per-pass LOD selection state: range tables, morph parameters and the
//! selected node list.

use crate::core::camera::CameraView;
use crate::core::types::{DVec3, Vec4};
use crate::math::Frustum;
use crate::terrain::config::TerrainSettings;

use super::node::{Node, NodeId, QuadrantMask};
use super::quadtree::Quadtree;

/// Part of a morph band pulled in at its far edge so the blend completes
/// just before the range boundary
const MORPH_END_FUDGE: f64 = 0.01;

/// A node chosen for rendering in the current pass
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SelectedNode {
    pub node: NodeId,
    /// Distance from the finest selectable level, 0 = finest
    pub lod_level: u32,
    /// Quadrants this node has to draw itself
    pub quadrants: QuadrantMask,
    /// The node reaches past the start of the next coarser morph band
    pub vis_dist_too_small: bool,
    /// Closest distance from the camera to the node box, only filled when sorting
    pub min_distance_to_camera: f64,
}

impl SelectedNode {
    pub(crate) fn new(node: NodeId, lod_level: u32, quadrants: QuadrantMask) -> Self {
        Self {
            node,
            lod_level,
            quadrants,
            vis_dist_too_small: false,
            min_distance_to_camera: 0.0,
        }
    }
}

/// Mutable state of a selection pass.
///
/// Owns a snapshot of the camera taken by [`reset`](Self::reset); range
/// tables are only recomputed when the camera's near or far plane changes.
#[derive(Clone, Debug)]
pub struct SelectionContext {
    level_count: u32,
    distance_ratio: f64,
    morph_start_ratio: f64,
    capacity: usize,

    near: f64,
    far: f64,
    camera_position: DVec3,
    frustum: Frustum,

    /// Outer range per tree level, largest at the root
    visibility_ranges: Vec<f64>,
    /// Morph band per selected LOD, 0 = nearest
    morph_start: Vec<f64>,
    morph_end: Vec<f64>,

    selected: Vec<SelectedNode>,
    min_selected_level: u32,
    max_selected_level: u32,
    stop_at_level: u32,
    sort_by_distance: bool,

    vis_dist_too_small: bool,
    capacity_exhausted: bool,
}

impl SelectionContext {
    /// Create a context for trees built with `settings`, ready for a pass from `camera`
    pub fn new<C: CameraView + ?Sized>(settings: &TerrainSettings, camera: &C) -> Self {
        let level_count = settings.lod_level_count;
        let mut context = Self {
            level_count,
            distance_ratio: settings.lod_level_distance_ratio,
            morph_start_ratio: settings.morph_start_ratio,
            capacity: settings.max_selected_nodes,
            near: camera.near_plane(),
            far: camera.far_plane(),
            camera_position: camera.position(),
            frustum: camera.view_frustum(),
            visibility_ranges: vec![0.0; level_count as usize],
            morph_start: vec![0.0; level_count as usize],
            morph_end: vec![0.0; level_count as usize],
            selected: Vec::with_capacity(settings.max_selected_nodes),
            min_selected_level: settings.deepest_level(),
            max_selected_level: 0,
            stop_at_level: settings.deepest_level(),
            sort_by_distance: settings.sort_by_distance,
            vis_dist_too_small: false,
            capacity_exhausted: false,
        };
        context.calculate_ranges(context.near, context.far);
        context
    }

    /// Start a new pass from `camera`: take its position and frustum, refresh
    /// the range tables if its clip planes moved, and clear the selection.
    pub fn reset<C: CameraView + ?Sized>(&mut self, camera: &C) {
        let (near, far) = (camera.near_plane(), camera.far_plane());
        if near != self.near || far != self.far {
            self.calculate_ranges(near, far);
        }
        self.camera_position = camera.position();
        self.frustum = camera.view_frustum();

        self.selected.clear();
        self.min_selected_level = self.stop_at_level;
        self.max_selected_level = 0;
        self.vis_dist_too_small = false;
        self.capacity_exhausted = false;
    }

    /// Split [near, far] into one band per LOD level. Band widths grow
    /// geometrically with the distance ratio, the nearest band is the narrowest.
    ///
    /// An empty or inverted view depth collapses every band onto the near
    /// plane (clamped at 0), so nothing past it is in range.
    pub fn calculate_ranges(&mut self, near: f64, far: f64) {
        if far <= near {
            log::warn!("LOD ranges for an empty view depth: near {near}, far {far}");
        }
        self.near = near;
        self.far = far;

        let count = self.level_count as usize;
        let total: f64 = (0..count).map(|i| self.distance_ratio.powi(i as i32)).sum();
        let section = if far > near { (far - near) / total } else { 0.0 };

        // Deepest tree level gets the first and smallest band
        let mut prev = near.max(0.0);
        for i in 0..count {
            let range = prev + section * self.distance_ratio.powi(i as i32);
            self.visibility_ranges[count - 1 - i] = range;
            prev = range;
        }

        let mut prev = near.max(0.0);
        for i in 0..count {
            let end = self.visibility_ranges[count - 1 - i];
            self.morph_end[i] = end;
            self.morph_start[i] = prev + (end - prev) * self.morph_start_ratio;
            prev = end;
        }

        if log::log_enabled!(log::Level::Debug) {
            log::debug!("LOD ranges for near {near:.2}, far {far:.2}:");
            for lod in 0..count {
                log::debug!(
                    "  lod {lod}: visible to {:.2}, morph {:.2}..{:.2}",
                    self.visibility_ranges[count - 1 - lod],
                    self.morph_start[lod],
                    self.morph_end[lod]
                );
            }
        }
    }

    /// Deepest tree level the next pass descends to. Clamped to the tree depth.
    /// Takes effect on a pass that has not selected anything yet.
    pub fn set_stop_at_level(&mut self, level: u32) {
        let deepest = self.level_count.saturating_sub(1);
        if level > deepest {
            log::warn!("Stop level {level} is below the deepest tree level, using {deepest}");
        }
        self.stop_at_level = level.min(deepest);
        if self.selected.is_empty() {
            self.min_selected_level = self.stop_at_level;
        }
    }

    pub fn set_sort_by_distance(&mut self, enabled: bool) {
        self.sort_by_distance = enabled;
    }

    pub fn sorts_by_distance(&self) -> bool {
        self.sort_by_distance
    }

    /// Order the selection nearest first. Does nothing unless sorting is enabled.
    pub fn sort_by_distance(&mut self) {
        if self.sort_by_distance {
            self.selected
                .sort_by(|a, b| a.min_distance_to_camera.total_cmp(&b.min_distance_to_camera));
        }
    }

    pub fn selection(&self) -> &[SelectedNode] {
        &self.selected
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Lowest LOD selected this pass. Starts at the stop level, so an empty
    /// selection can report a min above the max.
    pub fn min_selected_level(&self) -> u32 {
        self.min_selected_level
    }

    pub fn max_selected_level(&self) -> u32 {
        self.max_selected_level
    }

    pub fn visibility_ranges(&self) -> &[f64] {
        &self.visibility_ranges
    }

    /// Visibility range of a tree level, 0 past the deepest level
    pub fn visibility_range(&self, level: u32) -> f64 {
        self.visibility_ranges.get(level as usize).copied().unwrap_or(0.0)
    }

    pub fn morph_start(&self) -> &[f64] {
        &self.morph_start
    }

    pub fn morph_end(&self) -> &[f64] {
        &self.morph_end
    }

    /// Morph parameters for a LOD level: (start, 1 / width, end / width, 1 / width).
    ///
    /// A vertex at distance `d` morphs by `1 - clamp(c.z - d * c.w, 0, 1)`,
    /// which is 0 at the morph start and 1 at the (slightly pulled in) range end.
    pub fn morph_consts(&self, lod_level: u32) -> Vec4 {
        let lod = (lod_level as usize).min(self.morph_end.len().saturating_sub(1));
        let (Some(&start), Some(&end)) = (self.morph_start.get(lod), self.morph_end.get(lod)) else {
            return Vec4::ZERO;
        };
        let end = end + (start - end) * MORPH_END_FUDGE;
        let width = end - start;
        Vec4::new(
            start as f32,
            (1.0 / width) as f32,
            (end / width) as f32,
            (1.0 / width) as f32,
        )
    }

    /// The selection ran out of space this pass; some nodes were dropped
    pub fn is_capacity_exhausted(&self) -> bool {
        self.capacity_exhausted
    }

    /// A node selected this pass reaches past its coarser neighbour's morph start
    pub fn vis_dist_too_small(&self) -> bool {
        self.vis_dist_too_small
    }

    /// Selected nodes at one LOD level, in selection order
    pub fn nodes_at_level(&self, lod_level: u32) -> impl Iterator<Item = &SelectedNode> + '_ {
        self.selected.iter().filter(move |s| s.lod_level == lod_level)
    }

    /// Dump the current selection at info level
    pub fn log_selection(&self, tree: &Quadtree) {
        log::info!(
            "Selection: {} nodes, lod {}..={}, camera at ({:.1}, {:.1}, {:.1})",
            self.selected.len(),
            self.min_selected_level,
            self.max_selected_level,
            self.camera_position.x,
            self.camera_position.y,
            self.camera_position.z
        );
        for (i, selected) in self.selected.iter().enumerate() {
            let node = tree.node(selected.node);
            let distance = node.world_aabb().min_distance_sq(self.camera_position).sqrt();
            log::info!(
                "  {i:4}: node {:5} lod {} quadrants {:?} box {} distance {:.2}{}",
                selected.node.index(),
                selected.lod_level,
                selected.quadrants.0,
                node.world_aabb(),
                distance,
                if selected.vis_dist_too_small { " (range too small)" } else { "" }
            );
        }
    }

    pub(crate) fn is_full(&self) -> bool {
        self.selected.len() >= self.capacity
    }

    pub(crate) fn push(&mut self, selected: SelectedNode) {
        self.min_selected_level = self.min_selected_level.min(selected.lod_level);
        self.max_selected_level = self.max_selected_level.max(selected.lod_level);
        self.selected.push(selected);
    }

    pub(crate) fn note_capacity_exhausted(&mut self) {
        if !self.capacity_exhausted {
            log::warn!(
                "Selection capacity of {} nodes reached, remaining terrain is not drawn",
                self.capacity
            );
            self.capacity_exhausted = true;
        }
    }

    pub(crate) fn note_vis_dist_too_small(&mut self, node: &Node) {
        if !self.vis_dist_too_small {
            log::warn!(
                "Visibility range too small for clean morphing at node {} (level {}); \
                 increase the far plane or lower the morph start ratio",
                node.world_aabb(),
                node.level()
            );
            self.vis_dist_too_small = true;
        }
    }

    pub(crate) fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    pub(crate) fn camera_position(&self) -> DVec3 {
        self.camera_position
    }

    pub(crate) fn stop_at_level(&self) -> u32 {
        self.stop_at_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lod::test_view::TestView;

    fn context(near: f64, far: f64) -> SelectionContext {
        SelectionContext::new(&TerrainSettings::default(), &TestView::everything(DVec3::ZERO, near, far))
    }

    #[test]
    fn test_ranges_match_geometric_bands() {
        let ctx = context(1.0, 1000.0);
        let ranges = ctx.visibility_ranges();
        assert_eq!(ranges.len(), 5);

        // 999 split into 1 + 2 + 4 + 8 + 16 = 31 sections
        let section = 999.0 / 31.0;
        assert!((ranges[4] - (1.0 + section)).abs() < 1e-9);
        assert!((ranges[3] - (1.0 + 3.0 * section)).abs() < 1e-9);
        assert!((ranges[0] - 1000.0).abs() < 1e-9);
        assert!(ranges[4] < ranges[0] / 16.0);
    }

    #[test]
    fn test_ranges_strictly_decrease_with_depth() {
        for ratio in [1.5, 2.0, 3.7, 16.0] {
            let settings = TerrainSettings {
                lod_level_count: 8,
                lod_level_distance_ratio: ratio,
                ..Default::default()
            };
            let ctx = SelectionContext::new(&settings, &TestView::everything(DVec3::ZERO, 0.5, 20000.0));
            for pair in ctx.visibility_ranges().windows(2) {
                assert!(pair[0] > pair[1], "ratio {ratio}: {pair:?}");
            }
        }
    }

    #[test]
    fn test_morph_bands_are_contiguous() {
        let ctx = context(1.0, 1000.0);
        let (start, end) = (ctx.morph_start(), ctx.morph_end());

        assert!((start[0] - (1.0 + (end[0] - 1.0) * 0.66)).abs() < 1e-9);
        for lod in 0..5 {
            assert!(start[lod] <= end[lod]);
            assert_eq!(end[lod], ctx.visibility_range(4 - lod as u32));
        }
        for lod in 1..5 {
            // Each band starts where the finer one ends
            assert!(start[lod] >= end[lod - 1]);
            let expected = end[lod - 1] + (end[lod] - end[lod - 1]) * 0.66;
            assert!((start[lod] - expected).abs() < 1e-9);
        }
        assert!((end[4] - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_morph_consts() {
        let ctx = context(1.0, 1000.0);
        let consts = ctx.morph_consts(2);

        let start = ctx.morph_start()[2];
        let end = ctx.morph_end()[2];
        let fudged = end - (end - start) * 0.01;
        let width = fudged - start;

        assert_eq!(consts.x, start as f32);
        assert!((consts.y - (1.0 / width) as f32).abs() < 1e-6);
        assert!((consts.z - (fudged / width) as f32).abs() < 1e-4);
        assert_eq!(consts.y, consts.w);

        // Blend factor is 0 at the morph start and 1 just before the range end
        let blend = |d: f32| (d * consts.y - (consts.z - 1.0)).clamp(0.0, 1.0);
        assert!(blend(start as f32) < 1e-4);
        assert!((blend(fudged as f32) - 1.0).abs() < 1e-4);

        // Levels past the last one use the coarsest band
        assert_eq!(ctx.morph_consts(99), ctx.morph_consts(4));
    }

    #[test]
    fn test_reset_recomputes_only_on_plane_change() {
        let mut ctx = context(1.0, 1000.0);
        let before = ctx.visibility_ranges().to_vec();

        ctx.reset(&TestView::everything(DVec3::new(50.0, 0.0, 0.0), 1.0, 1000.0));
        assert_eq!(ctx.visibility_ranges(), before.as_slice());
        assert_eq!(ctx.camera_position(), DVec3::new(50.0, 0.0, 0.0));

        ctx.reset(&TestView::everything(DVec3::ZERO, 1.0, 2000.0));
        assert!((ctx.visibility_range(0) - 2000.0).abs() < 1e-9);
    }

    #[test]
    fn test_stop_level_is_clamped() {
        let mut ctx = context(1.0, 1000.0);
        assert_eq!(ctx.stop_at_level(), 4);

        ctx.set_stop_at_level(2);
        assert_eq!(ctx.stop_at_level(), 2);
        ctx.reset(&TestView::everything(DVec3::ZERO, 1.0, 1000.0));
        assert_eq!(ctx.min_selected_level(), 2);

        ctx.set_stop_at_level(40);
        assert_eq!(ctx.stop_at_level(), 4);
    }

    #[test]
    fn test_stop_level_change_after_reset() {
        let mut ctx = context(1.0, 1000.0);
        ctx.set_stop_at_level(2);
        ctx.reset(&TestView::everything(DVec3::ZERO, 1.0, 1000.0));
        assert_eq!(ctx.min_selected_level(), 2);

        ctx.set_stop_at_level(4);
        assert_eq!(ctx.min_selected_level(), 4);
        for (id, lod) in [(0, 4), (1, 3)] {
            ctx.push(SelectedNode::new(NodeId(id), lod, QuadrantMask::FULL));
        }
        assert_eq!(ctx.min_selected_level(), 3);

        // A running pass keeps what it has selected
        ctx.set_stop_at_level(4);
        assert_eq!(ctx.min_selected_level(), 3);
    }

    #[test]
    fn test_empty_view_depth_gives_no_range() {
        let ctx = context(50.0, 10.0);
        assert!(ctx.visibility_ranges().iter().all(|&r| r == 50.0));
        assert!(ctx.morph_start().iter().chain(ctx.morph_end()).all(|&d| d == 50.0));

        let ctx = context(-5.0, -1.0);
        assert!(ctx.visibility_ranges().iter().all(|&r| r >= 0.0));
    }

    #[test]
    fn test_settings_without_levels() {
        let settings = TerrainSettings { lod_level_count: 0, ..Default::default() };
        let mut ctx = SelectionContext::new(&settings, &TestView::everything(DVec3::ZERO, 1.0, 1000.0));
        assert!(ctx.visibility_ranges().is_empty());
        assert_eq!(ctx.visibility_range(0), 0.0);
        assert_eq!(ctx.morph_consts(0), Vec4::ZERO);

        ctx.set_stop_at_level(3);
        assert_eq!(ctx.stop_at_level(), 0);
    }

    #[test]
    fn test_push_tracks_levels_and_sorts() {
        let mut ctx = context(1.0, 1000.0);
        for (id, lod, distance) in [(0, 3, 40.0), (1, 1, 5.0), (2, 2, 5.0), (3, 1, 1.0)] {
            let mut selected = SelectedNode::new(NodeId(id), lod, QuadrantMask::FULL);
            selected.min_distance_to_camera = distance;
            ctx.push(selected);
        }
        assert_eq!(ctx.len(), 4);
        assert_eq!(ctx.min_selected_level(), 1);
        assert_eq!(ctx.max_selected_level(), 3);
        assert_eq!(ctx.nodes_at_level(1).count(), 2);

        ctx.sort_by_distance();
        let order: Vec<_> = ctx.selection().iter().map(|s| s.node.index()).collect();
        // Stable: equal distances keep their insertion order
        assert_eq!(order, vec![3, 1, 2, 0]);

        ctx.reset(&TestView::everything(DVec3::ZERO, 1.0, 1000.0));
        assert!(ctx.is_empty());
        assert!(ctx.min_selected_level() > ctx.max_selected_level());
    }

    #[test]
    fn test_sorting_can_be_disabled() {
        let mut ctx = context(1.0, 1000.0);
        ctx.set_sort_by_distance(false);
        for (id, distance) in [(0, 9.0), (1, 3.0)] {
            let mut selected = SelectedNode::new(NodeId(id), 0, QuadrantMask::FULL);
            selected.min_distance_to_camera = distance;
            ctx.push(selected);
        }
        ctx.sort_by_distance();
        assert_eq!(ctx.selection()[0].node, NodeId(0));
    }
}

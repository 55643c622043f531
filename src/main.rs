//! CDLOD demo: builds a terrain quadtree and flies a camera over it,
//! logging what the LOD selection would hand to a renderer each frame.
//!
//! Usage: cargo run --release -- [OPTIONS]
//!
//! Options:
//!   --heightmap <PNG>       Load a 16-bit grayscale heightmap instead of generating one
//!   --size <N>              Generated raster size in cells (default: 4096)
//!   --seed <SEED>           Noise seed for the generated raster (default: 12345)
//!   --settings <JSON>       Terrain settings file (default: built-in settings)
//!   --save-settings <JSON>  Write the settings in use to a file
//!   --export <PNG>          Save the heightmap in use as a 16-bit PNG
//!   --frames <N>            Number of frames to simulate (default: 240)
//!   --far <DIST>            Camera far plane (default: 3000)
//!   --print                 Dump the full selection of the last frame

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use cdlod::core::{Camera, DVec3, Result, logging};
use cdlod::lod::{DrawList, GridMesh, Quadtree, RenderStats, SelectionContext};
use cdlod::terrain::{Heightmap, RasterSource, TerrainGenerator, TerrainParams, TerrainSettings};

fn main() -> ExitCode {
    logging::init();

    let args: Vec<String> = std::env::args().collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<()> {
    let settings = match parse_path_arg(args, "--settings") {
        Some(path) => TerrainSettings::load(&path)?,
        None => TerrainSettings::default(),
    };
    if let Some(path) = parse_path_arg(args, "--save-settings") {
        settings.save(&path)?;
        log::info!("Settings written to {}", path.display());
    }

    let heightmap = match parse_path_arg(args, "--heightmap") {
        Some(path) => Heightmap::load_png(&path)?,
        None => {
            let size = parse_u32_arg(args, "--size").unwrap_or(4096);
            let seed = parse_u32_arg(args, "--seed").unwrap_or(12345);
            TerrainGenerator::new(TerrainParams { seed, ..Default::default() }).generate(size, size)
        }
    };
    if let Some(path) = parse_path_arg(args, "--export") {
        heightmap.save_png(&path)?;
        log::info!("Heightmap written to {}", path.display());
    }

    let tree = Quadtree::build(&heightmap, &settings)?;
    let mesh = GridMesh::for_settings(&settings)?;

    let frames = parse_u32_arg(args, "--frames").unwrap_or(240).max(1);
    let far = parse_f64_arg(args, "--far").unwrap_or(3000.0);
    let flight = Flight::over(&heightmap, &settings);

    let mut camera = Camera::new(DVec3::ZERO, 60.0, 16.0 / 9.0);
    camera.set_far_plane(far);
    let mut context = SelectionContext::new(&settings, &camera);

    let mut totals = RenderStats::default();
    let mut draw_calls = 0usize;
    let mut selected_total = 0usize;
    let mut exhausted_frames = 0u32;
    let mut too_small_frames = 0u32;
    let mut select_time = 0.0f64;

    for frame in 0..frames {
        let (position, target) = flight.at(frame as f64 / frames as f64);
        camera.set_position_and_target(position, target, DVec3::Y);

        let start = Instant::now();
        tree.select_frame(&mut context, &camera);
        let list = DrawList::build(&tree, &context);
        select_time += start.elapsed().as_secs_f64();

        let stats = list.stats();
        let frame_draws: usize = list.index_ranges(&mesh).map(|(_, ranges)| ranges.len()).sum();
        draw_calls += frame_draws;
        totals.patches += stats.patches;
        totals.triangles += stats.triangles;
        selected_total += context.len();
        exhausted_frames += u32::from(context.is_capacity_exhausted());
        too_small_frames += u32::from(context.vis_dist_too_small());

        if frame % 60 == 0 {
            log::info!(
                "Frame {frame}: camera ({:.0}, {:.0}, {:.0}), {} nodes in {} level groups, {} patches, {frame_draws} draw calls, {} triangles",
                position.x,
                position.y,
                position.z,
                context.len(),
                list.levels().count(),
                stats.patches,
                stats.triangles
            );
        }
        for run in list.levels() {
            let lod = run[0].lod_level;
            let consts = context.morph_consts(lod);
            log::debug!(
                "  lod {lod}: {} nodes, morph consts ({:.2}, {:.5}, {:.3}, {:.5})",
                run.len(),
                consts.x,
                consts.y,
                consts.z,
                consts.w
            );
        }
    }

    if args.iter().any(|a| a == "--print") {
        context.log_selection(&tree);
    }

    let n = frames as f64;
    log::info!(
        "{frames} frames: {:.1} nodes, {:.1} patches, {:.1} draw calls, {:.0} triangles per frame on average, {:.3}ms selection",
        selected_total as f64 / n,
        totals.patches as f64 / n,
        draw_calls as f64 / n,
        totals.triangles as f64 / n,
        select_time * 1000.0 / n
    );
    if exhausted_frames > 0 {
        log::warn!(
            "Selection capacity of {} hit in {exhausted_frames} frames",
            context.capacity()
        );
    }
    if too_small_frames > 0 {
        log::warn!("Visibility range too small for clean morphing in {too_small_frames} frames");
    }
    Ok(())
}

/// Circular camera path above the terrain
struct Flight {
    center: DVec3,
    radius: f64,
    altitude: f64,
}

impl Flight {
    fn over(heightmap: &Heightmap, settings: &TerrainSettings) -> Self {
        let extent = heightmap.extent();
        let [scale_x, scale_z] = settings.raster_to_world;
        let [offset_x, offset_y, offset_z] = settings.world_offset;
        let width = extent.x as f64 * scale_x;
        let depth = extent.y as f64 * scale_z;
        let (_, max_height) = heightmap.height_range();

        Self {
            center: DVec3::new(offset_x + width * 0.5, 0.0, offset_z + depth * 0.5),
            radius: width.min(depth) * 0.35,
            altitude: offset_y + max_height as f64 * settings.height_factor + 40.0,
        }
    }

    /// Camera position and look target at `t` in [0, 1) of one lap
    fn at(&self, t: f64) -> (DVec3, DVec3) {
        let angle = t * std::f64::consts::TAU;
        let position = self.center + DVec3::new(angle.cos(), 0.0, angle.sin()) * self.radius;
        let ahead = angle + 0.3;
        let target = self.center + DVec3::new(ahead.cos(), 0.0, ahead.sin()) * self.radius;
        (
            DVec3::new(position.x, self.altitude, position.z),
            DVec3::new(target.x, self.altitude * 0.5, target.z),
        )
    }
}

fn parse_path_arg(args: &[String], flag: &str) -> Option<PathBuf> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}

fn parse_u32_arg(args: &[String], flag: &str) -> Option<u32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_f64_arg(args: &[String], flag: &str) -> Option<f64> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

//! Noise-based procedural heightmap generation

use noise::{Fbm, MultiFractal, NoiseFn, Perlin};

use super::heightmap::Heightmap;

/// Parameters controlling terrain generation
#[derive(Clone, Debug)]
pub struct TerrainParams {
    pub seed: u32,
    pub scale: f32,        // Horizontal scale in raster cells (larger = smoother)
    pub height_scale: f32, // Raw raster value of the highest possible point
    pub octaves: u32,      // FBM octaves (detail levels)
    pub persistence: f32,  // FBM persistence (0.5 typical)
    pub lacunarity: f32,   // FBM lacunarity (2.0 typical)
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            seed: 12345,
            scale: 600.0,
            height_scale: 400.0,
            octaves: 6,
            persistence: 0.5,
            lacunarity: 2.0,
        }
    }
}

/// Procedural heightmap generator using fractal Brownian motion (FBM)
pub struct TerrainGenerator {
    params: TerrainParams,
    noise: Fbm<Perlin>,
}

impl TerrainGenerator {
    /// Create a new terrain generator with the given parameters
    pub fn new(params: TerrainParams) -> Self {
        let noise = Fbm::<Perlin>::new(params.seed)
            .set_octaves(params.octaves as usize)
            .set_persistence(params.persistence as f64)
            .set_lacunarity(params.lacunarity as f64);

        Self { params, noise }
    }

    /// Get terrain parameters
    pub fn params(&self) -> &TerrainParams {
        &self.params
    }

    /// Raw height at raster position (x, z), in [0, height_scale]
    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        let nx = (x / self.params.scale) as f64;
        let nz = (z / self.params.scale) as f64;

        // Noise value in range [-1, 1]
        let noise_value = self.noise.get([nx, nz]).clamp(-1.0, 1.0);

        let normalized = (noise_value + 1.0) / 2.0;
        (normalized * self.params.height_scale as f64) as f32
    }

    /// Sample a full raster
    pub fn generate(&self, width: u32, height: u32) -> Heightmap {
        let start = std::time::Instant::now();
        let heightmap = Heightmap::from_fn(width, height, |x, z| self.height_at(x as f32, z as f32));
        log::info!(
            "Generated {}x{} heightmap (seed {}) in {:.2}s",
            width,
            height,
            self.params.seed,
            start.elapsed().as_secs_f32()
        );
        heightmap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::heightmap::RasterSource;

    #[test]
    fn test_heights_stay_in_range() {
        let generator = TerrainGenerator::new(TerrainParams { height_scale: 100.0, ..Default::default() });
        let map = generator.generate(64, 64);
        let (min, max) = map.height_range();
        assert!(min >= 0.0);
        assert!(max <= 100.0);
        assert!(max > min, "terrain should not be flat");
    }

    #[test]
    fn test_same_seed_same_terrain() {
        let a = TerrainGenerator::new(TerrainParams::default()).generate(32, 16);
        let b = TerrainGenerator::new(TerrainParams::default()).generate(32, 16);
        assert_eq!(a.heights(), b.heights());
        assert_eq!(a.extent(), b.extent());
    }

    #[test]
    fn test_sample_matches_raster() {
        let generator = TerrainGenerator::new(TerrainParams::default());
        let map = generator.generate(16, 16);
        assert_eq!(map.height_at(5, 9), generator.height_at(5.0, 9.0));
    }
}

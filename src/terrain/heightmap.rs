//! Heightmap rasters and the raster source interface used by the quadtree build

use std::path::Path;

use image::{ImageBuffer, Luma};

use crate::core::error::Error;
use crate::core::types::{Result, UVec2};

/// Read access to a height raster.
///
/// Heights are raw raster values; the quadtree applies the height factor
/// when it turns them into world-space bounding boxes.
pub trait RasterSource {
    /// Raster size in cells (x = width, y = height along z)
    fn extent(&self) -> UVec2;

    /// Height at a raster cell. Callers stay within [`extent`](Self::extent).
    fn height_at(&self, x: u32, z: u32) -> f32;

    /// Min and max height over the `w` x `h` cells starting at (x, z).
    ///
    /// An empty area yields `(INFINITY, NEG_INFINITY)`.
    fn min_max_height_in_area(&self, x: u32, z: u32, w: u32, h: u32) -> (f32, f32) {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for j in z..z + h {
            for i in x..x + w {
                let value = self.height_at(i, j);
                min = min.min(value);
                max = max.max(value);
            }
        }
        (min, max)
    }
}

/// In-memory height raster, row major (x varies fastest)
#[derive(Clone, Debug)]
pub struct Heightmap {
    width: u32,
    height: u32,
    heights: Vec<f32>,
}

impl Heightmap {
    /// Wrap raw height values
    pub fn new(width: u32, height: u32, heights: Vec<f32>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::Heightmap(format!("empty raster {width}x{height}")));
        }
        let expected = width as usize * height as usize;
        if heights.len() != expected {
            return Err(Error::Heightmap(format!(
                "{} height values for a {width}x{height} raster, expected {expected}",
                heights.len()
            )));
        }
        Ok(Self { width, height, heights })
    }

    /// Raster with the same height everywhere
    pub fn flat(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            heights: vec![value; width as usize * height as usize],
        }
    }

    /// Build a raster by evaluating `f(x, z)` for every cell
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> f32) -> Self {
        let mut heights = Vec::with_capacity(width as usize * height as usize);
        for z in 0..height {
            for x in 0..width {
                heights.push(f(x, z));
            }
        }
        Self { width, height, heights }
    }

    /// Load a grayscale PNG. 16-bit images keep their full range (0..=65535),
    /// 8-bit images are widened by the image crate.
    pub fn load_png(path: &Path) -> Result<Self> {
        let image = image::open(path)?;
        if image.color().channel_count() != 1 {
            log::warn!(
                "Heightmap '{}' is not a monochrome image ({:?}), using its luminance",
                path.display(),
                image.color()
            );
        }
        let luma = image.into_luma16();
        let (width, height) = luma.dimensions();
        let heights = luma.into_raw().into_iter().map(f32::from).collect();
        let heightmap = Self::new(width, height, heights)?;

        let (min, max) = heightmap.height_range();
        log::info!(
            "Heightmap '{}' loaded: {}x{}, heights {:.1}..{:.1}, {:.0}kB",
            path.display(),
            width,
            height,
            min,
            max,
            heightmap.heights.len() as f32 * std::mem::size_of::<f32>() as f32 / 1024.0
        );
        Ok(heightmap)
    }

    /// Save as a 16-bit grayscale PNG. Heights are rounded and clamped to 0..=65535.
    pub fn save_png(&self, path: &Path) -> Result<()> {
        let raw: Vec<u16> = self
            .heights
            .iter()
            .map(|h| h.round().clamp(0.0, u16::MAX as f32) as u16)
            .collect();
        let image: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_raw(self.width, self.height, raw).ok_or_else(|| {
                Error::Heightmap(format!("cannot encode {}x{} raster", self.width, self.height))
            })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        image.save(path)?;
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw height values, row major
    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    /// Lowest and highest value of the whole raster
    pub fn height_range(&self) -> (f32, f32) {
        self.min_max_height_in_area(0, 0, self.width, self.height)
    }
}

impl RasterSource for Heightmap {
    fn extent(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    fn height_at(&self, x: u32, z: u32) -> f32 {
        self.heights[x as usize + z as usize * self.width as usize]
    }

    fn min_max_height_in_area(&self, x: u32, z: u32, w: u32, h: u32) -> (f32, f32) {
        let row = self.width as usize;
        let x_start = (x as usize).min(row);
        let x_end = ((x + w) as usize).min(row);
        let z_end = (z + h).min(self.height);

        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for j in z..z_end {
            let start = j as usize * row;
            for &value in &self.heights[start + x_start..start + x_end] {
                min = min.min(value);
                max = max.max(value);
            }
        }
        (min, max)
    }
}

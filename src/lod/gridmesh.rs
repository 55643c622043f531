//! Grid mesh drawn for every selected node.
//!
//! A flat `(d + 1)²` vertex grid over the unit square in x and z, scaled and
//! displaced per node by the vertex stage. Indices are laid out quadrant by
//! quadrant so a node that only covers part of its area can draw the
//! matching sub-ranges.

use std::ops::Range;

use bytemuck::{Pod, Zeroable};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::terrain::config::TerrainSettings;

use super::node::Quadrant;

/// Largest supported grid dimension
pub const MAX_GRIDMESH_DIMENSION: u32 = 4096;

/// Grid vertex, y is always 0 until displaced by the heightmap
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GridVertex {
    pub position: [f32; 3],
}

/// CPU side grid mesh with per-quadrant index ranges
#[derive(Clone, Debug)]
pub struct GridMesh {
    dimension: u32,
    vertices: Vec<GridVertex>,
    indices: Vec<u32>,
    /// End of each quadrant's index run, in `Quadrant::ALL` order
    quadrant_ends: [u32; 4],
}

impl GridMesh {
    /// Build a grid of `dimension` quads per side. The dimension must be even
    /// so the quadrants split on a vertex row.
    pub fn new(dimension: u32) -> Result<Self> {
        if dimension == 0 || dimension % 2 != 0 || dimension > MAX_GRIDMESH_DIMENSION {
            let message = format!(
                "grid mesh dimension must be even and between 2 and {MAX_GRIDMESH_DIMENSION}, got {dimension}"
            );
            log::error!("{message}");
            return Err(Error::Config(message));
        }

        let row = dimension + 1;
        let scale = 1.0 / dimension as f32;
        let vertices = (0..row)
            .flat_map(|z| (0..row).map(move |x| (x, z)))
            .map(|(x, z)| GridVertex { position: [x as f32 * scale, 0.0, z as f32 * scale] })
            .collect();

        let half = dimension / 2;
        let mut indices = Vec::with_capacity((dimension * dimension * 6) as usize);
        let mut quadrant_ends = [0u32; 4];
        for quadrant in Quadrant::ALL {
            let (x0, z0) = match quadrant {
                Quadrant::TopLeft => (0, 0),
                Quadrant::TopRight => (half, 0),
                Quadrant::BottomLeft => (0, half),
                Quadrant::BottomRight => (half, half),
            };
            for z in z0..z0 + half {
                for x in x0..x0 + half {
                    let top_left = x + row * z;
                    let bottom_left = top_left + row;
                    indices.extend_from_slice(&[
                        top_left,
                        bottom_left,
                        top_left + 1,
                        top_left + 1,
                        bottom_left,
                        bottom_left + 1,
                    ]);
                }
            }
            quadrant_ends[quadrant.index()] = indices.len() as u32;
        }

        log::info!(
            "Grid mesh of dimension {dimension} created: {} vertices, {} indices",
            row * row,
            indices.len()
        );
        Ok(Self { dimension, vertices, indices, quadrant_ends })
    }

    /// Grid mesh matching the leaf size and render resolution of `settings`
    pub fn for_settings(settings: &TerrainSettings) -> Result<Self> {
        Self::new(settings.gridmesh_dimension())
    }

    pub fn dimension(&self) -> u32 {
        self.dimension
    }

    pub fn vertices(&self) -> &[GridVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Indices of one quadrant's sub-mesh
    pub fn submesh_index_count(&self) -> u32 {
        self.quadrant_ends[0]
    }

    /// Index range drawing one quadrant of the grid
    pub fn quadrant_range(&self, quadrant: Quadrant) -> Range<u32> {
        let i = quadrant.index();
        let start = if i == 0 { 0 } else { self.quadrant_ends[i - 1] };
        start..self.quadrant_ends[i]
    }

    pub fn quadrant_indices(&self, quadrant: Quadrant) -> &[u32] {
        let range = self.quadrant_range(quadrant);
        &self.indices[range.start as usize..range.end as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let mesh = GridMesh::new(16).unwrap();
        assert_eq!(mesh.vertices().len(), 17 * 17);
        assert_eq!(mesh.index_count(), 16 * 16 * 6);
        assert_eq!(mesh.submesh_index_count(), 8 * 8 * 6);
        assert!(mesh.indices().iter().all(|&i| i < 17 * 17));
        assert_eq!(std::mem::size_of::<GridVertex>(), 12);
    }

    #[test]
    fn test_quadrant_ranges_are_contiguous() {
        let mesh = GridMesh::new(8).unwrap();
        let mut next = 0;
        for quadrant in Quadrant::ALL {
            let range = mesh.quadrant_range(quadrant);
            assert_eq!(range.start, next);
            assert_eq!(range.len() as u32, mesh.submesh_index_count());
            next = range.end;
        }
        assert_eq!(next, mesh.index_count());
    }

    #[test]
    fn test_vertices_span_unit_square() {
        let mesh = GridMesh::new(4).unwrap();
        let vertices = mesh.vertices();
        assert_eq!(vertices[0].position, [0.0, 0.0, 0.0]);
        assert_eq!(vertices[4].position, [1.0, 0.0, 0.0]);
        assert_eq!(vertices[24].position, [1.0, 0.0, 1.0]);
        assert!(vertices.iter().all(|v| v.position[1] == 0.0));
    }

    #[test]
    fn test_quadrants_stay_in_their_corner() {
        let mesh = GridMesh::new(8).unwrap();
        for quadrant in Quadrant::ALL {
            let (high_x, high_z) = (quadrant.index() & 1 != 0, quadrant.index() & 2 != 0);
            for &i in mesh.quadrant_indices(quadrant) {
                let [x, _, z] = mesh.vertices()[i as usize].position;
                assert!(if high_x { x >= 0.5 } else { x <= 0.5 }, "{quadrant:?} vertex {i}");
                assert!(if high_z { z >= 0.5 } else { z <= 0.5 }, "{quadrant:?} vertex {i}");
            }
        }
    }

    #[test]
    fn test_triangles_wind_consistently() {
        let mesh = GridMesh::new(4).unwrap();
        let vertices = mesh.vertices();
        for triangle in mesh.indices().chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|k| vertices[triangle[k] as usize].position);
            // y of (b - a) x (c - a)
            let cross_y = (b[2] - a[2]) * (c[0] - a[0]) - (b[0] - a[0]) * (c[2] - a[2]);
            assert!(cross_y > 0.0, "{triangle:?}");
        }
    }

    #[test]
    fn test_rejects_odd_or_zero_dimension() {
        assert!(matches!(GridMesh::new(0), Err(Error::Config(_))));
        assert!(matches!(GridMesh::new(7), Err(Error::Config(_))));
        assert!(GridMesh::new(MAX_GRIDMESH_DIMENSION * 2).is_err());

        let settings = TerrainSettings::default();
        assert_eq!(GridMesh::for_settings(&settings).unwrap().dimension(), 64);
    }
}

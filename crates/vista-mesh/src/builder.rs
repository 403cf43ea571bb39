//! Chunk tessellation: a skirted height grid over one quadtree node.
//!
//! The grid has `resolution + 2` vertices per side. The outer ring is a skirt
//! hanging below the chunk edge; it hides the cracks that appear where
//! neighbouring chunks of different resolution meet.

use glam::{DVec3, Vec3};
use tracing::trace;
use vista_config::MeshConfig;
use vista_field::HeightSource;
use vista_math::Aabb;

use crate::collision::CollisionHeightfield;
use crate::vertex::{ChunkMesh, TerrainVertex};

/// Why a chunk could not be built. No partial output exists on error.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BuildError {
    #[error("chunk width must be positive and finite, got {0}")]
    InvalidWidth(f64),

    #[error("chunk origin ({x}, {y}) is not finite")]
    InvalidOrigin { x: f64, y: f64 },

    #[error("mesh.{name} must be at least 2, got {value}")]
    InvalidResolution { name: &'static str, value: u32 },

    #[error("height source returned {height} at ({x}, {y})")]
    NonFiniteHeight { x: f64, y: f64, height: f64 },
}

/// Square world region to tessellate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChunkRequest {
    /// Minimum X of the chunk.
    pub x: f64,
    /// Minimum Y of the chunk.
    pub y: f64,
    pub width: f64,
    pub build_collision: bool,
}

impl ChunkRequest {
    /// Request covering the XY footprint of `bounds`.
    pub fn from_bounds(bounds: &Aabb, build_collision: bool) -> Self {
        Self {
            x: bounds.min.x,
            y: bounds.min.y,
            width: bounds.width(),
            build_collision,
        }
    }

    /// World position of the chunk's local origin.
    pub fn origin(&self) -> DVec3 {
        DVec3::new(self.x, self.y, 0.0)
    }
}

/// Output of a successful build.
#[derive(Clone, Debug)]
pub struct ChunkBuild {
    pub mesh: ChunkMesh,
    pub collision: Option<CollisionHeightfield>,
    /// Object-space bounds of every emitted vertex, skirts included.
    pub bounds: Aabb,
    /// World position of the local origin.
    pub origin: DVec3,
    /// The flatness probe found a constant height.
    pub flat: bool,
}

impl ChunkBuild {
    /// Bounds in world space.
    pub fn world_bounds(&self) -> Aabb {
        self.bounds.translated(self.origin)
    }
}

/// Finite-checked height queries relative to the chunk origin.
struct Sampler<'a, S: ?Sized> {
    source: &'a S,
    x: f64,
    y: f64,
}

impl<S: HeightSource + ?Sized> Sampler<'_, S> {
    fn at(&self, local_x: f64, local_y: f64) -> Result<f64, BuildError> {
        let x = self.x + local_x;
        let y = self.y + local_y;
        let height = self.source.height(x, y);
        if height.is_finite() {
            Ok(height)
        } else {
            Err(BuildError::NonFiniteHeight { x, y, height })
        }
    }
}

/// Tessellate one chunk of `source`.
///
/// Pure function of its inputs; runs on build workers.
pub fn build_chunk<S>(
    source: &S,
    request: &ChunkRequest,
    config: &MeshConfig,
) -> Result<ChunkBuild, BuildError>
where
    S: HeightSource + ?Sized,
{
    validate(request, config)?;

    let width = request.width;
    let sampler = Sampler {
        source,
        x: request.x,
        y: request.y,
    };

    let flat = probe_flat(&sampler, width, config.quick_sample_resolution as usize)?;
    let res = if flat {
        config.flat_resolution
    } else {
        config.full_resolution
    } as usize;
    let quad = width / (res - 1) as f64;

    let mut heights = Vec::with_capacity(res * res);
    for row in 0..res {
        for col in 0..res {
            heights.push(sampler.at(col as f64 * quad, row as f64 * quad)?);
        }
    }
    let grid = Grid {
        heights: &heights,
        res,
    };

    let mut normals = Vec::with_capacity(res * res);
    for row in 0..res {
        for col in 0..res {
            normals.push(grid.normal(&sampler, col, row, quad)?);
        }
    }

    let skirt_depth = config.skirt_depth_fraction * width;
    let n = res + 2;
    let mut vertices = Vec::with_capacity(n * n);
    let mut min_z = f64::INFINITY;
    let mut max_z = f64::NEG_INFINITY;

    for gr in 0..n {
        for gc in 0..n {
            let col = gc.saturating_sub(1).min(res - 1);
            let row = gr.saturating_sub(1).min(res - 1);
            let skirt = gc == 0 || gr == 0 || gc == n - 1 || gr == n - 1;

            let mut z = grid.at(col, row);
            let mut morph = 0.0;
            if skirt {
                z -= skirt_depth;
            } else if config.geomorph {
                morph = grid.morph_delta(col, row);
            }
            let position = Vec3::new((col as f64 * quad) as f32, (row as f64 * quad) as f32, z as f32);
            min_z = min_z.min(position.z as f64);
            max_z = max_z.max(position.z as f64);

            vertices.push(TerrainVertex::new(
                position,
                normals[row * res + col],
                skirt,
                morph as f32,
            ));
        }
    }

    let mut indices = Vec::with_capacity((n - 1) * (n - 1) * 6);
    for gr in 0..n - 1 {
        for gc in 0..n - 1 {
            let i0 = (gr * n + gc) as u32;
            let i1 = i0 + 1;
            let i2 = i0 + n as u32;
            let i3 = i2 + 1;
            indices.extend_from_slice(&[i0, i1, i3, i0, i3, i2]);
        }
    }

    let collision = if request.build_collision {
        Some(build_collision(&sampler, width, config.collision_resolution)?)
    } else {
        None
    };

    trace!(
        x = request.x,
        y = request.y,
        width,
        resolution = res,
        flat,
        collision = collision.is_some(),
        "chunk tessellated"
    );

    Ok(ChunkBuild {
        mesh: ChunkMesh {
            vertices,
            indices,
            resolution: res as u32,
        },
        collision,
        bounds: Aabb::new(DVec3::new(0.0, 0.0, min_z), DVec3::new(width, width, max_z)),
        origin: request.origin(),
        flat,
    })
}

fn validate(request: &ChunkRequest, config: &MeshConfig) -> Result<(), BuildError> {
    if !(request.width.is_finite() && request.width > 0.0) {
        return Err(BuildError::InvalidWidth(request.width));
    }
    if !(request.x.is_finite() && request.y.is_finite()) {
        return Err(BuildError::InvalidOrigin {
            x: request.x,
            y: request.y,
        });
    }
    let grids = [
        ("quick_sample_resolution", config.quick_sample_resolution),
        ("flat_resolution", config.flat_resolution),
        ("full_resolution", config.full_resolution),
        ("collision_resolution", config.collision_resolution),
    ];
    for (name, value) in grids {
        if value < 2 {
            return Err(BuildError::InvalidResolution { name, value });
        }
    }
    Ok(())
}

/// True if every probe sample is exactly equal.
fn probe_flat<S: HeightSource + ?Sized>(
    sampler: &Sampler<'_, S>,
    width: f64,
    samples: usize,
) -> Result<bool, BuildError> {
    let step = width / (samples - 1) as f64;
    let first = sampler.at(0.0, 0.0)?;
    for row in 0..samples {
        for col in 0..samples {
            if sampler.at(col as f64 * step, row as f64 * step)? != first {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

fn build_collision<S: HeightSource + ?Sized>(
    sampler: &Sampler<'_, S>,
    width: f64,
    resolution: u32,
) -> Result<CollisionHeightfield, BuildError> {
    let res = resolution as usize;
    let step = width / (res - 1) as f64;
    let mut heights = Vec::with_capacity(res * res);
    for row in 0..res {
        for col in 0..res {
            heights.push(sampler.at(col as f64 * step, row as f64 * step)? as f32);
        }
    }
    Ok(CollisionHeightfield::new(resolution, width, heights))
}

struct Grid<'a> {
    heights: &'a [f64],
    res: usize,
}

impl Grid<'_> {
    fn at(&self, col: usize, row: usize) -> f64 {
        self.heights[row * self.res + col]
    }

    fn is_edge(&self, col: usize, row: usize) -> bool {
        col == 0 || row == 0 || col == self.res - 1 || row == self.res - 1
    }

    /// Strictly interior vertices use the grid; edge vertices ask the source
    /// so both chunks sharing the edge agree.
    fn normal<S: HeightSource + ?Sized>(
        &self,
        sampler: &Sampler<'_, S>,
        col: usize,
        row: usize,
        quad: f64,
    ) -> Result<Vec3, BuildError> {
        let (dzdx, dzdy) = if self.is_edge(col, row) {
            let x = col as f64 * quad;
            let y = row as f64 * quad;
            (
                (sampler.at(x + quad, y)? - sampler.at(x - quad, y)?) / (2.0 * quad),
                (sampler.at(x, y + quad)? - sampler.at(x, y - quad)?) / (2.0 * quad),
            )
        } else {
            (
                (self.at(col + 1, row) - self.at(col - 1, row)) / (2.0 * quad),
                (self.at(col, row + 1) - self.at(col, row - 1)) / (2.0 * quad),
            )
        };
        Ok(DVec3::new(-dzdx, -dzdy, 1.0).normalize().as_vec3())
    }

    /// Height change that takes this vertex onto the grid with every other
    /// vertex dropped. Zero for vertices the coarser grid keeps and for edges.
    fn morph_delta(&self, col: usize, row: usize) -> f64 {
        if self.is_edge(col, row) {
            return 0.0;
        }
        let coarse = match (col % 2, row % 2) {
            (0, 0) => return 0.0,
            (1, 0) => (self.at(col - 1, row) + self.at(col + 1, row)) * 0.5,
            (0, _) => (self.at(col, row - 1) + self.at(col, row + 1)) * 0.5,
            _ => {
                (self.at(col - 1, row - 1)
                    + self.at(col + 1, row - 1)
                    + self.at(col - 1, row + 1)
                    + self.at(col + 1, row + 1))
                    * 0.25
            }
        };
        coarse - self.at(col, row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MeshConfig {
        MeshConfig {
            quick_sample_resolution: 8,
            flat_resolution: 5,
            full_resolution: 17,
            collision_resolution: 9,
            ..Default::default()
        }
    }

    fn request(x: f64, y: f64, width: f64) -> ChunkRequest {
        ChunkRequest {
            x,
            y,
            width,
            build_collision: false,
        }
    }

    #[test]
    fn test_flat_chunk_uses_flat_resolution() {
        let build = build_chunk(&|_: f64, _: f64| 10.0, &request(0.0, 0.0, 64.0), &config()).unwrap();
        assert!(build.flat);
        assert_eq!(build.mesh.resolution, 5);
        assert_eq!(build.mesh.vertices.len(), 7 * 7);
        assert_eq!(build.mesh.indices.len(), 6 * 6 * 6);
    }

    #[test]
    fn test_sloped_chunk_uses_full_resolution() {
        let build = build_chunk(&|x: f64, _: f64| x * 0.5, &request(0.0, 0.0, 64.0), &config()).unwrap();
        assert!(!build.flat);
        assert_eq!(build.mesh.resolution, 17);
        assert_eq!(build.mesh.vertices.len(), 19 * 19);
        let count = build.mesh.vertices.len() as u32;
        assert!(build.mesh.indices.iter().all(|&i| i < count));
    }

    #[test]
    fn test_positions_are_chunk_local() {
        let build = build_chunk(&|x: f64, y: f64| x + y, &request(1000.0, -500.0, 32.0), &config()).unwrap();
        for v in &build.mesh.vertices {
            assert!((0.0..=32.0).contains(&v.position[0]));
            assert!((0.0..=32.0).contains(&v.position[1]));
        }
        assert_eq!(build.origin, DVec3::new(1000.0, -500.0, 0.0));
    }

    #[test]
    fn test_skirt_hangs_below_edge() {
        let width = 64.0;
        let build = build_chunk(&|x: f64, y: f64| (x * 0.1).sin() * 5.0 + y * 0.2, &request(0.0, 0.0, width), &config())
            .unwrap();
        let depth = (MeshConfig::default().skirt_depth_fraction * width) as f32;
        let n = 19;
        let verts = &build.mesh.vertices;

        let skirts = verts.iter().filter(|v| v.is_skirt()).count();
        assert_eq!(skirts, n * n - 17 * 17);

        // Left skirt column hangs from the first interior column.
        for gr in 1..n - 1 {
            let skirt = verts[gr * n];
            let edge = verts[gr * n + 1];
            assert!(skirt.is_skirt());
            assert!(!edge.is_skirt());
            assert_eq!(skirt.position[0], edge.position[0]);
            assert_eq!(skirt.position[1], edge.position[1]);
            assert!((edge.position[2] - skirt.position[2] - depth).abs() < 1e-3);
            assert_eq!(skirt.normal[..3], edge.normal[..3]);
        }
    }

    #[test]
    fn test_planar_normals() {
        let build = build_chunk(&|x: f64, _: f64| x, &request(0.0, 0.0, 64.0), &config()).unwrap();
        let expected = Vec3::new(-1.0, 0.0, 1.0).normalize();
        for v in &build.mesh.vertices {
            let n = v.normal_f32();
            assert!((n - expected).length() < 0.02, "normal {n} at {:?}", v.position);
        }
    }

    #[test]
    fn test_edge_normals_match_across_neighbours() {
        let source = |x: f64, y: f64| (x * 0.1).sin() * 10.0 + y * y * 0.01;
        let left = build_chunk(&source, &request(0.0, 0.0, 64.0), &config()).unwrap();
        let right = build_chunk(&source, &request(64.0, 0.0, 64.0), &config()).unwrap();
        let n = 19;
        for gr in 1..n - 1 {
            let a = left.mesh.vertices[gr * n + (n - 2)];
            let b = right.mesh.vertices[gr * n + 1];
            assert_eq!(a.position[1], b.position[1]);
            assert_eq!(a.normal, b.normal);
        }
    }

    #[test]
    fn test_geomorph_deltas() {
        let source = |x: f64, _: f64| x * x;
        let build = build_chunk(&source, &request(0.0, 0.0, 64.0), &config()).unwrap();
        let n = 19;
        let quad = 4.0_f32;
        let vertex = |col: usize, row: usize| build.mesh.vertices[(row + 1) * n + col + 1];

        // Odd column, even row: midpoint of a parabola overshoots by quad².
        assert!((vertex(3, 2).morph_delta - quad * quad).abs() < 1e-2);
        assert_eq!(vertex(2, 2).morph_delta, 0.0);
        // Odd row only: the surface is constant along Y.
        assert!(vertex(2, 3).morph_delta.abs() < 1e-3);
        // Edges and skirts stay put.
        assert_eq!(vertex(0, 3).morph_delta, 0.0);
        assert_eq!(vertex(3, 16).morph_delta, 0.0);
        assert!(build.mesh.vertices.iter().filter(|v| v.is_skirt()).all(|v| v.morph_delta == 0.0));

        let static_config = MeshConfig {
            geomorph: false,
            ..config()
        };
        let build = build_chunk(&source, &request(0.0, 0.0, 64.0), &static_config).unwrap();
        assert!(build.mesh.vertices.iter().all(|v| v.morph_delta == 0.0));
    }

    #[test]
    fn test_collision_heightfield() {
        let source = |x: f64, y: f64| x - y;
        let mut req = request(100.0, 200.0, 64.0);
        assert!(build_chunk(&source, &req, &config()).unwrap().collision.is_none());

        req.build_collision = true;
        let build = build_chunk(&source, &req, &config()).unwrap();
        let collision = build.collision.unwrap();
        assert_eq!(collision.resolution(), 9);
        assert_eq!(collision.heights().len(), 81);
        assert_eq!(collision.spacing(), 8.0);
        assert_eq!(collision.height_at(0, 0), -100.0);
        assert_eq!(collision.height_at(8, 0), -36.0);
        assert_eq!(collision.height_at(0, 8), -164.0);
        assert_eq!(collision.height_range(), (-164.0, -36.0));
    }

    #[test]
    fn test_bounds_include_skirts() {
        let width = 64.0;
        let build = build_chunk(&|x: f64, _: f64| x, &request(0.0, 0.0, width), &config()).unwrap();
        let depth = MeshConfig::default().skirt_depth_fraction * width;
        assert!((build.bounds.min.z + depth).abs() < 1e-5);
        assert_eq!(build.bounds.max.z, 64.0);
        for v in &build.mesh.vertices {
            let p = v.position_vec3().as_dvec3();
            assert!(build.bounds.contains_point(p));
        }
    }

    #[test]
    fn test_world_bounds_offset_by_origin() {
        let build = build_chunk(&|_: f64, _: f64| 3.0, &request(-64.0, 128.0, 64.0), &config()).unwrap();
        let world = build.world_bounds();
        assert_eq!(world.min.x, -64.0);
        assert_eq!(world.max.y, 192.0);
        assert_eq!(world.max.z, 3.0);
    }

    #[test]
    fn test_invalid_requests() {
        let flat = |_: f64, _: f64| 0.0;
        assert_eq!(
            build_chunk(&flat, &request(0.0, 0.0, 0.0), &config()).unwrap_err(),
            BuildError::InvalidWidth(0.0)
        );
        assert!(matches!(
            build_chunk(&flat, &request(0.0, 0.0, f64::INFINITY), &config()),
            Err(BuildError::InvalidWidth(_))
        ));
        assert!(matches!(
            build_chunk(&flat, &request(f64::NAN, 0.0, 1.0), &config()),
            Err(BuildError::InvalidOrigin { .. })
        ));
        let bad = MeshConfig {
            full_resolution: 1,
            ..config()
        };
        assert!(matches!(
            build_chunk(&flat, &request(0.0, 0.0, 1.0), &bad),
            Err(BuildError::InvalidResolution {
                name: "full_resolution",
                value: 1
            })
        ));
    }

    #[test]
    fn test_non_finite_height_fails() {
        let holes = |x: f64, _: f64| if x > 40.0 { f64::NAN } else { x };
        let err = build_chunk(&holes, &request(0.0, 0.0, 64.0), &config()).unwrap_err();
        assert!(matches!(err, BuildError::NonFiniteHeight { .. }));
    }

    #[test]
    fn test_trait_object_source() {
        let source: Box<dyn HeightSource> = Box::new(|x: f64, y: f64| x * y * 0.001);
        let build = build_chunk(source.as_ref(), &request(0.0, 0.0, 16.0), &config()).unwrap();
        assert!(!build.flat);
    }
}

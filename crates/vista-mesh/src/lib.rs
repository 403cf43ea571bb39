//! Chunk mesh building: skirted heightfield tessellation, packed terrain
//! vertices, and collision heightfields.

mod builder;
mod collision;
pub mod layout;
mod vertex;

pub use builder::{BuildError, ChunkBuild, ChunkRequest, build_chunk};
pub use collision::CollisionHeightfield;
pub use layout::{TERRAIN_VERTEX_ATTRIBUTES, TERRAIN_VERTEX_LAYOUT, terrain_vertex_buffer_layout};
pub use vertex::{ChunkMesh, TerrainVertex};

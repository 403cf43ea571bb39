//! Packed terrain vertex and the mesh container handed to the render backend.

use glam::Vec3;

/// A single terrain vertex, packed to 20 bytes.
///
/// Layout (20 bytes total):
///   - `[0..12]`  position `[f32; 3]`, chunk-local XY plus world height in Z
///   - `[12..16]` normal `[i8; 4]`, snorm XYZ, W = 127 on skirt vertices
///   - `[16..20]` morph_delta `f32`, height offset to the next-coarser grid
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TerrainVertex {
    pub position: [f32; 3],
    pub normal: [i8; 4],
    pub morph_delta: f32,
}

static_assertions::assert_eq_size!(TerrainVertex, [u8; 20]);
static_assertions::const_assert_eq!(std::mem::align_of::<TerrainVertex>(), 4);

const SKIRT_FLAG: i8 = i8::MAX;

impl TerrainVertex {
    pub fn new(position: Vec3, normal: Vec3, skirt: bool, morph_delta: f32) -> Self {
        Self {
            position: position.to_array(),
            normal: pack_normal(normal, skirt),
            morph_delta,
        }
    }

    pub fn is_skirt(&self) -> bool {
        self.normal[3] == SKIRT_FLAG
    }

    /// Decode the packed normal (not renormalized).
    pub fn normal_f32(&self) -> Vec3 {
        Vec3::new(
            self.normal[0] as f32 / 127.0,
            self.normal[1] as f32 / 127.0,
            self.normal[2] as f32 / 127.0,
        )
    }

    pub fn position_vec3(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }
}

fn pack_normal(n: Vec3, skirt: bool) -> [i8; 4] {
    let n = n.try_normalize().unwrap_or(Vec3::Z);
    let q = |c: f32| (c.clamp(-1.0, 1.0) * 127.0).round() as i8;
    [q(n.x), q(n.y), q(n.z), if skirt { SKIRT_FLAG } else { 0 }]
}

/// Vertex and index buffers of one chunk, ready for upload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChunkMesh {
    pub vertices: Vec<TerrainVertex>,
    /// Triangle list, counter-clockwise seen from +Z.
    pub indices: Vec<u32>,
    /// Interior vertices per side (skirt ring excluded).
    pub resolution: u32,
}

impl ChunkMesh {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Vertex data as a byte slice for upload (zero-copy).
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Index data as a byte slice for upload (zero-copy).
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_size() {
        assert_eq!(std::mem::size_of::<TerrainVertex>(), 20);
    }

    #[test]
    fn test_normal_packing_round_trip() {
        let v = TerrainVertex::new(Vec3::ZERO, Vec3::new(1.0, 0.0, 1.0), false, 0.0);
        let n = v.normal_f32();
        let expected = std::f32::consts::FRAC_1_SQRT_2;
        assert!((n.x - expected).abs() < 0.01);
        assert_eq!(n.y, 0.0);
        assert!((n.z - expected).abs() < 0.01);
        assert!(!v.is_skirt());
    }

    #[test]
    fn test_skirt_flag_in_w() {
        let v = TerrainVertex::new(Vec3::ONE, Vec3::Z, true, 0.0);
        assert!(v.is_skirt());
        assert_eq!(v.normal, [0, 0, 127, 127]);
    }

    #[test]
    fn test_degenerate_normal_falls_back_to_up() {
        let v = TerrainVertex::new(Vec3::ZERO, Vec3::ZERO, false, 0.0);
        assert_eq!(v.normal, [0, 0, 127, 0]);
    }

    #[test]
    fn test_byte_views() {
        let mesh = ChunkMesh {
            vertices: vec![TerrainVertex::new(Vec3::ZERO, Vec3::Z, false, 0.5); 3],
            indices: vec![0, 1, 2],
            resolution: 2,
        };
        assert_eq!(mesh.vertex_bytes().len(), 60);
        assert_eq!(mesh.index_bytes().len(), 12);
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.index_count(), 3);
    }
}

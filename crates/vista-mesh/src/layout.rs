//! Canonical `wgpu::VertexBufferLayout` for terrain chunk rendering.
//!
//! Every terrain pipeline (opaque, shadow, debug wireframe) references
//! [`TERRAIN_VERTEX_LAYOUT`] so the shaders and [`TerrainVertex`] cannot drift.
//!
//! ## Attribute Packing
//!
//! | Location | Offset | Format    | Fields                      |
//! |----------|--------|-----------|-----------------------------|
//! | 0        | 0      | Float32x3 | chunk-local position        |
//! | 1        | 12     | Snorm8x4  | normal xyz + skirt flag (w) |
//! | 2        | 16     | Float32   | geomorph height delta       |

use std::mem;

use wgpu::{VertexAttribute, VertexBufferLayout, VertexFormat, VertexStepMode};

use crate::vertex::TerrainVertex;

pub const TERRAIN_VERTEX_ATTRIBUTES: [VertexAttribute; 3] = [
    VertexAttribute {
        format: VertexFormat::Float32x3,
        offset: 0,
        shader_location: 0,
    },
    VertexAttribute {
        format: VertexFormat::Snorm8x4,
        offset: 12,
        shader_location: 1,
    },
    VertexAttribute {
        format: VertexFormat::Float32,
        offset: 16,
        shader_location: 2,
    },
];

/// The vertex buffer layout for all terrain render pipelines.
pub const TERRAIN_VERTEX_LAYOUT: VertexBufferLayout<'static> = VertexBufferLayout {
    array_stride: mem::size_of::<TerrainVertex>() as u64,
    step_mode: VertexStepMode::Vertex,
    attributes: &TERRAIN_VERTEX_ATTRIBUTES,
};

/// Owned copy of [`TERRAIN_VERTEX_LAYOUT`], for APIs that take it by value.
pub fn terrain_vertex_buffer_layout() -> VertexBufferLayout<'static> {
    TERRAIN_VERTEX_LAYOUT
}

// ---------------------------------------------------------------------------
// Compile-time validation
// ---------------------------------------------------------------------------

const _: () = assert!(
    mem::size_of::<TerrainVertex>() == 20,
    "TerrainVertex size changed, update TERRAIN_VERTEX_LAYOUT"
);

const _: () = assert!(TERRAIN_VERTEX_ATTRIBUTES[0].offset == mem::offset_of!(TerrainVertex, position) as u64);
const _: () = assert!(TERRAIN_VERTEX_ATTRIBUTES[1].offset == mem::offset_of!(TerrainVertex, normal) as u64);
const _: () = assert!(TERRAIN_VERTEX_ATTRIBUTES[2].offset == mem::offset_of!(TerrainVertex, morph_delta) as u64);

const _: () = assert!(
    TERRAIN_VERTEX_ATTRIBUTES[2].offset + 4 <= mem::size_of::<TerrainVertex>() as u64,
    "Last attribute exceeds vertex stride"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_stride_matches_vertex_struct_size() {
        assert_eq!(
            TERRAIN_VERTEX_LAYOUT.array_stride,
            mem::size_of::<TerrainVertex>() as u64,
        );
    }

    #[test]
    fn test_attributes_fit_in_stride() {
        let stride = TERRAIN_VERTEX_LAYOUT.array_stride;
        for (i, attr) in TERRAIN_VERTEX_ATTRIBUTES.iter().enumerate() {
            let size = attr.format.size();
            assert!(
                attr.offset + size <= stride,
                "Attribute {i} at offset {} with size {size} exceeds stride {stride}",
                attr.offset,
            );
        }
        let covered: u64 = TERRAIN_VERTEX_ATTRIBUTES.iter().map(|a| a.format.size()).sum();
        assert_eq!(covered, stride, "every byte of the vertex is an attribute");
    }

    #[test]
    fn test_shader_locations_are_sequential() {
        for (i, attr) in TERRAIN_VERTEX_ATTRIBUTES.iter().enumerate() {
            assert_eq!(attr.shader_location, i as u32);
        }
    }

    #[test]
    fn test_helper_returns_same_layout() {
        let layout = terrain_vertex_buffer_layout();
        assert_eq!(layout.array_stride, TERRAIN_VERTEX_LAYOUT.array_stride);
        assert_eq!(layout.attributes, TERRAIN_VERTEX_LAYOUT.attributes);
    }

    #[test]
    fn test_layout_is_valid_for_wgpu_pipeline() {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            force_fallback_adapter: true,
            ..Default::default()
        }));

        let Ok(adapter) = adapter else {
            // Headless CI without any adapter.
            return;
        };

        let (device, _queue) =
            pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default()))
                .expect("failed to create device");

        let shader_source = r#"
            @vertex
            fn vs_main(
                @location(0) position: vec3<f32>,
                @location(1) normal_skirt: vec4<f32>,
                @location(2) morph_delta: f32,
            ) -> @builtin(position) vec4<f32> {
                let z = position.z + morph_delta * (1.0 - normal_skirt.w);
                return vec4<f32>(position.x, position.y, z, 1.0);
            }

            @fragment
            fn fs_main() -> @location(0) vec4<f32> {
                return vec4<f32>(1.0, 1.0, 1.0, 1.0);
            }
        "#;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("test_terrain_shader"),
            source: wgpu::ShaderSource::Wgsl(shader_source.into()),
        });

        let _pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("test_terrain_pipeline"),
            layout: None,
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[TERRAIN_VERTEX_LAYOUT],
                compilation_options: Default::default(),
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: wgpu::TextureFormat::Bgra8UnormSrgb,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview_mask: None,
            cache: None,
        });
    }
}

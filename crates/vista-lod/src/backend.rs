//! Interfaces to the render and physics backends.
//!
//! The engine only ever calls these from the thread that owns it. Objects
//! are allocated first and added to the scene later, so a chunk can be fully
//! uploaded long before it becomes visible.

use std::fmt;

use glam::DVec3;
use vista_math::Aabb;
use vista_mesh::CollisionHeightfield;
use wgpu::VertexBufferLayout;

/// Errors reported by a backend. The engine treats them as build failures.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("render backend rejected the request: {0}")]
    Render(String),

    #[error("physics backend rejected the request: {0}")]
    Physics(String),
}

macro_rules! backend_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

backend_id!(
    /// Uploaded vertex and index buffers.
    MeshHandle
);
backend_id!(
    /// A drawable instance of a mesh. Owns its mesh once allocated.
    RenderObjectId
);
backend_id!(CollisionObjectId);

/// Buffers for one chunk, borrowed for the duration of the upload.
#[derive(Clone, Debug)]
pub struct MeshUpload<'a> {
    pub vertex_bytes: &'a [u8],
    pub index_bytes: &'a [u8],
    pub index_count: u32,
    pub layout: VertexBufferLayout<'static>,
}

pub trait RenderBackend {
    fn upload_mesh(&mut self, upload: MeshUpload<'_>) -> Result<MeshHandle, BackendError>;

    /// Create an object that draws `mesh` at `origin`. `bounds` is the
    /// object's world-space box, used for culling.
    fn allocate_render_object(
        &mut self,
        mesh: MeshHandle,
        origin: DVec3,
        bounds: Aabb,
    ) -> Result<RenderObjectId, BackendError>;

    /// Free a mesh that never made it into a render object.
    fn release_mesh(&mut self, mesh: MeshHandle);

    fn add_render_object(&mut self, object: RenderObjectId);

    fn remove_render_object(&mut self, object: RenderObjectId);

    /// Free an object that is no longer in the scene, with its mesh.
    fn release_render_object(&mut self, object: RenderObjectId);
}

pub trait PhysicsBackend {
    /// Add a static heightfield collider translated by `translation`.
    fn add_collision_object(
        &mut self,
        shape: &CollisionHeightfield,
        translation: DVec3,
    ) -> Result<CollisionObjectId, BackendError>;

    fn remove_collision_object(&mut self, object: CollisionObjectId);
}

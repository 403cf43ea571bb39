//! In-memory backends that record what the engine does to them.
//!
//! They never draw or simulate anything. Every object is tracked from
//! allocation to release, and protocol mistakes (adding an object twice,
//! removing one that is not in the scene, releasing a live one) are logged
//! and kept in a violation list for tests and the demo to inspect. Released
//! objects leave only aggregate counts behind.

use glam::DVec3;
use rustc_hash::FxHashMap;
use tracing::warn;
use vista_math::Aabb;
use vista_mesh::CollisionHeightfield;

use crate::backend::{
    BackendError, CollisionObjectId, MeshHandle, MeshUpload, PhysicsBackend, RenderBackend,
    RenderObjectId,
};

#[derive(Clone, Copy, Debug)]
struct MeshRecord {
    vertex_bytes: usize,
    index_count: u32,
}

/// A render object as the headless backend sees it.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderRecord {
    pub origin: DVec3,
    pub bounds: Aabb,
    pub vertex_bytes: usize,
    pub index_count: u32,
    pub in_scene: bool,
    /// Times this object was added to the scene.
    pub adds: u32,
    pub removes: u32,
}

#[derive(Debug, Default)]
pub struct HeadlessRenderBackend {
    next_id: u64,
    meshes: FxHashMap<MeshHandle, MeshRecord>,
    objects: FxHashMap<RenderObjectId, RenderRecord>,
    total_adds: u64,
    total_removes: u64,
    released: usize,
    violations: Vec<String>,
    fail_uploads: bool,
}

impl HeadlessRenderBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `upload_mesh` call fail.
    pub fn set_fail_uploads(&mut self, fail: bool) {
        self.fail_uploads = fail;
    }

    /// Objects currently added to the scene.
    pub fn scene(&self) -> impl Iterator<Item = (RenderObjectId, &RenderRecord)> {
        self.objects
            .iter()
            .filter(|(_, r)| r.in_scene)
            .map(|(&id, r)| (id, r))
    }

    pub fn scene_len(&self) -> usize {
        self.scene().count()
    }

    pub fn object(&self, id: RenderObjectId) -> Option<&RenderRecord> {
        self.objects.get(&id)
    }

    /// Allocated objects, in the scene or not.
    pub fn live_objects(&self) -> usize {
        self.objects.len()
    }

    /// Uploaded meshes not yet owned by an object.
    pub fn loose_meshes(&self) -> usize {
        self.meshes.len()
    }

    pub fn released_count(&self) -> usize {
        self.released
    }

    /// Scene additions over the backend's lifetime.
    pub fn total_adds(&self) -> u64 {
        self.total_adds
    }

    /// Scene removals over the backend's lifetime.
    pub fn total_removes(&self) -> u64 {
        self.total_removes
    }

    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    fn violation(&mut self, message: String) {
        warn!("{message}");
        self.violations.push(message);
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl RenderBackend for HeadlessRenderBackend {
    fn upload_mesh(&mut self, upload: MeshUpload<'_>) -> Result<MeshHandle, BackendError> {
        if self.fail_uploads {
            return Err(BackendError::Render("uploads disabled".to_string()));
        }
        let stride = upload.layout.array_stride as usize;
        if stride == 0 || upload.vertex_bytes.len() % stride != 0 {
            return Err(BackendError::Render(format!(
                "{} vertex bytes is not a multiple of the {stride}-byte stride",
                upload.vertex_bytes.len()
            )));
        }
        if upload.index_bytes.len() != upload.index_count as usize * 4 {
            return Err(BackendError::Render(format!(
                "{} index bytes for {} u32 indices",
                upload.index_bytes.len(),
                upload.index_count
            )));
        }
        let handle = MeshHandle(self.next_id());
        self.meshes.insert(
            handle,
            MeshRecord {
                vertex_bytes: upload.vertex_bytes.len(),
                index_count: upload.index_count,
            },
        );
        Ok(handle)
    }

    fn allocate_render_object(
        &mut self,
        mesh: MeshHandle,
        origin: DVec3,
        bounds: Aabb,
    ) -> Result<RenderObjectId, BackendError> {
        let Some(record) = self.meshes.remove(&mesh) else {
            return Err(BackendError::Render(format!("unknown {mesh}")));
        };
        let id = RenderObjectId(self.next_id());
        self.objects.insert(
            id,
            RenderRecord {
                origin,
                bounds,
                vertex_bytes: record.vertex_bytes,
                index_count: record.index_count,
                in_scene: false,
                adds: 0,
                removes: 0,
            },
        );
        Ok(id)
    }

    fn release_mesh(&mut self, mesh: MeshHandle) {
        if self.meshes.remove(&mesh).is_none() {
            self.violation(format!("release of unknown {mesh}"));
        }
    }

    fn add_render_object(&mut self, object: RenderObjectId) {
        let message = match self.objects.get_mut(&object) {
            None => format!("add of unknown {object}"),
            Some(r) if r.in_scene => format!("{object} added twice"),
            Some(r) => {
                r.in_scene = true;
                r.adds += 1;
                self.total_adds += 1;
                return;
            }
        };
        self.violation(message);
    }

    fn remove_render_object(&mut self, object: RenderObjectId) {
        let message = match self.objects.get_mut(&object) {
            None => format!("remove of unknown {object}"),
            Some(r) if !r.in_scene => format!("remove of {object} which is not in the scene"),
            Some(r) => {
                r.in_scene = false;
                r.removes += 1;
                self.total_removes += 1;
                return;
            }
        };
        self.violation(message);
    }

    fn release_render_object(&mut self, object: RenderObjectId) {
        match self.objects.remove(&object) {
            Some(r) => {
                self.released += 1;
                if r.in_scene {
                    self.violation(format!("{object} released while in the scene"));
                }
            }
            None => self.violation(format!("release of unknown {object}")),
        }
    }
}

/// A collision object as the headless backend sees it.
#[derive(Clone, Debug, PartialEq)]
pub struct CollisionRecord {
    pub translation: DVec3,
    pub resolution: u32,
    pub width: f64,
}

#[derive(Debug, Default)]
pub struct HeadlessPhysicsBackend {
    next_id: u64,
    objects: FxHashMap<CollisionObjectId, CollisionRecord>,
    total_removes: u64,
    violations: Vec<String>,
    fail_adds: bool,
}

impl HeadlessPhysicsBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `add_collision_object` call fail.
    pub fn set_fail_adds(&mut self, fail: bool) {
        self.fail_adds = fail;
    }

    pub fn objects(&self) -> impl Iterator<Item = (CollisionObjectId, &CollisionRecord)> {
        self.objects.iter().map(|(&id, r)| (id, r))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn total_removes(&self) -> u64 {
        self.total_removes
    }

    pub fn violations(&self) -> &[String] {
        &self.violations
    }
}

impl PhysicsBackend for HeadlessPhysicsBackend {
    fn add_collision_object(
        &mut self,
        shape: &CollisionHeightfield,
        translation: DVec3,
    ) -> Result<CollisionObjectId, BackendError> {
        if self.fail_adds {
            return Err(BackendError::Physics("collision adds disabled".to_string()));
        }
        self.next_id += 1;
        let id = CollisionObjectId(self.next_id);
        self.objects.insert(
            id,
            CollisionRecord {
                translation,
                resolution: shape.resolution(),
                width: shape.width(),
            },
        );
        Ok(id)
    }

    fn remove_collision_object(&mut self, object: CollisionObjectId) {
        if self.objects.remove(&object).is_some() {
            self.total_removes += 1;
        } else {
            let message = format!("remove of unknown {object}");
            warn!("{message}");
            self.violations.push(message);
        }
    }
}

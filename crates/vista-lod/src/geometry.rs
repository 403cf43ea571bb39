//! Per-node ownership of backend objects.

use glam::DVec3;
use vista_mesh::CollisionHeightfield;

use crate::backend::{CollisionObjectId, PhysicsBackend, RenderBackend, RenderObjectId};

/// Built geometry that is allocated but not yet in the scene.
#[derive(Debug)]
pub(crate) struct PendingGeometry {
    pub render: RenderObjectId,
    pub collision: Option<CollisionHeightfield>,
    pub origin: DVec3,
}

/// Geometry currently visible and collidable.
#[derive(Debug)]
pub(crate) struct CommittedGeometry {
    pub render: RenderObjectId,
    pub collision: Option<CollisionObjectId>,
    /// The physics backend refused this chunk's collider.
    pub collision_rejected: bool,
}

/// What a leaf currently owns. Interior nodes are always `Empty`.
#[derive(Debug, Default)]
pub(crate) enum GeometrySlot {
    #[default]
    Empty,
    Pending(PendingGeometry),
    Committed(CommittedGeometry),
}

/// Objects still in the scene that wait for their replacement to commit.
#[derive(Debug, Default)]
pub(crate) struct Retired {
    pub render: Vec<RenderObjectId>,
    pub collision: Vec<CollisionObjectId>,
}

impl GeometrySlot {
    /// Take the slot's objects out of the leaf.
    ///
    /// Committed objects stay in the scene and move to `retired`. Pending
    /// objects were never added, so they are released right away.
    pub fn retire_into<R: RenderBackend>(&mut self, retired: &mut Retired, render: &mut R) {
        match std::mem::take(self) {
            GeometrySlot::Empty => {}
            GeometrySlot::Pending(pending) => render.release_render_object(pending.render),
            GeometrySlot::Committed(committed) => {
                retired.render.push(committed.render);
                retired.collision.extend(committed.collision);
            }
        }
    }

    /// Put pending objects into the scene. Returns true if anything changed.
    ///
    /// A collider the physics backend refuses is dropped. The leaf keeps
    /// its render object and is not rebuilt for collision until the slot is
    /// retired.
    pub fn promote<R: RenderBackend, P: PhysicsBackend>(
        &mut self,
        render: &mut R,
        physics: Option<&mut P>,
    ) -> bool {
        let GeometrySlot::Pending(pending) = std::mem::take(self) else {
            return false;
        };
        render.add_render_object(pending.render);
        let mut collision_rejected = false;
        let collision = match (pending.collision, physics) {
            (Some(shape), Some(physics)) => {
                match physics.add_collision_object(&shape, pending.origin) {
                    Ok(id) => Some(id),
                    Err(err) => {
                        tracing::warn!(object = %pending.render, "collision object rejected: {err}");
                        collision_rejected = true;
                        None
                    }
                }
            }
            _ => None,
        };
        *self = GeometrySlot::Committed(CommittedGeometry {
            render: pending.render,
            collision,
            collision_rejected,
        });
        true
    }

    /// Remove and release everything, whatever state it is in.
    pub fn release<R: RenderBackend, P: PhysicsBackend>(
        &mut self,
        render: &mut R,
        physics: Option<&mut P>,
    ) {
        match std::mem::take(self) {
            GeometrySlot::Empty => {}
            GeometrySlot::Pending(pending) => render.release_render_object(pending.render),
            GeometrySlot::Committed(committed) => {
                render.remove_render_object(committed.render);
                render.release_render_object(committed.render);
                if let (Some(id), Some(physics)) = (committed.collision, physics) {
                    physics.remove_collision_object(id);
                }
            }
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, GeometrySlot::Committed(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, GeometrySlot::Pending(_))
    }

    /// Committed without a collision object, and none was refused.
    pub fn lacks_collision(&self) -> bool {
        matches!(
            self,
            GeometrySlot::Committed(c) if c.collision.is_none() && !c.collision_rejected
        )
    }
}

impl Retired {
    pub fn append(&mut self, other: &mut Retired) {
        self.render.append(&mut other.render);
        self.collision.append(&mut other.collision);
    }

    pub fn is_empty(&self) -> bool {
        self.render.is_empty() && self.collision.is_empty()
    }

    pub fn len(&self) -> usize {
        self.render.len() + self.collision.len()
    }

    /// Remove every retired object from the scene and release it.
    pub fn flush<R: RenderBackend, P: PhysicsBackend>(
        &mut self,
        render: &mut R,
        mut physics: Option<&mut P>,
    ) {
        for id in self.render.drain(..) {
            render.remove_render_object(id);
            render.release_render_object(id);
        }
        for id in self.collision.drain(..) {
            if let Some(physics) = physics.as_deref_mut() {
                physics.remove_collision_object(id);
            }
        }
    }
}

//! Applying build results and swapping finished subtrees into the scene.
//!
//! A result is stored on its leaf as pending geometry. Nothing becomes
//! visible until every leaf of the smallest enclosing subtree whose
//! ancestors are all built has a result too; at that point the subtree's
//! retired objects leave the scene and its pending objects enter it in the
//! same call, so the backends never see a gap or an overlap.

use tracing::{debug, error, trace};
use vista_mesh::{ChunkBuild, TERRAIN_VERTEX_LAYOUT};

use crate::backend::{MeshUpload, PhysicsBackend, RenderBackend, RenderObjectId};
use crate::engine::TerrainEngine;
use crate::geometry::{GeometrySlot, PendingGeometry};
use crate::pipeline::{BuildCompletion, BuildOutcome, TaskScheduler};
use crate::quadtree::NodeId;

impl<R: RenderBackend, P: PhysicsBackend, S: TaskScheduler> TerrainEngine<R, P, S> {
    /// Apply every completion that has arrived so far.
    pub(crate) fn drain_completions(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.completion_rx.try_recv() {
            self.apply_completion(completion);
            applied += 1;
        }
        applied
    }

    fn apply_completion(&mut self, completion: BuildCompletion) {
        let id = completion.node;
        if let Some(node) = self.tree.get_mut(id) {
            node.outstanding = node.outstanding.saturating_sub(1);
        }
        let current = self
            .tree
            .get(id)
            .is_some_and(|n| n.is_leaf() && n.building && completion.revision >= n.revision);
        if !current {
            self.stats.discarded += 1;
            trace!(revision = completion.revision, "Discarded stale build for {id}");
            return;
        }

        match completion.outcome {
            BuildOutcome::Built(build) => match self.upload(&build) {
                Ok(render) => self.accept(id, *build, render),
                Err(message) => self.fail(id, message),
            },
            BuildOutcome::Failed(message) => self.fail(id, message),
            BuildOutcome::Cancelled => {
                self.stats.cancelled += 1;
                debug!("Build for {id} was cancelled, retrying next tick");
                self.mark_retry(id);
            }
        }
    }

    fn upload(&mut self, build: &ChunkBuild) -> Result<RenderObjectId, String> {
        let mesh = self
            .render
            .upload_mesh(MeshUpload {
                vertex_bytes: build.mesh.vertex_bytes(),
                index_bytes: build.mesh.index_bytes(),
                index_count: build.mesh.index_count(),
                layout: TERRAIN_VERTEX_LAYOUT,
            })
            .map_err(|err| err.to_string())?;
        match self
            .render
            .allocate_render_object(mesh, build.origin, build.world_bounds())
        {
            Ok(object) => Ok(object),
            Err(err) => {
                self.render.release_mesh(mesh);
                Err(err.to_string())
            }
        }
    }

    fn fail(&mut self, id: NodeId, message: String) {
        self.stats.failed += 1;
        error!("Build for {id} failed: {message}");
        self.mark_retry(id);
    }

    fn mark_retry(&mut self, id: NodeId) {
        if let Some(node) = self.tree.get_mut(id) {
            node.retry = true;
        }
    }

    fn accept(&mut self, id: NodeId, build: ChunkBuild, render: RenderObjectId) {
        let Some(node) = self.tree.get_mut(id) else {
            self.render.release_render_object(render);
            return;
        };
        // Leaves that are building own nothing yet; keep it that way.
        node.geometry
            .retire_into(&mut node.retired, &mut self.render);
        node.bounds = build.world_bounds();
        node.geometry = GeometrySlot::Pending(PendingGeometry {
            render,
            collision: build.collision,
            origin: build.origin,
        });
        node.building = false;
        node.retry = false;
        node.subtree_built = true;
        self.stats.committed += 1;
        trace!(flat = build.flat, "Accepted build for {id}");

        self.propagate_built(id);
    }

    /// Walk up from a node that just became built.
    fn propagate_built(&mut self, id: NodeId) {
        let mut cur = id;
        loop {
            if self.tree.all_ancestors_built(cur) {
                self.commit_subtree(cur);
                return;
            }
            let Some(parent) = self.tree.get(cur).and_then(|n| n.parent()) else {
                return;
            };
            let siblings_built = self
                .tree
                .get(parent)
                .and_then(|p| p.children())
                .is_some_and(|children| {
                    children
                        .iter()
                        .all(|c| self.tree.get(*c).is_some_and(|n| n.subtree_built))
                });
            if !siblings_built {
                return;
            }
            if let Some(node) = self.tree.get_mut(parent) {
                node.subtree_built = true;
            }
            cur = parent;
        }
    }

    /// Flush every retired object under `id`, then promote every pending one.
    fn commit_subtree(&mut self, id: NodeId) {
        let ids = self.tree.subtree(id);
        for &node_id in &ids {
            let Some(node) = self.tree.get_mut(node_id) else {
                continue;
            };
            if !node.retired.is_empty() {
                node.retired.flush(&mut self.render, self.physics.as_mut());
            }
        }
        let mut promoted = 0;
        for &node_id in &ids {
            let Some(node) = self.tree.get_mut(node_id) else {
                continue;
            };
            if node.geometry.promote(&mut self.render, self.physics.as_mut()) {
                promoted += 1;
            }
        }
        self.stats.subtree_commits += 1;
        debug!("Committed subtree {id}: {promoted} leaves promoted");
    }
}

//! Per-tick quadtree transitions: split, merge, dispatch and rebuild.

use tracing::{debug, warn};
use vista_math::Aabb;
use vista_mesh::ChunkRequest;

use crate::backend::{PhysicsBackend, RenderBackend};
use crate::engine::TerrainEngine;
use crate::geometry::GeometrySlot;
use crate::pipeline::{BuildTask, TaskScheduler};
use crate::quadtree::NodeId;

impl<R: RenderBackend, P: PhysicsBackend, S: TaskScheduler> TerrainEngine<R, P, S> {
    /// Mark every leaf overlapping `region` out of date and rebuild it.
    ///
    /// Call after publishing new field data; the old geometry stays visible
    /// until its replacement commits.
    pub fn invalidate_region(&mut self, region: Aabb) {
        if self.shut_down {
            warn!("invalidate_region called after shutdown");
            return;
        }
        let stale: Vec<NodeId> = self
            .tree
            .leaves()
            .filter(|leaf| leaf.footprint().intersects_xy(&region))
            .map(|leaf| leaf.id())
            .collect();
        debug!("Invalidating {} leaves", stale.len());

        for id in stale {
            let Some(node) = self.tree.get_mut(id) else {
                continue;
            };
            node.revision += 1;
            node.building = false;
            node.subtree_built = false;
            node.geometry
                .retire_into(&mut node.retired, &mut self.render);
            self.clear_ancestors_built(id);
            self.dispatch(id);
        }
        self.publish_coverage();
    }

    pub(crate) fn update_node(&mut self, id: NodeId) {
        let Some(node) = self.tree.get(id) else {
            return;
        };
        let desired = self.selector.desired_depth(node.bounds(), self.viewpoint);
        let depth = node.depth();

        match node.children() {
            None if desired > depth => {
                if let Some(children) = self.split(id) {
                    for child in children {
                        self.update_node(child);
                    }
                }
            }
            Some(_) if desired <= depth => self.merge(id),
            Some(children) => {
                for child in children {
                    self.update_node(child);
                }
            }
            None => self.update_leaf(id),
        }
    }

    fn update_leaf(&mut self, id: NodeId) {
        let Some(node) = self.tree.get(id) else {
            return;
        };
        // A retry waits until no earlier build for this node is still out,
        // since that one may yet be accepted.
        let needs_build = if node.building {
            node.retry && node.outstanding == 0
        } else {
            matches!(node.geometry, GeometrySlot::Empty)
        };
        if needs_build {
            self.dispatch(id);
            return;
        }

        let wants_collision = !node.building
            && self.collision_required()
            && node.geometry.lacks_collision()
            && self
                .selector
                .within_physics_radius(node.bounds(), self.viewpoint);
        if wants_collision {
            debug!("{id} entered the physics radius, rebuilding with collision");
            if let Some(node) = self.tree.get_mut(id) {
                node.subtree_built = false;
                node.geometry
                    .retire_into(&mut node.retired, &mut self.render);
            }
            self.clear_ancestors_built(id);
            self.dispatch(id);
        }
    }

    /// Turn a leaf into an interior node with four fresh children.
    fn split(&mut self, id: NodeId) -> Option<[NodeId; 4]> {
        let node = self.tree.get_mut(id)?;
        node.geometry
            .retire_into(&mut node.retired, &mut self.render);
        node.building = false;
        node.retry = false;
        node.subtree_built = false;
        // Never shrink below the placeholder, or the node could flip back
        // and forth between split and merged.
        node.bounds = node.footprint().union(&node.bounds);

        self.clear_ancestors_built(id);
        let children = self.tree.split(id)?;
        self.stats.splits += 1;
        debug!("Split {id} into {children:?}");
        Some(children)
    }

    /// Collapse a subtree back into `id` and rebuild it as one leaf.
    fn merge(&mut self, id: NodeId) {
        let removed = self.tree.remove_descendants(id);
        let Some(node) = self.tree.get_mut(id) else {
            return;
        };
        for mut child in removed {
            child
                .geometry
                .retire_into(&mut node.retired, &mut self.render);
            node.retired.append(&mut child.retired);
        }
        node.subtree_built = false;
        node.retry = false;

        self.clear_ancestors_built(id);
        self.stats.merges += 1;
        debug!("Merged {id}");
        self.dispatch(id);
    }

    /// A leaf below `id` lost its built flag. Ancestors inside the committed
    /// region keep theirs, since the scene there still shows retired
    /// geometry. Built ancestors below that region were only waiting on
    /// their siblings and must wait on this leaf too.
    pub(crate) fn clear_ancestors_built(&mut self, id: NodeId) {
        let mut chain = self.tree.ancestors(id);
        chain.reverse();
        let committed = chain
            .iter()
            .take_while(|a| self.tree.get(**a).is_some_and(|n| n.subtree_built))
            .count();
        for ancestor in &chain[committed..] {
            if let Some(node) = self.tree.get_mut(*ancestor) {
                node.subtree_built = false;
            }
        }
    }

    pub(crate) fn collision_required(&self) -> bool {
        self.config.lod.collision_enabled && self.physics.is_some()
    }

    /// Submit a build for leaf `id` at its current revision.
    pub(crate) fn dispatch(&mut self, id: NodeId) {
        let collision_required = self.collision_required();
        let viewpoint = self.viewpoint;
        let Some(node) = self.tree.get_mut(id) else {
            return;
        };
        node.building = true;
        node.retry = false;
        node.outstanding += 1;

        let within_physics_radius = self.selector.within_physics_radius(&node.bounds, viewpoint);
        let footprint = *node.footprint();
        let build_collision = collision_required && within_physics_radius;
        let task = BuildTask {
            node: id,
            revision: node.revision,
            request: ChunkRequest::from_bounds(&footprint, build_collision),
            footprint,
            collision_required,
            within_physics_radius,
            field: self.field.clone(),
            mesh_config: self.mesh_config.clone(),
            completions: self.completion_tx.clone(),
            token: self.in_flight.acquire(),
        };
        self.stats.builds_submitted += 1;
        if let Err(err) = self.scheduler.submit(Box::new(task)) {
            // The task already reported itself cancelled; the next tick retries.
            warn!("Build for {id} not accepted: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use glam::DVec3;
    use vista_config::{Config, LodConfig, MeshConfig};
    use vista_math::Aabb;

    use crate::engine::TerrainEngine;
    use crate::headless::{HeadlessPhysicsBackend, HeadlessRenderBackend};
    use crate::pipeline::ManualScheduler;
    use crate::quadtree::NodeState;

    type Engine = TerrainEngine<HeadlessRenderBackend, HeadlessPhysicsBackend, ManualScheduler>;

    fn config(max_depth: u32) -> Config {
        Config {
            lod: LodConfig {
                world_width: 1024.0,
                resolution_constant: 1.0,
                target_screen_quad_width: 1.0,
                min_distance: 1.0,
                max_depth,
                placeholder_min_height: -50.0,
                placeholder_max_height: 50.0,
                physics_radius: 100.0,
                ..Default::default()
            },
            mesh: MeshConfig {
                quick_sample_resolution: 4,
                flat_resolution: 2,
                full_resolution: 4,
                collision_resolution: 3,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn engine(max_depth: u32, viewpoint: DVec3) -> Engine {
        TerrainEngine::init(
            config(max_depth),
            Arc::new(|_: f64, _: f64| 0.0),
            HeadlessRenderBackend::new(),
            Some(HeadlessPhysicsBackend::new()),
            ManualScheduler::new(),
            viewpoint,
        )
        .unwrap()
    }

    fn settle(engine: &mut Engine, viewpoint: DVec3) {
        for _ in 0..32 {
            engine.scheduler().run_all();
            engine.update_viewpoint(viewpoint);
            if engine.is_settled() {
                return;
            }
        }
        panic!("engine did not settle");
    }

    #[test]
    fn test_split_children_start_building() {
        let e = engine(1, DVec3::ZERO);
        let root = e.node(e.root()).unwrap();
        assert_eq!(root.state(), NodeState::Interior);
        let children = root.children().unwrap();
        for child in children {
            assert_eq!(e.node(child).unwrap().state(), NodeState::LeafBuilding);
        }
        assert_eq!(e.scheduler().len(), 4);
        assert_eq!(e.stats().splits, 1);
    }

    #[test]
    fn test_split_keeps_placeholder_bounds() {
        let mut e = engine(1, DVec3::new(1.0e6, 0.0, 0.0));
        settle(&mut e, DVec3::new(1.0e6, 0.0, 0.0));
        let tight = *e.node(e.root()).unwrap().bounds();
        assert!(tight.max.z < 1.0);

        e.update_viewpoint(DVec3::ZERO);
        let root = e.node(e.root()).unwrap();
        assert!(!root.is_leaf());
        assert_eq!(root.bounds().max.z, e.config().lod.placeholder_max_height);
        // Built far outside the physics radius, so only the render object.
        assert_eq!(root.retired_len(), 1);
    }

    #[test]
    fn test_merge_moves_geometry_to_parent() {
        let mut e = engine(1, DVec3::ZERO);
        settle(&mut e, DVec3::ZERO);
        assert_eq!(e.render().scene_len(), 4);

        let far = DVec3::new(1.0e6, 0.0, 0.0);
        e.update_viewpoint(far);
        let root = e.node(e.root()).unwrap();
        assert!(root.is_leaf());
        assert!(root.is_building());
        assert!(root.retired_len() >= 4);
        assert_eq!(e.render().scene_len(), 4, "old children stay visible");
        assert_eq!(e.stats().merges, 1);
    }

    #[test]
    fn test_invalidate_bumps_revision() {
        let mut e = engine(1, DVec3::ZERO);
        settle(&mut e, DVec3::ZERO);
        let target = e.leaf_at(-100.0, -100.0).unwrap().id();
        let before = e.stats().builds_submitted;

        e.invalidate_region(Aabb::from_square(-200.0, -200.0, 10.0, 0.0, 1.0));
        let node = e.node(target).unwrap();
        assert_eq!(node.revision(), 1);
        assert!(node.is_building());
        assert!(!node.has_committed_geometry());
        assert_eq!(e.stats().builds_submitted, before + 1);
        assert_eq!(e.render().scene_len(), 4);
        assert!(!e.coverage().is_fully_built(-100.0, -100.0));
        assert!(e.coverage().is_fully_built(100.0, 100.0));
    }

    #[test]
    fn test_rejected_collider_settles() {
        let mut e = engine(0, DVec3::ZERO);
        e.physics_mut().unwrap().set_fail_adds(true);
        settle(&mut e, DVec3::ZERO);
        assert_eq!(e.stats().builds_submitted, 1);

        for _ in 0..5 {
            e.scheduler().run_all();
            e.update_viewpoint(DVec3::ZERO);
        }
        assert!(e.is_settled());
        assert_eq!(e.stats().builds_submitted, 1);
        assert_eq!(e.stats().subtree_commits, 1);
        assert_eq!(e.render().scene_len(), 1);
        assert!(e.physics().unwrap().is_empty());

        // A rebuild for fresh data tries the collider again.
        e.physics_mut().unwrap().set_fail_adds(false);
        e.invalidate_region(Aabb::from_square(-10.0, -10.0, 20.0, 0.0, 1.0));
        settle(&mut e, DVec3::ZERO);
        assert_eq!(e.physics().unwrap().len(), 1);
        assert_eq!(e.render().scene_len(), 1);
    }

    #[test]
    fn test_clear_ancestors_keeps_committed_region() {
        let mut e = engine(2, DVec3::new(1.0e6, 0.0, 0.0));
        settle(&mut e, DVec3::new(1.0e6, 0.0, 0.0));
        // Split to depth 1 and let it commit, then go deeper near a corner.
        let mid = DVec3::new(0.0, 0.0, 400.0);
        settle(&mut e, mid);
        assert!(e.node(e.root()).unwrap().is_subtree_built());

        e.update_viewpoint(DVec3::ZERO);
        assert!(
            e.node(e.root()).unwrap().is_subtree_built(),
            "root stays built while its committed children refine"
        );
    }
}

//! The terrain engine instance.
//!
//! [`TerrainEngine`] owns the quadtree, both backends and the scheduler.
//! All of its methods run on the controlling thread; only build tasks leave
//! it. Tree transitions live in `lifecycle`, completion handling in
//! `commit`.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use glam::DVec3;
use tracing::{error, info, warn};
use vista_config::{Config, ConfigError, MeshConfig};
use vista_field::HeightSource;
use vista_math::Aabb;

use crate::backend::{PhysicsBackend, RenderBackend};
use crate::coverage::{CoverageCell, CoverageSnapshot, CoverageView};
use crate::pipeline::{BuildCompletion, InFlightCounter, TaskScheduler};
use crate::quadtree::{NodeId, QuadNode, QuadTree};
use crate::selector::DepthSelector;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("shutdown gave up with {in_flight} builds still in flight")]
    ShutdownTimeout { in_flight: usize },
}

/// Running totals since `init`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub splits: u64,
    pub merges: u64,
    pub builds_submitted: u64,
    /// Build results accepted into a node.
    pub committed: u64,
    /// Results that arrived for a node that moved on.
    pub discarded: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// Subtrees whose pending geometry went into the scene.
    pub subtree_commits: u64,
}

pub struct TerrainEngine<R: RenderBackend, P: PhysicsBackend, S: TaskScheduler> {
    pub(crate) config: Config,
    pub(crate) mesh_config: Arc<MeshConfig>,
    pub(crate) selector: DepthSelector,
    pub(crate) field: Arc<dyn HeightSource>,
    pub(crate) tree: QuadTree,
    pub(crate) render: R,
    pub(crate) physics: Option<P>,
    pub(crate) scheduler: S,
    pub(crate) completion_tx: Sender<BuildCompletion>,
    pub(crate) completion_rx: Receiver<BuildCompletion>,
    pub(crate) in_flight: InFlightCounter,
    pub(crate) coverage: CoverageView,
    pub(crate) viewpoint: DVec3,
    pub(crate) stats: EngineStats,
    pub(crate) tick: u64,
    pub(crate) shut_down: bool,
}

impl<R: RenderBackend, P: PhysicsBackend, S: TaskScheduler> TerrainEngine<R, P, S> {
    /// Build the root and run the first tick for `viewpoint`.
    ///
    /// `physics` may be `None`; chunks are then built without collision.
    pub fn init(
        config: Config,
        field: Arc<dyn HeightSource>,
        render: R,
        physics: Option<P>,
        scheduler: S,
        viewpoint: DVec3,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let lod = &config.lod;
        let half = lod.world_width / 2.0;
        let root = Aabb::from_square(
            -half,
            -half,
            lod.world_width,
            lod.placeholder_min_height,
            lod.placeholder_max_height,
        );
        let (completion_tx, completion_rx) = crossbeam_channel::unbounded();

        let mut engine = Self {
            mesh_config: Arc::new(config.mesh.clone()),
            selector: DepthSelector::new(&config.lod),
            config,
            field,
            tree: QuadTree::new(root),
            render,
            physics,
            scheduler,
            completion_tx,
            completion_rx,
            in_flight: InFlightCounter::new(),
            coverage: CoverageView::new(),
            viewpoint,
            stats: EngineStats::default(),
            tick: 0,
            shut_down: false,
        };
        info!(
            world_width = engine.config.lod.world_width,
            max_depth = engine.config.lod.max_depth,
            physics = engine.physics.is_some(),
            "Terrain engine initialized"
        );
        engine.update_viewpoint(viewpoint);
        Ok(engine)
    }

    /// One tick: apply finished builds, then bring the tree in line with
    /// `viewpoint`.
    pub fn update_viewpoint(&mut self, viewpoint: DVec3) {
        if self.shut_down {
            warn!("update_viewpoint called after shutdown");
            return;
        }
        self.tick += 1;
        self.viewpoint = viewpoint;
        self.drain_completions();
        let root = self.tree.root();
        self.update_node(root);
        self.publish_coverage();
    }

    /// Cancel queued builds, wait for running ones, and release every
    /// backend object the engine owns.
    pub fn shutdown(&mut self) -> Result<(), EngineError> {
        if self.shut_down {
            return Ok(());
        }
        let cancelled = self.scheduler.cancel_pending();

        let interval = Duration::from_millis(self.config.build.shutdown_poll_interval_ms);
        let limit = self.config.build.shutdown_poll_limit;
        let mut polls = 0;
        let mut timed_out = None;
        while self.in_flight.get() > 0 {
            if polls >= limit {
                timed_out = Some(self.in_flight.get());
                break;
            }
            // Results no longer matter, only that their tasks are finished.
            match self.completion_rx.recv_timeout(interval) {
                Ok(_) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            polls += 1;
        }
        while self.completion_rx.try_recv().is_ok() {}

        match timed_out {
            Some(_) => self.scheduler.abandon(),
            None => self.scheduler.shutdown(),
        }
        self.release_all();
        self.shut_down = true;
        self.publish_coverage();

        match timed_out {
            Some(in_flight) => {
                error!("Terrain engine shutdown timed out with {in_flight} builds in flight");
                Err(EngineError::ShutdownTimeout { in_flight })
            }
            None => {
                info!(cancelled, polls, "Terrain engine shut down");
                Ok(())
            }
        }
    }

    fn release_all(&mut self) {
        let ids = self.tree.subtree(self.tree.root());
        for id in ids {
            if let Some(node) = self.tree.get_mut(id) {
                node.retired.flush(&mut self.render, self.physics.as_mut());
                node.geometry
                    .release(&mut self.render, self.physics.as_mut());
            }
        }
    }

    pub(crate) fn publish_coverage(&self) {
        let cells = self
            .tree
            .leaves()
            .map(|leaf| CoverageCell {
                footprint: *leaf.footprint(),
                fully_built: !self.shut_down
                    && leaf.subtree_built
                    && self.tree.all_ancestors_built(leaf.id()),
            })
            .collect();
        self.coverage.publish(CoverageSnapshot {
            tick: self.tick,
            cells,
        });
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn viewpoint(&self) -> DVec3 {
        self.viewpoint
    }

    pub fn render(&self) -> &R {
        &self.render
    }

    pub fn render_mut(&mut self) -> &mut R {
        &mut self.render
    }

    pub fn physics(&self) -> Option<&P> {
        self.physics.as_ref()
    }

    pub fn physics_mut(&mut self) -> Option<&mut P> {
        self.physics.as_mut()
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Builds submitted and not yet finished or cancelled.
    pub fn in_flight(&self) -> usize {
        self.in_flight.get()
    }

    /// Nothing building, nothing in flight, every subtree built.
    pub fn is_settled(&self) -> bool {
        self.in_flight.get() == 0
            && self
                .tree
                .nodes()
                .all(|n| n.subtree_built && !n.building)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    pub fn node(&self, id: NodeId) -> Option<&QuadNode> {
        self.tree.get(id)
    }

    pub fn node_count(&self) -> usize {
        self.tree.len()
    }

    pub fn leaves(&self) -> impl Iterator<Item = &QuadNode> {
        self.tree.leaves()
    }

    /// Leaf covering world `(x, y)`, if inside the world square.
    pub fn leaf_at(&self, x: f64, y: f64) -> Option<&QuadNode> {
        self.tree.leaf_at(x, y)
    }

    /// True once every ancestor of `node` has its subtree built; placement
    /// code uses it to wait for final geometry.
    pub fn are_all_parent_subtrees_built(&self, node: NodeId) -> bool {
        self.tree.get(node).is_some() && self.tree.all_ancestors_built(node)
    }

    /// Shared handle for other threads.
    pub fn coverage(&self) -> CoverageView {
        self.coverage.clone()
    }
}

impl<R: RenderBackend, P: PhysicsBackend, S: TaskScheduler> Drop for TerrainEngine<R, P, S> {
    fn drop(&mut self) {
        if self.shut_down {
            return;
        }
        if let Err(err) = self.shutdown() {
            error!("Terrain engine dropped without a clean shutdown: {err}");
        }
    }
}

//! Quadtree level of detail for streamed terrain.
//!
//! [`TerrainEngine`] splits and merges a quadtree around a moving viewpoint,
//! builds chunk meshes off-thread through a [`TaskScheduler`], and commits
//! finished subtrees to the render and physics backends so that the scene
//! always covers the whole world exactly once.

mod backend;
mod commit;
mod coverage;
mod engine;
mod geometry;
mod headless;
mod lifecycle;
mod pipeline;
mod quadtree;
mod selector;

pub use backend::{
    BackendError, CollisionObjectId, MeshHandle, MeshUpload, PhysicsBackend, RenderBackend,
    RenderObjectId,
};
pub use coverage::{CoverageCell, CoverageSnapshot, CoverageView};
pub use engine::{EngineError, EngineStats, TerrainEngine};
pub use headless::{CollisionRecord, HeadlessPhysicsBackend, HeadlessRenderBackend, RenderRecord};
pub use pipeline::{
    BuildCompletion, BuildOutcome, BuildTask, InFlightCounter, InFlightToken, ManualScheduler,
    SchedulerError, TaskScheduler, UnitOfWork, WorkerPool, worker_count,
};
pub use quadtree::{NodeId, NodeState, QuadNode};
pub use selector::DepthSelector;

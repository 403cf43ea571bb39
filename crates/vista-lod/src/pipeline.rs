//! Asynchronous chunk builds.
//!
//! The controlling thread wraps every build in a [`BuildTask`] and hands it
//! to a [`TaskScheduler`]. Whatever happens to the task afterwards, exactly
//! one [`BuildCompletion`] comes back on the completion channel and the
//! shared [`InFlightCounter`] drops by exactly one. Both exits consume the
//! boxed task, so a unit cannot report twice.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};
use vista_config::MeshConfig;
use vista_field::HeightSource;
use vista_math::Aabb;
use vista_mesh::{ChunkBuild, ChunkRequest, build_chunk};

use crate::quadtree::NodeId;

/// Number of units submitted but not yet finished or cancelled.
#[derive(Clone, Debug, Default)]
pub struct InFlightCounter(Arc<AtomicUsize>);

impl InFlightCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    /// Count one more unit until the returned token is dropped.
    pub fn acquire(&self) -> InFlightToken {
        self.0.fetch_add(1, Ordering::AcqRel);
        InFlightToken(Arc::clone(&self.0))
    }
}

/// Decrements its counter once, on drop.
#[derive(Debug)]
pub struct InFlightToken(Arc<AtomicUsize>);

impl Drop for InFlightToken {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A unit of work a scheduler can run or throw away.
///
/// A scheduler calls exactly one of the two methods for every unit it
/// accepted.
pub trait UnitOfWork: Send + 'static {
    fn run(self: Box<Self>);

    /// The unit was dropped from the queue without running.
    fn on_removed_from_queue(self: Box<Self>);
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler is shut down")]
    Closed,
}

pub trait TaskScheduler {
    /// Queue `unit`. On error the unit has already been told it was removed.
    fn submit(&self, unit: Box<dyn UnitOfWork>) -> Result<(), SchedulerError>;

    /// Remove every queued unit that has not started. Returns how many.
    fn cancel_pending(&self) -> usize;

    /// Stop accepting work and release worker resources.
    fn shutdown(&mut self) {}

    /// Stop accepting work without waiting for units that are running.
    ///
    /// Used when running units did not finish in time. Afterwards neither
    /// `shutdown` nor dropping the scheduler may block on them.
    fn abandon(&mut self) {}
}

/// What a build produced.
#[derive(Debug)]
pub enum BuildOutcome {
    Built(Box<ChunkBuild>),
    /// Builder error or a panic in the height source.
    Failed(String),
    /// Dropped from the queue before it ran.
    Cancelled,
}

/// Message posted back to the controlling thread for every build.
#[derive(Debug)]
pub struct BuildCompletion {
    pub node: NodeId,
    pub revision: u64,
    /// XY footprint of the requested chunk.
    pub footprint: Aabb,
    pub collision_required: bool,
    pub within_physics_radius: bool,
    pub outcome: BuildOutcome,
}

/// One chunk build, runnable on any thread.
pub struct BuildTask {
    pub node: NodeId,
    pub revision: u64,
    pub request: ChunkRequest,
    pub footprint: Aabb,
    pub collision_required: bool,
    pub within_physics_radius: bool,
    pub field: Arc<dyn HeightSource>,
    pub mesh_config: Arc<MeshConfig>,
    pub completions: Sender<BuildCompletion>,
    pub token: InFlightToken,
}

impl BuildTask {
    fn complete(self, outcome: BuildOutcome) {
        let BuildTask {
            node,
            revision,
            footprint,
            collision_required,
            within_physics_radius,
            completions,
            token,
            ..
        } = self;
        // The engine may already be gone; nobody is left to care.
        let _ = completions.send(BuildCompletion {
            node,
            revision,
            footprint,
            collision_required,
            within_physics_radius,
            outcome,
        });
        // Only after the send, so a zero count means every message is queued.
        drop(token);
    }
}

impl UnitOfWork for BuildTask {
    fn run(self: Box<Self>) {
        let task = *self;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            build_chunk(task.field.as_ref(), &task.request, &task.mesh_config)
        }));
        let outcome = match result {
            Ok(Ok(build)) => BuildOutcome::Built(Box::new(build)),
            Ok(Err(err)) => BuildOutcome::Failed(err.to_string()),
            Err(payload) => BuildOutcome::Failed(panic_message(payload.as_ref())),
        };
        task.complete(outcome);
    }

    fn on_removed_from_queue(self: Box<Self>) {
        self.complete(BuildOutcome::Cancelled);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("build panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("build panicked: {s}")
    } else {
        "build panicked".to_string()
    }
}

/// Worker thread count for a configured value; 0 leaves two cores free.
pub fn worker_count(configured: usize) -> usize {
    if configured > 0 {
        return configured;
    }
    (num_cpus::get().max(2) - 2).max(1)
}

/// Fixed pool of named OS threads fed through an unbounded channel.
pub struct WorkerPool {
    sender: Option<Sender<Box<dyn UnitOfWork>>>,
    /// Kept so queued units can be drained without a worker.
    queue: Receiver<Box<dyn UnitOfWork>>,
    shutting_down: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        let (tx, rx) = crossbeam_channel::unbounded::<Box<dyn UnitOfWork>>();
        let shutting_down = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(threads);
        for i in 0..threads {
            let rx = rx.clone();
            let stop = Arc::clone(&shutting_down);
            let spawned = std::thread::Builder::new()
                .name(format!("terrain-build-{i}"))
                .spawn(move || {
                    while let Ok(unit) = rx.recv() {
                        if stop.load(Ordering::Acquire) {
                            unit.on_removed_from_queue();
                        } else {
                            unit.run();
                        }
                    }
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => warn!("failed to spawn terrain-build-{i}: {err}"),
            }
        }
        info!("Terrain build pool started with {} workers", handles.len());

        Self {
            sender: Some(tx),
            queue: rx,
            shutting_down,
            handles,
        }
    }

    pub fn thread_count(&self) -> usize {
        self.handles.len()
    }

    /// Units waiting for a worker.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

impl TaskScheduler for WorkerPool {
    fn submit(&self, unit: Box<dyn UnitOfWork>) -> Result<(), SchedulerError> {
        let Some(sender) = &self.sender else {
            unit.on_removed_from_queue();
            return Err(SchedulerError::Closed);
        };
        if self.handles.is_empty() {
            unit.on_removed_from_queue();
            return Err(SchedulerError::Closed);
        }
        sender.send(unit).map_err(|err| {
            err.0.on_removed_from_queue();
            SchedulerError::Closed
        })
    }

    fn cancel_pending(&self) -> usize {
        let mut cancelled = 0;
        while let Ok(unit) = self.queue.try_recv() {
            unit.on_removed_from_queue();
            cancelled += 1;
        }
        cancelled
    }

    fn shutdown(&mut self) {
        if self.sender.is_none() && self.handles.is_empty() {
            return;
        }
        self.shutting_down.store(true, Ordering::Release);
        self.sender.take();
        let cancelled = self.cancel_pending();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        debug!("Terrain build pool stopped, {cancelled} queued units cancelled");
    }

    fn abandon(&mut self) {
        self.shutting_down.store(true, Ordering::Release);
        self.sender.take();
        let cancelled = self.cancel_pending();
        // Dropping a handle detaches its thread. A worker exits on its own
        // once its unit returns and it finds the channel closed.
        let detached = self.handles.drain(..).count();
        warn!("Terrain build pool abandoned {detached} workers, {cancelled} queued units cancelled");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Scheduler that only runs work when told to.
///
/// Lets tests and tools pick the exact order in which builds finish.
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<VecDeque<Box<dyn UnitOfWork>>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Box<dyn UnitOfWork>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Run the oldest queued unit. Returns false if the queue was empty.
    pub fn run_next(&self) -> bool {
        let unit = self.lock().pop_front();
        match unit {
            Some(unit) => {
                unit.run();
                true
            }
            None => false,
        }
    }

    /// Run the newest queued unit. Returns false if the queue was empty.
    pub fn run_last(&self) -> bool {
        let unit = self.lock().pop_back();
        match unit {
            Some(unit) => {
                unit.run();
                true
            }
            None => false,
        }
    }

    /// Drop the oldest queued unit without running it.
    pub fn discard_next(&self) -> bool {
        let unit = self.lock().pop_front();
        match unit {
            Some(unit) => {
                unit.on_removed_from_queue();
                true
            }
            None => false,
        }
    }

    /// Run everything queued right now, oldest first.
    pub fn run_all(&self) -> usize {
        let units: Vec<_> = self.lock().drain(..).collect();
        let count = units.len();
        for unit in units {
            unit.run();
        }
        count
    }

    /// Run the queued units in the order given by `order`, a list of queue
    /// positions. Out-of-range and repeated positions are skipped; units not
    /// named run afterwards in queue order.
    pub fn run_in_order(&self, order: &[usize]) -> usize {
        let mut units: Vec<Option<Box<dyn UnitOfWork>>> =
            self.lock().drain(..).map(Some).collect();
        let count = units.len();
        for &i in order {
            if let Some(unit) = units.get_mut(i).and_then(Option::take) {
                unit.run();
            }
        }
        for unit in units.into_iter().flatten() {
            unit.run();
        }
        count
    }

    /// Drop every queued unit without running it.
    pub fn discard_all(&self) -> usize {
        let units: Vec<_> = self.lock().drain(..).collect();
        let count = units.len();
        for unit in units {
            unit.on_removed_from_queue();
        }
        count
    }
}

impl TaskScheduler for ManualScheduler {
    fn submit(&self, unit: Box<dyn UnitOfWork>) -> Result<(), SchedulerError> {
        self.lock().push_back(unit);
        Ok(())
    }

    fn cancel_pending(&self) -> usize {
        self.discard_all()
    }
}

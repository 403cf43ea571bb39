//! Read-only view of which terrain is at its final detail level.
//!
//! Vegetation and other placement code runs on its own threads and must not
//! touch the quadtree. After every tick the engine publishes a fresh
//! snapshot by swapping one `Arc`; readers keep whatever snapshot they
//! loaded until they ask again.

use std::sync::{Arc, PoisonError, RwLock};

use vista_math::Aabb;

/// One leaf of the tree at the time of the snapshot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoverageCell {
    pub footprint: Aabb,
    /// The leaf and every ancestor have their subtree built.
    pub fully_built: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CoverageSnapshot {
    /// Engine tick that produced the snapshot.
    pub tick: u64,
    pub cells: Vec<CoverageCell>,
}

impl CoverageSnapshot {
    /// False if any leaf touching `(x, y)` is still being built, or if the
    /// point lies outside every leaf.
    pub fn is_fully_built(&self, x: f64, y: f64) -> bool {
        let mut found = false;
        for cell in self.cells.iter().filter(|c| c.footprint.contains_xy(x, y)) {
            if !cell.fully_built {
                return false;
            }
            found = true;
        }
        found
    }

    pub fn fully_built_fraction(&self) -> f64 {
        if self.cells.is_empty() {
            return 0.0;
        }
        let built = self.cells.iter().filter(|c| c.fully_built).count();
        built as f64 / self.cells.len() as f64
    }
}

/// Cheap, cloneable handle to the latest snapshot.
#[derive(Clone, Debug, Default)]
pub struct CoverageView {
    current: Arc<RwLock<Arc<CoverageSnapshot>>>,
}

impl CoverageView {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn publish(&self, snapshot: CoverageSnapshot) {
        let snapshot = Arc::new(snapshot);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    pub fn snapshot(&self) -> Arc<CoverageSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn is_fully_built(&self, x: f64, y: f64) -> bool {
        self.snapshot().is_fully_built(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(x: f64, y: f64, built: bool) -> CoverageCell {
        CoverageCell {
            footprint: Aabb::from_square(x, y, 10.0, 0.0, 1.0),
            fully_built: built,
        }
    }

    #[test]
    fn test_lookup_by_point() {
        let view = CoverageView::new();
        assert!(!view.is_fully_built(1.0, 1.0));

        view.publish(CoverageSnapshot {
            tick: 1,
            cells: vec![cell(0.0, 0.0, true), cell(10.0, 0.0, false)],
        });
        assert!(view.is_fully_built(5.0, 5.0));
        assert!(!view.is_fully_built(15.0, 5.0));
        // Shared edge with an unbuilt neighbour.
        assert!(!view.is_fully_built(10.0, 5.0));
        assert!(!view.is_fully_built(50.0, 5.0));
        assert_eq!(view.snapshot().fully_built_fraction(), 0.5);
    }

    #[test]
    fn test_old_snapshot_survives_publish() {
        let view = CoverageView::new();
        view.publish(CoverageSnapshot {
            tick: 1,
            cells: vec![cell(0.0, 0.0, false)],
        });
        let old = view.snapshot();
        view.clone().publish(CoverageSnapshot {
            tick: 2,
            cells: vec![cell(0.0, 0.0, true)],
        });
        assert_eq!(old.tick, 1);
        assert!(!old.is_fully_built(5.0, 5.0));
        assert!(view.is_fully_built(5.0, 5.0));
    }

    #[test]
    fn test_view_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CoverageView>();
    }
}

//! Render queue for wave-based hosts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::Mutex;

use super::Invalidate;

/// Unique identifier for a host unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitId(u64);

impl UnitId {
    /// Generate a new unique unit ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for UnitId {
    fn default() -> Self {
        Self::new()
    }
}

/// Collects invalidated units until the host drains them.
///
/// A unit invalidated several times before a drain appears once, at the
/// position of its first invalidation.
#[derive(Debug, Clone, Default)]
pub struct RenderQueue {
    dirty: Arc<Mutex<IndexSet<UnitId>>>,
}

impl RenderQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// A scheduling primitive that marks `unit` dirty in this queue.
    pub fn invalidator(&self, unit: UnitId) -> impl Invalidate + 'static {
        let dirty = Arc::clone(&self.dirty);
        move || {
            dirty.lock().insert(unit);
        }
    }

    /// Mark `unit` dirty.
    pub fn mark(&self, unit: UnitId) {
        self.dirty.lock().insert(unit);
    }

    /// Take the current wave: every unit marked since the last drain.
    pub fn drain(&self) -> Vec<UnitId> {
        self.dirty.lock().drain(..).collect()
    }

    /// Number of units waiting to re-render.
    pub fn len(&self) -> usize {
        self.dirty.lock().len()
    }

    /// Whether no unit is waiting.
    pub fn is_empty(&self) -> bool {
        self.dirty.lock().is_empty()
    }
}

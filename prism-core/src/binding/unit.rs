//! Per-unit bindings.
//!
//! Observers are matched to the unit's render cycle by call order: the
//! n-th `select` of a render reuses the observer created by the n-th
//! `select` of the previous render. Reuse updates the observer's projection
//! in place rather than creating a duplicate. If the n-th call projects to a
//! different type than before, the old observer is detached and a new one
//! takes its slot.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::Invalidate;
use crate::store::{
    infallible, whole_value, Equality, Identity, ObserverHandle, Projection, Result, Store,
    StoreError,
};

trait BoundSlot: Send + Sync {
    fn detach(&self);
    fn as_any(&self) -> &dyn Any;
}

impl<T, G> BoundSlot for ObserverHandle<T, G>
where
    T: Send + Sync + 'static,
    G: Send + Sync + 'static,
{
    fn detach(&self) {
        self.unsubscribe();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct BindingState {
    slots: Vec<Box<dyn BoundSlot>>,
    cursor: usize,
    retired: bool,
}

/// Ties a host unit's observers to its lifecycle.
///
/// Dropping the binding retires it.
pub struct Binding<T> {
    store: Store<T>,
    invalidate: Arc<dyn Invalidate>,
    state: Mutex<BindingState>,
}

impl<T> Binding<T>
where
    T: Send + Sync + 'static,
{
    pub(crate) fn new<I>(store: Store<T>, invalidate: I) -> Self
    where
        I: Invalidate + 'static,
    {
        Self {
            store,
            invalidate: Arc::new(invalidate),
            state: Mutex::new(BindingState {
                slots: Vec::new(),
                cursor: 0,
                retired: false,
            }),
        }
    }

    /// Start a render cycle.
    pub fn begin(&self) {
        self.state.lock().cursor = 0;
    }

    /// Finish a render cycle, detaching observers the render no longer used.
    pub fn end(&self) {
        let stale = {
            let mut state = self.state.lock();
            let keep = state.cursor.min(state.slots.len());
            state.slots.split_off(keep)
        };
        if !stale.is_empty() {
            trace!(store = self.store.id(), detached = stale.len(), "binding shrank");
        }
        for slot in stale {
            slot.detach();
        }
    }

    /// Run one render cycle.
    pub fn render<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        self.begin();
        let out = f(self);
        self.end();
        out
    }

    /// Read a slice of the state, compared by identity, and keep watching it.
    pub fn select<G, P>(&self, projection: P) -> Result<G>
    where
        G: Identity + Clone + Send + Sync + 'static,
        P: Fn(&T) -> G + Send + Sync + 'static,
    {
        self.select_with(projection, Equality::identity())
    }

    /// Read a slice of the state under a custom equality policy, and keep
    /// watching it.
    pub fn select_with<G, P>(&self, projection: P, equals: Equality<G>) -> Result<G>
    where
        G: Clone + Send + Sync + 'static,
        P: Fn(&T) -> G + Send + Sync + 'static,
    {
        self.select_projection(infallible(projection), equals)
    }

    /// Read the whole value, and re-render on every new snapshot.
    pub fn select_value(&self) -> Result<Arc<T>> {
        self.select_projection(whole_value(), Equality::identity())
    }

    fn select_projection<G>(&self, projection: Projection<T, G>, equals: Equality<G>) -> Result<G>
    where
        G: Clone + Send + Sync + 'static,
    {
        let (index, existing) = {
            let mut state = self.state.lock();
            if state.retired {
                return Err(StoreError::InvalidState {
                    store: self.store.id(),
                });
            }
            let index = state.cursor;
            state.cursor += 1;
            let existing = state.slots.get(index).map(|slot| {
                slot.as_any()
                    .downcast_ref::<ObserverHandle<T, G>>()
                    .cloned()
            });
            (index, existing)
        };

        if let Some(Some(handle)) = existing {
            self.store.reselect_projection(&handle, projection, equals)?;
            return Ok(handle.get());
        }

        let invalidate = Arc::clone(&self.invalidate);
        let handle = self
            .store
            .attach(projection, equals, Arc::new(move || invalidate.invalidate()))?;
        let value = handle.get();

        let replaced = {
            let mut state = self.state.lock();
            let slot: Box<dyn BoundSlot> = Box::new(handle);
            if index < state.slots.len() {
                Some(std::mem::replace(&mut state.slots[index], slot))
            } else {
                state.slots.push(slot);
                None
            }
        };
        if let Some(old) = replaced {
            trace!(store = self.store.id(), index, "binding slot changed type");
            old.detach();
        }
        Ok(value)
    }

    /// Number of observers held by this binding.
    pub fn observer_count(&self) -> usize {
        self.state.lock().slots.len()
    }

    /// Whether the binding has been retired.
    pub fn is_retired(&self) -> bool {
        self.state.lock().retired
    }

    /// Detach every observer. Runs once; later calls are no-ops.
    pub fn retire(&self) {
        if let Some(slots) = self.take_slots() {
            debug!(store = self.store.id(), observers = slots.len(), "binding retired");
            for slot in slots {
                slot.detach();
            }
        }
    }
}

impl<T> Binding<T> {
    /// Mark the binding retired, returning its slots the first time only.
    fn take_slots(&self) -> Option<Vec<Box<dyn BoundSlot>>> {
        let mut state = self.state.lock();
        if state.retired {
            return None;
        }
        state.retired = true;
        Some(std::mem::take(&mut state.slots))
    }
}

impl<T> Drop for Binding<T> {
    fn drop(&mut self) {
        for slot in self.take_slots().into_iter().flatten() {
            slot.detach();
        }
    }
}

impl<T> fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Binding")
            .field("store", &self.store.id())
            .field("observers", &state.slots.len())
            .field("retired", &state.retired)
            .finish()
    }
}

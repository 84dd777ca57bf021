//! Store Implementation
//!
//! The store owns the current published value and the registry of observers
//! watching it.
//!
//! # Locking
//!
//! All mutable store state sits behind a single mutex. The mutex is never
//! held while user code runs: projections and change callbacks are free to
//! read the store, subscribe, unsubscribe or publish. Observers removed from
//! the registry are dropped after the lock is released, since dropping one
//! may run arbitrary destructors that call back into the store.

use std::collections::VecDeque;
use std::fmt;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::config::StoreConfig;
use super::equality::{Equality, Identity};
use super::error::{Result, StoreError};
use super::handle::ObserverHandle;
use super::observer::{project, ObserverCell, ObserverId, Observe, OnChange, Projection};
use super::registry::Registry;

/// Counter for generating unique store IDs.
static STORE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_store_id() -> u64 {
    STORE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

pub(crate) struct StoreState<T> {
    /// The last published value.
    pub(crate) value: Arc<T>,
    pub(crate) registry: Registry<T>,
    /// Incremented at the start of every pass.
    pub(crate) epoch: u64,
    pub(crate) torn_down: bool,
    /// Whether a publish is currently draining `pending`.
    pub(crate) notifying: bool,
    /// Values published while a pass was running, in publish order.
    pub(crate) pending: VecDeque<Arc<T>>,
}

pub(crate) struct StoreInner<T> {
    pub(crate) id: u64,
    pub(crate) state: Mutex<StoreState<T>>,
    pub(crate) config: StoreConfig,
}

impl<T> StoreInner<T> {
    pub(crate) fn torn_down_error(&self) -> StoreError {
        StoreError::InvalidState { store: self.id }
    }

    /// Remove an observer. Returns true if it was live.
    pub(crate) fn detach(&self, id: ObserverId) -> bool {
        let removed = self.state.lock().registry.remove(id);
        match removed {
            Some(observer) => {
                debug!(observer = %id, "observer detached");
                drop(observer);
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_live(&self, id: ObserverId) -> bool {
        self.state.lock().registry.contains(id)
    }
}

/// A single-writer value store with selector-based subscriptions.
///
/// Cloning a store yields another handle to the same value and registry.
///
/// # Example
///
/// ```rust
/// use prism_core::store::Store;
///
/// let store = Store::new((String::from("foo"), 1_u32));
/// let foo = store.subscribe(|s| s.0.clone(), || println!("foo changed")).unwrap();
///
/// store.publish((String::from("fooo"), 1)).unwrap();
/// assert_eq!(foo.get(), "fooo");
/// ```
pub struct Store<T> {
    pub(crate) inner: Arc<StoreInner<T>>,
}

impl<T> Store<T> {
    /// Get the store's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }
}

impl<T> Store<T>
where
    T: Send + Sync + 'static,
{
    /// Create a store holding `initial`.
    pub fn new(initial: T) -> Self {
        Self::with_config(initial, StoreConfig::default())
    }

    /// Create a store with explicit configuration.
    pub fn with_config(initial: T, config: StoreConfig) -> Self {
        let id = next_store_id();
        debug!(store = id, "store created");
        Self {
            inner: Arc::new(StoreInner {
                id,
                state: Mutex::new(StoreState {
                    value: Arc::new(initial),
                    registry: Registry::new(id),
                    epoch: 0,
                    torn_down: false,
                    notifying: false,
                    pending: VecDeque::new(),
                }),
                config,
            }),
        }
    }

    /// The last published value, or the initial value if nothing was published.
    ///
    /// While a pass is delivering, this is the value that pass delivers;
    /// values published from inside the pass become current when their own
    /// pass starts.
    pub fn current_value(&self) -> Result<Arc<T>> {
        let state = self.inner.state.lock();
        if state.torn_down {
            return Err(self.inner.torn_down_error());
        }
        Ok(Arc::clone(&state.value))
    }

    /// Subscribe with the default identity policy.
    pub fn subscribe<G, P, C>(&self, projection: P, on_change: C) -> Result<ObserverHandle<T, G>>
    where
        G: Identity + Send + Sync + 'static,
        P: Fn(&T) -> G + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        self.subscribe_with(projection, Equality::identity(), on_change)
    }

    /// Subscribe with a custom equality policy.
    pub fn subscribe_with<G, P, C>(
        &self,
        projection: P,
        equals: Equality<G>,
        on_change: C,
    ) -> Result<ObserverHandle<T, G>>
    where
        G: Send + Sync + 'static,
        P: Fn(&T) -> G + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        self.attach(infallible(projection), equals, Arc::new(on_change))
    }

    /// Subscribe with a projection that can fail.
    ///
    /// An error while computing the initial result fails the subscription;
    /// an error during a later pass faults the observer.
    pub fn subscribe_fallible<G, E, P, C>(
        &self,
        projection: P,
        equals: Equality<G>,
        on_change: C,
    ) -> Result<ObserverHandle<T, G>>
    where
        G: Send + Sync + 'static,
        E: Display + 'static,
        P: Fn(&T) -> std::result::Result<G, E> + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        self.attach(fallible(projection), equals, Arc::new(on_change))
    }

    /// Subscribe to the whole value.
    ///
    /// The observer's result is the published snapshot itself, compared by
    /// pointer, so it fires on every publish of a new value and stays quiet
    /// when the same `Arc` is published again.
    pub fn subscribe_value<C>(&self, on_change: C) -> Result<ObserverHandle<T, Arc<T>>>
    where
        C: Fn() + Send + Sync + 'static,
    {
        self.attach(whole_value(), Equality::identity(), Arc::new(on_change))
    }

    pub(crate) fn attach<G>(
        &self,
        projection: Projection<T, G>,
        equals: Equality<G>,
        on_change: OnChange,
    ) -> Result<ObserverHandle<T, G>>
    where
        G: Send + Sync + 'static,
    {
        let mut seen = self.current_value()?;
        loop {
            let initial = project(&projection, &seen)
                .map_err(|message| StoreError::Projection { message })?;

            let mut state = self.inner.state.lock();
            if state.torn_down {
                return Err(self.inner.torn_down_error());
            }
            // Another publish landed while projecting; project again.
            if !Arc::ptr_eq(&state.value, &seen) {
                seen = Arc::clone(&state.value);
                continue;
            }

            let id = state.registry.next_id();
            let cell = Arc::new(ObserverCell::new(id, projection, equals, initial, on_change));
            let epoch = state.epoch;
            state
                .registry
                .insert(Arc::clone(&cell) as Arc<dyn Observe<T>>, epoch);
            drop(state);

            debug!(observer = %id, "observer attached");
            return Ok(ObserverHandle::new(Arc::downgrade(&self.inner), cell));
        }
    }

    /// Give an existing observer a new projection and equality policy.
    ///
    /// The observer keeps its identity and callback; its last result is
    /// recomputed against the current value, and a previous fault is
    /// cleared. A no-op for observers that are no longer registered.
    pub fn reselect<G, P>(
        &self,
        handle: &ObserverHandle<T, G>,
        projection: P,
        equals: Equality<G>,
    ) -> Result<()>
    where
        G: Send + Sync + 'static,
        P: Fn(&T) -> G + Send + Sync + 'static,
    {
        self.reselect_projection(handle, infallible(projection), equals)
    }

    pub(crate) fn reselect_projection<G>(
        &self,
        handle: &ObserverHandle<T, G>,
        projection: Projection<T, G>,
        equals: Equality<G>,
    ) -> Result<()>
    where
        G: Send + Sync + 'static,
    {
        self.check_owned(handle.id())?;
        let value = self.current_value()?;
        if !self.inner.is_live(handle.id()) {
            return Ok(());
        }
        handle
            .cell
            .reselect(projection, equals, &value)
            .map_err(|message| StoreError::Projection { message })
    }

    /// Detach an observer.
    ///
    /// Idempotent: detaching twice, or after teardown, is a no-op. Safe to
    /// call from inside a pass; an observer detached mid-pass is neither
    /// evaluated nor notified for the rest of it.
    pub fn unsubscribe<G>(&self, handle: &ObserverHandle<T, G>) -> Result<()> {
        self.check_owned(handle.id())?;
        self.inner.detach(handle.id());
        Ok(())
    }

    /// Read an observer's last result.
    pub fn read<G: Clone>(&self, handle: &ObserverHandle<T, G>) -> Result<G> {
        self.check_owned(handle.id())?;
        Ok(handle.get())
    }

    /// Number of live observers.
    pub fn observer_count(&self) -> usize {
        self.inner.state.lock().registry.len()
    }

    /// Whether [`Store::teardown`] has been called.
    pub fn is_torn_down(&self) -> bool {
        self.inner.state.lock().torn_down
    }

    /// Detach every observer and reject further publishes and subscriptions.
    ///
    /// Queued publishes are discarded. Idempotent.
    pub fn teardown(&self) {
        let drained = {
            let mut state = self.inner.state.lock();
            if state.torn_down {
                return;
            }
            state.torn_down = true;
            state.pending.clear();
            state.registry.drain()
        };
        debug!(store = self.inner.id, observers = drained.len(), "store torn down");
        drop(drained);
    }

    fn check_owned(&self, id: ObserverId) -> Result<()> {
        if id.store() == self.inner.id {
            Ok(())
        } else {
            Err(StoreError::ForeignHandle {
                observer: id,
                store: self.inner.id,
            })
        }
    }
}

pub(crate) fn infallible<T, G, P>(projection: P) -> Projection<T, G>
where
    T: 'static,
    G: 'static,
    P: Fn(&T) -> G + Send + Sync + 'static,
{
    Arc::new(move |value: &Arc<T>| Ok(projection(&**value)))
}

fn fallible<T, G, E, P>(projection: P) -> Projection<T, G>
where
    T: 'static,
    G: 'static,
    E: 'static,
    E: Display,
    P: Fn(&T) -> std::result::Result<G, E> + Send + Sync + 'static,
{
    Arc::new(move |value: &Arc<T>| projection(&**value).map_err(|err| err.to_string()))
}

/// Projects the whole snapshot.
pub(crate) fn whole_value<T: 'static>() -> Projection<T, Arc<T>> {
    Arc::new(|value: &Arc<T>| Ok(Arc::clone(value)))
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("observers", &state.registry.len())
            .field("epoch", &state.epoch)
            .field("torn_down", &state.torn_down)
            .finish()
    }
}

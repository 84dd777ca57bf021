//! Store Handles
//!
//! [`create_store`] splits a store into the two capabilities the host hands
//! out: a [`Publisher`] for the single writer and a [`Subscriber`] for
//! readers. Both close over the same store; there is no global lookup from
//! handle to store, so a handle can only ever reach the store it came from.
//!
//! Subscriptions are represented by [`ObserverHandle`], which reads the
//! observer's last result directly and holds only a weak reference to the
//! store.

use std::fmt;
use std::fmt::Display;
use std::sync::{Arc, Weak};

use super::config::StoreConfig;
use super::equality::{Equality, Identity};
use super::error::{ProjectionFault, Result};
use super::notify::PassReport;
use super::observer::{ObserverCell, ObserverId};
use super::state::{Store, StoreInner};
use crate::binding::{Binding, Invalidate};

/// Create a store holding `initial` and return its publish and subscribe
/// capabilities.
pub fn create_store<T>(initial: T) -> (Publisher<T>, Subscriber<T>)
where
    T: Send + Sync + 'static,
{
    create_store_with(initial, StoreConfig::default())
}

/// Like [`create_store`], with explicit configuration.
pub fn create_store_with<T>(initial: T, config: StoreConfig) -> (Publisher<T>, Subscriber<T>)
where
    T: Send + Sync + 'static,
{
    let store = Store::with_config(initial, config);
    (
        Publisher {
            store: store.clone(),
        },
        Subscriber { store },
    )
}

/// The write half of a store.
pub struct Publisher<T> {
    store: Store<T>,
}

impl<T> Publisher<T>
where
    T: Send + Sync + 'static,
{
    /// Publish a new value. See [`Store::publish`].
    pub fn publish(&self, value: T) -> Result<PassReport> {
        self.store.publish(value)
    }

    /// Publish a value derived from the latest one. See [`Store::update`].
    pub fn update<F>(&self, f: F) -> Result<PassReport>
    where
        F: FnMut(&T) -> T,
    {
        self.store.update(f)
    }

    /// Tear the store down. See [`Store::teardown`].
    pub fn teardown(&self) {
        self.store.teardown();
    }

    /// The underlying store.
    pub fn store(&self) -> &Store<T> {
        &self.store
    }
}

/// The read half of a store.
pub struct Subscriber<T> {
    store: Store<T>,
}

impl<T> Subscriber<T>
where
    T: Send + Sync + 'static,
{
    /// Observe a slice of the state, compared by identity.
    pub fn select<G, P, C>(&self, projection: P, on_change: C) -> Result<ObserverHandle<T, G>>
    where
        G: Identity + Send + Sync + 'static,
        P: Fn(&T) -> G + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        self.store.subscribe(projection, on_change)
    }

    /// Observe a slice of the state under a custom equality policy.
    pub fn select_with<G, P, C>(
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
        self.store.subscribe_with(projection, equals, on_change)
    }

    /// Observe the whole value, compared by pointer.
    ///
    /// Fires whenever a new snapshot is published, however little changed.
    pub fn select_value<C>(&self, on_change: C) -> Result<ObserverHandle<T, Arc<T>>>
    where
        C: Fn() + Send + Sync + 'static,
    {
        self.store.subscribe_value(on_change)
    }

    /// Observe a slice through a projection that can fail.
    pub fn select_fallible<G, E, P, C>(
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
        self.store.subscribe_fallible(projection, equals, on_change)
    }

    /// Detach an observer. See [`Store::unsubscribe`].
    pub fn unsubscribe<G>(&self, handle: &ObserverHandle<T, G>) -> Result<()> {
        self.store.unsubscribe(handle)
    }

    /// The current value.
    pub fn current_value(&self) -> Result<Arc<T>> {
        self.store.current_value()
    }

    /// Create a binding for one host unit that re-renders through `invalidate`.
    pub fn bind<I>(&self, invalidate: I) -> Binding<T>
    where
        I: Invalidate + 'static,
    {
        Binding::new(self.store.clone(), invalidate)
    }

    /// The underlying store.
    pub fn store(&self) -> &Store<T> {
        &self.store
    }
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<T> fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Publisher").field(&self.store.id()).finish()
    }
}

impl<T> fmt::Debug for Subscriber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Subscriber").field(&self.store.id()).finish()
    }
}

/// Handle to a registered observer.
///
/// Dropping the handle does not detach the observer; call
/// [`ObserverHandle::unsubscribe`] (or use a [`Binding`], which detaches on
/// drop). Discarding a freshly issued handle is flagged at compile time:
///
/// ```compile_fail
/// #![deny(unused_must_use)]
/// let store = prism_core::store::Store::new(0_u32);
/// store.subscribe(|v: &u32| *v, || {}).unwrap();
/// ```
#[must_use = "dropping the handle leaves the observer registered; keep it to unsubscribe"]
pub struct ObserverHandle<T, G> {
    store: Weak<StoreInner<T>>,
    pub(crate) cell: Arc<ObserverCell<T, G>>,
}

impl<T, G> ObserverHandle<T, G> {
    pub(crate) fn new(store: Weak<StoreInner<T>>, cell: Arc<ObserverCell<T, G>>) -> Self {
        Self { store, cell }
    }

    /// The observer's id.
    pub fn id(&self) -> ObserverId {
        self.cell.id()
    }

    /// The last projected result.
    pub fn get(&self) -> G
    where
        G: Clone,
    {
        self.cell.with_last(G::clone)
    }

    /// Borrow the last projected result.
    ///
    /// The observer is not locked while `f` runs, so `f` may read this
    /// handle again.
    pub fn with<R>(&self, f: impl FnOnce(&G) -> R) -> R {
        self.cell.with_last(f)
    }

    /// The fault that stopped this observer, if any.
    pub fn fault(&self) -> Option<ProjectionFault> {
        self.cell.fault()
    }

    /// Whether the observer is still registered with a live store.
    pub fn is_active(&self) -> bool {
        self.store
            .upgrade()
            .is_some_and(|inner| inner.is_live(self.id()))
    }

    /// Detach the observer. Idempotent, and a no-op once the store is gone.
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.store.upgrade() {
            inner.detach(self.id());
        }
    }
}

impl<T, G> Clone for ObserverHandle<T, G> {
    fn clone(&self) -> Self {
        Self {
            store: Weak::clone(&self.store),
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T, G: fmt::Debug> fmt::Debug for ObserverHandle<T, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverHandle")
            .field("id", &self.id())
            .field("observer", &self.cell)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn publisher_and_subscriber_share_a_store() {
        let (publisher, subscriber) = create_store(1);
        assert_eq!(publisher.store().id(), subscriber.store().id());

        publisher.publish(2).unwrap();
        assert_eq!(*subscriber.current_value().unwrap(), 2);
    }

    #[test]
    fn update_derives_from_current_value() {
        let (publisher, subscriber) = create_store(10);
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        let handle = subscriber
            .select(|v: &i32| *v, move || {
                fired_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        publisher.update(|v| v + 5).unwrap();
        assert_eq!(handle.get(), 15);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handle_outlives_store() {
        let (publisher, subscriber) = create_store(3);
        let handle = subscriber.select(|v: &i32| *v, || {}).unwrap();
        drop(publisher);
        drop(subscriber);

        assert!(!handle.is_active());
        handle.unsubscribe();
        assert_eq!(handle.get(), 3);
    }

    #[test]
    fn update_inside_callback_builds_on_queued_value() {
        let (publisher, subscriber) = create_store(0);
        let publisher_clone = publisher.clone();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        let _observer = subscriber
            .select(|v: &i32| *v, move || {
                if fired_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                    publisher_clone.update(|v| v + 1).unwrap();
                    publisher_clone.update(|v| v + 1).unwrap();
                }
            })
            .unwrap();

        let report = publisher.publish(1).unwrap();
        assert_eq!(report.passes, 3);
        assert_eq!(*subscriber.current_value().unwrap(), 3);
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn select_value_watches_the_snapshot() {
        let (publisher, subscriber) = create_store(String::from("foo"));
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        let whole = subscriber
            .select_value(move || {
                fired_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(*whole.get(), "foo");

        // Same text, new snapshot: still a change.
        publisher.publish(String::from("foo")).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // The same snapshot again is not.
        let current = subscriber.current_value().unwrap();
        publisher.store().publish_arc(Arc::clone(&current)).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&whole.get(), &current));
    }

    #[test]
    fn comparator_and_reader_may_read_the_same_handle() {
        let (publisher, subscriber) = create_store(1);
        let slot: Arc<parking_lot::Mutex<Option<ObserverHandle<i32, i32>>>> =
            Arc::new(parking_lot::Mutex::new(None));
        let slot_clone = slot.clone();
        let handle = subscriber
            .select_with(
                |v: &i32| *v,
                Equality::new(move |a: &i32, b: &i32| {
                    let own = slot_clone.lock().as_ref().map(ObserverHandle::get);
                    own.map_or(a == b, |last| *b == last && a == b)
                }),
                || {},
            )
            .unwrap();
        *slot.lock() = Some(handle.clone());

        publisher.publish(2).unwrap();
        assert_eq!(handle.get(), 2);
        assert_eq!(handle.with(|v| v + handle.get()), 4);
    }
}

//! Observer Records
//!
//! An observer is the unit of subscription: a projection over the stored
//! value, the last result it produced, the equality policy used to decide
//! whether a new result is a change, and the callback fired on change.
//!
//! The registry stores observers type-erased behind [`Observe`], since every
//! observer on a store projects to its own type. The typed half lives in
//! [`ObserverCell`], which the issuing handle keeps so it can read the last
//! result without going through the registry.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use super::equality::Equality;
use super::error::{panic_message, ProjectionFault};

/// Identity of an observer within the store that issued it.
///
/// Ids are keyed by registry slot and slot generation, so an id that outlives
/// its observer never matches whichever observer later reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ObserverId {
    store: u64,
    slot: u32,
    generation: u32,
}

impl ObserverId {
    pub(crate) fn new(store: u64, slot: u32, generation: u32) -> Self {
        Self {
            store,
            slot,
            generation,
        }
    }

    /// Id of the store that issued this observer.
    pub fn store(&self) -> u64 {
        self.store
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot as usize
    }

    pub(crate) fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}v{}", self.store, self.slot, self.generation)
    }
}

/// A projection from the stored snapshot to an observer's slice.
///
/// Fallible projections report their error message; infallible ones are
/// wrapped to always succeed.
pub(crate) type Projection<T, G> = Arc<dyn Fn(&Arc<T>) -> Result<G, String> + Send + Sync>;

/// Callback fired when an observer's slice changes.
pub(crate) type OnChange = Arc<dyn Fn() + Send + Sync>;

/// Outcome of evaluating one observer against a published value.
#[derive(Debug)]
pub(crate) enum Evaluation {
    /// The projection matched the last result under the equality policy.
    Unchanged,
    /// The projection produced a new result; the callback is due.
    Changed,
    /// The observer is faulted and was not evaluated.
    Skipped,
    /// The projection failed during this evaluation.
    Faulted(ProjectionFault),
}

/// Type-erased view of an observer, as held by the registry.
pub(crate) trait Observe<T>: Send + Sync {
    fn id(&self) -> ObserverId;

    /// Project `value`, compare against the last result and store the new one.
    fn evaluate(&self, value: &Arc<T>) -> Evaluation;

    /// Fire the change callback.
    fn notify(&self);
}

struct ObserverState<T, G> {
    projection: Projection<T, G>,
    equals: Equality<G>,
    last: Arc<G>,
    fault: Option<ProjectionFault>,
}

/// The typed observer record.
///
/// The lock only guards swaps of the fields above. Projections, comparators
/// and readers of the last result all run with it released, so any of them
/// may read this observer again.
pub(crate) struct ObserverCell<T, G> {
    id: ObserverId,
    state: Mutex<ObserverState<T, G>>,
    on_change: OnChange,
}

/// Run a projection, converting both errors and panics into a message.
pub(crate) fn project<T, G>(projection: &Projection<T, G>, value: &Arc<T>) -> Result<G, String> {
    match catch_unwind(AssertUnwindSafe(|| projection(value))) {
        Ok(result) => result,
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

impl<T, G> ObserverCell<T, G> {
    pub(crate) fn new(
        id: ObserverId,
        projection: Projection<T, G>,
        equals: Equality<G>,
        initial: G,
        on_change: OnChange,
    ) -> Self {
        Self {
            id,
            state: Mutex::new(ObserverState {
                projection,
                equals,
                last: Arc::new(initial),
                fault: None,
            }),
            on_change,
        }
    }

    pub(crate) fn id(&self) -> ObserverId {
        self.id
    }

    pub(crate) fn last(&self) -> Arc<G> {
        Arc::clone(&self.state.lock().last)
    }

    pub(crate) fn with_last<R>(&self, f: impl FnOnce(&G) -> R) -> R {
        let last = self.last();
        f(&last)
    }

    pub(crate) fn fault(&self) -> Option<ProjectionFault> {
        self.state.lock().fault.clone()
    }

    /// Swap in a new projection and policy, recomputing the last result
    /// against `value`. Clears any previous fault on success.
    pub(crate) fn reselect(
        &self,
        projection: Projection<T, G>,
        equals: Equality<G>,
        value: &Arc<T>,
    ) -> Result<(), String> {
        let next = project(&projection, value);
        let next = next.map(|next| {
            // Keep the existing result when it is still equal.
            let last = self.last();
            if equals.equals(&next, &last) {
                None
            } else {
                Some(Arc::new(next))
            }
        });

        let mut state = self.state.lock();
        state.projection = projection;
        state.equals = equals;
        match next {
            Ok(next) => {
                if let Some(next) = next {
                    state.last = next;
                }
                state.fault = None;
                Ok(())
            }
            Err(message) => {
                state.fault = Some(ProjectionFault {
                    observer: self.id,
                    message: message.clone(),
                });
                Err(message)
            }
        }
    }
}

impl<T, G> Observe<T> for ObserverCell<T, G>
where
    T: Send + Sync,
    G: Send + Sync,
{
    fn id(&self) -> ObserverId {
        self.id
    }

    fn evaluate(&self, value: &Arc<T>) -> Evaluation {
        let (projection, equals, last) = {
            let state = self.state.lock();
            if state.fault.is_some() {
                return Evaluation::Skipped;
            }
            (
                Arc::clone(&state.projection),
                state.equals.clone(),
                Arc::clone(&state.last),
            )
        };

        let next = match project(&projection, value) {
            Ok(next) => next,
            Err(message) => {
                let fault = ProjectionFault {
                    observer: self.id,
                    message,
                };
                self.state.lock().fault = Some(fault.clone());
                return Evaluation::Faulted(fault);
            }
        };

        if equals.equals(&next, &last) {
            return Evaluation::Unchanged;
        }
        self.state.lock().last = Arc::new(next);
        Evaluation::Changed
    }

    fn notify(&self) {
        (self.on_change)();
    }
}

impl<T, G: fmt::Debug> fmt::Debug for ObserverCell<T, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (last, fault) = {
            let state = self.state.lock();
            (Arc::clone(&state.last), state.fault.clone())
        };
        f.debug_struct("ObserverCell")
            .field("id", &self.id)
            .field("last", &last)
            .field("fault", &fault)
            .finish()
    }
}

//! Notification Pass
//!
//! Every publish runs one pass over the registry:
//!
//! 1. Bump the store epoch and note the registry's slot count. Together they
//!    are the pass snapshot; observers attached during the pass are outside
//!    it.
//! 2. Evaluate each observer in the snapshot that is still registered:
//!    project the new value, compare against the last result, and store the
//!    new result when it differs. When the policy reports equal, the previous
//!    result is kept, so unchanged slices stay reference-stable for
//!    downstream memoization.
//! 3. Fire the callbacks of every changed observer as one batch, in slot
//!    order, skipping observers detached since they were evaluated.
//!
//! # Reentrancy
//!
//! A publish issued while a pass is running (from a projection or a callback)
//! is queued, not run nested. The outermost publish drains the queue,
//! running one full pass per queued value in publish order. Publishes are
//! never coalesced: each gets its own pass, so an observer whose slice
//! changes in both sees two notifications.

use parking_lot::MutexGuard;
use smallvec::SmallVec;
use std::any::Any;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::error::{panic_message, ProjectionFault, Result};
use super::observer::{Evaluation, Observe};
use super::state::{Store, StoreInner, StoreState};

/// Summary of the work done by one publish.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PassReport {
    /// The publish landed during another pass and was queued behind it; the
    /// outer publish reports its pass.
    pub queued: bool,
    /// Passes run, including queued publishes drained by this call.
    pub passes: usize,
    /// Observers whose projection was evaluated.
    pub evaluated: usize,
    /// Change callbacks fired.
    pub notified: usize,
    /// Projection faults raised.
    pub faults: Vec<ProjectionFault>,
}

/// Clears the notifying flag even if a callback unwinds.
struct PassGuard<'a, T> {
    inner: &'a StoreInner<T>,
}

impl<T> Drop for PassGuard<'_, T> {
    fn drop(&mut self) {
        self.inner.state.lock().notifying = false;
    }
}

impl<T> Store<T>
where
    T: Send + Sync + 'static,
{
    /// Replace the stored value and notify every observer whose slice changed.
    ///
    /// Returns once every pass this call is responsible for has completed,
    /// callbacks included. Fails with `InvalidState` after teardown.
    ///
    /// A change callback that panics does not cut its batch short: the rest
    /// of the batch and any queued passes still run, and the first panic is
    /// resumed once they are done.
    pub fn publish(&self, value: T) -> Result<PassReport> {
        self.publish_arc(Arc::new(value))
    }

    /// Publish an already shared value.
    pub fn publish_arc(&self, value: Arc<T>) -> Result<PassReport> {
        let state = self.inner.state.lock();
        if state.torn_down {
            return Err(self.inner.torn_down_error());
        }
        self.enqueue(state, value)
    }

    /// Publish a value derived from the latest one.
    ///
    /// The latest value is the last one queued if a pass is running, so
    /// several updates issued from inside callbacks build on each other.
    /// `f` runs without the store lock held; if another publish lands
    /// meanwhile, `f` runs again against the newer value.
    pub fn update<F>(&self, mut f: F) -> Result<PassReport>
    where
        F: FnMut(&T) -> T,
    {
        let mut base = {
            let state = self.inner.state.lock();
            if state.torn_down {
                return Err(self.inner.torn_down_error());
            }
            Arc::clone(latest(&state))
        };
        loop {
            let next = Arc::new(f(&base));
            let state = self.inner.state.lock();
            if state.torn_down {
                return Err(self.inner.torn_down_error());
            }
            let newest = latest(&state);
            if !Arc::ptr_eq(newest, &base) {
                base = Arc::clone(newest);
                continue;
            }
            return self.enqueue(state, next);
        }
    }

    /// Queue `value` under the held lock, then drain the queue unless a pass
    /// is already draining it.
    fn enqueue(
        &self,
        mut state: MutexGuard<'_, StoreState<T>>,
        value: Arc<T>,
    ) -> Result<PassReport> {
        state.pending.push_back(value);
        if state.notifying {
            trace!(store = self.inner.id, queued = state.pending.len(), "publish queued");
            return Ok(PassReport {
                queued: true,
                ..PassReport::default()
            });
        }
        state.notifying = true;
        drop(state);

        let guard = PassGuard { inner: &self.inner };
        let mut report = PassReport::default();
        let mut panicked = None;
        loop {
            let (value, epoch, bound) = {
                let mut state = self.inner.state.lock();
                if state.torn_down {
                    state.pending.clear();
                    break;
                }
                let Some(value) = state.pending.pop_front() else {
                    break;
                };
                state.value = Arc::clone(&value);
                state.epoch += 1;
                (value, state.epoch, state.registry.bound())
            };
            self.run_pass(&value, epoch, bound, &mut report, &mut panicked);
        }
        drop(guard);

        debug!(
            store = self.inner.id,
            passes = report.passes,
            evaluated = report.evaluated,
            notified = report.notified,
            faults = report.faults.len(),
            "publish complete"
        );
        if let Some(payload) = panicked {
            resume_unwind(payload);
        }
        Ok(report)
    }

    fn run_pass(
        &self,
        value: &Arc<T>,
        epoch: u64,
        bound: usize,
        report: &mut PassReport,
        panicked: &mut Option<Box<dyn Any + Send>>,
    ) {
        report.passes += 1;
        let mut changed: SmallVec<[Arc<dyn Observe<T>>; 8]> = SmallVec::new();

        for slot in 0..bound {
            let observer = self.inner.state.lock().registry.eligible(slot, epoch);
            let Some(observer) = observer else {
                continue;
            };

            match observer.evaluate(value) {
                Evaluation::Changed => {
                    report.evaluated += 1;
                    changed.push(observer);
                }
                Evaluation::Unchanged => report.evaluated += 1,
                Evaluation::Skipped => {}
                Evaluation::Faulted(fault) => {
                    report.evaluated += 1;
                    warn!(observer = %fault.observer, message = %fault.message, "projection fault");
                    if let Some(on_fault) = &self.inner.config.on_fault {
                        on_fault(&fault);
                    }
                    report.faults.push(fault);
                }
            }
        }

        trace!(
            store = self.inner.id,
            epoch,
            snapshot = bound,
            changed = changed.len(),
            "pass evaluated"
        );

        if changed.is_empty() {
            return;
        }

        let inner = &self.inner;
        let mut notified = 0;
        let mut deliver = || {
            for observer in &changed {
                if !inner.is_live(observer.id()) {
                    continue;
                }
                notified += 1;
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| observer.notify())) {
                    warn!(
                        observer = %observer.id(),
                        message = %panic_message(payload.as_ref()),
                        "change callback panicked"
                    );
                    if panicked.is_none() {
                        *panicked = Some(payload);
                    }
                }
            }
        };
        match &inner.config.batch {
            Some(batch) => batch(&mut deliver),
            None => deliver(),
        }
        report.notified += notified;
    }
}

/// The value the next queued pass would build on.
fn latest<T>(state: &StoreState<T>) -> &Arc<T> {
    state.pending.back().unwrap_or(&state.value)
}

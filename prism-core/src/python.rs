//! Python Bindings
//!
//! Exposes the store to Python as `prism._core.Store`. Values are arbitrary
//! Python objects; selectors are compared by object identity (`is`), so a
//! selector returning the same object keeps its subscription quiet. Exceptions
//! raised by a selector are projection faults: they fail `subscribe` when
//! raised on the first call, and fault the subscription (reported in the
//! publish result) afterwards.

use pyo3::exceptions::PyRuntimeError;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use tracing::warn;

use crate::store::{Equality, Identity, ObserverHandle, Store, StoreError};

impl Identity for Py<PyAny> {
    fn same(&self, other: &Self) -> bool {
        self.as_ptr() == other.as_ptr()
    }
}

fn store_err(err: StoreError) -> PyErr {
    PyRuntimeError::new_err(err.to_string())
}

/// Python-exposed store.
#[pyclass(name = "Store")]
pub struct PyStore {
    store: Store<PyObject>,
}

#[pymethods]
impl PyStore {
    /// Create a store holding `initial`.
    #[new]
    fn new(initial: PyObject) -> Self {
        Self {
            store: Store::new(initial),
        }
    }

    /// Publish a new value. Returns a dict summarising the pass.
    fn publish(&self, py: Python<'_>, value: PyObject) -> PyResult<PyObject> {
        let report = self.store.publish(value).map_err(store_err)?;

        let dict = PyDict::new_bound(py);
        dict.set_item("queued", report.queued)?;
        dict.set_item("passes", report.passes)?;
        dict.set_item("evaluated", report.evaluated)?;
        dict.set_item("notified", report.notified)?;
        let faults: Vec<String> = report.faults.iter().map(ToString::to_string).collect();
        dict.set_item("faults", faults)?;
        Ok(dict.into_any().unbind())
    }

    /// The current value.
    #[getter]
    fn value(&self, py: Python<'_>) -> PyResult<PyObject> {
        let value = self.store.current_value().map_err(store_err)?;
        Ok(value.clone_ref(py))
    }

    /// Watch `selector(value)`, calling `callback()` whenever it changes.
    fn subscribe(&self, selector: PyObject, callback: PyObject) -> PyResult<PySubscription> {
        let handle = self
            .store
            .subscribe_fallible(
                move |value: &PyObject| {
                    Python::with_gil(|py| {
                        selector
                            .call1(py, (value.clone_ref(py),))
                            .map_err(|err| err.to_string())
                    })
                },
                Equality::identity(),
                move || {
                    Python::with_gil(|py| {
                        if let Err(err) = callback.call0(py) {
                            warn!(error = %err, "subscription callback raised");
                        }
                    });
                },
            )
            .map_err(store_err)?;
        Ok(PySubscription { handle })
    }

    /// Number of live subscriptions.
    fn observer_count(&self) -> usize {
        self.store.observer_count()
    }

    /// Detach every subscription and reject further publishes.
    fn teardown(&self) {
        self.store.teardown();
    }

    fn __repr__(&self) -> String {
        format!(
            "Store(id={}, subscriptions={})",
            self.store.id(),
            self.store.observer_count()
        )
    }
}

/// Python-exposed subscription handle.
#[pyclass(name = "Subscription")]
pub struct PySubscription {
    handle: ObserverHandle<PyObject, PyObject>,
}

#[pymethods]
impl PySubscription {
    /// The last selected value.
    #[getter]
    fn value(&self, py: Python<'_>) -> PyObject {
        self.handle.with(|value| value.clone_ref(py))
    }

    /// The fault message, if the selector raised during a publish.
    #[getter]
    fn fault(&self) -> Option<String> {
        self.handle.fault().map(|fault| fault.message)
    }

    /// Whether the subscription is still registered.
    #[getter]
    fn active(&self) -> bool {
        self.handle.is_active()
    }

    /// Stop receiving updates. Idempotent.
    fn unsubscribe(&self) {
        self.handle.unsubscribe();
    }

    fn __repr__(&self) -> String {
        format!("Subscription(id={}, active={})", self.handle.id(), self.handle.is_active())
    }
}

/// Python module definition.
///
/// This function is called by Python when importing the module.
/// It registers all Python-exposed types.
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyStore>()?;
    m.add_class::<PySubscription>()?;

    // Add version info
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}

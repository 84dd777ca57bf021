//! Store configuration.

use std::fmt;
use std::sync::Arc;

use super::error::ProjectionFault;

/// Handler invoked for every projection fault raised during a pass.
pub type FaultHandler = Arc<dyn Fn(&ProjectionFault) + Send + Sync>;

/// Hook wrapping the callback phase of a pass.
///
/// The hook receives the whole batch of change callbacks as one closure and
/// must call it exactly once, typically inside the host's batched-update
/// scope so the batch lands as a single re-render wave.
pub type BatchHook = Arc<dyn Fn(&mut dyn FnMut()) + Send + Sync>;

/// Options for a [`Store`](super::Store).
#[derive(Clone, Default)]
pub struct StoreConfig {
    pub(crate) on_fault: Option<FaultHandler>,
    pub(crate) batch: Option<BatchHook>,
}

impl StoreConfig {
    /// Default configuration: no fault handler, callbacks run unwrapped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fault handler.
    pub fn on_fault<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ProjectionFault) + Send + Sync + 'static,
    {
        self.on_fault = Some(Arc::new(handler));
        self
    }

    /// Register a batch hook.
    pub fn batch<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut dyn FnMut()) + Send + Sync + 'static,
    {
        self.batch = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("on_fault", &self.on_fault.is_some())
            .field("batch", &self.batch.is_some())
            .finish()
    }
}

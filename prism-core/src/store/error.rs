//! Store errors and projection faults.

use thiserror::Error;

use super::observer::ObserverId;

/// Errors returned by store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store was torn down; it accepts no further publishes or subscriptions.
    #[error("store {store} has been torn down")]
    InvalidState {
        /// Id of the torn-down store.
        store: u64,
    },

    /// A handle issued by one store was passed to another.
    #[error("observer {observer} was not issued by store {store}")]
    ForeignHandle {
        /// The offending observer id.
        observer: ObserverId,
        /// Id of the store that received the handle.
        store: u64,
    },

    /// A projection failed while computing an observer's initial result.
    #[error("projection failed: {message}")]
    Projection {
        /// Error or panic message produced by the projection.
        message: String,
    },
}

/// A projection failed while being evaluated.
///
/// Faults are isolated to the observer that raised them: the pass continues
/// for every other observer, and the faulted observer stops updating until
/// it is given a new projection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[error("projection of observer {observer} failed: {message}")]
pub struct ProjectionFault {
    /// The observer whose projection failed.
    pub observer: ObserverId,
    /// Error or panic message produced by the projection.
    pub message: String,
}

/// Convenience alias for store results.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Extract a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "projection panicked".to_string()
    }
}

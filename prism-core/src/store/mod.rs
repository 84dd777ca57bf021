//! Selector Store
//!
//! This module implements the subscription engine: a single-writer store and
//! the observers that watch projections ("selectors") of its value.
//!
//! # Concepts
//!
//! ## Store
//!
//! A Store owns the current value and a registry of observers. Publishing
//! replaces the value wholesale; values are immutable snapshots behind an
//! `Arc`, and a new snapshot is the only change signal.
//!
//! ## Observers
//!
//! An Observer pairs a projection with the last result it produced, an
//! equality policy and a change callback. Observers are independent: the
//! same projection subscribed twice yields two observers, and one observer
//! firing never forces another to.
//!
//! ## Notification Pass
//!
//! Each publish runs a pass that re-projects every observer against the new
//! value and fires callbacks only for observers whose result changed under
//! their policy. By the time a callback fires, the observer's last result
//! already holds the new slice, so the host can read it without projecting
//! again.
//!
//! # Implementation Notes
//!
//! The registry is an arena of generation-stamped slots, which gives stable
//! observer ids and an O(1) snapshot per pass. Publishes from inside a pass
//! are queued and drained by the outermost publish; see [`notify`] for the
//! exact policy.

mod config;
mod equality;
mod error;
mod handle;
pub mod notify;
mod observer;
mod registry;
mod state;

pub use config::{BatchHook, FaultHandler, StoreConfig};
pub use equality::{Equality, Identity};
pub use error::{ProjectionFault, Result, StoreError};
pub use handle::{create_store, create_store_with, ObserverHandle, Publisher, Subscriber};
pub use notify::PassReport;
pub use observer::ObserverId;
pub use state::Store;

pub(crate) use observer::Projection;
pub(crate) use state::{infallible, whole_value};

//! Host Binding Layer
//!
//! The adapter between the store and a host UI tree. A host unit (a
//! component, a widget, any node with its own render cycle) owns one
//! [`Binding`]. The binding gives the unit's observers a stable identity
//! across renders, routes change callbacks to the unit's scheduling
//! primitive, and detaches everything exactly once when the unit retires.
//!
//! The store guarantees that an observer's last result is already updated
//! when its callback fires, so a unit re-rendering in response reads its
//! slices straight from the binding without re-projecting anything.
//!
//! [`RenderQueue`] is a ready-made scheduling primitive for hosts that
//! re-render in waves: invalidations are collected and deduplicated, and the
//! host drains them once per wave.

mod queue;
mod unit;

pub use queue::{RenderQueue, UnitId};
pub use unit::Binding;

/// Marks a host unit as needing re-evaluation.
pub trait Invalidate: Send + Sync {
    /// Schedule the unit to re-render.
    fn invalidate(&self);
}

impl<F> Invalidate for F
where
    F: Fn() + Send + Sync,
{
    fn invalidate(&self) {
        self();
    }
}

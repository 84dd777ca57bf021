//! Prism Core
//!
//! This crate provides fine-grained state subscriptions. One producer
//! publishes a shared value; many readers each watch only a projection
//! ("selector") of it, and are notified only when their own projection's
//! result changes. "The whole state changed" is decoupled from "my slice
//! changed", so a tree of independent observers does no wasted work.
//!
//! It implements:
//!
//! - A single-writer store with per-observer memoized projections
//! - Pluggable equality policies (identity by default)
//! - A batched, snapshot-based notification pass
//! - A host binding layer tying observers to a UI unit's render lifecycle
//!
//! The crate is designed to be used both as a native Rust library and as a
//! Python extension module via PyO3 (feature `python`).
//!
//! # Architecture
//!
//! - `store`: the store, observers, registry and notification pass
//! - `binding`: per-unit bindings and the render queue
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use prism_core::store::create_store;
//!
//! struct State {
//!     foo: String,
//!     bar: Arc<String>,
//! }
//!
//! let (publisher, subscriber) = create_store(State {
//!     foo: "foo".into(),
//!     bar: Arc::new("baz".into()),
//! });
//!
//! let foo = subscriber.select(|s: &State| s.foo.clone(), || println!("foo changed")).unwrap();
//! let bar = subscriber.select(|s: &State| Arc::clone(&s.bar), || println!("bar changed")).unwrap();
//!
//! // Only `foo` changes; `bar` keeps its reference and stays quiet.
//! let current = subscriber.current_value().unwrap();
//! let report = publisher
//!     .publish(State { foo: "fooo".into(), bar: Arc::clone(&current.bar) })
//!     .unwrap();
//!
//! assert_eq!(report.notified, 1);
//! assert_eq!(foo.get(), "fooo");
//! assert_eq!(*bar.get(), "baz");
//! ```

pub mod binding;
pub mod store;

#[cfg(feature = "python")]
pub mod python;

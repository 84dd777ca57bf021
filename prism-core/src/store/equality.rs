//! Equality Policies
//!
//! An equality policy decides whether a freshly projected value counts as a
//! change. The default policy is identity comparison: shared pointers compare
//! by address, scalars and strings compare by value (they carry no identity
//! of their own).
//!
//! Identity comparison is what makes structural sharing pay off. A producer
//! that rebuilds the top-level state but reuses an `Arc` for an untouched
//! branch keeps every observer of that branch quiet. A producer that deep
//! clones on every publish defeats it: every `Arc` is new, so every identity
//! observer fires. Custom policies (for example [`Equality::structural`])
//! are the escape hatch for that case.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Values that can be compared by identity.
pub trait Identity {
    /// Returns true when `self` and `other` are the same value.
    fn same(&self, other: &Self) -> bool;
}

impl<T: ?Sized> Identity for Arc<T> {
    fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<T: ?Sized> Identity for Rc<T> {
    fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

impl<T: ?Sized> Identity for &T {
    fn same(&self, other: &Self) -> bool {
        std::ptr::eq(*self, *other)
    }
}

impl<T: Identity> Identity for Option<T> {
    fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.same(b),
            (None, None) => true,
            _ => false,
        }
    }
}

macro_rules! value_identity {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Identity for $ty {
                fn same(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

value_identity!(
    (), bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, String,
);

// Floats compare bitwise so NaN is identical to itself.
impl Identity for f32 {
    fn same(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits()
    }
}

impl Identity for f64 {
    fn same(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits()
    }
}

macro_rules! tuple_identity {
    ($(($($name:ident $idx:tt),+)),* $(,)?) => {
        $(
            impl<$($name: Identity),+> Identity for ($($name,)+) {
                fn same(&self, other: &Self) -> bool {
                    $(self.$idx.same(&other.$idx))&&+
                }
            }
        )*
    };
}

tuple_identity!((A 0), (A 0, B 1), (A 0, B 1, C 2), (A 0, B 1, C 2, D 3));

/// A binary predicate over two projected values.
pub struct Equality<G> {
    eq: Arc<dyn Fn(&G, &G) -> bool + Send + Sync>,
}

impl<G> Equality<G> {
    /// Build a policy from a custom comparator.
    pub fn new<F>(eq: F) -> Self
    where
        F: Fn(&G, &G) -> bool + Send + Sync + 'static,
    {
        Self { eq: Arc::new(eq) }
    }

    /// Identity comparison, the default policy.
    pub fn identity() -> Self
    where
        G: Identity,
    {
        Self::new(|a: &G, b: &G| a.same(b))
    }

    /// Structural comparison via `PartialEq`.
    pub fn structural() -> Self
    where
        G: PartialEq,
    {
        Self::new(|a: &G, b: &G| a == b)
    }

    /// Returns true when `next` is equal to `prev` under this policy.
    pub fn equals(&self, next: &G, prev: &G) -> bool {
        (self.eq)(next, prev)
    }
}

impl<G> Clone for Equality<G> {
    fn clone(&self) -> Self {
        Self {
            eq: Arc::clone(&self.eq),
        }
    }
}

impl<G: Identity> Default for Equality<G> {
    fn default() -> Self {
        Self::identity()
    }
}

impl<G> fmt::Debug for Equality<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Equality").finish_non_exhaustive()
    }
}

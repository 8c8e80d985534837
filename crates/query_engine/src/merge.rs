//! Reconciling freshly computed values with cached ones.
//!
//! A recomputed query rarely produces a value that is *new* in every respect.
//! Merging instead of replacing keeps the cached allocation (and every `Arc`
//! handed out from it) whenever the content did not change, and tells the
//! engine whether dependents have to be revisited at all.

use core::hash::{BuildHasher, Hash};
use core::mem;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// Per-type reconciliation of a cached value with a fresh one.
///
/// After `merge(current, fresh)` returns, `current` must be equal in content to
/// what `fresh` held on entry. Whatever is left in `fresh` is the superseded
/// material; the engine retains it until the next garbage collection so that
/// nothing a consumer might still look at is freed mid-revision.
///
/// The return value reports whether the content of `current` changed. Saying
/// `false` is what enables early cutoff, so it must only be returned when the
/// two values are indistinguishable to every consumer.
pub trait Merge {
    /// Reconcile `fresh` into `current`, returning whether `current` changed.
    fn merge(current: &mut Self, fresh: &mut Self) -> bool;
}

/// Default merge: structural equality, swapping only on inequality.
#[inline]
pub fn merge_by_eq<T: PartialEq>(current: &mut T, fresh: &mut T) -> bool {
    if *current == *fresh {
        false
    } else {
        mem::swap(current, fresh);
        true
    }
}

/// Implement [`Merge`] by structural equality for one or more types.
///
/// ```
/// #[derive(Clone, PartialEq)]
/// struct Span { start: u32, end: u32 }
///
/// query_engine::impl_merge_by_eq!(Span);
/// ```
#[macro_export]
macro_rules! impl_merge_by_eq {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::Merge for $ty {
                #[inline]
                fn merge(current: &mut Self, fresh: &mut Self) -> bool {
                    $crate::merge_by_eq(current, fresh)
                }
            }
        )+
    };
}

impl_merge_by_eq!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    String,
    &'static str,
);

/// Floats compare by bit pattern, so a `NaN` result equals itself.
macro_rules! impl_merge_by_bits {
    ($($ty:ty),+) => {
        $(
            impl Merge for $ty {
                #[inline]
                fn merge(current: &mut Self, fresh: &mut Self) -> bool {
                    if current.to_bits() == fresh.to_bits() {
                        return false;
                    }
                    mem::swap(current, fresh);
                    true
                }
            }
        )+
    };
}

impl_merge_by_bits!(f32, f64);

/// Shared values keep their allocation when the content is unchanged.
impl<T: ?Sized + PartialEq> Merge for Arc<T> {
    #[inline]
    fn merge(current: &mut Self, fresh: &mut Self) -> bool {
        if Arc::ptr_eq(current, fresh) || **current == **fresh {
            return false;
        }
        mem::swap(current, fresh);
        true
    }
}

impl<T: ?Sized + PartialEq> Merge for Box<T> {
    #[inline]
    fn merge(current: &mut Self, fresh: &mut Self) -> bool {
        if **current == **fresh {
            return false;
        }
        mem::swap(current, fresh);
        true
    }
}

/// Element-wise when the lengths agree, so unchanged elements keep their identity
/// even if a neighbour changed.
impl<T: Merge> Merge for Vec<T> {
    fn merge(current: &mut Self, fresh: &mut Self) -> bool {
        if current.len() != fresh.len() {
            mem::swap(current, fresh);
            return true;
        }
        let mut changed = false;
        for (kept, incoming) in current.iter_mut().zip(fresh.iter_mut()) {
            changed |= T::merge(kept, incoming);
        }
        changed
    }
}

impl<T: Merge> Merge for Option<T> {
    fn merge(current: &mut Self, fresh: &mut Self) -> bool {
        match (current.as_mut(), fresh.as_mut()) {
            (Some(kept), Some(incoming)) => T::merge(kept, incoming),
            (None, None) => false,
            _ => {
                mem::swap(current, fresh);
                true
            }
        }
    }
}

impl<T: Merge, E: Merge> Merge for Result<T, E> {
    fn merge(current: &mut Self, fresh: &mut Self) -> bool {
        match (current.as_mut(), fresh.as_mut()) {
            (Ok(kept), Ok(incoming)) => T::merge(kept, incoming),
            (Err(kept), Err(incoming)) => E::merge(kept, incoming),
            _ => {
                mem::swap(current, fresh);
                true
            }
        }
    }
}

macro_rules! merge_tuple {
    ($($name:ident . $idx:tt),+) => {
        impl<$($name: Merge),+> Merge for ($($name,)+) {
            fn merge(current: &mut Self, fresh: &mut Self) -> bool {
                let mut changed = false;
                $(changed |= $name::merge(&mut current.$idx, &mut fresh.$idx);)+
                changed
            }
        }
    };
}

merge_tuple!(A.0);
merge_tuple!(A.0, B.1);
merge_tuple!(A.0, B.1, C.2);
merge_tuple!(A.0, B.1, C.2, D.3);
merge_tuple!(A.0, B.1, C.2, D.3, E.4);

impl<K: Ord, V: PartialEq> Merge for BTreeMap<K, V> {
    #[inline]
    fn merge(current: &mut Self, fresh: &mut Self) -> bool {
        merge_by_eq(current, fresh)
    }
}

impl<K: Ord> Merge for BTreeSet<K> {
    #[inline]
    fn merge(current: &mut Self, fresh: &mut Self) -> bool {
        merge_by_eq(current, fresh)
    }
}

impl<K: Eq + Hash, V: PartialEq, S: BuildHasher> Merge for HashMap<K, V, S> {
    #[inline]
    fn merge(current: &mut Self, fresh: &mut Self) -> bool {
        merge_by_eq(current, fresh)
    }
}

impl<K: Eq + Hash, S: BuildHasher> Merge for HashSet<K, S> {
    #[inline]
    fn merge(current: &mut Self, fresh: &mut Self) -> bool {
        merge_by_eq(current, fresh)
    }
}

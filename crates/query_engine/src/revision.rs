//! Revisions: the epochs a context moves through as its inputs change.
//!
//! Every entry carries two stamps, the revision its value last changed and
//! the revision it was last confirmed at. A dependency is stale for a reader
//! when its change stamp is after the reader's confirmation stamp.

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// One epoch of a context. `r0` is the epoch before any input was written.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct Revision(u64);

impl Revision {
    /// The epoch a fresh context starts in.
    pub const INITIAL: Self = Self(0);

    /// Revision `rN` for `N = value`.
    #[inline]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Whether this epoch came after `other`.
    #[inline]
    pub const fn is_after(self, other: Self) -> bool {
        self.0 > other.0
    }

    #[inline]
    const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "r{}", self.0)
    }
}

/// The current epoch of one context. Only moved by input writes and
/// explicit advances, which both need `&mut Context`.
#[derive(Debug)]
pub(crate) struct RevisionCounter {
    current: AtomicU64,
}

impl RevisionCounter {
    pub(crate) const fn new() -> Self {
        Self {
            current: AtomicU64::new(Revision::INITIAL.0),
        }
    }

    #[inline]
    pub(crate) fn current(&self) -> Revision {
        Revision(self.current.load(Ordering::Acquire))
    }

    /// Move to the next epoch and return it.
    pub(crate) fn advance(&self) -> Revision {
        Revision(self.current.fetch_add(1, Ordering::AcqRel)).next()
    }
}

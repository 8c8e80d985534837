//! Context-owned string interning.

use crate::merge::{Merge, merge_by_eq};
use lasso::{Spur, ThreadedRodeo};

/// An interned string. Only meaningful for the context that produced it.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Symbol(Spur);

impl Merge for Symbol {
    #[inline]
    fn merge(current: &mut Self, fresh: &mut Self) -> bool {
        merge_by_eq(current, fresh)
    }
}

/// Thread-safe string table.
#[derive(Debug, Default)]
pub(crate) struct Interner {
    rodeo: ThreadedRodeo,
}

impl Interner {
    #[inline]
    pub(crate) fn intern(&self, text: &str) -> Symbol {
        Symbol(self.rodeo.get_or_intern(text))
    }

    #[inline]
    pub(crate) fn lookup(&self, text: &str) -> Option<Symbol> {
        self.rodeo.get(text).map(Symbol)
    }

    #[inline]
    pub(crate) fn resolve(&self, symbol: Symbol) -> Option<&str> {
        self.rodeo.try_resolve(&symbol.0)
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.rodeo.len()
    }
}

//! Per-thread stack of executing queries.
//!
//! Each running query owns a frame. Nested query calls land in the frame on
//! top as dependency edges, diagnostics reported through the context land
//! there too, and when the query finishes its frame is sealed into the entry.

use crate::diagnostics::Diagnostic;
use crate::storage::{EntryId, ErasedEntry, Recorded};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Everything one query execution recorded, in recording order.
#[derive(Default)]
pub(crate) struct Sealed {
    pub(crate) trail: Arc<[Recorded]>,
    pub(crate) volatile: bool,
}

/// Recording scope of one executing query.
pub(crate) struct Frame {
    owner: Arc<dyn ErasedEntry>,
    trail: Vec<Recorded>,
    seen: FxHashMap<EntryId, usize>,
    volatile: bool,
}

impl Frame {
    pub(crate) fn new(owner: Arc<dyn ErasedEntry>) -> Self {
        Self {
            owner,
            trail: Vec::new(),
            seen: FxHashMap::default(),
            volatile: false,
        }
    }

    /// Record that the owner read `dependency`. Repeated reads keep the
    /// position of the first one. A `collected` read keeps the dependency's
    /// diagnostics out of delivery unless the owner also read it plainly.
    pub(crate) fn record_dependency(
        &mut self,
        dependency: Arc<dyn ErasedEntry>,
        collected: bool,
    ) {
        if let Some(&position) = self.seen.get(&dependency.id()) {
            if !collected
                && let Some(record @ Recorded::Collected(_)) = self.trail.get_mut(position)
            {
                *record = Recorded::Dependency(dependency);
            }
            return;
        }
        self.seen.insert(dependency.id(), self.trail.len());
        self.trail.push(if collected {
            Recorded::Collected(dependency)
        } else {
            Recorded::Dependency(dependency)
        });
    }

    pub(crate) fn record_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.trail.push(Recorded::Diagnostic(diagnostic));
    }

    pub(crate) fn mark_volatile(&mut self) {
        self.volatile = true;
    }

    pub(crate) fn seal(self) -> Sealed {
        Sealed {
            trail: self.trail.into(),
            volatile: self.volatile,
        }
    }
}

/// Stack of frames for the queries running on one thread.
#[derive(Default)]
pub(crate) struct QueryStack {
    frames: Vec<Frame>,
    /// Dependency walks in progress on this thread.
    validating: usize,
}

impl QueryStack {
    #[inline]
    pub(crate) fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    #[inline]
    pub(crate) fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    #[inline]
    pub(crate) fn top_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    #[inline]
    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Nesting level for trace events: running queries plus dependency
    /// walks.
    #[inline]
    pub(crate) fn trace_depth(&self) -> usize {
        self.frames.len() + self.validating
    }

    #[inline]
    pub(crate) fn enter_validation(&mut self) {
        self.validating += 1;
    }

    #[inline]
    pub(crate) fn leave_validation(&mut self) {
        self.validating = self.validating.saturating_sub(1);
    }

    /// Running queries, outermost first.
    pub(crate) fn describe(&self) -> Vec<String> {
        self.frames
            .iter()
            .map(|frame| frame.owner.describe())
            .collect()
    }
}

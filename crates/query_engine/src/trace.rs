//! Observation hooks around every query evaluation.
//!
//! A [`TraceSink`] sees a `Begin` event when a query is requested and an
//! `End` event carrying the [`Verdict`] once its value is known. Sinks only
//! observe; nothing they do feeds back into the evaluation.

use crate::revision::Revision;
use core::fmt::{self, Debug};
use log::trace;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// How a query obtained its value.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Verdict {
    /// The cached value was confirmed without running the query.
    Reused,
    /// The query ran and produced a value equal to the cached one.
    RecomputedUnchanged,
    /// The query ran and produced new content (or ran for the first time).
    RecomputedChanged,
}

impl Verdict {
    /// Whether the query function was executed.
    #[inline]
    pub const fn recomputed(self) -> bool {
        !matches!(self, Self::Reused)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Reused => "REUSING",
            Self::RecomputedUnchanged => "NO CHANGE",
            Self::RecomputedChanged => "UPDATED",
        })
    }
}

/// Which side of an evaluation an event describes.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TracePhase {
    /// The query was requested.
    Begin,
    /// The query's value is available.
    End(Verdict),
}

/// One observation of a query evaluation.
#[derive(Copy, Clone)]
pub struct TraceEvent<'event> {
    /// Begin or end.
    pub phase: TracePhase,
    /// [`Query::name`](crate::Query::name) of the evaluated query.
    pub query: &'static str,
    /// The query's arguments.
    pub key: &'event dyn Debug,
    /// Revision the evaluation happened in.
    pub revision: Revision,
    /// Nesting on the same thread: queries executing below this one plus
    /// dependency walks it is being revalidated for.
    pub depth: usize,
}

impl Debug for TraceEvent<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("TraceEvent")
            .field("phase", &self.phase)
            .field("query", &self.query)
            .field("key", self.key)
            .field("revision", &self.revision)
            .field("depth", &self.depth)
            .finish()
    }
}

impl fmt::Display for TraceEvent<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indent = self.depth * 2;
        match self.phase {
            TracePhase::Begin => write!(
                formatter,
                "{:indent$}BEGIN {}({:?}) at {}",
                "", self.query, self.key, self.revision
            ),
            TracePhase::End(verdict) => write!(
                formatter,
                "{:indent$}END {}({:?}) {verdict}",
                "", self.query, self.key
            ),
        }
    }
}

/// Receiver of trace events.
pub trait TraceSink: Send + Sync {
    /// Observe one event.
    fn event(&self, event: &TraceEvent<'_>);
}

/// Forwards every event to `log::trace!`, indented by depth.
#[derive(Copy, Clone, Debug, Default)]
pub struct LogTraceSink;

impl TraceSink for LogTraceSink {
    fn event(&self, event: &TraceEvent<'_>) {
        trace!("{event}");
    }
}

#[derive(Debug, Default)]
struct Tally {
    reused: AtomicU64,
    unchanged: AtomicU64,
    changed: AtomicU64,
}

/// Counts verdicts. Clones share their counters.
#[derive(Clone, Debug, Default)]
pub struct CountingTraceSink {
    tally: Arc<Tally>,
}

/// Snapshot of a [`CountingTraceSink`].
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct VerdictCounts {
    /// Evaluations answered from cache. Dependencies confirmed while
    /// revalidating a reader count here as well as direct reads.
    pub reused: u64,
    /// Executions whose result merged as unchanged.
    pub recomputed_unchanged: u64,
    /// Executions that produced new content.
    pub recomputed_changed: u64,
}

impl VerdictCounts {
    /// Number of query executions.
    pub const fn recomputed(&self) -> u64 {
        self.recomputed_changed + self.recomputed_unchanged
    }
}

impl CountingTraceSink {
    /// Create a sink with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the counters and reset them to zero.
    pub fn take(&self) -> VerdictCounts {
        VerdictCounts {
            reused: self.tally.reused.swap(0, Ordering::AcqRel),
            recomputed_unchanged: self.tally.unchanged.swap(0, Ordering::AcqRel),
            recomputed_changed: self.tally.changed.swap(0, Ordering::AcqRel),
        }
    }
}

impl TraceSink for CountingTraceSink {
    fn event(&self, event: &TraceEvent<'_>) {
        let counter = match event.phase {
            TracePhase::Begin => return,
            TracePhase::End(Verdict::Reused) => &self.tally.reused,
            TracePhase::End(Verdict::RecomputedUnchanged) => &self.tally.unchanged,
            TracePhase::End(Verdict::RecomputedChanged) => &self.tally.changed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

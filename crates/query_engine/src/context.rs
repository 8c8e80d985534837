//! The query context.
//!
//! The `Context` is the central coordinator for all query execution,
//! memoization, dependency tracking and diagnostic delivery. Every query call
//! is routed through it, and it owns everything the engine keeps: one table
//! per query type, the revision counter, the per-thread dependency stacks and
//! the error handler.

use crate::config::EngineConfig;
use crate::cycle::{self, CycleError};
use crate::diagnostics::{Diagnostic, ErrorHandler, LogErrorHandler};
use crate::interner::{Interner, Symbol};
use crate::parallel::ParallelRuntime;
use crate::query::{InputQuery, InputSlot, Query};
use crate::revision::{Revision, RevisionCounter};
use crate::stack::{Frame, QueryStack, Sealed};
use crate::storage::{
    Entry, EntryId, EntryInfo, ErasedEntry, ErasedTable, Memo, QueryTable, for_each_diagnostic,
};
use crate::trace::{LogTraceSink, TracePhase, TraceEvent, TraceSink, Verdict};
use core::any::TypeId;
use core::cell::RefCell;
use core::fmt;
use dashmap::DashMap;
use log::{debug, trace};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rustc_hash::{FxBuildHasher, FxHashMap};
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::thread::ThreadId;
use thread_local::ThreadLocal;

/// A thread blocked on an entry claimed by another thread.
#[derive(Copy, Clone, Debug)]
struct Wait {
    owner: ThreadId,
    entry: EntryId,
}

/// Counters describing what a context currently holds.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct ContextStats {
    /// Current revision.
    pub revision: Revision,
    /// Number of query tables (one per query type used so far).
    pub tables: usize,
    /// Number of entries across all tables.
    pub entries: usize,
    /// Superseded values waiting for [`Context::collect_garbage`].
    pub retained: usize,
    /// Number of interned strings.
    pub symbols: usize,
}

/// The query context.
///
/// This is the main interface for executing queries, writing inputs and
/// receiving diagnostics. Contexts are independent of each other: nothing is
/// shared between two instances.
pub struct Context {
    /// Settings this context was built with.
    config: EngineConfig,

    /// Current revision counter - incremented on input changes.
    revision: RevisionCounter,

    /// Table for each query type (type-erased).
    tables: DashMap<TypeId, Arc<dyn ErasedTable>, FxBuildHasher>,

    /// Per-thread query execution stack for dependency tracking.
    stacks: ThreadLocal<RefCell<QueryStack>>,

    /// Source of entry identities.
    next_entry: AtomicU64,

    /// Which thread waits on which, for turning cross-thread cycles into
    /// errors instead of deadlocks.
    waits_for: Mutex<FxHashMap<ThreadId, Wait>>,

    /// Receives diagnostics at the end of top-level calls.
    error_handler: Box<dyn ErrorHandler>,

    /// Observes every evaluation, if installed.
    trace_sink: Option<Box<dyn TraceSink>>,

    /// Strings interned by queries.
    interner: Interner,

    /// Pool for [`Context::par_query`], built on first use.
    runtime: OnceCell<ParallelRuntime>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Context")
            .field("config", &self.config)
            .field("revision", &self.current_revision())
            .field("tables", &self.tables.len())
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Create a context with default settings.
    #[inline]
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create a context with explicit settings.
    pub fn with_config(config: EngineConfig) -> Self {
        let trace_sink = config
            .trace
            .then(|| Box::new(LogTraceSink) as Box<dyn TraceSink>);
        Self {
            config,
            revision: RevisionCounter::new(),
            tables: DashMap::with_hasher(FxBuildHasher),
            stacks: ThreadLocal::new(),
            next_entry: AtomicU64::new(0),
            waits_for: Mutex::new(FxHashMap::default()),
            error_handler: Box::new(LogErrorHandler),
            trace_sink,
            interner: Interner::default(),
            runtime: OnceCell::new(),
        }
    }

    /// Settings this context was built with.
    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replace the handler receiving diagnostics.
    pub fn set_error_handler(&mut self, handler: impl ErrorHandler + 'static) {
        self.error_handler = Box::new(handler);
    }

    /// Install a trace sink, replacing any previous one.
    pub fn set_trace_sink(&mut self, sink: impl TraceSink + 'static) {
        self.trace_sink = Some(Box::new(sink));
    }

    /// Remove the trace sink.
    pub fn clear_trace_sink(&mut self) {
        self.trace_sink = None;
    }

    /// Get the current revision.
    #[inline]
    pub fn current_revision(&self) -> Revision {
        self.revision.current()
    }

    /// Start a new revision without changing any input.
    ///
    /// Every entry is revalidated on its next request; entries that read
    /// external state run again.
    pub fn advance_revision(&mut self) -> Revision {
        let revision = self.revision.advance();
        debug!("Advanced to revision {revision}");
        revision
    }

    /// Evaluate a query, returning the memoized result if still valid.
    ///
    /// This is the main entry point for query execution. It:
    /// 1. Looks up or creates the entry for `key`
    /// 2. Confirms the cached value by walking its recorded dependencies, or
    ///    runs the query function when that walk fails
    /// 3. Records the entry as a dependency of the running query, or, when
    ///    called from outside any query, delivers every diagnostic of the
    ///    evaluation to the error handler
    ///
    /// # Panics
    ///
    /// Unwinds with a [`CycleError`] payload if the query depends on itself.
    /// Use [`Context::try_query`] at the outermost call to get a `Result`.
    pub fn query<Q: Query>(&self, key: Q::Key) -> Q::Value {
        let (entry, value) = self.evaluate::<Q>(key);
        self.complete(entry);
        value
    }

    /// Evaluate a query at the top level, reporting recursion as an error.
    ///
    /// Claims and stack frames held by the failed evaluation are released, so
    /// the context stays usable afterwards.
    pub fn try_query<Q: Query>(&self, key: Q::Key) -> Result<Q::Value, CycleError> {
        cycle::catch_cycle(|| self.query::<Q>(key))
    }

    /// Evaluate a query and return every diagnostic of the evaluation
    /// alongside its value, instead of sending them to the error handler.
    ///
    /// Diagnostics of dependencies are included, each entry once, in the
    /// order they were recorded.
    ///
    /// Inside a running query the callee is still recorded as a dependency,
    /// but its diagnostics are not delivered again through the caller. A
    /// caller that wants them reported passes them to [`Context::report`].
    /// Reading the same query plainly as well hands its diagnostics back to
    /// the handler.
    pub fn query_with_diagnostics<Q: Query>(&self, key: Q::Key) -> (Q::Value, Vec<Diagnostic>) {
        let (entry, value) = self.evaluate::<Q>(key);
        let mut diagnostics = Vec::new();
        for_each_diagnostic(&*entry, &mut |diagnostic| diagnostics.push(diagnostic.clone()));
        self.record_dependency(entry, true);
        (value, diagnostics)
    }

    /// Evaluate a query for many keys at once.
    ///
    /// From outside any query the keys are evaluated on the context's thread
    /// pool; dependency edges and diagnostics are still handled on the calling
    /// thread once every key is done. Inside a running query the keys are
    /// evaluated in order on the current thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread pool cannot be created.
    pub fn par_query<Q: Query>(&self, keys: Vec<Q::Key>) -> anyhow::Result<Vec<Q::Value>> {
        if self.depth() > 0 {
            return Ok(keys.into_iter().map(|key| self.query::<Q>(key)).collect());
        }
        let runtime = self.runtime()?;
        trace!(
            "Evaluating {} keys of {} on {} threads",
            keys.len(),
            Q::name(),
            runtime.threads()
        );
        let evaluated = runtime.map(keys, |key| self.evaluate::<Q>(key));
        Ok(evaluated
            .into_iter()
            .map(|(entry, value)| {
                self.complete(entry);
                value
            })
            .collect())
    }

    /// Get an input value, falling back to [`InputQuery::default_value`].
    #[inline]
    pub fn input<I: InputQuery>(&self, key: I::Key) -> I::Value {
        self.query::<InputSlot<I>>(key)
    }

    /// Set an input value.
    ///
    /// The new value is merged into the current one. Only if that reports a
    /// change is the revision incremented and stamped on the input, which
    /// makes every query that read it revalidate on its next request. The
    /// first write of a key always counts as a change. Returns whether the
    /// value changed.
    pub fn set_input<I: InputQuery>(&mut self, key: I::Key, value: I::Value) -> bool {
        let table = self.table::<InputSlot<I>>();
        let entry = QueryTable::lookup_or_create(&table, key, &self.next_entry);
        let changed = entry.overwrite(value, self.config.retain_superseded, || {
            self.revision.advance()
        });
        if changed {
            debug!(
                "Input changed: {}({:?}) -> revision {}",
                I::name(),
                entry.key(),
                self.current_revision()
            );
        } else {
            trace!("Input unchanged: {}({:?})", I::name(), entry.key());
        }
        changed
    }

    /// Report a diagnostic.
    ///
    /// Inside a query the diagnostic is attached to the running query and
    /// delivered (and replayed on later cache hits) with it. Outside any query
    /// it goes straight to the error handler.
    pub fn report(&self, diagnostic: Diagnostic) {
        let mut stack = self.stack().borrow_mut();
        if let Some(frame) = stack.top_mut() {
            frame.record_diagnostic(diagnostic);
            return;
        }
        drop(stack);
        self.error_handler.report(&diagnostic);
    }

    /// Declare that the running query read state outside the engine.
    ///
    /// Its entry will run again once per revision instead of being confirmed
    /// through its dependencies. Has no effect outside a query.
    pub fn depends_on_external(&self) {
        if let Some(frame) = self.stack().borrow_mut().top_mut() {
            frame.mark_volatile();
        }
    }

    /// Intern a string for this context.
    #[inline]
    pub fn intern(&self, text: &str) -> Symbol {
        self.interner.intern(text)
    }

    /// Find an already interned string.
    #[inline]
    pub fn lookup_symbol(&self, text: &str) -> Option<Symbol> {
        self.interner.lookup(text)
    }

    /// The text of `symbol`, if it was interned by this context.
    #[inline]
    pub fn resolve(&self, symbol: Symbol) -> Option<&str> {
        self.interner.resolve(symbol)
    }

    /// Inspect the entry of a derived query without creating or refreshing it.
    pub fn entry_info<Q: Query>(&self, key: &Q::Key) -> Option<EntryInfo> {
        let table = self.existing_table::<Q>()?;
        table.find(key).map(|entry| entry.info())
    }

    /// Inspect the entry of an input without creating it.
    #[inline]
    pub fn input_info<I: InputQuery>(&self, key: &I::Key) -> Option<EntryInfo> {
        self.entry_info::<InputSlot<I>>(key)
    }

    /// Release every superseded value retained since the last collection.
    ///
    /// Returns the number of values released.
    pub fn collect_garbage(&mut self) -> usize {
        let released: usize = self
            .tables
            .iter()
            .map(|table| table.value().collect_garbage())
            .sum();
        debug!("Collected {released} superseded values at {}", self.current_revision());
        released
    }

    /// Counters describing what this context holds.
    pub fn stats(&self) -> ContextStats {
        let mut stats = ContextStats {
            revision: self.current_revision(),
            tables: 0,
            entries: 0,
            retained: 0,
            symbols: self.interner.len(),
        };
        for table in self.tables.iter() {
            stats.tables += 1;
            stats.entries += table.value().len();
            stats.retained += table.value().retained();
        }
        stats
    }

    /// Names of the query types with a table, sorted.
    pub fn query_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .tables
            .iter()
            .map(|table| table.value().query_name())
            .collect();
        names.sort_unstable();
        names
    }

    /// Begin, refresh and read one entry, without recording it anywhere.
    fn evaluate<Q: Query>(&self, key: Q::Key) -> (Arc<Entry<Q>>, Q::Value) {
        let table = self.table::<Q>();
        let entry = QueryTable::lookup_or_create(&table, key, &self.next_entry);
        let (_, value) = self.refresh_traced(&entry, |memo: &Memo<Q::Value>| memo.value.clone());
        (entry, value)
    }

    /// Refresh `entry` between begin and end trace events.
    pub(crate) fn refresh_traced<Q: Query, R>(
        &self,
        entry: &Arc<Entry<Q>>,
        read: impl FnOnce(&Memo<Q::Value>) -> R,
    ) -> (Verdict, R) {
        let Some(sink) = self.trace_sink.as_deref() else {
            return Entry::refresh_with(entry, self, read);
        };
        let depth = self
            .stacks
            .get()
            .map_or(0, |stack| stack.borrow().trace_depth());
        let revision = self.current_revision();
        sink.event(&TraceEvent {
            phase: TracePhase::Begin,
            query: Q::name(),
            key: entry.key(),
            revision,
            depth,
        });
        let (verdict, output) = Entry::refresh_with(entry, self, read);
        sink.event(&TraceEvent {
            phase: TracePhase::End(verdict),
            query: Q::name(),
            key: entry.key(),
            revision,
            depth,
        });
        (verdict, output)
    }

    /// End of a query call: record the edge into the caller, or deliver the
    /// evaluation's diagnostics when there is no caller.
    fn complete(&self, entry: Arc<dyn ErasedEntry>) {
        if let Some(root) = self.record_dependency(entry, false) {
            for_each_diagnostic(&*root, &mut |diagnostic| self.error_handler.report(diagnostic));
        }
    }

    /// Record `entry` into the running query. Hands it back if none is running.
    fn record_dependency(
        &self,
        entry: Arc<dyn ErasedEntry>,
        collected: bool,
    ) -> Option<Arc<dyn ErasedEntry>> {
        let mut stack = self.stack().borrow_mut();
        match stack.top_mut() {
            Some(frame) => {
                frame.record_dependency(entry, collected);
                None
            }
            None => Some(entry),
        }
    }

    pub(crate) fn push_frame(&self, owner: Arc<dyn ErasedEntry>) -> FrameGuard<'_> {
        self.stack().borrow_mut().push(Frame::new(owner));
        FrameGuard {
            ctx: self,
            armed: true,
        }
    }

    /// Mark a dependency walk on this thread until the guard drops, so the
    /// entries it revalidates trace one level deeper than their reader.
    pub(crate) fn validating(&self) -> ValidationGuard<'_> {
        self.stack().borrow_mut().enter_validation();
        ValidationGuard { ctx: self }
    }

    fn pop_frame(&self) -> Option<Frame> {
        self.stack().borrow_mut().pop()
    }

    fn depth(&self) -> usize {
        self.stacks
            .get()
            .map_or(0, |stack| stack.borrow().depth())
    }

    fn stack(&self) -> &RefCell<QueryStack> {
        self.stacks.get_or_default()
    }

    /// Abort the current evaluation: `query` was requested while this thread
    /// was already computing it.
    pub(crate) fn recursion_detected(&self, query: String) -> ! {
        let active = self
            .stacks
            .get()
            .map(|stack| stack.borrow().describe())
            .unwrap_or_default();
        cycle::raise(CycleError { query, active })
    }

    /// Register that `waiter` is about to block on `entry`, claimed by
    /// `owner`. Aborts instead if the wait would close a cycle of threads.
    pub(crate) fn wait_for(
        &self,
        waiter: ThreadId,
        owner: ThreadId,
        entry: EntryId,
        describe: impl FnOnce() -> String,
    ) -> WaitGuard<'_> {
        let closes_cycle = {
            let mut waits = self.waits_for.lock();
            let mut cursor = owner;
            let mut closes = false;
            for _ in 0..=waits.len() {
                if cursor == waiter {
                    closes = true;
                    break;
                }
                match waits.get(&cursor) {
                    Some(next) => cursor = next.owner,
                    None => break,
                }
            }
            if !closes {
                waits.insert(waiter, Wait { owner, entry });
            }
            closes
        };
        if closes_cycle {
            self.recursion_detected(describe());
        }
        WaitGuard { ctx: self, waiter }
    }

    /// Forget every wait on `entry`; its claim was just released.
    pub(crate) fn release_waiters(&self, entry: EntryId) {
        let mut waits = self.waits_for.lock();
        if !waits.is_empty() {
            waits.retain(|_, wait| wait.entry != entry);
        }
    }

    fn runtime(&self) -> anyhow::Result<&ParallelRuntime> {
        self.runtime
            .get_or_try_init(|| ParallelRuntime::new(self.config.threads))
    }

    fn table<Q: Query>(&self) -> Arc<QueryTable<Q>> {
        let erased = match self.tables.get(&TypeId::of::<Q>()) {
            Some(existing) => Arc::clone(existing.value()),
            None => Arc::clone(
                self.tables
                    .entry(TypeId::of::<Q>())
                    .or_insert_with(|| -> Arc<dyn ErasedTable> { Arc::new(QueryTable::<Q>::new()) })
                    .value(),
            ),
        };
        Self::downcast::<Q>(erased)
    }

    fn existing_table<Q: Query>(&self) -> Option<Arc<QueryTable<Q>>> {
        let erased = Arc::clone(self.tables.get(&TypeId::of::<Q>())?.value());
        Some(Self::downcast::<Q>(erased))
    }

    #[allow(
        clippy::expect_used,
        reason = "tables are keyed by the TypeId of the query they store"
    )]
    fn downcast<Q: Query>(erased: Arc<dyn ErasedTable>) -> Arc<QueryTable<Q>> {
        erased
            .into_any()
            .downcast::<QueryTable<Q>>()
            .expect("query table registered under a foreign TypeId")
    }
}

/// Pops the frame pushed for a running query, also when it unwinds.
pub(crate) struct FrameGuard<'ctx> {
    ctx: &'ctx Context,
    armed: bool,
}

impl FrameGuard<'_> {
    /// Pop the frame and seal what it recorded.
    pub(crate) fn finish(mut self) -> Sealed {
        self.armed = false;
        self.ctx.pop_frame().map(Frame::seal).unwrap_or_default()
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            drop(self.ctx.pop_frame());
        }
    }
}

/// Ends a dependency walk started by [`Context::validating`].
pub(crate) struct ValidationGuard<'ctx> {
    ctx: &'ctx Context,
}

impl Drop for ValidationGuard<'_> {
    fn drop(&mut self) {
        self.ctx.stack().borrow_mut().leave_validation();
    }
}

/// Removes a thread's waits-for edge once it stops waiting.
pub(crate) struct WaitGuard<'ctx> {
    ctx: &'ctx Context,
    waiter: ThreadId,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.ctx.waits_for.lock().remove(&self.waiter);
    }
}

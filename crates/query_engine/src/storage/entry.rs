//! Result entries and the validity protocol.
//!
//! An entry moves through three states:
//!
//! ```text
//! UNSET ──claim──▶ IN_PROGRESS ──settle──▶ VALID(changed_at, checked_at)
//!                       ▲                          │
//!                       └──────────claim───────────┘
//! ```
//!
//! Claiming happens for both revalidation and recomputation. Requesting an
//! entry that the current thread already claimed is a cycle; requesting one
//! claimed by another thread waits for it.

use crate::context::Context;
use crate::diagnostics::Diagnostic;
use crate::merge::Merge;
use crate::query::Query;
use crate::revision::Revision;
use crate::stack::Sealed;
use crate::storage::table::QueryTable;
use crate::trace::Verdict;
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

/// Identity of an entry within its context.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub(crate) struct EntryId(u64);

impl EntryId {
    #[inline]
    pub(crate) fn next(counter: &AtomicU64) -> Self {
        Self(counter.fetch_add(1, Ordering::Relaxed))
    }
}

/// One item of an execution's trail.
pub(crate) enum Recorded {
    /// A query read during execution.
    Dependency(Arc<dyn ErasedEntry>),
    /// A query read through [`Context::query_with_diagnostics`]. It is
    /// validated like any dependency, but its diagnostics belong to the
    /// reader and are not delivered through this trail.
    Collected(Arc<dyn ErasedEntry>),
    /// A diagnostic reported during execution.
    Diagnostic(Diagnostic),
}

/// Cached outcome of the last execution.
pub(crate) struct Memo<V> {
    pub(crate) value: V,
    pub(crate) changed_at: Revision,
    pub(crate) checked_at: Revision,
    pub(crate) trail: Arc<[Recorded]>,
    pub(crate) volatile: bool,
}

impl<V> Memo<V> {
    fn dependencies(&self) -> impl Iterator<Item = &Arc<dyn ErasedEntry>> {
        self.trail.iter().filter_map(|record| match record {
            Recorded::Dependency(dependency) | Recorded::Collected(dependency) => Some(dependency),
            Recorded::Diagnostic(_) => None,
        })
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum Phase {
    Idle,
    InProgress(ThreadId),
}

struct Slot<V> {
    phase: Phase,
    /// `None` while unset, and while a claim holds the memo aside.
    memo: Option<Memo<V>>,
    executions: u64,
}

/// Observable state of an entry.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum EntryState {
    /// Never computed.
    Unset,
    /// Being revalidated or recomputed right now.
    InProgress,
    /// Holds a value.
    Valid {
        /// Revision at which the value last changed.
        changed_at: Revision,
        /// Revision at which the value was last confirmed.
        checked_at: Revision,
    },
}

/// Snapshot of one entry, for drivers and tests.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct EntryInfo {
    /// Current state.
    pub state: EntryState,
    /// How many times the query function ran for this key.
    pub executions: u64,
    /// Distinct queries read by the last execution.
    pub dependencies: usize,
    /// Diagnostics reported directly by the last execution.
    pub diagnostics: usize,
    /// Whether the last execution read state outside the engine.
    pub volatile: bool,
}

/// Type-erased view of an entry, as stored in dependency trails.
pub(crate) trait ErasedEntry: Send + Sync + 'static {
    fn id(&self) -> EntryId;

    /// `Name(key)`.
    fn describe(&self) -> String;

    /// Bring the entry up to date with the current revision and return the
    /// revision at which its value last changed.
    fn validate(self: Arc<Self>, ctx: &Context) -> Revision;

    /// Trail of the last completed execution.
    fn trail(&self) -> Option<Arc<[Recorded]>>;
}

/// The cached result of one query for one key.
pub(crate) struct Entry<Q: Query> {
    id: EntryId,
    key: Q::Key,
    slot: Mutex<Slot<Q::Value>>,
    ready: Condvar,
    table: Weak<QueryTable<Q>>,
}

impl<Q: Query> Entry<Q> {
    pub(crate) fn new(id: EntryId, key: Q::Key, table: Weak<QueryTable<Q>>) -> Self {
        Self {
            id,
            key,
            slot: Mutex::new(Slot {
                phase: Phase::Idle,
                memo: None,
                executions: 0,
            }),
            ready: Condvar::new(),
            table,
        }
    }

    #[inline]
    pub(crate) fn key(&self) -> &Q::Key {
        &self.key
    }

    /// Make the entry valid for the current revision, then `read` its memo.
    pub(crate) fn refresh_with<R>(
        this: &Arc<Self>,
        ctx: &Context,
        read: impl FnOnce(&Memo<Q::Value>) -> R,
    ) -> (Verdict, R) {
        let me = thread::current().id();
        let revision = ctx.current_revision();

        let mut slot = this.slot.lock();
        loop {
            match slot.phase {
                Phase::Idle => break,
                Phase::InProgress(owner) if owner == me => {
                    drop(slot);
                    ctx.recursion_detected(this.describe());
                }
                Phase::InProgress(owner) => {
                    let _waiting = ctx.wait_for(me, owner, this.id, || this.describe());
                    this.ready.wait(&mut slot);
                }
            }
        }

        if let Some(memo) = slot.memo.as_mut() {
            if memo.checked_at == revision || Q::IS_INPUT {
                memo.checked_at = revision;
                return (Verdict::Reused, read(memo));
            }
        }

        slot.phase = Phase::InProgress(me);
        let stash = slot.memo.take();
        drop(slot);
        let mut claim = Claim {
            entry: this,
            ctx,
            owner: me,
            stash,
        };

        let confirmed = claim.stash.as_ref().is_some_and(|memo| {
            !memo.volatile && dependencies_unchanged(ctx, &memo.trail, memo.checked_at)
        });
        let fresh = (!confirmed).then(|| Self::execute(this, ctx));

        let (verdict, memo) = match (fresh, claim.stash.take()) {
            (None, Some(mut memo)) => {
                memo.checked_at = revision;
                (Verdict::Reused, memo)
            }
            (run, previous) => {
                let (value, sealed) = run.unwrap_or_else(|| Self::execute(this, ctx));
                this.settle(ctx, previous, value, sealed, revision)
            }
        };

        let mut slot = this.slot.lock();
        if verdict.recomputed() {
            slot.executions += 1;
        }
        let output = read(slot.memo.insert(memo));
        drop(slot);
        drop(claim);
        (verdict, output)
    }

    fn execute(this: &Arc<Self>, ctx: &Context) -> (Q::Value, Sealed) {
        let owner: Arc<dyn ErasedEntry> = Arc::<Self>::clone(this);
        let frame = ctx.push_frame(owner);
        let value = Q::execute(ctx, this.key.clone());
        (value, frame.finish())
    }

    /// Fold a fresh execution into the previous memo.
    fn settle(
        &self,
        ctx: &Context,
        previous: Option<Memo<Q::Value>>,
        mut value: Q::Value,
        sealed: Sealed,
        revision: Revision,
    ) -> (Verdict, Memo<Q::Value>) {
        let Some(mut memo) = previous else {
            let memo = Memo {
                value,
                changed_at: revision,
                checked_at: revision,
                trail: sealed.trail,
                volatile: sealed.volatile,
            };
            return (Verdict::RecomputedChanged, memo);
        };

        let changed = Merge::merge(&mut memo.value, &mut value);
        self.retire(ctx.config().retain_superseded, value);
        memo.checked_at = revision;
        memo.trail = sealed.trail;
        memo.volatile = sealed.volatile;
        if changed {
            memo.changed_at = revision;
            (Verdict::RecomputedChanged, memo)
        } else {
            (Verdict::RecomputedUnchanged, memo)
        }
    }

    /// Write an input value. `bump` is called, and its revision stamped on
    /// the entry, only if the value changed.
    pub(crate) fn overwrite(
        &self,
        mut value: Q::Value,
        retain: bool,
        bump: impl FnOnce() -> Revision,
    ) -> bool {
        let mut slot = self.slot.lock();
        if let Some(memo) = slot.memo.as_mut() {
            let changed = Merge::merge(&mut memo.value, &mut value);
            if changed {
                let revision = bump();
                memo.changed_at = revision;
                memo.checked_at = revision;
            }
            drop(slot);
            self.retire(retain, value);
            return changed;
        }

        let revision = bump();
        slot.memo = Some(Memo {
            value,
            changed_at: revision,
            checked_at: revision,
            trail: Arc::default(),
            volatile: false,
        });
        true
    }

    fn retire(&self, retain: bool, leftover: Q::Value) {
        if !retain {
            return;
        }
        if let Some(table) = self.table.upgrade() {
            table.retire(leftover);
        }
    }

    pub(crate) fn info(&self) -> EntryInfo {
        let slot = self.slot.lock();
        let state = match (&slot.memo, slot.phase) {
            (_, Phase::InProgress(_)) => EntryState::InProgress,
            (None, Phase::Idle) => EntryState::Unset,
            (Some(memo), Phase::Idle) => EntryState::Valid {
                changed_at: memo.changed_at,
                checked_at: memo.checked_at,
            },
        };
        let (dependencies, diagnostics, volatile) = slot.memo.as_ref().map_or((0, 0, false), |memo| {
            let dependencies = memo.dependencies().count();
            (dependencies, memo.trail.len() - dependencies, memo.volatile)
        });
        EntryInfo {
            state,
            executions: slot.executions,
            dependencies,
            diagnostics,
            volatile,
        }
    }
}

impl<Q: Query> ErasedEntry for Entry<Q> {
    #[inline]
    fn id(&self) -> EntryId {
        self.id
    }

    fn describe(&self) -> String {
        format!("{}({:?})", Q::name(), self.key)
    }

    fn validate(self: Arc<Self>, ctx: &Context) -> Revision {
        let (_, changed_at) = ctx.refresh_traced(&self, |memo| memo.changed_at);
        changed_at
    }

    fn trail(&self) -> Option<Arc<[Recorded]>> {
        let slot = self.slot.lock();
        slot.memo.as_ref().map(|memo| Arc::clone(&memo.trail))
    }
}

/// Walk `trail` in recording order, validating each dependency, and stop at
/// the first one that changed after `checked_at`.
fn dependencies_unchanged(ctx: &Context, trail: &[Recorded], checked_at: Revision) -> bool {
    let _walk = ctx.validating();
    trail.iter().all(|record| match record {
        Recorded::Dependency(dependency) | Recorded::Collected(dependency) => {
            !Arc::clone(dependency).validate(ctx).is_after(checked_at)
        }
        Recorded::Diagnostic(_) => true,
    })
}

/// Visit every diagnostic reachable from `root`, each entry once, in
/// recording order.
pub(crate) fn for_each_diagnostic(root: &dyn ErasedEntry, visit: &mut dyn FnMut(&Diagnostic)) {
    let mut seen = FxHashSet::default();
    seen.insert(root.id());
    walk_trail(root, &mut seen, visit);
}

fn walk_trail(
    entry: &dyn ErasedEntry,
    seen: &mut FxHashSet<EntryId>,
    visit: &mut dyn FnMut(&Diagnostic),
) {
    let Some(trail) = entry.trail() else {
        return;
    };
    for record in trail.iter() {
        match record {
            Recorded::Diagnostic(diagnostic) => visit(diagnostic),
            Recorded::Dependency(dependency) => {
                if seen.insert(dependency.id()) {
                    walk_trail(&**dependency, seen, visit);
                }
            }
            Recorded::Collected(_) => {}
        }
    }
}

/// Exclusive right to update an entry. Releasing it wakes waiters; if it is
/// dropped while unwinding, the previous memo is put back.
struct Claim<'entry, Q: Query> {
    entry: &'entry Entry<Q>,
    ctx: &'entry Context,
    owner: ThreadId,
    stash: Option<Memo<Q::Value>>,
}

impl<Q: Query> Drop for Claim<'_, Q> {
    fn drop(&mut self) {
        let mut slot = self.entry.slot.lock();
        if slot.phase == Phase::InProgress(self.owner) {
            slot.phase = Phase::Idle;
            if slot.memo.is_none() {
                slot.memo = self.stash.take();
            }
        }
        drop(slot);
        self.entry.ready.notify_all();
        self.ctx.release_waiters(self.entry.id);
    }
}

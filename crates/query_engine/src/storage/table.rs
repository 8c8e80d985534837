//! Per-query tables of result entries.

use crate::query::Query;
use crate::storage::entry::{Entry, EntryId};
use core::any::Any;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as Slot;
use log::debug;
use parking_lot::Mutex;
use rustc_hash::FxBuildHasher;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

/// Type-erased trait for query tables.
///
/// This allows the [`Context`](crate::Context) to keep tables of different
/// query types in a single collection.
pub(crate) trait ErasedTable: Send + Sync + 'static {
    /// Recover the concrete table.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Name of the query this table belongs to.
    fn query_name(&self) -> &'static str;

    /// Number of entries.
    fn len(&self) -> usize;

    /// Number of superseded values waiting for collection.
    fn retained(&self) -> usize;

    /// Release every superseded value, returning how many were released.
    fn collect_garbage(&self) -> usize;
}

/// All entries of one query, keyed by the query's real key.
pub(crate) struct QueryTable<Q: Query> {
    entries: DashMap<Q::Key, Arc<Entry<Q>>, FxBuildHasher>,
    /// Leftovers of merges, kept until the next collection.
    retired: Mutex<Vec<Q::Value>>,
}

impl<Q: Query> QueryTable<Q> {
    pub(crate) fn new() -> Self {
        Self {
            entries: DashMap::with_hasher(FxBuildHasher),
            retired: Mutex::new(Vec::new()),
        }
    }

    /// Return the entry for `key`, creating an unset one on first use.
    pub(crate) fn lookup_or_create(this: &Arc<Self>, key: Q::Key, ids: &AtomicU64) -> Arc<Entry<Q>> {
        if let Some(existing) = this.entries.get(&key) {
            return Arc::clone(existing.value());
        }
        match this.entries.entry(key) {
            Slot::Occupied(occupied) => Arc::clone(occupied.get()),
            Slot::Vacant(vacant) => {
                let entry = Arc::new(Entry::new(
                    EntryId::next(ids),
                    vacant.key().clone(),
                    Arc::downgrade(this),
                ));
                vacant.insert(Arc::clone(&entry));
                entry
            }
        }
    }

    /// Return the entry for `key` without creating it.
    pub(crate) fn find(&self, key: &Q::Key) -> Option<Arc<Entry<Q>>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Keep a superseded value alive until the next collection.
    pub(crate) fn retire(&self, leftover: Q::Value) {
        self.retired.lock().push(leftover);
    }
}

impl<Q: Query> ErasedTable for QueryTable<Q> {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn query_name(&self) -> &'static str {
        Q::name()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn retained(&self) -> usize {
        self.retired.lock().len()
    }

    fn collect_garbage(&self) -> usize {
        let released = core::mem::take(&mut *self.retired.lock());
        if !released.is_empty() {
            debug!("Releasing {} superseded values of {}", released.len(), Q::name());
        }
        released.len()
    }
}

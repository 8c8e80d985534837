//! Storage backends for query results.
//!
//! This module provides the storage infrastructure for:
//! - Result entries with validity stamps and recorded trails
//! - Per-query tables owning those entries

mod entry;
mod table;

pub use entry::{EntryInfo, EntryState};
pub(crate) use entry::{Entry, EntryId, ErasedEntry, Memo, Recorded, for_each_diagnostic};
pub(crate) use table::{ErasedTable, QueryTable};

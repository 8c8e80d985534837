//! Demand-driven incremental query engine.
//!
//! This crate provides a Salsa/Rustc-style query system with:
//! - Automatic memoization of query results, one entry per (query, key)
//! - Dependency tracking between queries as they call each other
//! - Lazy revalidation with early cutoff (only recompute what changed)
//! - Diagnostics that are attached to entries and replayed on cache hits
//! - Recursion detection that fails the evaluation instead of looping
//! - Optional parallel evaluation of independent keys
//!
//! # Architecture
//!
//! Computations are organized in layers:
//!
//! ```text
//! Layer 0: Input Queries (file contents, options set by the driver)
//!     ↓
//! Layer 1+: Derived Queries (parse, scope, resolve, evaluate, ...)
//! ```
//!
//! Each query type gets its own table inside the [`Context`]. A request
//! either confirms the cached entry by revalidating what it read last time,
//! or runs the query function again and merges the result into the entry
//! with [`Merge`], so an unchanged result does not disturb its dependents.
//!
//! # Example
//!
//! ```
//! use query_engine::{Context, InputQuery, Query};
//!
//! // Define an input query
//! struct Width;
//! impl InputQuery for Width {
//!     type Key = ();
//!     type Value = u32;
//!     fn default_value(_key: &()) -> u32 { 0 }
//! }
//!
//! // Define a derived query
//! struct Area;
//! impl Query for Area {
//!     type Key = u32;
//!     type Value = u32;
//!
//!     fn execute(ctx: &Context, height: u32) -> u32 {
//!         // Dependencies are automatically tracked
//!         ctx.input::<Width>(()) * height
//!     }
//! }
//!
//! // Use the context
//! let mut ctx = Context::new();
//! ctx.set_input::<Width>((), 3);
//! assert_eq!(ctx.query::<Area>(4), 12);
//! ```

#![allow(
    clippy::module_name_repetitions,
    reason = "Query types like InputQuery are clearer than just Input"
)]
#![allow(clippy::missing_errors_doc, reason = "Internal crate")]
#![allow(clippy::missing_panics_doc, reason = "Internal crate")]

mod config;
mod context;
mod cycle;
mod diagnostics;
mod interner;
mod merge;
mod query;
mod revision;
mod stack;
mod storage;
mod trace;

pub mod parallel;

// Re-exports
pub use config::EngineConfig;
pub use context::{Context, ContextStats};
pub use cycle::CycleError;
pub use diagnostics::{
    BufferedErrorHandler, Diagnostic, ErrorHandler, Location, LogErrorHandler, Severity,
};
pub use interner::Symbol;
pub use merge::{Merge, merge_by_eq};
pub use query::{InputQuery, Query, QueryExt};
pub use revision::Revision;
pub use storage::{EntryInfo, EntryState};
pub use trace::{
    CountingTraceSink, LogTraceSink, TraceEvent, TracePhase, TraceSink, Verdict, VerdictCounts,
};

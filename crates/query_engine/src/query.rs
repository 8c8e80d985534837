//! Query trait and related types.
//!
//! Queries are the fundamental unit of computation in the engine.
//! Each query is a pure function from a key to a value, with automatic
//! memoization and dependency tracking.

use crate::context::Context;
use crate::merge::Merge;
use core::any::type_name;
use core::fmt::Debug;
use core::hash::Hash;
use core::marker::PhantomData;

/// Trait for all derived queries.
///
/// A query is a pure function from `Key` to `Value` that:
/// - Is automatically memoized per key
/// - Tracks the queries it calls while it runs
/// - Is revalidated lazily when something it read may have changed
///
/// # Example
///
/// ```
/// use query_engine::{Context, Query};
///
/// struct Double;
///
/// impl Query for Double {
///     type Key = u32;
///     type Value = u32;
///
///     fn execute(_ctx: &Context, key: u32) -> u32 {
///         key * 2
///     }
/// }
///
/// let ctx = Context::new();
/// assert_eq!(ctx.query::<Double>(5), 10);
/// ```
pub trait Query: 'static + Sized {
    /// The argument tuple for this query. Rendered with `Debug` for tracing.
    type Key: Clone + Hash + Eq + Debug + Send + Sync + 'static;

    /// The output value type for this query.
    ///
    /// Values are handed out as clones of the cached copy, so large results
    /// should be wrapped in an `Arc`.
    type Value: Merge + Clone + Send + Sync + 'static;

    /// Execute the query to compute its value.
    ///
    /// This is called when:
    /// - The query has never been computed for this key
    /// - One of the queries it read last time reports a newer change
    /// - It declared a dependency on external state and the revision moved
    ///
    /// The implementation should use `ctx.query::<OtherQuery>(key)` to read
    /// other queries, which automatically records dependencies.
    fn execute(ctx: &Context, key: Self::Key) -> Self::Value;

    /// Stable name used in traces and cycle reports.
    fn name() -> &'static str {
        type_name::<Self>()
    }

    /// Input entries skip the dependency walk; they only change through
    /// [`Context::set_input`].
    #[doc(hidden)]
    const IS_INPUT: bool = false;
}

/// Trait for input queries (external data sources).
///
/// Input queries are the leaves of the dependency graph. They represent data
/// that comes from outside the engine (file contents, command-line options).
/// When an input changes, the revision is incremented and every query that
/// transitively read it is revalidated on its next request.
pub trait InputQuery: 'static + Sized {
    /// The input key type.
    type Key: Clone + Hash + Eq + Debug + Send + Sync + 'static;

    /// The input value type.
    type Value: Merge + Clone + Send + Sync + 'static;

    /// Value observed when no input has been set for `key`.
    fn default_value(key: &Self::Key) -> Self::Value;

    /// Stable name used in traces and cycle reports.
    fn name() -> &'static str {
        type_name::<Self>()
    }
}

/// Adapter giving an input its own query table.
pub(crate) struct InputSlot<I>(PhantomData<fn() -> I>);

impl<I: InputQuery> Query for InputSlot<I> {
    type Key = I::Key;
    type Value = I::Value;

    const IS_INPUT: bool = true;

    fn execute(_ctx: &Context, key: Self::Key) -> Self::Value {
        I::default_value(&key)
    }

    fn name() -> &'static str {
        I::name()
    }
}

/// Extension trait for convenient query execution.
pub trait QueryExt: Query {
    /// Evaluate this query on the given context.
    #[inline]
    fn get(ctx: &Context, key: Self::Key) -> Self::Value {
        ctx.query::<Self>(key)
    }
}

impl<Q: Query> QueryExt for Q {}

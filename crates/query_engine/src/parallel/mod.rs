//! Parallel query evaluation infrastructure.
//!
//! [`Context::par_query`](crate::Context::par_query) fans independent keys of
//! one query out over a rayon pool owned by the context.

mod runtime;

pub use runtime::ParallelRuntime;

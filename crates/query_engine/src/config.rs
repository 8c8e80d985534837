//! Configuration settings for a query context.
//!
//! Configuration can be loaded from environment variables or constructed
//! programmatically.

use std::env;

/// Runtime configuration for a [`Context`](crate::Context).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Whether to install [`LogTraceSink`](crate::LogTraceSink) on creation
    pub trace: bool,
    /// Worker count for [`Context::par_query`](crate::Context::par_query);
    /// `None` lets rayon decide
    pub threads: Option<usize>,
    /// Whether superseded values are kept until
    /// [`Context::collect_garbage`](crate::Context::collect_garbage)
    pub retain_superseded: bool,
}

impl Default for EngineConfig {
    #[inline]
    fn default() -> Self {
        Self {
            trace: false,
            threads: None,
            retain_superseded: true,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `QUERY_ENGINE_TRACE`: Set to "1" to log every query evaluation (default: disabled)
    /// - `QUERY_ENGINE_THREADS`: Parallel worker count, ignored unless positive
    /// - `QUERY_ENGINE_RETAIN`: Set to "0" to drop superseded values immediately
    #[inline]
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let trace = lookup("QUERY_ENGINE_TRACE").as_deref() == Some("1");
        let threads = lookup("QUERY_ENGINE_THREADS")
            .and_then(|val| val.trim().parse::<usize>().ok())
            .filter(|count| *count > 0);
        let retain_superseded = lookup("QUERY_ENGINE_RETAIN").as_deref() != Some("0");
        Self {
            trace,
            threads,
            retain_superseded,
        }
    }

    /// Set the parallel worker count.
    #[inline]
    #[must_use]
    pub const fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Enable or disable retention of superseded values.
    #[inline]
    #[must_use]
    pub const fn with_retention(mut self, retain: bool) -> Self {
        self.retain_superseded = retain;
        self
    }
}

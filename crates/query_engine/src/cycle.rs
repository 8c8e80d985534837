//! Recursion detection failure and its top-level boundary.
//!
//! A query that (transitively) requires its own value has no answer under
//! eager evaluation. Inside the engine the failure unwinds as a [`CycleError`]
//! panic payload so no query function has to thread it through its return
//! type; [`catch_cycle`] turns it back into a `Result` at the outermost call.

use core::fmt;
use log::error;
use std::panic::{self, AssertUnwindSafe};

/// Error indicating a query re-entered itself before completing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError {
    /// The query that was requested while already in progress, as
    /// `Name(key)`.
    pub query: String,
    /// Queries active on the detecting thread, outermost first.
    pub active: Vec<String>,
}

impl CycleError {
    /// Whether `name` appears anywhere in the reported cycle.
    pub fn involves(&self, name: &str) -> bool {
        self.query.contains(name) || self.active.iter().any(|frame| frame.contains(name))
    }
}

impl fmt::Display for CycleError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "recursion encountered in query {}", self.query)?;
        if !self.active.is_empty() {
            write!(formatter, " (active: {})", self.active.join(" -> "))?;
        }
        Ok(())
    }
}

impl std::error::Error for CycleError {}

/// Log and unwind with `cycle` as the payload.
pub(crate) fn raise(cycle: CycleError) -> ! {
    error!("{cycle}");
    panic::panic_any(cycle)
}

/// Run `body`, converting an escaping [`CycleError`] into `Err`.
///
/// Any other panic keeps unwinding.
pub(crate) fn catch_cycle<R>(body: impl FnOnce() -> R) -> Result<R, CycleError> {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(value) => Ok(value),
        Err(payload) => match payload.downcast::<CycleError>() {
            Ok(cycle) => Err(*cycle),
            Err(other) => panic::resume_unwind(other),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_active_queries() {
        let cycle = CycleError {
            query: "Outer(1)".to_owned(),
            active: vec!["Outer(1)".to_owned(), "Inner(1)".to_owned()],
        };
        assert_eq!(
            cycle.to_string(),
            "recursion encountered in query Outer(1) (active: Outer(1) -> Inner(1))"
        );
        assert!(cycle.involves("Inner"));
    }

    #[test]
    fn other_panics_are_not_swallowed() {
        let outcome = panic::catch_unwind(|| catch_cycle::<()>(|| panic::panic_any(7_u8)));
        assert!(outcome.is_err());
    }

    #[test]
    fn cycle_payload_becomes_err() {
        let cycle = CycleError {
            query: "Loop(())".to_owned(),
            active: Vec::new(),
        };
        let result: Result<(), CycleError> = catch_cycle(|| panic::panic_any(cycle.clone()));
        assert_eq!(result, Err(cycle));
    }
}

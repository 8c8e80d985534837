//! Diagnostics raised by query functions and the handlers that receive them.
//!
//! Diagnostics are never delivered while a query is still running. They are
//! recorded into the running entry, sealed when it completes, and delivered to
//! the context's [`ErrorHandler`] once the outermost query call returns. A
//! cache hit replays exactly what the original run recorded.

use core::fmt;
use log::{error, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;

/// How serious a diagnostic is.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum Severity {
    /// Supplementary information attached to another diagnostic.
    Note,
    /// Suspicious but accepted input.
    Warning,
    /// Malformed input rejected by a parser.
    Syntax,
    /// Semantic error.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Note => "note",
            Self::Warning => "warning",
            Self::Syntax => "syntax error",
            Self::Error => "error",
        })
    }
}

/// A position in some source file. Lines and columns are 1-based.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Location {
    /// Path of the source file as the driver named it.
    pub path: Arc<str>,
    /// Line number, starting at 1.
    pub line: u32,
    /// Column number, starting at 1.
    pub column: u32,
}

impl Location {
    /// Create a location.
    pub fn new(path: impl Into<Arc<str>>, line: u32, column: u32) -> Self {
        Self {
            path: path.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}:{}", self.path, self.line, self.column)
    }
}

/// A user-facing diagnostic: kind, location and message.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Diagnostic {
    /// Kind of diagnostic.
    pub severity: Severity,
    /// Where it applies, if anywhere in particular.
    pub location: Option<Location>,
    /// Human-readable message.
    pub message: String,
}

impl Diagnostic {
    /// Create a diagnostic of the given severity.
    pub fn new(severity: Severity, location: Option<Location>, message: impl Into<String>) -> Self {
        Self {
            severity,
            location,
            message: message.into(),
        }
    }

    /// Create an error at `location`.
    pub fn error(location: Location, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, Some(location), message)
    }

    /// Create a syntax error at `location`.
    pub fn syntax(location: Location, message: impl Into<String>) -> Self {
        Self::new(Severity::Syntax, Some(location), message)
    }

    /// Create a warning at `location`.
    pub fn warning(location: Location, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, Some(location), message)
    }

    /// Create a note with no particular location.
    pub fn note(message: impl Into<String>) -> Self {
        Self::new(Severity::Note, None, message)
    }

    /// Whether this diagnostic should fail a compilation.
    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error | Severity::Syntax)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(location) = &self.location {
            write!(formatter, "{location}: ")?;
        }
        write!(formatter, "{}: {}", self.severity, self.message)
    }
}

/// Receives diagnostics delivered at the end of top-level query calls.
pub trait ErrorHandler: Send + Sync {
    /// Deliver one diagnostic.
    fn report(&self, diagnostic: &Diagnostic);
}

/// Default handler: forwards every diagnostic to the `log` facade.
#[derive(Copy, Clone, Debug, Default)]
pub struct LogErrorHandler;

impl ErrorHandler for LogErrorHandler {
    fn report(&self, diagnostic: &Diagnostic) {
        match diagnostic.severity {
            Severity::Error | Severity::Syntax => error!("{diagnostic}"),
            Severity::Warning => warn!("{diagnostic}"),
            Severity::Note => info!("{diagnostic}"),
        }
    }
}

/// Handler that keeps delivered diagnostics for later inspection.
///
/// Clones share the same buffer, so a driver can keep one clone while the
/// context owns another.
#[derive(Clone, Debug, Default)]
pub struct BufferedErrorHandler {
    buffer: Arc<Mutex<Vec<Diagnostic>>>,
}

impl BufferedErrorHandler {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything delivered so far.
    pub fn take(&self) -> Vec<Diagnostic> {
        core::mem::take(&mut *self.buffer.lock())
    }

    /// Number of diagnostics currently buffered.
    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }
}

impl ErrorHandler for BufferedErrorHandler {
    fn report(&self, diagnostic: &Diagnostic) {
        self.buffer.lock().push(diagnostic.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_location_and_severity() {
        let diagnostic = Diagnostic::error(Location::new("main.src", 3, 7), "unknown name `x`");
        assert_eq!(diagnostic.to_string(), "main.src:3:7: error: unknown name `x`");
        assert!(diagnostic.is_error());
        assert!(!Diagnostic::note("see here").is_error());
    }

    #[test]
    fn buffered_handler_clones_share_storage() {
        let handler = BufferedErrorHandler::new();
        let shared = handler.clone();
        shared.report(&Diagnostic::note("one"));
        assert_eq!(handler.len(), 1);
        assert_eq!(handler.take().len(), 1);
        assert!(shared.is_empty());
    }
}

//! Round-based evaluation of a fixed set of source files.

use crate::frontend::{BindingValue, FilePath, FileSummary, SourceText};
use anyhow::{Context as _, Result};
use log::{debug, info};
use query_engine::{
    BufferedErrorHandler, Context, CountingTraceSink, Diagnostic, EngineConfig, LogTraceSink,
    Revision, TraceEvent, TraceSink, VerdictCounts,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// Counts verdicts and, when tracing is enabled, also logs every event.
struct RoundSink {
    counts: CountingTraceSink,
    log: Option<LogTraceSink>,
}

impl TraceSink for RoundSink {
    fn event(&self, event: &TraceEvent<'_>) {
        self.counts.event(event);
        if let Some(log) = &self.log {
            log.event(event);
        }
    }
}

/// Outcome of one round.
#[derive(Clone, Debug)]
pub struct RoundReport {
    /// Revision the round was evaluated at.
    pub revision: Revision,
    /// Files whose text differed from the previous round.
    pub changed_files: usize,
    /// Summary of every file, in command-line order.
    pub summaries: Vec<(FilePath, Vec<BindingValue>)>,
    /// Diagnostics delivered during the round.
    pub diagnostics: Vec<Diagnostic>,
    /// Reuse and recompute counts for the round.
    pub verdicts: VerdictCounts,
    /// Superseded values released before the round started.
    pub released: usize,
}

impl RoundReport {
    /// Number of diagnostics that are errors.
    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|diagnostic| diagnostic.is_error())
            .count()
    }
}

/// Owns the query context and the files being evaluated.
pub struct Driver {
    ctx: Context,
    diagnostics: BufferedErrorHandler,
    counts: CountingTraceSink,
    files: Vec<(PathBuf, FilePath)>,
    rounds: u32,
}

impl Driver {
    /// Create a driver for `paths`. Nothing is read until the first round.
    pub fn new(config: EngineConfig, paths: Vec<PathBuf>) -> Self {
        let diagnostics = BufferedErrorHandler::new();
        let counts = CountingTraceSink::new();
        let log = config.trace.then_some(LogTraceSink);

        let mut ctx = Context::with_config(config);
        ctx.set_error_handler(diagnostics.clone());
        ctx.set_trace_sink(RoundSink {
            counts: counts.clone(),
            log,
        });

        let files = paths
            .into_iter()
            .map(|path| {
                let key = FilePath::from(path.display().to_string());
                (path, key)
            })
            .collect();

        Self {
            ctx,
            diagnostics,
            counts,
            files,
            rounds: 0,
        }
    }

    /// The underlying query context.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Re-read every file and evaluate every summary.
    ///
    /// Rounds after the first start a new revision and release values
    /// superseded during the previous one.
    ///
    /// # Errors
    /// Fails when a file cannot be read or an evaluation hits a cycle.
    pub fn run_round(&mut self) -> Result<RoundReport> {
        let released = if self.rounds == 0 {
            0
        } else {
            self.ctx.advance_revision();
            self.ctx.collect_garbage()
        };
        self.rounds += 1;

        let mut changed_files = 0;
        for (path, key) in &self.files {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            if self.ctx.set_input::<SourceText>(Arc::clone(key), Arc::from(text)) {
                debug!("{key} changed");
                changed_files += 1;
            }
        }
        self.counts.take();

        let mut summaries = Vec::with_capacity(self.files.len());
        for (_, key) in &self.files {
            let summary = self.ctx.try_query::<FileSummary>(Arc::clone(key))?;
            summaries.push((Arc::clone(key), summary));
        }

        let report = RoundReport {
            revision: self.ctx.current_revision(),
            changed_files,
            summaries,
            diagnostics: self.diagnostics.take(),
            verdicts: self.counts.take(),
            released,
        };
        info!(
            "Round {} at {}: {} recomputed, {} reused",
            self.rounds,
            report.revision,
            report.verdicts.recomputed(),
            report.verdicts.reused
        );
        Ok(report)
    }
}

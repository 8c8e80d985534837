//! Queries of the binding language, from source text to per-file summaries.

use crate::syntax::{Term, parse_line};
use core::fmt;
use query_engine::{Context, Diagnostic, InputQuery, Location, Query, Severity, Symbol};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Key naming one source file.
pub type FilePath = Arc<str>;

/// One `let` line that parsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    /// Bound name.
    pub name: Arc<str>,
    /// 1-based line of the binding.
    pub line: u32,
    /// 1-based column of the bound name.
    pub column: u32,
    /// Operands of the sum.
    pub terms: Vec<Term>,
}

/// Final value of one binding. `None` when it could not be evaluated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindingValue {
    /// Bound name.
    pub name: Arc<str>,
    /// Evaluated sum.
    pub value: Option<i64>,
}

query_engine::impl_merge_by_eq!(BindingValue);

impl fmt::Display for BindingValue {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Some(value) => write!(formatter, "{} = {value}", self.name),
            None => write!(formatter, "{} = <error>", self.name),
        }
    }
}

/// Contents of a source file, set by the driver.
pub struct SourceText;

impl InputQuery for SourceText {
    type Key = FilePath;
    type Value = Arc<str>;

    fn default_value(_key: &FilePath) -> Arc<str> {
        Arc::from("")
    }

    fn name() -> &'static str {
        "SourceText"
    }
}

/// Every binding that parsed, in source order. Lines that fail to parse are
/// reported and skipped.
pub struct ParseFile;

impl Query for ParseFile {
    type Key = FilePath;
    type Value = Vec<Arc<Binding>>;

    fn execute(ctx: &Context, key: FilePath) -> Self::Value {
        let text = ctx.input::<SourceText>(Arc::clone(&key));
        let mut bindings = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line_number = u32::try_from(index).map_or(u32::MAX, |line| line.saturating_add(1));
            match parse_line(line) {
                Ok(Some(parsed)) => bindings.push(Arc::new(Binding {
                    name: Arc::from(parsed.name),
                    line: line_number,
                    column: parsed.column,
                    terms: parsed.terms,
                })),
                Ok(None) => {}
                Err(error) => ctx.report(Diagnostic::syntax(
                    Location::new(Arc::clone(&key), line_number, error.column),
                    error.message,
                )),
            }
        }
        bindings
    }

    fn name() -> &'static str {
        "ParseFile"
    }
}

/// Index of the first binding of every name defined in a file. Later
/// definitions of the same name are reported as duplicates.
pub struct FileScope;

impl Query for FileScope {
    type Key = FilePath;
    type Value = BTreeMap<Symbol, usize>;

    fn execute(ctx: &Context, key: FilePath) -> Self::Value {
        let bindings = ctx.query::<ParseFile>(Arc::clone(&key));
        let mut scope = BTreeMap::new();
        for (index, binding) in bindings.iter().enumerate() {
            let symbol = ctx.intern(&binding.name);
            if let Some(first) = scope.get(&symbol).and_then(|&first: &usize| bindings.get(first)) {
                ctx.report(Diagnostic::error(
                    binding_location(&key, binding),
                    format!("duplicate definition of `{}`", binding.name),
                ));
                ctx.report(Diagnostic::new(
                    Severity::Note,
                    Some(binding_location(&key, &**first)),
                    "first defined here",
                ));
                continue;
            }
            scope.insert(symbol, index);
        }
        scope
    }

    fn name() -> &'static str {
        "FileScope"
    }
}

/// Value of one named binding in a file. Names may only refer to bindings
/// defined on earlier lines.
pub struct EvalBinding;

impl Query for EvalBinding {
    type Key = (FilePath, Symbol);
    type Value = Option<i64>;

    fn execute(ctx: &Context, key: (FilePath, Symbol)) -> Self::Value {
        let (path, symbol) = key;
        let scope = ctx.query::<FileScope>(Arc::clone(&path));
        let bindings = ctx.query::<ParseFile>(Arc::clone(&path));
        let index = *scope.get(&symbol)?;
        let binding = bindings.get(index)?;

        let mut total = Some(0_i64);
        for term in &binding.terms {
            let operand = match term {
                Term::Number(value) => Some(*value),
                Term::Name { text, column } => {
                    let referenced = ctx.intern(text);
                    let location = Location::new(Arc::clone(&path), binding.line, *column);
                    match scope.get(&referenced) {
                        Some(&target) if target < index => {
                            ctx.query::<Self>((Arc::clone(&path), referenced))
                        }
                        Some(_) => {
                            ctx.report(Diagnostic::error(
                                location,
                                format!("`{text}` is used before its definition"),
                            ));
                            None
                        }
                        None => {
                            ctx.report(Diagnostic::error(location, format!("unknown name `{text}`")));
                            None
                        }
                    }
                }
            };
            total = match (total, operand) {
                (Some(sum), Some(value)) => {
                    let next = sum.checked_add(value);
                    if next.is_none() {
                        ctx.report(Diagnostic::error(
                            binding_location(&path, binding),
                            format!("value of `{}` overflows", binding.name),
                        ));
                    }
                    next
                }
                _ => None,
            };
        }
        total
    }

    fn name() -> &'static str {
        "EvalBinding"
    }
}

/// Values of every distinct binding of a file, in definition order.
pub struct FileSummary;

impl Query for FileSummary {
    type Key = FilePath;
    type Value = Vec<BindingValue>;

    fn execute(ctx: &Context, key: FilePath) -> Self::Value {
        let bindings = ctx.query::<ParseFile>(Arc::clone(&key));
        let scope = ctx.query::<FileScope>(Arc::clone(&key));
        bindings
            .iter()
            .enumerate()
            .filter_map(|(index, binding)| {
                let symbol = ctx.intern(&binding.name);
                (scope.get(&symbol) == Some(&index)).then(|| BindingValue {
                    name: Arc::clone(&binding.name),
                    value: ctx.query::<EvalBinding>((Arc::clone(&key), symbol)),
                })
            })
            .collect()
    }

    fn name() -> &'static str {
        "FileSummary"
    }
}

fn binding_location(path: &FilePath, binding: &Binding) -> Location {
    Location::new(Arc::clone(path), binding.line, binding.column)
}

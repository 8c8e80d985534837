//! A tiny binding language evaluated incrementally on `query_engine`.
//!
//! Each file is a list of `let NAME = EXPR` lines where `EXPR` sums integer
//! literals and names bound on earlier lines. The queries in [`frontend`]
//! parse, scope and evaluate files; [`Driver`] re-reads the files in rounds
//! and reports how much work each round actually redid.

#![allow(clippy::missing_errors_doc, reason = "Internal crate")]

pub mod cli;
pub mod driver;
pub mod frontend;
pub mod syntax;

pub use cli::{Options, USAGE};
pub use driver::{Driver, RoundReport};

//! Command-line parsing.

use anyhow::{Context as _, Result, bail};
use std::path::PathBuf;

/// Usage line printed on `--help` and on argument errors.
pub const USAGE: &str = "Usage: query_driver [--rounds N] FILE...";

/// Parsed command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    /// How many times every file is re-read and re-evaluated.
    pub rounds: u32,
    /// Source files, in command-line order.
    pub files: Vec<PathBuf>,
}

impl Options {
    /// Parse arguments, excluding the program name. Returns `Ok(None)` when
    /// help was requested.
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Option<Self>> {
        let mut rounds = 1;
        let mut files = Vec::new();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--rounds" => {
                    let Some(count) = args.next() else {
                        bail!("--rounds requires a value");
                    };
                    rounds = count
                        .parse()
                        .with_context(|| format!("invalid round count `{count}`"))?;
                }
                "--help" | "-h" => return Ok(None),
                flag if flag.starts_with("--") => bail!("unknown option `{flag}`"),
                _ => files.push(PathBuf::from(&arg)),
            }
        }

        if files.is_empty() {
            bail!("no input files");
        }
        if rounds == 0 {
            bail!("--rounds must be at least 1");
        }
        Ok(Some(Self { rounds, files }))
    }
}

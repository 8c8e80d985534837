use anyhow::{Result, anyhow};
use log::error;
use query_driver::{Driver, Options, USAGE};
use query_engine::EngineConfig;
use std::env;
use std::io::{Write as _, stderr, stdout};

fn main() -> Result<()> {
    env_logger::init();

    let Some(options) = Options::parse(env::args().skip(1)).inspect_err(|_| {
        drop(writeln!(stderr(), "{USAGE}"));
    })?
    else {
        drop(writeln!(stdout(), "{USAGE}"));
        return Ok(());
    };

    let mut driver = Driver::new(EngineConfig::from_env(), options.files);
    let mut out = stdout().lock();
    let mut errors = 0;

    for round in 1..=options.rounds {
        let report = driver.run_round().inspect_err(|err| error!("{err:#}"))?;

        writeln!(
            out,
            "round {round} ({}): {} changed, {} recomputed, {} reused, {} released",
            report.revision,
            report.changed_files,
            report.verdicts.recomputed(),
            report.verdicts.reused,
            report.released
        )?;
        for diagnostic in &report.diagnostics {
            writeln!(stderr(), "{diagnostic}")?;
        }
        for (path, values) in &report.summaries {
            for value in values {
                writeln!(out, "{path}: {value}")?;
            }
        }
        errors = report.error_count();
    }

    if errors > 0 {
        return Err(anyhow!("{errors} error(s) in the last round"));
    }
    Ok(())
}

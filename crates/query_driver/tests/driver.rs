use query_driver::Driver;
use query_engine::{CycleError, EngineConfig};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

fn values(report: &query_driver::RoundReport, file: usize) -> Vec<String> {
    report.summaries[file]
        .1
        .iter()
        .map(ToString::to_string)
        .collect()
}

#[test]
fn unchanged_round_recomputes_nothing() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let first = write(dir.path(), "a.let", "let x = 1\nlet y = x + x\n");
    let second = write(dir.path(), "b.let", "let z = 40 + 2\n");
    let mut driver = Driver::new(EngineConfig::default(), vec![first, second]);

    let cold = driver.run_round().unwrap();
    assert_eq!(cold.changed_files, 2);
    assert_eq!(values(&cold, 0), vec!["x = 1", "y = 2"]);
    assert_eq!(values(&cold, 1), vec!["z = 42"]);
    assert!(cold.verdicts.recomputed() > 0);
    assert_eq!(cold.error_count(), 0);

    let warm = driver.run_round().unwrap();
    assert_eq!(warm.changed_files, 0);
    assert_eq!(warm.verdicts.recomputed(), 0);
    assert!(warm.revision > cold.revision);
    assert_eq!(warm.summaries, cold.summaries);
}

#[test]
fn edits_only_touch_their_own_file() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let first = write(dir.path(), "a.let", "let x = 1\n");
    let second = write(dir.path(), "b.let", "let z = 2\n");
    let mut driver = Driver::new(EngineConfig::default(), vec![first.clone(), second]);
    driver.run_round().unwrap();

    fs::write(&first, "let x = 10\n").unwrap();
    let report = driver.run_round().unwrap();
    assert_eq!(report.changed_files, 1);
    assert_eq!(values(&report, 0), vec!["x = 10"]);
    assert_eq!(values(&report, 1), vec!["z = 2"]);
    // ParseFile, FileScope, EvalBinding and FileSummary of a.let
    assert_eq!(report.verdicts.recomputed(), 4);
    assert_eq!(report.released, 0);

    let next = driver.run_round().unwrap();
    assert!(next.released > 0);
}

#[test]
fn diagnostics_are_reported_every_round() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let file = write(dir.path(), "bad.let", "let x = y\n");
    let mut driver = Driver::new(EngineConfig::default(), vec![file]);

    for _ in 0..2 {
        let report = driver.run_round().unwrap();
        assert_eq!(report.error_count(), 1);
        assert_eq!(values(&report, 0), vec!["x = <error>"]);
    }
}

#[test]
fn unreadable_file_fails_the_round() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let mut driver = Driver::new(EngineConfig::default(), vec![dir.path().join("missing.let")]);
    let error = driver.run_round().unwrap_err();
    assert!(error.to_string().contains("missing.let"));
    assert!(error.downcast_ref::<CycleError>().is_none());
}

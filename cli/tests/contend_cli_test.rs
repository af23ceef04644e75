use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::error::Error;
use std::fs;
use std::process::Command;
use stressgen_core::recording::{EventKind, Recording};
use tempfile::tempdir;

const QUICK: [&str; 6] = ["--workers", "3", "--iterations", "2000", "--alloc-ms", "30"];

#[test]
fn contend_without_output_runs_unrecorded() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("stressgen")?;
    cmd.arg("contend").args(QUICK);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Increments: 6000 across 3 workers"))
        .stdout(predicate::str::contains("Recording written").not())
        .stderr(predicate::str::contains("Count => "));
    Ok(())
}

#[test]
fn contend_with_output_writes_recording() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let output = dir.path().join("multi.sgrc");

    let mut cmd = Command::cargo_bin("stressgen")?;
    cmd.arg("contend")
        .arg(&output)
        .args(QUICK)
        .args(["--events", "thread-start,thread-end,allocation", "--spinners", "2"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Spinners: 2 started, 2 joined"))
        .stdout(predicate::str::contains("Recording written to"));

    let recording = Recording::read_from(&output)?;
    assert_eq!(recording.count(EventKind::ThreadStart), 3);
    assert_eq!(recording.count(EventKind::ThreadEnd), 3);
    assert!(recording.threads().contains(&"cpu-intensive-increment"));
    Ok(())
}

#[test]
fn contend_report_is_json() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let report = dir.path().join("report.json");

    let mut cmd = Command::cargo_bin("stressgen")?;
    cmd.arg("contend").args(QUICK).arg("--report").arg(&report);
    cmd.assert().success();

    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&report)?)?;
    assert_eq!(value["contention"]["total_increments"], 6000);
    assert_eq!(value["contention"]["per_worker"].as_array().map(Vec::len), Some(3));
    assert!(value["recording"].is_null());
    Ok(())
}

#[test]
fn contend_rejects_bad_arguments() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("stressgen")?;
    cmd.args(["contend", "out.sgrc", "--events", "cpu"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unknown event kind 'cpu'"));

    let mut cmd = Command::cargo_bin("stressgen")?;
    cmd.args(["contend", "../escape.sgrc"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Parent directory components"));

    let mut cmd = Command::cargo_bin("stressgen")?;
    cmd.args(["contend", "--workers", "0"]);
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Error: invalid configuration"));
    Ok(())
}

#[test]
fn contend_unwritable_output_fails_before_running() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let output = dir.path().join("missing").join("out.sgrc");

    let mut cmd = Command::cargo_bin("stressgen")?;
    cmd.arg("contend").arg(&output).args(["--alloc-ms", "30000"]);
    cmd.assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("Increments").not())
        .stderr(predicate::str::contains("failed to start recording session"));
    Ok(())
}

#[test]
fn contend_timeout_fails_the_run() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let output = dir.path().join("timeout.sgrc");

    let mut cmd = Command::cargo_bin("stressgen")?;
    cmd.arg("contend")
        .arg(&output)
        .args(["--workers", "2", "--iterations", "50000000", "--alloc-ms", "10", "--timeout-ms", "1"]);
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("timed out"));

    // Cleanup still stopped and dumped the session.
    assert!(output.exists());
    Ok(())
}

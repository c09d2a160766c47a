use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

#[test]
fn reckon_eval_snippet() {
    let mut cmd = Command::cargo_bin("reckon").expect("binary exists");
    cmd.arg("eval").arg("x = 1 + 2 + 3\ny = x * 2");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("x = 1 + 2 + 3  = 6"))
        .stdout(predicate::str::contains("y = x * 2  = 12"));
}

#[test]
fn reckon_run_reports_failing_lines() {
    let dir = tempdir().expect("create temp dir");
    let script = dir.path().join("budget.rk");
    fs::write(&script, "rent = 1200\nfood = rent / 0\n").expect("write script");

    let mut cmd = Command::cargo_bin("reckon").expect("binary exists");
    cmd.arg("run").arg(&script);
    cmd.assert()
        .failure()
        .stdout(predicate::str::contains("rent = 1200  = 1200"))
        .stdout(predicate::str::contains("division"))
        .stderr(predicate::str::contains("Failed(1)"));
}

#[test]
fn reckon_no_warnings_hides_warnings() {
    let source = "x = fa 1 / 0 fo 7";
    let mut cmd = Command::cargo_bin("reckon").expect("binary exists");
    cmd.arg("eval").arg(source);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("warning"));

    let mut cmd = Command::cargo_bin("reckon").expect("binary exists");
    cmd.arg("--no-warnings").arg("eval").arg(source);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("= 7"))
        .stdout(predicate::str::contains("warning").not());
}

#[test]
fn reckon_execute_runs_macros() {
    let mut cmd = Command::cargo_bin("reckon").expect("binary exists");
    cmd.arg("--execute").arg("eval").arg("n = 21\nprint!(n * 2)");
    cmd.assert()
        .success()
        .stdout(predicate::str::starts_with("42\n"));
}

//! CLI smoke tests for the gavel binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn gavel() -> Command {
    Command::cargo_bin("gavel").unwrap()
}

#[test]
fn test_help() {
    gavel().arg("--help").assert().success();
}

#[test]
fn test_registry_prints_every_phase() {
    gavel()
        .arg("registry")
        .assert()
        .success()
        .stdout(predicate::str::contains("XIV"))
        .stdout(predicate::str::contains("Argument draft"))
        .stdout(predicate::str::contains("claude-opus-4-1"));
}

#[test]
fn test_refund_example_values() {
    gavel()
        .args(["refund", "--paid-cents", "100000", "--phase", "I"])
        .assert()
        .success()
        .stdout(predicate::str::contains("$850.00"))
        .stdout(predicate::str::contains("85%"));

    gavel()
        .args(["refund", "--paid-cents", "100000", "--phase", "X"])
        .assert()
        .success()
        .stdout(predicate::str::contains("$0.00"));
}

#[test]
fn test_refund_unknown_phase_flags_review() {
    gavel()
        .args(["refund", "--paid-cents", "100000", "--phase", "Z9"])
        .assert()
        .success()
        .stdout(predicate::str::contains("$500.00"))
        .stdout(predicate::str::contains("manual review"));
}

#[test]
fn test_extract_reports_both_pipelines() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("motion.txt");
    fs::write(
        &path,
        "Under La. C.C.P. Art. 966 and Cal. Civ. Proc. § 437c, summary \
         judgment is proper. See 123 So.3d 456, 460.",
    )
    .unwrap();

    gavel()
        .arg("extract")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Statutory citations (2 found)"))
        .stdout(predicate::str::contains("louisiana"))
        .stdout(predicate::str::contains("california"))
        .stdout(predicate::str::contains("Case-law citations (1 found)"));
}

#[test]
fn test_extract_missing_file_fails() {
    gavel()
        .arg("extract")
        .arg("/nonexistent/motion.txt")
        .assert()
        .failure();
}

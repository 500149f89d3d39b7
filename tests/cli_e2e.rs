//! CLI argument/exit-code behavior via the built binary.
//!
//! These tests stay on the argument-validation paths: anything past them
//! would launch a browser.

use assert_cmd::Command;
use predicates::prelude::*;

fn docharvest() -> Command {
    Command::cargo_bin("docharvest").expect("binary builds")
}

#[test]
fn test_help_shows_usage() {
    docharvest()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--listing-template"))
        .stdout(predicate::str::contains("--pages"));
}

#[test]
fn test_missing_required_args_fails() {
    docharvest()
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_inverted_range_is_rejected() {
    docharvest()
        .args([
            "10",
            "1",
            "--listing-template",
            "https://example.com/data-set-{n}-files",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("inverted"));
}

#[test]
fn test_template_without_placeholder_is_rejected() {
    docharvest()
        .args(["1", "2", "--listing-template", "https://example.com/fixed"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("{n}"));
}

#[test]
fn test_invalid_pages_spec_is_rejected() {
    docharvest()
        .args([
            "1",
            "2",
            "--listing-template",
            "https://example.com/data-set-{n}-files",
            "--pages",
            "4-2",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid page range"));
}

#[test]
fn test_all_units_complete_exits_zero_without_a_browser() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    std::fs::write(dir.path().join("completed.txt"), "1\n2\n").expect("seed completed file");

    docharvest()
        .args([
            "1",
            "2",
            "--listing-template",
            "https://example.com/data-set-{n}-files",
            "--data-dir",
        ])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("nothing left to do"));
}

#[test]
fn test_version_flag_prints_version() {
    docharvest()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

//! CLI integration tests for mig.
//!
//! These cover argument parsing, help output and the exit codes of the
//! failures that happen before any database is contacted.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn cmd() -> Command {
    Command::cargo_bin("mig").unwrap()
}

fn config_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", contents).unwrap();
    file
}

// =============================================================================
// Help and Version
// =============================================================================

#[test]
fn test_help_shows_config_forms() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[CONFIG]"))
        .stdout(predicate::str::contains("-c, --config <CONFIG>"))
        .stdout(predicate::str::contains("config.yaml"));
}

#[test]
fn test_short_help() {
    cmd()
        .arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("MySQL to PostgreSQL"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mig"));
}

#[test]
fn test_positional_and_flag_conflict() {
    cmd()
        .args(["a.yaml", "-c", "b.yaml"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot be used with"));
}

// =============================================================================
// Exit Code 1: configuration problems
// =============================================================================

#[test]
fn test_missing_config_file() {
    cmd()
        .arg("nonexistent_config_file.yaml")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("IO error"));
}

#[test]
fn test_default_config_path_is_used() {
    let dir = tempfile::tempdir().unwrap();
    cmd()
        .current_dir(dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("IO error"));
}

#[test]
fn test_invalid_yaml() {
    let file = config_file("mysql: [unclosed\n");
    cmd()
        .args(["-c", file.path().to_str().unwrap()])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("YAML error"));
}

#[test]
fn test_missing_source_host() {
    let file = config_file(
        "mysql:\n  username: root\n  database: shop\npostgresql:\n  host: pg\n  username: postgres\n  database: shop\n",
    );
    cmd()
        .arg(file.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("mysql.host is required"));
}

#[test]
fn test_missing_target_database() {
    let file = config_file(
        "mysql:\n  host: my\n  username: root\n  database: shop\npostgresql:\n  host: pg\n  username: postgres\n",
    );
    cmd()
        .args(["--config", file.path().to_str().unwrap()])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("postgresql.database is required"));
}

#[test]
fn test_zero_limit_rejected() {
    let file = config_file(
        "mysql:\n  host: my\n  username: root\n  database: shop\npostgresql:\n  host: pg\n  username: postgres\n  database: shop\nconversion:\n  limits:\n    batch_insert_size: 0\n",
    );
    cmd()
        .arg(file.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("batch_insert_size must be at least 1"));
}

//! Integration tests for CLI commands.

#![allow(deprecated)] // Command::cargo_bin is deprecated but replacement requires newer assert_cmd

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn lineflow(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("lineflow").unwrap();
    cmd.current_dir(dir.path());
    cmd
}

// ============================================================================
// Run
// ============================================================================

#[test]
fn run_prints_a_json_report() {
    let temp = TempDir::new().unwrap();

    let output = lineflow(&temp)
        .args(["run", "--seed", "7", "--horizon", "100"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["seed"], 7);
    assert_eq!(report["time"], 100.0);
    assert_eq!(report["stations"].as_array().unwrap().len(), 6);
}

#[test]
fn run_is_reproducible() {
    let temp = TempDir::new().unwrap();
    let args = ["run", "--seed", "11", "--horizon", "200"];

    let first = lineflow(&temp).args(args).output().unwrap();
    let second = lineflow(&temp).args(args).output().unwrap();
    assert_eq!(first.stdout, second.stdout);
}

#[test]
fn run_with_traces_includes_item_routes() {
    let temp = TempDir::new().unwrap();

    lineflow(&temp)
        .args(["run", "--horizon", "300", "--max-items", "5", "--traces"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"item_traces\""));
}

#[test]
fn run_reads_project_config() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("lineflow.toml"),
        "route = [[1], [2, 3]]\n\n[[stations]]\n\n[[stations]]\n\n[[stations]]\n",
    )
    .unwrap();

    let output = lineflow(&temp)
        .args(["run", "--horizon", "50"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["stations"].as_array().unwrap().len(), 3);
}

#[test]
fn run_rejects_invalid_horizon() {
    let temp = TempDir::new().unwrap();

    lineflow(&temp)
        .args(["run", "--horizon", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("run.horizon"));
}

#[test]
fn run_rejects_invalid_config_file() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("lineflow.toml"),
        "[processing]\nfaulty_probability = 3.0\n",
    )
    .unwrap();

    lineflow(&temp)
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("faulty_probability"));
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn config_prints_toml_defaults() {
    let temp = TempDir::new().unwrap();

    lineflow(&temp)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("[run]"))
        .stdout(predicate::str::contains("horizon = 5000.0"))
        .stdout(predicate::str::contains("[[stations]]"))
        .stdout(predicate::str::contains("route"));
}

#[test]
fn config_prints_json() {
    let temp = TempDir::new().unwrap();

    let output = lineflow(&temp)
        .args(["config", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let config: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(config["stock"]["devices"], 3);
}

#[test]
fn config_rejects_unknown_format() {
    let temp = TempDir::new().unwrap();

    lineflow(&temp)
        .args(["config", "--format", "yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown format"));
}

#[test]
fn missing_config_dir_is_an_error() {
    let temp = TempDir::new().unwrap();

    lineflow(&temp)
        .args(["run", "--config", "does-not-exist"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

//! Integration tests for the Nox CLI
//!
//! These tests run the actual CLI binary and verify output.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Binary isolated from the user's config and secrets
fn nox_cmd(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("nox").unwrap();
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("NOX_SERVER_URL")
        .env_remove("NOX_CACHE_FILE")
        .env_remove("RUST_LOG")
        .current_dir(home);
    cmd
}

fn write_workflow(dir: &TempDir, name: &str, yaml: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, yaml).unwrap();
    path
}

const GREET: &str = r#"
name: greet
jobs:
  - id: main
    steps:
      - id: hello
        uses: core/echo@v1
        with:
          message: "Hello, ${{ vars.who }}"
        display:
          success: "said ${{ steps.hello.outputs.message }}"
"#;

#[test]
fn test_help_flag() {
    let dir = TempDir::new().unwrap();
    nox_cmd(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("validate"));
}

// ============================================================================
// validate
// ============================================================================

#[test]
fn test_validate_valid_workflow() {
    let dir = TempDir::new().unwrap();
    let file = write_workflow(&dir, "greet.yaml", GREET);

    nox_cmd(dir.path())
        .arg("validate")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"))
        .stdout(predicate::str::contains("Steps: 1"));
}

#[test]
fn test_validate_duplicate_step_ids() {
    let dir = TempDir::new().unwrap();
    let file = write_workflow(
        &dir,
        "dup.yaml",
        r#"
name: dup
jobs:
  - id: main
    steps:
      - id: same
        uses: core/echo@v1
      - id: SAME
        uses: core/echo@v1
"#,
    );

    nox_cmd(dir.path())
        .arg("validate")
        .arg(&file)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("NOX-002"))
        .stderr(predicate::str::contains("Fix:"));
}

#[test]
fn test_validate_missing_file() {
    let dir = TempDir::new().unwrap();
    nox_cmd(dir.path())
        .args(["validate", "nope.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("NOX-003"));
}

// ============================================================================
// run
// ============================================================================

#[test]
fn test_run_with_var() {
    let dir = TempDir::new().unwrap();
    let file = write_workflow(&dir, "greet.yaml", GREET);

    nox_cmd(dir.path())
        .arg("run")
        .arg(&file)
        .args(["--var", "who=CLI"])
        .assert()
        .success()
        .stdout(predicate::str::contains("said Hello, CLI"))
        .stdout(predicate::str::contains("Done!"));
}

#[test]
fn test_run_quiet_prints_nothing() {
    let dir = TempDir::new().unwrap();
    let file = write_workflow(&dir, "greet.yaml", GREET);

    nox_cmd(dir.path())
        .arg("run")
        .arg(&file)
        .args(["--var", "who=CLI", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_run_unresolved_variable_fails() {
    let dir = TempDir::new().unwrap();
    let file = write_workflow(&dir, "greet.yaml", GREET);

    nox_cmd(dir.path())
        .arg("run")
        .arg(&file)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("NOX-030"))
        .stderr(predicate::str::contains("vars.who"));
}

#[test]
fn test_run_rejects_malformed_var() {
    let dir = TempDir::new().unwrap();
    let file = write_workflow(&dir, "greet.yaml", GREET);

    nox_cmd(dir.path())
        .arg("run")
        .arg(&file)
        .args(["--var", "no-equals-sign"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("NOX-031"));
}

#[test]
fn test_run_with_solution_file() {
    let dir = TempDir::new().unwrap();
    let solution = dir.path().join("solution.yaml");
    fs::write(
        &solution,
        "name: shop\nservices:\n  - name: api\n  - name: web\n",
    )
    .unwrap();
    let file = write_workflow(
        &dir,
        "services.yaml",
        r#"
name: services
jobs:
  - id: each
    for-each: "${{ solution.services }}"
    steps:
      - id: show
        uses: core/echo@v1
        with:
          message: "${{ solution.name }}/${{ foreach.name }}"
        display:
          success: "${{ steps.show.outputs.message }}"
"#,
    );

    nox_cmd(dir.path())
        .arg("run")
        .arg(&file)
        .arg("--solution")
        .arg(&solution)
        .assert()
        .success()
        .stdout(predicate::str::contains("shop/api"))
        .stdout(predicate::str::contains("shop/web"));
}

#[test]
fn test_run_secret_from_environment_is_masked() {
    let dir = TempDir::new().unwrap();
    let file = write_workflow(
        &dir,
        "secret.yaml",
        r#"
name: secret
jobs:
  - id: main
    steps:
      - id: login
        uses: core/echo@v1
        with:
          message: "token=${{ secrets.api.token }}"
        display:
          success: "${{ steps.login.outputs.message }}"
"#,
    );

    nox_cmd(dir.path())
        .arg("run")
        .arg(&file)
        .env("NOX_SECRET_API_TOKEN", "hunter2")
        .assert()
        .success()
        .stdout(predicate::str::contains("token=*******"))
        .stdout(predicate::str::contains("hunter2").not());
}

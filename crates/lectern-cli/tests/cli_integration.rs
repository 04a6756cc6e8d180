//! CLI subprocess integration tests.
//!
//! These tests invoke the `lectern` binary against the in-memory engine
//! (`LECTERN_ENGINE=mock`) and verify exit codes, stdout content, and JSON
//! output stability.

use std::path::Path;
use std::process::Command;

const COMPOSE: &str = r#"
services:
  frontend:
    build: ./frontend
    image: lectern-frontend:latest
    ports:
      - "1280:80"
  backend:
    build: ./backend
    image: lectern-backend:latest
    ports:
      - "1281:1281"
"#;

fn lectern_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_lectern"));
    cmd.env("LECTERN_ENGINE", "mock");
    cmd.env_remove("LECTERN_COMPOSE_FILE");
    cmd.env_remove("LECTERN_LOG");
    cmd
}

fn lectern_in(root: &Path) -> Command {
    let mut cmd = lectern_bin();
    cmd.arg("--root").arg(root).arg("--yes");
    cmd
}

fn deploy_root() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let deploy = dir.path().join("deploy");
    for role in ["frontend", "backend"] {
        std::fs::create_dir_all(deploy.join(role)).unwrap();
        std::fs::write(deploy.join(role).join("Dockerfile"), "FROM node:20-alpine\n").unwrap();
    }
    std::fs::write(deploy.join("docker-compose.yml"), COMPOSE).unwrap();
    dir
}

fn read_secret(root: &Path) -> String {
    std::fs::read_to_string(root.join(".env"))
        .unwrap()
        .lines()
        .find_map(|l| l.strip_prefix("JWT_SECRET=").map(str::to_owned))
        .unwrap()
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("invalid JSON ({e}):\n{stdout}"))
}

#[test]
fn cli_version_exits_zero() {
    let output = lectern_bin().arg("--version").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("lectern"), "version output: {stdout}");
}

#[test]
fn cli_help_lists_commands() {
    let output = lectern_bin().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for cmd in ["install", "sidecar", "export", "import", "delete", "doctor"] {
        assert!(stdout.contains(cmd), "help should list '{cmd}'");
    }
}

#[test]
fn cli_install_json_reports_urls_and_writes_env() {
    let root = deploy_root();
    let output = lectern_in(root.path())
        .args(["--json", "install"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "install failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let json = stdout_json(&output);
    assert_eq!(json["build"]["outcome"], "built");
    let urls: Vec<&str> = json["urls"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|u| u.as_str())
        .collect();
    assert_eq!(urls, ["http://localhost:1280", "http://localhost:1281"]);
    assert!(root.path().join(".env").is_file());
    assert!(root.path().join("data").is_dir());
}

#[test]
fn cli_install_text_prints_steps() {
    let root = deploy_root();
    let output = lectern_in(root.path()).arg("install").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[1/11]"), "stdout: {stdout}");
    assert!(stdout.contains("[11/11]"), "stdout: {stdout}");
    assert!(stdout.contains("http://localhost:1280"));
}

#[test]
fn cli_install_without_profile_fails_with_hint() {
    let root = tempfile::tempdir().unwrap();
    let output = lectern_in(root.path()).arg("install").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("hint:"), "stderr: {stderr}");
    assert!(!root.path().join(".env").exists());
}

#[test]
fn cli_sidecar_without_compose_file_fails() {
    let root = deploy_root();
    let output = lectern_in(root.path())
        .args(["sidecar", "tts"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn cli_sidecar_rejects_core_role_name() {
    let output = lectern_bin()
        .args(["sidecar", "librarian"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[test]
fn cli_status_json_lists_every_role() {
    let root = deploy_root();
    let output = lectern_in(root.path())
        .args(["--json", "status"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["engine"], "mock");
    let roles = json["roles"].as_array().unwrap();
    assert_eq!(roles.len(), 4);
    assert!(roles.iter().all(|r| r["image_present"] == false));
}

#[test]
fn cli_doctor_json_is_stable() {
    let root = deploy_root();
    let output = lectern_in(root.path())
        .args(["--json", "doctor"])
        .output()
        .unwrap();
    let json = stdout_json(&output);
    assert!(json["healthy"].is_boolean());
    let checks = json["checks"].as_array().unwrap();
    let names: Vec<&str> = checks.iter().filter_map(|c| c["name"].as_str()).collect();
    for name in ["platform", "engine_prereqs", "profile", "run_lock"] {
        assert!(names.contains(&name), "missing check '{name}': {names:?}");
    }
    let profile = checks.iter().find(|c| c["name"] == "profile").unwrap();
    assert_eq!(profile["status"], "pass");
}

#[test]
fn cli_doctor_fails_without_profile() {
    let root = tempfile::tempdir().unwrap();
    let output = lectern_in(root.path())
        .args(["--json", "doctor"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout_json(&output)["healthy"], false);
}

#[test]
fn cli_export_skips_absent_images() {
    let root = deploy_root();
    let output = lectern_in(root.path())
        .args(["--json", "export", "frontend"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json[0]["role"], "frontend");
    assert_eq!(json[0]["outcome"]["outcome"], "not-present");
    assert!(!root.path().join("docker-images").exists());
}

#[test]
fn cli_delete_with_nothing_installed_succeeds() {
    let root = deploy_root();
    let output = lectern_in(root.path()).arg("delete").output().unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn cli_menu_requires_terminal() {
    let root = deploy_root();
    let output = lectern_in(root.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn cli_missing_root_fails() {
    let output = lectern_bin()
        .args(["--root", "/nonexistent/lectern-root", "status"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("cannot use root"), "stderr: {stderr}");
}

#[test]
fn cli_completions_bash() {
    let output = lectern_bin().args(["completions", "bash"]).output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("lectern"));
}

#[test]
fn cli_man_pages_written() {
    let dir = tempfile::tempdir().unwrap();
    let output = lectern_bin()
        .arg("man-pages")
        .arg(dir.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(dir.path().join("lectern.1").is_file());
}

#[test]
fn cli_install_secrets_are_random_per_root() {
    let first = deploy_root();
    let second = deploy_root();
    for root in [&first, &second] {
        let output = lectern_in(root.path()).arg("install").output().unwrap();
        assert!(output.status.success());
    }
    let a = read_secret(first.path());
    let b = read_secret(second.path());
    assert_eq!(a.len(), 64);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(a, b);
}

#[test]
fn cli_maintenance_reports_the_declared_tag() {
    let root = deploy_root();
    std::fs::write(
        root.path().join("deploy/docker-compose.yml"),
        COMPOSE.replace(":latest", ":2.0"),
    )
    .unwrap();

    let output = lectern_in(root.path())
        .args(["--json", "status"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json = stdout_json(&output);
    let backend = json["roles"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["role"] == "backend")
        .unwrap();
    assert_eq!(backend["image"], "lectern-backend:2.0");

    let output = lectern_in(root.path())
        .args(["--json", "export", "frontend", "backend"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json[0]["image"], "lectern-frontend:2.0");
    assert_eq!(json[1]["image"], "lectern-backend:2.0");

    let output = lectern_in(root.path())
        .args(["--json", "delete", "backend"])
        .output()
        .unwrap();
    assert!(output.status.success());
}

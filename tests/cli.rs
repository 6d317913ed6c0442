//! End-to-end checks of the `sb` binary that need no network.

use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

const CONNECTION_ENV: &[&str] = &[
    "STACKBRIDGE_CONFIG",
    "JIRA_HOST",
    "JIRA_EMAIL",
    "JIRA_API_TOKEN",
    "JIRA_PROJECT_KEY",
    "OPENPROJECT_HOST",
    "OPENPROJECT_API_KEY",
    "OPENPROJECT_PROJECT_ID",
    "JIRA_ID_CUSTOM_FIELD",
    "CONFLUENCE_HOST",
    "CONFLUENCE_EMAIL",
    "CONFLUENCE_API_TOKEN",
    "CONFLUENCE_SPACE_KEY",
    "BOOKSTACK_HOST",
    "BOOKSTACK_TOKEN_ID",
    "BOOKSTACK_TOKEN_SECRET",
    "BOOKSTACK_SHELF_ID",
    "BOOKSTACK_BOOK_ID",
    "BOOKSTACK_EXTERNAL_TAG",
    "RUST_LOG",
];

/// A command isolated from the caller's environment, with an empty config file.
fn sb(dir: &TempDir) -> Command {
    let config = dir.path().join("config.json");
    std::fs::write(&config, "{}").unwrap();

    let mut cmd = Command::cargo_bin("sb").unwrap();
    for var in CONNECTION_ENV {
        cmd.env_remove(var);
    }
    cmd.arg("--config").arg(config);
    cmd
}

fn stderr_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stderr).unwrap()
}

#[test]
fn test_version_json() {
    let dir = TempDir::new().unwrap();
    let output = sb(&dir).args(["--json", "version"]).output().unwrap();
    assert!(output.status.success());

    let value: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["name"], "stackbridge");
    assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(value["migrations"][0]["target"], "openproject");
    assert_eq!(value["migrations"][1]["source"], "confluence");
}

#[test]
fn test_completions_bash() {
    let dir = TempDir::new().unwrap();
    let output = sb(&dir).args(["completions", "bash"]).output().unwrap();
    assert!(output.status.success());
    let script = String::from_utf8(output.stdout).unwrap();
    assert!(script.contains("_sb"));
}

#[test]
fn test_missing_setting_exits_with_config_code() {
    let dir = TempDir::new().unwrap();
    let output = sb(&dir)
        .args(["--json", "issues", "sync", "--jira-host", "acme.atlassian.net"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(7));
    let error = &stderr_json(&output)["error"];
    assert_eq!(error["code"], "MISSING_SETTING");
    assert!(error["hint"].as_str().unwrap().contains("JIRA_EMAIL"));
}

#[test]
fn test_missing_setting_from_env_is_satisfied() {
    let dir = TempDir::new().unwrap();
    let output = sb(&dir)
        .env("JIRA_HOST", "acme.atlassian.net")
        .env("JIRA_EMAIL", "ops@acme.test")
        .env("JIRA_API_TOKEN", "t")
        .args(["--json", "issues", "sync"])
        .output()
        .unwrap();

    // Jira is complete, so the first gap is on the OpenProject side.
    assert_eq!(output.status.code(), Some(7));
    let error = &stderr_json(&output)["error"];
    assert!(error["message"].as_str().unwrap().contains("OpenProject"));
}

#[test]
fn test_conflicting_layout_rejected() {
    let dir = TempDir::new().unwrap();
    let output = sb(&dir)
        .args([
            "--json",
            "prune",
            "chapters",
            "--bookstack-host",
            "wiki.acme.test",
            "--bookstack-token-id",
            "id",
            "--bookstack-token-secret",
            "secret",
            "--bookstack-shelf-id",
            "1",
            "--bookstack-book-id",
            "2",
        ])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(7));
    assert_eq!(stderr_json(&output)["error"]["code"], "CONFLICTING_LAYOUT");
}

#[test]
fn test_explicit_missing_config_file() {
    let mut cmd = Command::cargo_bin("sb").unwrap();
    for var in CONNECTION_ENV {
        cmd.env_remove(var);
    }
    let output = cmd
        .args(["--json", "--config", "/nonexistent/stackbridge.json", "issues", "diagnose"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(7));
    assert_eq!(stderr_json(&output)["error"]["code"], "CONFIG_ERROR");
}

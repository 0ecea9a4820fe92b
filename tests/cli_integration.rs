//! CLI integration tests
//!
//! Only commands that need no network or model downloads are exercised:
//! help, version, model listing and planning with an assumed memory size.

use std::process::{Command, Output};

fn edgeinfer(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_edgeinfer"))
        .args(args)
        .env_remove("EDGEINFER_API_KEY")
        .env_remove("EDGEINFER_LOG_LEVEL")
        .output()
        .expect("Failed to execute edgeinfer")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn test_cli_help() {
    let output = edgeinfer(&["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("edgeinfer"));
    for command in ["profile", "models", "plan", "generate", "ask"] {
        assert!(stdout.contains(command), "help is missing {}", command);
    }
}

#[test]
fn test_cli_version() {
    let output = edgeinfer(&["--version"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_plan_small_device_json() {
    let output = edgeinfer(&["plan", "quantum-1.7b", "--memory-mb", "2048", "-f", "json"]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let plan = stdout_json(&output);
    assert_eq!(plan["model"], "quantum-1.7b");
    assert_eq!(plan["canRun"], true);
    assert_eq!(plan["precision"], "q4");
    assert_eq!(plan["context_window"], 1024);
}

#[test]
fn test_plan_rejects_oversized_precision() {
    let output = edgeinfer(&[
        "plan",
        "quantum-1.7b",
        "--precision",
        "q8",
        "--memory-mb",
        "2048",
        "-f",
        "json",
    ]);

    assert!(output.status.success());
    let plan = stdout_json(&output);
    assert_eq!(plan["canRun"], false);
    assert_eq!(plan["recommendedQuant"], "q4");
    assert_eq!(plan["context_window"], 0);
}

#[test]
fn test_plan_unknown_model_fails() {
    let output = edgeinfer(&["plan", "no-such-model", "--memory-mb", "4096"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unknown model"));
}

#[test]
fn test_invalid_precision_is_a_usage_error() {
    let output = edgeinfer(&["plan", "quantum-1.7b", "--precision", "q2"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unknown precision"));
}

#[test]
fn test_models_lists_registry() {
    let output = edgeinfer(&["models", "--memory-mb", "2048", "-f", "json"]);

    assert!(output.status.success());
    let rows = stdout_json(&output);
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 6);

    let by_id = |id: &str| rows.iter().find(|r| r["id"] == id).unwrap().clone();
    assert_eq!(by_id("quantum-0.5b")["feasibility"]["canRun"], true);
    assert_eq!(by_id("quantum-7b")["feasibility"]["canRun"], false);
    assert_eq!(by_id("whisper-base")["feasibility"]["precision"], "fp32");
}

#[test]
fn test_ask_requires_a_file() {
    let output = edgeinfer(&["ask", "what?"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--file"));
}

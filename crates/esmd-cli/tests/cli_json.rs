//! Integration tests for the offline `esmd` subcommands.

use std::process::{Command, Output};

fn cargo_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO"));
    cmd.args(["run", "-p", "esmd-cli", "--bin", "esmd", "--"]);
    cmd
}

fn run_json(args: &[&str]) -> serde_json::Value {
    let output = cargo_bin()
        .arg("--json")
        .args(args)
        .output()
        .expect("Failed to run esmd");
    assert!(
        output.status.success(),
        "esmd {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).expect("stdout should be valid JSON")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

#[test]
fn test_args_encode_decode() {
    let encoded = run_json(&[
        "args",
        "encode",
        "--pkg",
        "app",
        "--alias",
        "react:preact/compat",
        "--dep",
        "@types/react@18",
        "--dep",
        "app@1.0.0",
        "--condition",
        "worker",
        "--keep-names",
    ]);
    let token = encoded["token"].as_str().unwrap();
    assert!(!token.is_empty());
    assert_eq!(encoded["segment"], format!("X-{token}"));

    let decoded = run_json(&["args", "decode", &format!("X-{token}")]);
    assert_eq!(decoded["alias"]["react"], "preact/compat");
    assert_eq!(decoded["deps"]["@types/react"], "18");
    // The package's own pin is meaningless and dropped
    assert!(decoded["deps"].get("app").is_none());
    assert_eq!(decoded["conditions"][0], "worker");
    assert_eq!(decoded["keepNames"], true);
    assert_eq!(decoded["sourcemap"], false);
}

#[test]
fn test_args_encode_nothing() {
    let encoded = run_json(&["args", "encode", "--pkg", "app", "--dep", "app@1.0.0"]);
    assert_eq!(encoded["token"], "");
    assert!(encoded["segment"].is_null());
}

#[test]
fn test_args_decode_rejects_garbage() {
    let output = cargo_bin()
        .args(["args", "decode", "X-!!not-base64!!"])
        .output()
        .expect("Failed to run esmd");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid build args"), "stderr: {stderr}");
}

#[test]
fn test_parse_json() {
    let parsed = run_json(&["parse", "/react@18.2.0/jsx-runtime"]);
    assert_eq!(parsed["pkgName"], "react");
    assert_eq!(parsed["pkgVersion"], "18.2.0");
    assert_eq!(parsed["subModuleName"], "jsx-runtime");
    assert_eq!(parsed["specifier"], "react@18.2.0/jsx-runtime");
    assert_eq!(parsed["exactVersion"], true);
    assert_eq!(parsed["hasTargetSegment"], false);
}

#[test]
fn test_parse_artifact_path() {
    let parsed = run_json(&["parse", "/preact@10/es2022/preact.mjs"]);
    assert_eq!(parsed["exactVersion"], false);
    assert_eq!(parsed["hasTargetSegment"], true);
}

#[test]
fn test_target_from_user_agent() {
    let output = cargo_bin()
        .args(["target", "Deno/1.40.0"])
        .output()
        .expect("Failed to run esmd");
    assert!(output.status.success());
    assert_eq!(stdout(&output), "denonext");

    let json = run_json(&["target", "curl/8.0"]);
    assert_eq!(json["target"], "es2022");
}

#[test]
fn test_entry_picks_conditions_per_target() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("esm")).unwrap();
    std::fs::create_dir_all(root.join("cjs")).unwrap();
    std::fs::write(
        root.join("package.json"),
        r#"{
            "name": "lib",
            "version": "1.0.0",
            "exports": {
                ".": {
                    "node": "./cjs/index.js",
                    "import": "./esm/index.mjs",
                    "require": "./cjs/index.js"
                }
            }
        }"#,
    )
    .unwrap();
    std::fs::write(root.join("esm/index.mjs"), "export default 1").unwrap();
    std::fs::write(root.join("cjs/index.js"), "module.exports = 1").unwrap();

    let dir_arg = root.to_str().unwrap();
    let browser = run_json(&["entry", dir_arg]);
    assert_eq!(browser["esm"], "./esm/index.mjs");

    let node = run_json(&["entry", dir_arg, "--target", "node"]);
    assert_eq!(node["cjs"], "./cjs/index.js");
    assert_eq!(node["esm"], "");
}

#[test]
fn test_entry_missing_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("package.json"),
        r#"{ "name": "lib", "version": "1.0.0", "main": "missing.js" }"#,
    )
    .unwrap();

    let output = cargo_bin()
        .args(["entry", dir.path().to_str().unwrap()])
        .output()
        .expect("Failed to run esmd");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no entry found for 'lib'"));
}

//! CLI integration tests for the `pvmap` subcommands.
//!
//! Uses `assert_cmd` to spawn the `pvmap` binary and verify exit codes,
//! stdout and stderr. Commands run from the workspace root against the
//! fixtures of the core and eval crates, with the eval fixture root as the
//! configuration root.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

/// Locate the workspace root by walking up from CARGO_MANIFEST_DIR.
fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    // crates/cli -> workspace root is two levels up
    manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .to_path_buf()
}

const SCAN_DIR: &str = "crates/eval/tests/fixtures/study/3";
const STUDY_DIR: &str = "crates/eval/tests/fixtures/study";
const METHOD_FILE: &str = "crates/core/tests/fixtures/params/method";
const METADATA_SPEC: &str = "crates/eval/tests/fixtures/root/specs/metadata.yaml";

/// Helper: create a Command for the `pvmap` binary, rooted at workspace.
fn pvmap() -> Command {
    let mut cmd = cargo_bin_cmd!("pvmap");
    cmd.current_dir(workspace_root());
    cmd.env(
        "PVMAP_CONFIG_HOME",
        workspace_root().join("crates/eval/tests/fixtures/root"),
    );
    cmd
}

fn stdout_json(cmd: &mut Command) -> serde_json::Value {
    let out = cmd.output().expect("run pvmap");
    assert!(
        out.status.success(),
        "pvmap failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    serde_json::from_slice(&out.stdout).expect("stdout is JSON")
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    pvmap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("structured metadata"))
        .stdout(predicate::str::contains("remap"));
}

#[test]
fn version_exits_0() {
    pvmap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pvmap"));
}

#[test]
fn no_subcommand_is_usage_error() {
    pvmap().assert().failure();
}

// ──────────────────────────────────────────────
// 2. params
// ──────────────────────────────────────────────

#[test]
fn params_prints_file_as_json() {
    let json = stdout_json(pvmap().args(["--output", "json", "params", METHOD_FILE]));
    assert_eq!(json["Method"], serde_json::json!("User:cfMRI_EPI"));
    assert_eq!(json["PVM_Matrix"], serde_json::json!([96, 96]));
    assert!(json.get("JCAMPDX").is_none());
}

#[test]
fn params_single_key_text() {
    pvmap()
        .args(["params", METHOD_FILE, "--key", "PVM_Matrix"])
        .assert()
        .success()
        .stdout(predicate::str::diff("[96,96]\n"));
}

#[test]
fn params_missing_key_fails() {
    pvmap()
        .args(["params", METHOD_FILE, "--key", "PVM_Nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("PVM_Nope"));
}

#[test]
fn params_search_in_file() {
    pvmap()
        .args(["params", METHOD_FILE, "--search", "slice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PVM_SliceThick = 0.5"))
        .stdout(predicate::str::contains("PVM_Matrix").not());
}

#[test]
fn params_search_in_scan_directory() {
    let json = stdout_json(pvmap().args([
        "--output", "json", "params", SCAN_DIR, "--search", "subject_id",
    ]));
    let hits = json.as_array().expect("hits array");
    assert!(hits
        .iter()
        .any(|h| h["file"] == "subject" && h["value"] == "rat_042"));
}

#[test]
fn params_non_parameter_file_fails() {
    pvmap()
        .args(["params", "crates/core/tests/fixtures/params/notes.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("notes.txt"));
}

#[test]
fn params_directory_without_search_fails() {
    pvmap()
        .args(["params", SCAN_DIR])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--search"));
}

// ──────────────────────────────────────────────
// 3. remap
// ──────────────────────────────────────────────

#[test]
fn remap_scan_with_spec_path() {
    let json = stdout_json(pvmap().args(["remap", SCAN_DIR, "--spec", METADATA_SPEC]));
    assert_eq!(json["Method"], serde_json::json!("RARE"));
    assert_eq!(json["Subject"]["ID"], serde_json::json!("rat_042"));
    assert_eq!(json["Institution"], serde_json::json!("Imaging Core (scan 3)"));
}

#[test]
fn remap_validated_with_installed_spec_name() {
    let json = stdout_json(pvmap().args([
        "remap", SCAN_DIR, "--spec", "metadata", "--validate",
    ]));
    assert_eq!(json["Acquisition"]["Matrix"], serde_json::json!([256, 256]));
}

#[test]
fn remap_with_explicit_map_file() {
    let dir = tempfile::tempdir().unwrap();
    let map = dir.path().join("site.yaml");
    fs::write(&map, "Institution:\n  value: Elsewhere\n").unwrap();
    let json = stdout_json(pvmap().args(["remap", SCAN_DIR, "--spec", METADATA_SPEC]).arg("--map-file").arg(&map));
    assert_eq!(json["Institution"], serde_json::json!("Elsewhere"));
}

#[test]
fn remap_reco_selection_reaches_overlay() {
    let dir = tempfile::tempdir().unwrap();
    let map = dir.path().join("reco.yaml");
    fs::write(
        &map,
        "Reconstruction:\n  - when: {RecoID: 2}\n    value: second\n  - value: other\n",
    )
    .unwrap();
    let json = stdout_json(
        pvmap()
            .args(["remap", SCAN_DIR, "--spec", "base.yaml", "--reco", "2"])
            .arg("--map-file")
            .arg(&map),
    );
    assert_eq!(json["Reconstruction"], serde_json::json!("second"));
}

#[test]
fn remap_study_with_subject_spec() {
    let json = stdout_json(pvmap().args(["remap", STUDY_DIR, "--spec", "subject.yaml"]));
    assert_eq!(json["SubjectID"], serde_json::json!("rat_042"));
}

#[test]
fn remap_study_with_scan_spec_fails() {
    pvmap()
        .args(["remap", STUDY_DIR, "--spec", METADATA_SPEC])
        .assert()
        .failure()
        .stderr(predicate::str::contains("method"));
}

#[test]
fn remap_missing_spec_reports_json_error() {
    let out = pvmap()
        .args(["--output", "json", "remap", SCAN_DIR, "--spec", "nope.yaml"])
        .output()
        .expect("run pvmap");
    assert!(!out.status.success());
    let err: serde_json::Value = serde_json::from_slice(&out.stderr).expect("stderr is JSON");
    assert!(err["error"].as_str().unwrap().contains("nope.yaml"));
}

#[test]
fn quiet_suppresses_error_output() {
    pvmap()
        .args(["--quiet", "remap", SCAN_DIR, "--spec", "nope.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::is_empty());
}

// ──────────────────────────────────────────────
// 4. select
// ──────────────────────────────────────────────

#[test]
fn select_metadata_spec_for_scan() {
    pvmap()
        .args(["select", SCAN_DIR])
        .assert()
        .success()
        .stdout(predicate::str::contains("rare -> specs/metadata.yaml"));
}

#[test]
fn select_info_spec_json() {
    let json = stdout_json(pvmap().args([
        "--output", "json", "select", STUDY_DIR, "--category", "info_spec",
    ]));
    assert_eq!(json["name"], serde_json::json!("study-info"));
    assert_eq!(json["use"], serde_json::json!("subject.yaml"));
}

#[test]
fn select_unknown_category_fails() {
    pvmap()
        .args(["select", SCAN_DIR, "--category", "bogus"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown rule category"));
}

#[test]
fn select_without_rules_matches_nothing() {
    let root = tempfile::tempdir().unwrap();
    pvmap()
        .arg("--root")
        .arg(root.path())
        .args(["select", SCAN_DIR])
        .assert()
        .success()
        .stdout(predicate::str::contains("no metadata_spec rule matched"));
}

// ──────────────────────────────────────────────
// 5. validate
// ──────────────────────────────────────────────

#[test]
fn validate_valid_spec() {
    pvmap()
        .args(["validate", "crates/core/tests/fixtures/specs/valid/with_include.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid (3 keys, 2 transforms)"));
}

#[test]
fn validate_invalid_spec_lists_errors() {
    pvmap()
        .args(["validate", "crates/core/tests/fixtures/specs/invalid/bad_reco.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid"))
        .stderr(predicate::str::contains("  - "));
}

#[test]
fn validate_invalid_spec_json() {
    let out = pvmap()
        .args([
            "--output",
            "json",
            "validate",
            "crates/core/tests/fixtures/specs/invalid/bad_reco.yaml",
        ])
        .output()
        .expect("run pvmap");
    assert!(!out.status.success());
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).expect("stdout is JSON");
    assert_eq!(json["valid"], serde_json::json!(false));
    assert!(!json["errors"].as_array().unwrap().is_empty());
}

#[test]
fn validate_include_cycle_fails() {
    pvmap()
        .args(["validate", "crates/core/tests/fixtures/specs/invalid/cycle_a.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cycle_a.yaml"));
}

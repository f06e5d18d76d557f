use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_dnesave"))
        .args(args)
        .output()
        .expect("failed to run dnesave CLI")
}

fn temp_path(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("{prefix}_{}_{}.sav", std::process::id(), nanos))
}

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../tests/fixtures")
        .join(name)
}

fn as_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn stdout_json(output: &std::process::Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).expect("stdout should be valid JSON")
}

#[test]
fn summary_json_reads_compressed_saves() {
    let save = fixture_path("story_zlib.sav");

    let output = run_cli(&[&as_arg(&save), "--json"]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["save_data_type"], "DNESaveGame");
    assert_eq!(json["encoding"], "Compressed");
    assert_eq!(json["scene_ids"][1], "S1100_10");

    let output = run_cli(&[&as_arg(&save), "--codec", "none"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn unpack_writes_the_raw_stream() {
    let raw = fs::read(fixture_path("story.sav")).unwrap();
    let save = fixture_path("story_zlib.sav");
    let unpacked = temp_path("dnesave_unpack_out");

    let output = run_cli(&[&as_arg(&save), "--unpack", &as_arg(&unpacked)]);
    assert!(output.status.success());
    assert_eq!(fs::read(&unpacked).unwrap(), raw);

    let _ = fs::remove_file(unpacked);
}

#[test]
fn tree_text_prints_properties() {
    let save = fixture_path("story.sav");

    let output = run_cli(&[&as_arg(&save), "--tree"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("DNESaveGame\nEngine ver.: 5.3.2\n"));
    assert!(stdout.contains("IntProperty SaveSlot = 3\n"));
}

#[test]
fn set_fact_writes_patched_output() {
    let save = fixture_path("story_zlib.sav");
    let out = temp_path("dnesave_edit_out");

    let output = run_cli(&[
        &as_arg(&save),
        "--set-fact",
        "A1/F2=9",
        "--set-relationship",
        "Nora=4,2,1,3,0",
        "--global",
        "--output",
        &as_arg(&out),
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let output = run_cli(&[&as_arg(&out), "--facts", "--json"]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    let trust = json
        .as_array()
        .expect("facts should be an array")
        .iter()
        .find(|fact| fact["fact_id"] == "F2")
        .expect("F2 should be listed");
    let values: Vec<i64> = trust["values"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["value"].as_i64().unwrap())
        .collect();
    assert_eq!(values, vec![5, 5, 9]);

    let output = run_cli(&[&as_arg(&out), "--relationships", "--json"]);
    let json = stdout_json(&output);
    let nora = json["global"]
        .as_array()
        .unwrap()
        .iter()
        .find(|rel| rel["name"] == "Nora")
        .expect("Nora should be listed")
        .clone();
    assert_eq!(nora["level"], 4);
    assert_eq!(nora["decay"], 1);
    assert_eq!(nora["growth_changes"], 3);

    let _ = fs::remove_file(out);
}

#[test]
fn edits_without_output_are_usage_errors() {
    let save = fixture_path("story.sav");

    let output = run_cli(&[&as_arg(&save), "--set-fact", "A1/F2=9", "--global"]);
    assert_eq!(output.status.code(), Some(2));

    let out = temp_path("dnesave_usage_out");
    let output = run_cli(&[&as_arg(&save), "--set-fact", "A1/F2=9", "--output", &as_arg(&out)]);
    assert_eq!(output.status.code(), Some(2));
    assert!(!out.exists());
}

#[test]
fn unknown_fact_fails_without_patching() {
    let save = fixture_path("story.sav");
    let raw = fs::read(&save).unwrap();
    let out = temp_path("dnesave_missing_out");

    let output = run_cli(&[
        &as_arg(&save),
        "--set-fact",
        "A7/F9=1",
        "--all-scenes",
        "--output",
        &as_arg(&out),
    ]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown fact"), "stderr: {stderr}");
    if let Ok(written) = fs::read(&out) {
        assert_eq!(written, raw);
    }

    let _ = fs::remove_file(out);
}

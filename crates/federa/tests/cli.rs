#![cfg(feature = "cli")]

use std::process::{Command, Output};

fn federa(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_federa"))
        .arg("--log-level")
        .arg("error")
        .args(args)
        .output()
        .expect("federa should run")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

#[test]
fn encode_prints_cold_and_warm_hex() {
    let output = federa(&["--format", "json", "encode", r#"{"a":1}"#, "--twice"]);
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["hex"], "2100610000");
    assert_eq!(json["size"], 5);
    assert_eq!(json["warm_hex"], "210100");
}

#[test]
fn decode_prints_json() {
    let output = federa(&["--format", "json", "decode", "2100610000"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), r#"{"a":1}"#);
}

#[test]
fn encode_then_decode_preserves_references() {
    let input = r#"{"owner":{"$id":"0102030405060708090a0b0c"},"tags":["x",2]}"#;
    let encoded = federa(&["--format", "json", "encode", input]);
    assert!(encoded.status.success());
    let json: serde_json::Value = serde_json::from_str(&stdout(&encoded)).unwrap();
    let hex = json["hex"].as_str().unwrap().to_string();

    let decoded = federa(&["--format", "json", "decode", &hex]);
    assert!(decoded.status.success());
    assert_eq!(stdout(&decoded), input);
}

#[test]
fn invalid_data_exits_60() {
    let output = federa(&["decode", "10"]);
    assert_eq!(output.status.code(), Some(60));
    assert!(String::from_utf8_lossy(&output.stderr).contains("decode failed"));

    let output = federa(&["decode", "abc"]);
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn non_object_input_is_a_usage_error() {
    let output = federa(&["encode", "[1, 2]"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn inspect_names_the_packet_type() {
    let output = federa(&["--format", "json", "inspect", "0400700020006d000000"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), r#"{"type":"heartbeat"}"#);
}

#[test]
fn objectid_prints_requested_count() {
    let output = federa(&["--format", "json", "objectid", "--count", "3"]);
    assert!(output.status.success());
    let ids: Vec<String> = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(|id| id.len() == 24));
    assert!(ids[0] != ids[1] && ids[1] != ids[2]);
}

#[test]
fn version_prints_name() {
    let output = federa(&["version"]);
    assert!(output.status.success());
    assert!(stdout(&output).starts_with("federa "));
}

#[test]
fn extended_version_renders_json() {
    let output = federa(&["--format", "json", "version", "--extended"]);
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["name"], "federa");
    assert_eq!(json["runtime"], true);
}

#[test]
fn extended_version_renders_raw_pairs() {
    let output = federa(&["--format", "raw", "version", "--extended"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.starts_with("name: federa"));
    assert!(text.contains("float_tags: 0x06 f32, 0x07 f64"));
}

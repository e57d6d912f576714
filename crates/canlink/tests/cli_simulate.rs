#![cfg(feature = "cli")]

use std::process::{Command, Output};

fn canlink(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_canlink"))
        .args(["--log-level", "error", "--format", "json"])
        .args(args)
        .output()
        .expect("canlink should run")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    let text = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(text.trim()).expect("stdout should be one JSON object")
}

#[test]
fn version_prints_package_version() {
    let output = canlink(&["version"]);
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    assert_eq!(text.trim(), format!("canlink {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn simulated_send_is_acknowledged() {
    let output = canlink(&["send", "--simulate", "0x301", "0A"]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(0), "stderr: {stderr}");

    let value = stdout_json(&output);
    assert_eq!(value["identifier"], "0x301");
    assert_eq!(value["payload"], "0A");
    assert_eq!(value["length"], 1);
    assert_eq!(value["acknowledged"], true);
    assert!(value["ack_tick"].is_u64());
}

#[test]
fn send_without_ack_leaves_acknowledgement_unset() {
    let output = canlink(&["send", "--simulate", "--no-ack", "519", "FF00AA55"]);
    assert_eq!(output.status.code(), Some(0));

    let value = stdout_json(&output);
    assert_eq!(value["identifier"], "0x207");
    assert_eq!(value["payload"], "FF 00 AA 55");
    assert!(value["acknowledged"].is_null());
}

#[test]
fn send_rejects_wildcard_payload() {
    let output = canlink(&["send", "--simulate", "0x301", "0AXX"]);
    assert_eq!(output.status.code(), Some(64));
    assert!(output.stdout.is_empty());
}

#[test]
fn send_rejects_oversized_payload() {
    let output = canlink(&["send", "--simulate", "0x301", "000102030405060708"]);
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn verify_on_silent_bus_times_out() {
    let output = canlink(&[
        "verify",
        "--simulate",
        "--payload",
        "FF00AA55",
        "--timeout",
        "200ms",
    ]);
    assert_eq!(output.status.code(), Some(124));

    let value = stdout_json(&output);
    assert_eq!(value["result"], "no_frames_seen");
    assert_eq!(value["criteria"], "payload=FF 00 AA 55");
}

#[test]
fn verify_rejects_unknown_field() {
    let output = canlink(&["verify", "--simulate", "--field", "colour=red"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn listen_on_silent_bus_prints_nothing() {
    let output = canlink(&["listen", "--simulate", "--duration", "100ms"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(output.stdout.is_empty());
}

#[test]
fn filtered_listen_on_silent_bus_prints_nothing() {
    let output = canlink(&[
        "listen",
        "--simulate",
        "--identifier",
        "0x207",
        "--duration",
        "100ms",
    ]);
    assert_eq!(output.status.code(), Some(0));
    assert!(output.stdout.is_empty());
}

#[test]
fn probe_reports_simulated_adapter() {
    let output = canlink(&["probe", "--simulate", "--window", "50ms"]);
    assert_eq!(output.status.code(), Some(0));

    let value = stdout_json(&output);
    assert_eq!(value["simulated"], true);
    assert_eq!(value["connected"], true);
    assert_eq!(value["device"], "5458:1222 interface 1");
}

#[cfg(not(feature = "usb"))]
#[test]
fn hardware_access_needs_usb_feature() {
    let output = canlink(&["probe"]);
    assert_eq!(output.status.code(), Some(64));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--simulate"), "stderr: {stderr}");
}

use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "lansim-rs-{prefix}-{}-{nanos}",
        std::process::id()
    ));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn binding_lines(stdout: &str) -> Vec<&str> {
    stdout
        .lines()
        .filter(|line| line.starts_with("dhcp_binding "))
        .collect()
}

#[test]
fn dhcp_lan_binds_every_client() {
    let output = Command::new(env!("CARGO_BIN_EXE_dhcp_lan"))
        .env("RUST_LOG", "error")
        .output()
        .expect("run dhcp_lan");
    assert!(
        output.status.success(),
        "dhcp_lan failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");

    let lines = binding_lines(&stdout);
    assert_eq!(lines.len(), 2, "{stdout}");
    for line in &lines {
        assert!(line.contains("prefix=24"), "{line}");
        assert!(line.contains("gateway=10.0.0.1"), "{line}");
        assert!(line.contains("dhcp_enabled=false"), "{line}");
        assert!(!line.contains("addr=-"), "{line}");
    }
    assert!(stdout.contains("dhcp_server bindings=2"), "{stdout}");
}

#[test]
fn dhcp_lan_writes_bindings_json() {
    let dir = unique_temp_dir("dhcp-lan-json");
    let out_json = dir.join("bindings.json");

    let output = Command::new(env!("CARGO_BIN_EXE_dhcp_lan"))
        .args(["--clients", "3", "--json", out_json.to_str().unwrap()])
        .env("RUST_LOG", "error")
        .output()
        .expect("run dhcp_lan");
    assert!(output.status.success());

    let text = fs::read_to_string(&out_json).expect("read bindings json");
    let bindings: Vec<Value> = serde_json::from_str(&text).expect("parse bindings json");
    assert_eq!(bindings.len(), 3);

    let mut addrs: Vec<&str> = bindings
        .iter()
        .map(|b| b["addr"].as_str().expect("bound address"))
        .collect();
    addrs.sort();
    addrs.dedup();
    assert_eq!(addrs.len(), 3);
    assert!(bindings.iter().all(|b| b["prefix"] == 24));
    assert!(bindings.iter().all(|b| b["dhcp_enabled"] == false));
}

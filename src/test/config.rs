use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::sim::{ConfigError, SimConfig, SimTime, SplitMix64};

fn temp_file(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time")
        .as_nanos();
    std::env::temp_dir().join(format!("lansim-{name}-{nanos}.json"))
}

#[test]
fn missing_fields_fall_back_to_defaults() {
    let path = temp_file("partial");
    fs::write(&path, r#"{ "link_latency_us": 250, "default_ttl": 8 }"#).expect("write config");
    let cfg = SimConfig::from_json_file(&path).expect("config");
    fs::remove_file(&path).ok();

    assert_eq!(cfg.link_latency(), SimTime::from_micros(250));
    assert_eq!(cfg.default_ttl, 8);
    assert_eq!(cfg.echo_timeout(), SimConfig::default().echo_timeout());
    assert_eq!(cfg.dhcp_route_distance, 254);
}

#[test]
fn bad_config_is_reported() {
    let path = temp_file("bad");
    fs::write(&path, "{ not json").expect("write config");
    let err = SimConfig::from_json_file(&path).expect_err("invalid json");
    fs::remove_file(&path).ok();
    assert!(matches!(err, ConfigError::Json(_)));

    let err = SimConfig::from_json_file(temp_file("missing")).expect_err("missing file");
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn poll_intervals_never_reach_zero() {
    let cfg = SimConfig {
        arp_poll_interval_ms: 0,
        dhcp_server_poll_ms: 0,
        ..SimConfig::default()
    };
    assert_eq!(cfg.arp_poll_interval(), SimTime::from_millis(1));
    assert_eq!(cfg.dhcp_server_poll(), SimTime::from_millis(1));
}

#[test]
fn rng_is_reproducible_per_seed() {
    let mut a = SplitMix64::new(42);
    let mut b = SplitMix64::new(42);
    let xs: Vec<u64> = (0..8).map(|_| a.next_u64()).collect();
    let ys: Vec<u64> = (0..8).map(|_| b.next_u64()).collect();
    assert_eq!(xs, ys);

    let mut c = SplitMix64::new(43);
    assert_ne!(c.next_u64(), xs[0]);
    for _ in 0..100 {
        let v = a.in_range(10, 12);
        assert!((10..=12).contains(&v));
    }
}

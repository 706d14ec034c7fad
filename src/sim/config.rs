//! 仿真配置
//!
//! 所有协议计时器与默认值集中在这里；二进制通过 `--config <json>` 覆盖，
//! 缺省字段使用 `Default`。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::SimTime;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// RNG 种子（MAC / 设备 ID / xid）
    pub seed: u64,
    /// 单向链路传播时延（微秒）
    pub link_latency_us: u64,
    /// 本地发出的 IPv4 包的 TTL
    pub default_ttl: u8,
    pub echo_timeout_ms: u64,
    pub ping_interval_ms: u64,
    /// echo 等待 ARP 解析时的轮询周期
    pub arp_poll_interval_ms: u64,
    /// DHCP client 等待 OFFER/ACK 的时长
    pub dhcp_poll_interval_ms: u64,
    /// OFFER 的有效期（server 预留与 client 持有共用）
    pub dhcp_offer_timeout_ms: u64,
    /// server 探测候选地址时每次 echo 的超时
    pub dhcp_probe_timeout_ms: u64,
    /// server 监听循环的接收超时
    pub dhcp_server_poll_ms: u64,
    pub dhcp_lease_secs: u32,
    pub static_route_distance: u8,
    pub dhcp_route_distance: u8,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 0x5EED,
            link_latency_us: 10,
            default_ttl: 64,
            echo_timeout_ms: 1_000,
            ping_interval_ms: 1_000,
            arp_poll_interval_ms: 20,
            dhcp_poll_interval_ms: 2_000,
            dhcp_offer_timeout_ms: 10_000,
            dhcp_probe_timeout_ms: 500,
            dhcp_server_poll_ms: 1_000,
            dhcp_lease_secs: 86_400,
            static_route_distance: 1,
            dhcp_route_distance: 254,
        }
    }
}

impl SimConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn link_latency(&self) -> SimTime {
        SimTime::from_micros(self.link_latency_us)
    }
    pub fn echo_timeout(&self) -> SimTime {
        SimTime::from_millis(self.echo_timeout_ms)
    }
    pub fn ping_interval(&self) -> SimTime {
        SimTime::from_millis(self.ping_interval_ms)
    }
    pub fn arp_poll_interval(&self) -> SimTime {
        SimTime::from_millis(self.arp_poll_interval_ms.max(1))
    }
    pub fn dhcp_poll_interval(&self) -> SimTime {
        SimTime::from_millis(self.dhcp_poll_interval_ms.max(1))
    }
    pub fn dhcp_offer_timeout(&self) -> SimTime {
        SimTime::from_millis(self.dhcp_offer_timeout_ms)
    }
    pub fn dhcp_probe_timeout(&self) -> SimTime {
        SimTime::from_millis(self.dhcp_probe_timeout_ms)
    }
    pub fn dhcp_server_poll(&self) -> SimTime {
        SimTime::from_millis(self.dhcp_server_poll_ms.max(1))
    }
}

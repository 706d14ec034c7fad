//! 接口
//!
//! 接口是一个独立的对象（以 MAC 地址为键存放在 `Network` 的接口表里），
//! 设备只持有接口的 MAC 列表。

use serde::Serialize;

use crate::addr::{DeviceId, Ipv4Address, MacAddr, Prefix, Subnet};

/// 接口工作层次
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    /// 二层：参与 MAC 学习与泛洪
    Bridging,
    /// 三层：可以配置 IPv4 地址
    Routing,
}

#[derive(Debug, Clone)]
pub struct Interface {
    pub mac: MacAddr,
    pub device: DeviceId,
    pub layer: Layer,
    pub enabled: bool,
    pub vlan: u16,
    pub addr: Ipv4Address,
    pub prefix: Prefix,
    pub loopback: bool,
}

impl Interface {
    pub(crate) fn new(mac: MacAddr, device: DeviceId, layer: Layer) -> Self {
        Self {
            mac,
            device,
            layer,
            enabled: true,
            vlan: 0,
            addr: Ipv4Address::UNSPECIFIED,
            prefix: Prefix::ANY,
            loopback: false,
        }
    }

    /// 回环接口：127.0.0.1/8，永远处于活动状态
    pub(crate) fn loopback(mac: MacAddr, device: DeviceId) -> Self {
        Self {
            addr: Ipv4Address::LOOPBACK,
            prefix: Prefix::new(8),
            loopback: true,
            ..Self::new(mac, device, Layer::Routing)
        }
    }

    pub fn is_routing(&self) -> bool {
        self.layer == Layer::Routing
    }

    pub fn is_bridging(&self) -> bool {
        self.layer == Layer::Bridging
    }

    /// 三层接口且已经分配了地址
    pub fn is_configured(&self) -> bool {
        self.is_routing() && !self.addr.is_unspecified()
    }

    pub fn subnet(&self) -> Subnet {
        Subnet::new(self.addr, self.prefix)
    }
}

/// 对外暴露的接口快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceInfo {
    pub mac: MacAddr,
    pub layer: Layer,
    pub enabled: bool,
    pub active: bool,
    pub vlan: u16,
    pub loopback: bool,
    pub connected_to: Option<MacAddr>,
    pub addr: Option<Ipv4Address>,
    pub prefix: Option<Prefix>,
}

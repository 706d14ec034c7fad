use serde::{Deserialize, Serialize};

use crate::addr::{Ipv4Address, MacAddr};
use crate::net::{DeviceKind, EchoResult};

/// 记录的事件类型
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEventKind {
    /// 拓扑元信息（建议作为 t=0 的第一条事件）
    Meta {
        devices: Vec<TraceDeviceInfo>,
        links: Vec<TraceLinkInfo>,
    },
    /// 帧从某个接口发出
    FrameTx {
        iface: MacAddr,
        src: MacAddr,
        dst: MacAddr,
        ethertype: u16,
        bytes: usize,
    },
    /// 帧到达某个接口
    FrameRx {
        iface: MacAddr,
        src: MacAddr,
        dst: MacAddr,
        ethertype: u16,
    },
    /// 帧被丢弃
    FrameDrop { iface: MacAddr, reason: DropReason },
    /// ARP 表新增表项
    ArpLearned { addr: Ipv4Address, mac: MacAddr },
    /// 生成了 ICMP 差错报文
    IcmpError {
        dst: Ipv4Address,
        icmp_type: u8,
        code: u8,
    },
    /// 一次 ICMP echo 结束
    EchoDone { dst: Ipv4Address, result: EchoResult },
    /// DHCP server 发出 OFFER
    DhcpOffer { client: MacAddr, addr: Ipv4Address },
    /// DHCP client 完成地址绑定
    DhcpBound {
        iface: MacAddr,
        addr: Ipv4Address,
        prefix: u8,
        gateway: Option<Ipv4Address>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// 出接口未连线或对端/本端被禁用
    LinkDown,
    /// 目的 MAC 未学习到
    UnknownUnicast,
    /// 已学习的出端口就是入端口
    SamePort,
    /// 解码失败（截断、校验和错误等）
    Malformed,
    /// 目的接口不存在或已禁用
    NoInterface,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceDeviceInfo {
    pub id: u32,
    pub name: String,
    pub kind: DeviceKind,
    pub ifaces: Vec<MacAddr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceLinkInfo {
    pub a: MacAddr,
    pub b: MacAddr,
    /// 单向传播时延（ns）
    pub latency_ns: u64,
}

/// 一条可回放的事件（JSON）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    /// 仿真时间（纳秒，和 `SimTime.0` 同口径）
    pub t_ns: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<u32>,
    #[serde(flatten)]
    pub kind: TraceEventKind,
}

/// 一个简单的事件收集器（存内存，仿真结束写 JSON 文件）
#[derive(Debug, Default)]
pub struct TraceLogger {
    pub events: Vec<TraceEvent>,
}

impl TraceLogger {
    pub fn push(&mut self, ev: TraceEvent) {
        self.events.push(ev);
    }

    pub fn count(&self, pred: impl Fn(&TraceEventKind) -> bool) -> usize {
        self.events.iter().filter(|e| pred(&e.kind)).count()
    }
}

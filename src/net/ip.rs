//! IP 发送路径：封装、路由、ARP 解析、转发与 ICMP 差错。

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use super::device::Device;
use super::network::Network;
use crate::addr::{Ipv4Address, MacAddr};
use crate::sim::Simulator;
use crate::trace::TraceEventKind;
use crate::wire::arp::PTYPE_IPV4;
use crate::wire::{icmp, ArpPacket, EtherType, EthernetFrame, IcmpPacket, IpProtocol, Ipv4Packet};

/// 一次 IP 发送的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendOutcome {
    Sent,
    TimeExceeded,
    HostUnreachable,
    NetUnreachable,
}

impl Device {
    /// 封装并发送一个 IPv4 包；失败时向原始源地址回送 ICMP 差错。
    #[tracing::instrument(skip_all, fields(device = %self.id, src = %pkt.src, dst = %pkt.dst, ttl = pkt.ttl))]
    pub fn try_encapsulate_and_send(&mut self, pkt: Ipv4Packet, sim: &mut Simulator, net: &mut Network) -> SendOutcome {
        self.send_ip(pkt, true, sim, net)
    }

    fn send_ip(&mut self, pkt: Ipv4Packet, report: bool, sim: &mut Simulator, net: &mut Network) -> SendOutcome {
        if !self.has_routing_interfaces(net) {
            return SendOutcome::NetUnreachable;
        }
        if pkt.ttl == 0 {
            if report {
                self.icmp_error(icmp::TIME_EXCEEDED, 0, &pkt, sim, net);
            }
            return SendOutcome::TimeExceeded;
        }

        let connected = self.connected(net);
        let Some(hop) = self.routes.get(pkt.dst, &connected) else {
            debug!("没有路由");
            if report {
                self.icmp_error(icmp::UNREACHABLE, icmp::CODE_NET_UNREACHABLE, &pkt, sim, net);
            }
            return SendOutcome::NetUnreachable;
        };

        let locals = self.local_addrs(net);
        if let Some(entry) = self.arp.get(PTYPE_IPV4, hop.next_hop, &locals) {
            trace!(next_hop = %hop.next_hop, via = %entry.local, "🚀 发送 IPv4");
            self.send_frame(entry.local, entry.remote, EtherType::IPV4, pkt.encode(), sim, net);
            return SendOutcome::Sent;
        }

        self.send_arp_request(hop.local, hop.next_hop, sim, net);
        let (code, outcome) = if hop.next_hop == pkt.dst {
            (icmp::CODE_HOST_UNREACHABLE, SendOutcome::HostUnreachable)
        } else {
            (icmp::CODE_NET_UNREACHABLE, SendOutcome::NetUnreachable)
        };
        debug!(next_hop = %hop.next_hop, ?outcome, "下一跳尚未解析");
        if report {
            self.icmp_error(icmp::UNREACHABLE, code, &pkt, sim, net);
        }
        outcome
    }

    /// 转发收到的 IPv4 包：TTL 必须大于 1
    pub(crate) fn forward_ip(&mut self, pkt: Ipv4Packet, sim: &mut Simulator, net: &mut Network) -> SendOutcome {
        if pkt.ttl <= 1 {
            info!(src = %pkt.src, dst = %pkt.dst, "⌛ TTL 耗尽");
            self.icmp_error(icmp::TIME_EXCEEDED, 0, &pkt, sim, net);
            return SendOutcome::TimeExceeded;
        }
        self.send_ip(pkt.copy_and_decrement(1), true, sim, net)
    }

    /// 向 `offending.src` 回送一个 ICMP 差错报文
    pub(crate) fn icmp_error(&mut self, icmp_type: u8, code: u8, offending: &Ipv4Packet, sim: &mut Simulator, net: &mut Network) {
        if offending.src.is_unspecified() || offending.src.is_broadcast() || offending.dst.is_broadcast() {
            return;
        }
        if offending.protocol == IpProtocol::ICMP
            && IcmpPacket::parse(&offending.payload).is_ok_and(|m| m.is_error())
        {
            return;
        }
        let connected = self.connected(net);
        let Some(back) = self.routes.lookup(offending.src, &connected) else {
            debug!(to = %offending.src, "无法回送 ICMP 差错：没有回程路由");
            return;
        };

        let msg = IcmpPacket::error(icmp_type, code, offending);
        let ttl = net.config().default_ttl;
        let pkt = Ipv4Packet::new(back.local, offending.src, IpProtocol::ICMP, ttl, msg.encode());
        net.stats.icmp_errors += 1;
        net.record(
            Some(self.id),
            sim.now(),
            TraceEventKind::IcmpError {
                dst: offending.src,
                icmp_type,
                code,
            },
        );
        info!(to = %offending.src, icmp_type, code, "⚠️ 回送 ICMP 差错");
        let outcome = self.send_ip(pkt, false, sim, net);
        trace!(?outcome, "ICMP 差错发送结果");
    }

    /// 在本地地址为 `local` 的接口上广播 ARP 请求
    pub(crate) fn send_arp_request(&mut self, local: Ipv4Address, target: Ipv4Address, sim: &mut Simulator, net: &mut Network) {
        let Some(iface) = self.iface_with_addr(net, local) else {
            return;
        };
        let req = ArpPacket::request(iface, local, target);
        net.stats.arp_requests += 1;
        debug!(%target, via = %iface, "📣 ARP 请求");
        self.send_frame(iface, MacAddr::BROADCAST, EtherType::ARP, req.encode(), sim, net);
    }

    /// 从接口 `egress` 发出一帧；`MacAddr::LOOPBACK` 表示本设备的回环接口
    pub(crate) fn send_frame(
        &mut self,
        egress: MacAddr,
        dst: MacAddr,
        ethertype: u16,
        payload: Vec<u8>,
        sim: &mut Simulator,
        net: &mut Network,
    ) -> bool {
        let egress = if egress.is_loopback() {
            match self.loopback {
                Some(lo) => lo,
                None => {
                    warn!(device = %self.id, "设备没有回环接口");
                    return false;
                }
            }
        } else {
            egress
        };
        let frame = EthernetFrame::new(dst, egress, ethertype, payload);
        net.transmit(egress, &frame, sim)
    }

    /// 以 `dst` 的出口地址为源地址构造一个本地发出的 IPv4 包
    pub(crate) fn originate(&self, dst: Ipv4Address, protocol: u8, payload: Vec<u8>, net: &Network) -> Ipv4Packet {
        let connected = self.connected(net);
        let src = self
            .routes
            .lookup(dst, &connected)
            .map(|h| h.local)
            .or_else(|| connected.iter().find(|c| !c.loopback).map(|c| c.addr))
            .unwrap_or(Ipv4Address::UNSPECIFIED);
        Ipv4Packet::new(src, dst, protocol, net.config().default_ttl, payload)
    }
}

//! 设备入口处理：分类、MAC 学习、ARP/IPv4 分发、二层转发。

use tracing::{debug, info, trace};

use super::device::Device;
use super::network::Network;
use crate::addr::{Ipv4Address, MacAddr};
use crate::sim::Simulator;
use crate::socket::{Endpoint, SocketType};
use crate::trace::{DropReason, TraceEventKind};
use crate::wire::{
    icmp, ArpOp, ArpPacket, EtherType, EthernetFrame, IcmpPacket, IpProtocol, Ipv4Packet, UdpDatagram,
};
use crate::wire::arp::{HTYPE_ETHERNET, PTYPE_IPV4};

/// 上层处理是否允许继续二层转发
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Continue,
    Suppress,
}

impl Device {
    /// 一帧到达接口 `ingress`
    #[tracing::instrument(skip_all, fields(device = %self.id, ingress = %ingress, src = %frame.src, dst = %frame.dst))]
    pub(crate) fn on_frame(&mut self, ingress: MacAddr, frame: EthernetFrame, sim: &mut Simulator, net: &mut Network) {
        let (ingress_bridging, ingress_loopback) = {
            let i = net.iface(ingress);
            (i.is_bridging(), i.loopback)
        };

        // 1. 分类
        let mut forward = self.caps.forwarding;
        let mut process = false;
        if self.owns_mac(frame.dst) || (ingress_loopback && frame.dst.is_loopback()) {
            forward = false;
            process = true;
        }
        if frame.dst.is_broadcast() {
            process = true;
        }

        // 2. 学习
        if ingress_bridging
            && !self.owns_mac(frame.src)
            && !frame.src.is_broadcast()
            && !frame.src.is_loopback()
        {
            let own = self.all_macs();
            if self.fib.learn(frame.src, ingress, &own) {
                trace!(mac = %frame.src, port = %ingress, "学习 MAC");
            }
        }

        // 3. 上层处理
        if process && self.has_routing_interfaces(net) {
            let verdict = match frame.ethertype {
                EtherType::ARP => self.on_arp(ingress, &frame.payload, sim, net),
                EtherType::IPV4 => self.on_ipv4(ingress, frame.dst, &frame.payload, sim, net),
                other => {
                    trace!(ethertype = other, "未知帧类型");
                    Verdict::Continue
                }
            };
            if verdict == Verdict::Suppress {
                forward = false;
            }
        }

        // 4. 二层转发
        if forward {
            self.bridge(ingress, &frame, sim, net);
        }
    }

    fn bridge(&mut self, ingress: MacAddr, frame: &EthernetFrame, sim: &mut Simulator, net: &mut Network) {
        let vlan = net.iface(ingress).vlan;
        if frame.dst.is_broadcast() {
            let ports: Vec<MacAddr> = self
                .ifaces
                .iter()
                .copied()
                .filter(|&m| m != ingress)
                .filter(|&m| {
                    let i = net.iface(m);
                    i.is_bridging() && i.vlan == vlan
                })
                .filter(|&m| net.is_active(m))
                .collect();
            trace!(ports = ports.len(), "泛洪广播帧");
            for port in ports {
                net.transmit(port, frame, sim);
            }
            return;
        }

        match self.fib.get(frame.dst) {
            Some(egress) if egress != ingress && net.is_active(egress) => {
                trace!(egress = %egress, "已知单播转发");
                net.transmit(egress, frame, sim);
            }
            Some(egress) if egress == ingress => {
                trace!(dst = %frame.dst, "目的就在入端口一侧，过滤");
                net.drop_frame(self.id, ingress, DropReason::SamePort, sim);
            }
            Some(egress) => {
                net.drop_frame(self.id, egress, DropReason::LinkDown, sim);
            }
            None => {
                debug!(dst = %frame.dst, "未知单播，丢弃");
                net.drop_frame(self.id, ingress, DropReason::UnknownUnicast, sim);
            }
        }
    }

    /// RFC 826 的接收流程
    fn on_arp(&mut self, ingress: MacAddr, payload: &[u8], sim: &mut Simulator, net: &mut Network) -> Verdict {
        let pkt = match ArpPacket::parse(payload) {
            Ok(p) => p,
            Err(e) => {
                debug!(%e, "ARP 解码失败，丢弃");
                net.drop_frame(self.id, ingress, DropReason::Malformed, sim);
                return Verdict::Suppress;
            }
        };
        if pkt.htype != HTYPE_ETHERNET || pkt.ptype != PTYPE_IPV4 {
            return Verdict::Continue;
        }

        let merged = self.arp.merge(pkt.ptype, pkt.sender_proto, pkt.sender_hw, ingress);
        let Some(owner) = self.iface_with_addr(net, pkt.target_proto) else {
            return Verdict::Continue;
        };
        if !merged {
            self.arp.record(pkt.ptype, pkt.sender_proto, pkt.sender_hw, ingress);
            info!(addr = %pkt.sender_proto, mac = %pkt.sender_hw, "📒 ARP 表新增表项");
            net.record(
                Some(self.id),
                sim.now(),
                TraceEventKind::ArpLearned {
                    addr: pkt.sender_proto,
                    mac: pkt.sender_hw,
                },
            );
        }

        if pkt.op == ArpOp::Request {
            let reply = pkt.make_reply(owner);
            debug!(to = %pkt.sender_proto, "回复 ARP 请求");
            self.send_frame(ingress, pkt.sender_hw, EtherType::ARP, reply.encode(), sim, net);
            return Verdict::Suppress;
        }
        Verdict::Continue
    }

    fn on_ipv4(
        &mut self,
        ingress: MacAddr,
        frame_dst: MacAddr,
        payload: &[u8],
        sim: &mut Simulator,
        net: &mut Network,
    ) -> Verdict {
        let pkt = match Ipv4Packet::parse(payload) {
            Ok(p) => p,
            Err(e) => {
                debug!(%e, "IPv4 解码失败，丢弃");
                net.drop_frame(self.id, ingress, DropReason::Malformed, sim);
                return Verdict::Suppress;
            }
        };

        if self.is_local_destination(net, ingress, pkt.dst) {
            self.deliver_local(ingress, pkt, payload, sim, net);
        } else if self.caps.forwarding && !frame_dst.is_broadcast() {
            let outcome = self.forward_ip(pkt, sim, net);
            trace!(?outcome, "转发结果");
        }
        Verdict::Continue
    }

    fn is_local_destination(&self, net: &Network, ingress: MacAddr, dst: Ipv4Address) -> bool {
        if dst.is_broadcast() || self.local_addrs(net).contains(&dst) {
            return true;
        }
        let i = net.iface(ingress);
        if i.loopback {
            return i.subnet().contains(dst);
        }
        i.is_configured() && i.prefix.len() < 32 && dst == i.subnet().broadcast()
    }

    fn deliver_local(&mut self, ingress: MacAddr, pkt: Ipv4Packet, raw: &[u8], sim: &mut Simulator, net: &mut Network) {
        let receivers = self
            .sockets
            .incoming(raw, SocketType::Raw, Endpoint::Link(ingress), 0, sim);
        trace!(receivers, proto = pkt.protocol, "本地交付");

        match pkt.protocol {
            IpProtocol::ICMP => self.on_icmp(pkt, sim, net),
            IpProtocol::UDP => self.on_udp(ingress, pkt, sim, net),
            other => trace!(proto = other, "未处理的协议号"),
        }
    }

    fn on_icmp(&mut self, pkt: Ipv4Packet, sim: &mut Simulator, net: &mut Network) {
        let msg = match IcmpPacket::parse(&pkt.payload) {
            Ok(m) => m,
            Err(e) => {
                debug!(%e, "ICMP 解码失败，丢弃");
                return;
            }
        };
        if msg.icmp_type != icmp::ECHO_REQUEST || !self.local_addrs(net).contains(&pkt.dst) {
            return;
        }
        let reply = IcmpPacket::echo_reply(&msg);
        let ttl = net.config().default_ttl;
        let out = Ipv4Packet::new(pkt.dst, pkt.src, IpProtocol::ICMP, ttl, reply.encode());
        let outcome = self.try_encapsulate_and_send(out, sim, net);
        debug!(to = %pkt.src, ?outcome, "🔁 回复 echo");
    }

    fn on_udp(&mut self, ingress: MacAddr, pkt: Ipv4Packet, sim: &mut Simulator, net: &mut Network) {
        let udp = match UdpDatagram::parse(&pkt.payload, pkt.src, pkt.dst) {
            Ok(u) => u,
            Err(e) => {
                debug!(%e, "UDP 解码失败，丢弃");
                return;
            }
        };
        let key = if self.local_addrs(net).contains(&pkt.dst) {
            pkt.dst
        } else {
            net.iface(ingress).addr
        };
        let receivers = self
            .sockets
            .incoming(&udp.payload, SocketType::Dgram, Endpoint::Ip(key), udp.dst_port, sim);
        if receivers == 0 {
            trace!(addr = %key, port = udp.dst_port, "没有监听者");
        }
    }
}

//! ICMP echo
//!
//! 同一设备上的 echo 串行执行：进行中的那一个独占通配 RAW 套接字，其余排队。
//! 流程：
//! 1. 若下一跳尚未解析，发 ARP 请求并按 `arp_poll_interval` 轮询，直到解析或超时
//! 2. 绑定通配 RAW 套接字，发出 echo request
//! 3. 逐条接收 IPv4 数据，直到匹配的 echo reply、引用了本请求的 ICMP 差错或超时

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use super::device::Device;
use super::ip::SendOutcome;
use super::net_world::NetWorld;
use super::network::Network;
use crate::addr::{DeviceId, Ipv4Address};
use crate::sim::{Event, SimTime, Simulator, World};
use crate::socket::{Endpoint, Resume, SocketId, SocketType};
use crate::trace::TraceEventKind;
use crate::wire::arp::PTYPE_IPV4;
use crate::wire::{icmp, IcmpPacket, IpProtocol, Ipv4Packet};

const ECHO_DATA: &[u8] = b"lansim echo";

/// 一次 echo 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EchoResult {
    Reply { from: Ipv4Address, rtt: SimTime },
    /// 收到引用本请求的 ICMP 差错
    Error { from: Ipv4Address, icmp_type: u8, code: u8 },
    /// 无法发出
    Failed { outcome: SendOutcome },
    Timeout,
}

impl EchoResult {
    pub fn is_reply(&self) -> bool {
        matches!(self, EchoResult::Reply { .. })
    }
}

pub type EchoCallback = Box<dyn FnOnce(EchoResult) + Send>;

pub(crate) enum EchoPurpose {
    Ping { ping: u64, seq: u32 },
    Probe { probe: u64 },
    External(EchoCallback),
}

struct PendingEcho {
    dst: Ipv4Address,
    timeout: SimTime,
    purpose: EchoPurpose,
}

struct ActiveEcho {
    id: u64,
    dst: Ipv4Address,
    request: IcmpPacket,
    started: SimTime,
    deadline: SimTime,
    arp_requested: bool,
    socket: Option<SocketId>,
    purpose: EchoPurpose,
}

#[derive(Default)]
pub(crate) struct EchoEngine {
    queue: VecDeque<PendingEcho>,
    active: Option<ActiveEcho>,
    next_id: u64,
    next_seq: u16,
}

impl EchoEngine {
    pub(crate) fn is_idle(&self) -> bool {
        self.active.is_none() && self.queue.is_empty()
    }

    /// 丢弃所有排队与进行中的 echo（不回调）
    pub(crate) fn clear(&mut self) {
        self.queue.clear();
        self.active = None;
    }
}

/// 事件：检查进行中的 echo 的下一跳是否已解析
#[derive(Debug)]
pub struct EchoPoll {
    pub device: DeviceId,
    pub echo: u64,
}

impl Event for EchoPoll {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let EchoPoll { device, echo } = *self;
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        w.net.on_echo_poll(device, echo, sim);
    }
}

impl Device {
    /// 排队一次 echo
    pub(crate) fn icmp_echo(
        &mut self,
        dst: Ipv4Address,
        timeout: SimTime,
        purpose: EchoPurpose,
        sim: &mut Simulator,
        net: &mut Network,
    ) {
        self.echo.queue.push_back(PendingEcho { dst, timeout, purpose });
        if self.echo.active.is_none() {
            self.start_next_echo(sim, net);
        }
    }

    fn start_next_echo(&mut self, sim: &mut Simulator, net: &mut Network) {
        let Some(next) = self.echo.queue.pop_front() else {
            return;
        };
        let id = self.echo.next_id;
        self.echo.next_id += 1;
        let seq = self.echo.next_seq;
        self.echo.next_seq = self.echo.next_seq.wrapping_add(1);
        let ident = (self.id.get() & 0xffff) as u16;

        let now = sim.now();
        self.echo.active = Some(ActiveEcho {
            id,
            dst: next.dst,
            request: IcmpPacket::echo_request(ident, seq, ECHO_DATA.to_vec()),
            started: now,
            deadline: now.saturating_add(next.timeout),
            arp_requested: false,
            socket: None,
            purpose: next.purpose,
        });
        debug!(device = %self.id, dst = %next.dst, echo = id, "开始 echo");
        self.echo_poll(id, sim, net);
    }

    /// 等待下一跳解析；解析后发送
    pub(crate) fn echo_poll(&mut self, echo: u64, sim: &mut Simulator, net: &mut Network) {
        let Some(active) = self.echo.active.as_ref().filter(|a| a.id == echo) else {
            return;
        };
        let (dst, deadline, arp_requested) = (active.dst, active.deadline, active.arp_requested);
        let now = sim.now();
        if now >= deadline {
            self.finish_echo(EchoResult::Timeout, sim, net);
            return;
        }

        let connected = self.connected(net);
        let hop = self.routes.lookup(dst, &connected);
        let locals = self.local_addrs(net);
        let resolved = match hop {
            Some(h) => self.arp.get(PTYPE_IPV4, h.next_hop, &locals).is_some(),
            // 没有路由：直接发送，由发送路径给出结果
            None => true,
        };
        if resolved {
            self.transmit_echo(sim, net);
            return;
        }

        if let (Some(h), false) = (hop, arp_requested) {
            self.send_arp_request(h.local, h.next_hop, sim, net);
            if let Some(a) = self.echo.active.as_mut() {
                a.arp_requested = true;
            }
        }
        let at = now.saturating_add(net.config().arp_poll_interval()).min(deadline);
        trace!(%dst, ?at, "等待 ARP 解析");
        sim.schedule(at, EchoPoll { device: self.id, echo });
    }

    fn transmit_echo(&mut self, sim: &mut Simulator, net: &mut Network) {
        let Some(active) = self.echo.active.as_ref() else {
            return;
        };
        let (id, dst, deadline) = (active.id, active.dst, active.deadline);
        let payload = active.request.encode();

        let socket = self.sockets.open(SocketType::Raw);
        if !self.bind_socket(socket, Endpoint::AnyLink, 0, net) {
            self.sockets.close(socket, sim);
            debug!("通配 RAW 套接字已被占用");
            self.finish_echo(EchoResult::Failed { outcome: SendOutcome::NetUnreachable }, sim, net);
            return;
        }
        if let Some(a) = self.echo.active.as_mut() {
            a.socket = Some(socket);
        }

        let pkt = self.originate(dst, IpProtocol::ICMP, payload, net);
        let outcome = self.try_encapsulate_and_send(pkt, sim, net);
        if outcome != SendOutcome::Sent {
            self.finish_echo(EchoResult::Failed { outcome }, sim, net);
            return;
        }
        let wait = deadline.saturating_sub(sim.now());
        self.sockets.receive(socket, wait, Resume::Echo { echo: id }, sim);
    }

    pub(crate) fn resume_echo(&mut self, echo: u64, data: Option<Vec<u8>>, sim: &mut Simulator, net: &mut Network) {
        let Some(active) = self.echo.active.as_ref().filter(|a| a.id == echo) else {
            return;
        };
        let Some(bytes) = data else {
            self.finish_echo(EchoResult::Timeout, sim, net);
            return;
        };

        if let Some(result) = Self::match_echo(&bytes, &active.request, active.started, sim.now()) {
            self.finish_echo(result, sim, net);
            return;
        }

        // 不相关的数据：继续等
        let (socket, deadline) = (active.socket, active.deadline);
        let remaining = deadline.saturating_sub(sim.now());
        match socket {
            Some(s) if remaining > SimTime::ZERO => {
                self.sockets.receive(s, remaining, Resume::Echo { echo }, sim);
            }
            _ => self.finish_echo(EchoResult::Timeout, sim, net),
        }
    }

    fn match_echo(bytes: &[u8], request: &IcmpPacket, started: SimTime, now: SimTime) -> Option<EchoResult> {
        let ip = Ipv4Packet::parse(bytes).ok()?;
        if ip.protocol != IpProtocol::ICMP {
            return None;
        }
        let msg = IcmpPacket::parse(&ip.payload).ok()?;
        if msg.matches_request(request) {
            return Some(EchoResult::Reply {
                from: ip.src,
                rtt: now.saturating_sub(started),
            });
        }
        let (_, _, proto, quoted) = msg.quoted()?;
        if proto != IpProtocol::ICMP || quoted.len() < IcmpPacket::HEADER_LEN {
            return None;
        }
        let ours = quoted[0] == icmp::ECHO_REQUEST && quoted[4..8] == request.rest;
        ours.then_some(EchoResult::Error {
            from: ip.src,
            icmp_type: msg.icmp_type,
            code: msg.code,
        })
    }

    fn finish_echo(&mut self, result: EchoResult, sim: &mut Simulator, net: &mut Network) {
        let Some(active) = self.echo.active.take() else {
            return;
        };
        if let Some(s) = active.socket {
            self.sockets.close(s, sim);
        }
        info!(device = %self.id, dst = %active.dst, ?result, "🏁 echo 结束");
        net.record(
            Some(self.id),
            sim.now(),
            TraceEventKind::EchoDone {
                dst: active.dst,
                result,
            },
        );

        match active.purpose {
            EchoPurpose::Ping { ping, seq } => {
                let interval = net.config().ping_interval();
                self.on_ping_echo(ping, seq, result, sim, interval)
            }
            EchoPurpose::Probe { probe } => self.on_probe_result(probe, result, sim, net),
            EchoPurpose::External(cb) => cb(result),
        }

        if self.echo.active.is_none() {
            self.start_next_echo(sim, net);
        }
    }
}

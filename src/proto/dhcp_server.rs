//! DHCP server
//!
//! 地址池以子网为键。服务器在每个已配置的三层接口的 (地址, 67) 上监听，
//! 每次接收最多等待 `dhcp_server_poll`，超时后重新挂起接收，直到被关闭。
//!
//! DISCOVER 的处理：
//! 1. 选出包含入接口地址的地址池
//! 2. 从网络地址之后依次挑选候选地址，跳过网关、本机地址、其他客户端的保留与租约
//! 3. 对候选地址做两次 ICMP echo 探测，有应答则换下一个
//! 4. 保留 `dhcp_offer_timeout`，发 OFFER
//!
//! REQUEST 命中同一客户端的有效保留（或已有租约）则 ACK，否则 NAK。
//! 租约在 `dhcp_lease_secs` 后到期；客户端接口被删除时立即回收。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::addr::{Ipv4Address, MacAddr, Prefix, Subnet};
use crate::net::{Device, EchoPurpose, EchoResult, Network};
use crate::sim::{SimTime, Simulator};
use crate::socket::{Endpoint, Resume, SocketId, SocketTable, SocketType};
use crate::trace::TraceEventKind;
use crate::wire::dhcp::{CLIENT_PORT, OP_REQUEST, SERVER_PORT};
use crate::wire::{DhcpMessage, DhcpMessageType, DhcpOption};

/// 探测次数：全部无应答才认为地址空闲
const PROBES_PER_CANDIDATE: u8 = 2;

/// 地址池：分配的前缀长度与下发的网关
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpPool {
    pub prefix: Prefix,
    pub gateway: Ipv4Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingState {
    Offered,
    Leased,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DhcpBinding {
    pub addr: Ipv4Address,
    pub client: MacAddr,
    pub state: BindingState,
}

#[derive(Debug, Clone, Copy)]
struct Reservation {
    client: MacAddr,
    expires: SimTime,
}

#[derive(Debug, Clone, Copy)]
struct Lease {
    client: MacAddr,
    expires: SimTime,
}

#[derive(Debug)]
struct Probe {
    iface: MacAddr,
    request: DhcpMessage,
    candidate: Ipv4Address,
    attempts: u8,
}

#[derive(Debug, Default)]
pub(crate) struct DhcpServer {
    enabled: bool,
    pools: BTreeMap<Subnet, DhcpPool>,
    /// 接口 -> (监听套接字, 绑定地址)
    listeners: BTreeMap<MacAddr, (SocketId, Ipv4Address)>,
    offers: BTreeMap<Ipv4Address, Reservation>,
    leases: BTreeMap<Ipv4Address, Lease>,
    probes: BTreeMap<u64, Probe>,
    next_probe: u64,
}

impl DhcpServer {
    pub(crate) fn add_pool(&mut self, subnet: Subnet, pool: DhcpPool) -> bool {
        if self.pools.contains_key(&subnet) {
            return false;
        }
        self.pools.insert(subnet, pool);
        true
    }

    pub(crate) fn remove_pool(&mut self, subnet: Subnet) -> bool {
        self.pools.remove(&subnet).is_some()
    }

    pub(crate) fn pools(&self) -> Vec<(Subnet, DhcpPool)> {
        self.pools.iter().map(|(&s, &p)| (s, p)).collect()
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn bindings(&self, now: SimTime) -> Vec<DhcpBinding> {
        let leased = self
            .leases
            .iter()
            .filter(|(_, l)| l.expires > now)
            .map(|(&addr, l)| DhcpBinding {
                addr,
                client: l.client,
                state: BindingState::Leased,
            });
        let offered = self
            .offers
            .iter()
            .filter(|(_, r)| r.expires > now)
            .map(|(&addr, r)| DhcpBinding {
                addr,
                client: r.client,
                state: BindingState::Offered,
            });
        leased.chain(offered).collect()
    }

    /// 关闭监听并放弃进行中的探测；租约保留
    pub(crate) fn disable(&mut self, sockets: &mut SocketTable, sim: &mut Simulator) {
        if !self.enabled {
            return;
        }
        self.enabled = false;
        for (_, (socket, _)) in std::mem::take(&mut self.listeners) {
            sockets.close(socket, sim);
        }
        self.probes.clear();
        self.offers.clear();
        info!("DHCP server 已关闭");
    }

    fn pool_for(&self, addr: Ipv4Address) -> Option<(Subnet, DhcpPool)> {
        self.pools
            .iter()
            .filter(|(s, _)| s.contains(addr))
            .max_by_key(|(s, _)| s.prefix().len())
            .map(|(&s, &p)| (s, p))
    }

    /// 丢弃过期的保留与租约
    fn expire(&mut self, now: SimTime) {
        self.offers.retain(|_, r| r.expires > now);
        let before = self.leases.len();
        self.leases.retain(|_, l| l.expires > now);
        if self.leases.len() != before {
            debug!(expired = before - self.leases.len(), "租约到期");
        }
    }

    /// 客户端接口被删除：回收它的保留、租约与进行中的探测
    pub(crate) fn forget_client(&mut self, client: MacAddr) {
        self.offers.retain(|_, r| r.client != client);
        self.leases.retain(|_, l| l.client != client);
        self.probes.retain(|_, p| p.request.chaddr != client);
    }

    /// 地址没有被其他客户端保留、租用或正在为其探测
    fn is_free_for(&self, addr: Ipv4Address, client: MacAddr) -> bool {
        self.offers.get(&addr).is_none_or(|r| r.client == client)
            && self.leases.get(&addr).is_none_or(|l| l.client == client)
            && !self
                .probes
                .values()
                .any(|p| p.candidate == addr && p.request.chaddr != client)
    }

    fn reserved_for(&self, client: MacAddr) -> Option<Ipv4Address> {
        self.leases
            .iter()
            .find(|(_, l)| l.client == client)
            .map(|(&a, _)| a)
            .or_else(|| {
                self.offers
                    .iter()
                    .find(|(_, r)| r.client == client)
                    .map(|(&a, _)| a)
            })
    }

    /// `after` 之后第一个可分配的地址
    fn next_candidate(
        &self,
        subnet: Subnet,
        pool: DhcpPool,
        after: Ipv4Address,
        client: MacAddr,
        own: &[Ipv4Address],
    ) -> Option<Ipv4Address> {
        let broadcast = subnet.broadcast();
        let mut a = after.max(subnet.network()).inc();
        while a < broadcast {
            if a != pool.gateway && !own.contains(&a) && self.is_free_for(a, client) {
                return Some(a);
            }
            a = a.inc();
        }
        None
    }
}

impl Device {
    /// 启用 DHCP server，在每个已配置的三层接口上开始监听
    pub(crate) fn enable_dhcp_server(&mut self, sim: &mut Simulator, net: &mut Network) -> bool {
        if !self.caps.dhcp_server {
            warn!(device = %self.id, "设备不支持 DHCP server");
            return false;
        }
        if !self.dhcp_server.enabled {
            self.dhcp_server.enabled = true;
            info!(device = %self.id, pools = self.dhcp_server.pools.len(), "🗂️ DHCP server 启动");
        }
        self.reconcile_listeners(sim, net);
        true
    }

    /// 让监听套接字与接口当前地址一致
    fn reconcile_listeners(&mut self, sim: &mut Simulator, net: &mut Network) {
        let wanted: BTreeMap<MacAddr, Ipv4Address> = self
            .ifaces
            .iter()
            .map(|&m| net.iface(m))
            .filter(|i| i.is_configured())
            .map(|i| (i.mac, i.addr))
            .collect();

        let stale: Vec<MacAddr> = self
            .dhcp_server
            .listeners
            .iter()
            .filter(|(m, (_, addr))| wanted.get(m) != Some(addr))
            .map(|(&m, _)| m)
            .collect();
        for m in stale {
            self.dhcp_server_drop_interface(m, sim);
        }

        let poll = net.config().dhcp_server_poll();
        for (iface, addr) in wanted {
            if self.dhcp_server.listeners.contains_key(&iface) {
                continue;
            }
            let socket = self.sockets.open(SocketType::Dgram);
            if !self.bind_socket(socket, Endpoint::Ip(addr), SERVER_PORT, net) {
                self.sockets.close(socket, sim);
                warn!(%addr, "DHCP 端口已被占用");
                continue;
            }
            self.dhcp_server.listeners.insert(iface, (socket, addr));
            self.sockets
                .receive(socket, poll, Resume::DhcpServer { iface }, sim);
            debug!(%iface, %addr, "DHCP server 监听");
        }
    }

    /// 关闭某个接口上的监听
    pub(crate) fn dhcp_server_drop_interface(&mut self, iface: MacAddr, sim: &mut Simulator) {
        if let Some((socket, _)) = self.dhcp_server.listeners.remove(&iface) {
            self.sockets.close(socket, sim);
        }
        self.dhcp_server.probes.retain(|_, p| p.iface != iface);
    }

    pub(crate) fn resume_dhcp_server(&mut self, iface: MacAddr, data: Option<Vec<u8>>, sim: &mut Simulator, net: &mut Network) {
        if !self.dhcp_server.enabled {
            return;
        }
        let Some(&(socket, _)) = self.dhcp_server.listeners.get(&iface) else {
            return;
        };
        self.dhcp_server.expire(sim.now());
        if let Some(bytes) = data {
            self.handle_dhcp_request(iface, &bytes, sim, net);
        }
        // 重新挂起接收
        if self.dhcp_server.listeners.get(&iface).map(|l| l.0) == Some(socket) {
            let poll = net.config().dhcp_server_poll();
            self.sockets
                .receive(socket, poll, Resume::DhcpServer { iface }, sim);
        }
        self.reconcile_listeners(sim, net);
    }

    fn handle_dhcp_request(&mut self, iface: MacAddr, bytes: &[u8], sim: &mut Simulator, net: &mut Network) {
        let msg = match DhcpMessage::parse(bytes) {
            Ok(m) => m,
            Err(e) => {
                debug!(%e, "DHCP 解码失败");
                return;
            }
        };
        if msg.op != OP_REQUEST {
            return;
        }
        self.dhcp_server.expire(sim.now());
        match msg.message_type() {
            Some(DhcpMessageType::Discover) => self.on_discover(iface, msg, sim, net),
            Some(DhcpMessageType::Request) => self.on_request(iface, msg, sim, net),
            other => trace!(?other, "忽略 DHCP 报文"),
        }
    }

    fn on_discover(&mut self, iface: MacAddr, msg: DhcpMessage, sim: &mut Simulator, net: &mut Network) {
        let client = msg.chaddr;
        let server_addr = net.iface(iface).addr;
        debug!(%client, xid = msg.xid, "收到 DISCOVER");

        if self.dhcp_server.probes.values().any(|p| p.request.chaddr == client) {
            trace!(%client, "探测进行中");
            return;
        }
        let Some((subnet, pool)) = self.dhcp_server.pool_for(server_addr) else {
            debug!(%server_addr, "没有匹配的地址池");
            return;
        };
        if let Some(addr) = self.dhcp_server.reserved_for(client).filter(|&a| subnet.contains(a)) {
            self.send_offer(iface, &msg, addr, pool, sim, net);
            return;
        }

        let own = self.local_addrs(net);
        let Some(candidate) = self
            .dhcp_server
            .next_candidate(subnet, pool, subnet.network(), client, &own)
        else {
            warn!(%subnet, "地址池已耗尽");
            return;
        };
        self.start_probe(
            Probe {
                iface,
                request: msg,
                candidate,
                attempts: 0,
            },
            sim,
            net,
        );
    }

    fn start_probe(&mut self, probe: Probe, sim: &mut Simulator, net: &mut Network) {
        let id = self.dhcp_server.next_probe;
        self.dhcp_server.next_probe += 1;
        let dst = probe.candidate;
        trace!(%dst, attempt = probe.attempts + 1, "探测候选地址");
        self.dhcp_server.probes.insert(id, probe);
        let timeout = net.config().dhcp_probe_timeout();
        self.icmp_echo(dst, timeout, EchoPurpose::Probe { probe: id }, sim, net);
    }

    pub(crate) fn on_probe_result(&mut self, probe: u64, result: EchoResult, sim: &mut Simulator, net: &mut Network) {
        let Some(mut p) = self.dhcp_server.probes.remove(&probe) else {
            return;
        };
        if !self.dhcp_server.enabled {
            return;
        }
        let client = p.request.chaddr;
        let in_use = result.is_reply() || !self.dhcp_server.is_free_for(p.candidate, client);

        if !in_use {
            p.attempts += 1;
            if p.attempts < PROBES_PER_CANDIDATE {
                self.start_probe(p, sim, net);
                return;
            }
            let server_addr = net.iface(p.iface).addr;
            if let Some((_, pool)) = self.dhcp_server.pool_for(server_addr) {
                self.send_offer(p.iface, &p.request, p.candidate, pool, sim, net);
            }
            return;
        }

        debug!(addr = %p.candidate, "候选地址已被使用，换下一个");
        let server_addr = net.iface(p.iface).addr;
        let own = self.local_addrs(net);
        let next = self
            .dhcp_server
            .pool_for(server_addr)
            .and_then(|(subnet, pool)| self.dhcp_server.next_candidate(subnet, pool, p.candidate, client, &own));
        match next {
            Some(candidate) => {
                p.candidate = candidate;
                p.attempts = 0;
                self.start_probe(p, sim, net);
            }
            None => warn!(%client, "地址池已耗尽"),
        }
    }

    fn send_offer(
        &mut self,
        iface: MacAddr,
        request: &DhcpMessage,
        addr: Ipv4Address,
        pool: DhcpPool,
        sim: &mut Simulator,
        net: &mut Network,
    ) {
        let client = request.chaddr;
        let expires = sim.now().saturating_add(net.config().dhcp_offer_timeout());
        if !self.dhcp_server.leases.contains_key(&addr) {
            self.dhcp_server
                .offers
                .insert(addr, Reservation { client, expires });
        }

        let server_addr = net.iface(iface).addr;
        let mut offer = self.dhcp_reply(DhcpMessageType::Offer, request, server_addr, pool, net);
        offer.yiaddr = addr;
        info!(%client, %addr, "📨 OFFER");
        net.record(Some(self.id), sim.now(), TraceEventKind::DhcpOffer { client, addr });
        self.broadcast_dhcp(iface, server_addr, (SERVER_PORT, CLIENT_PORT), &offer, sim, net);
    }

    fn on_request(&mut self, iface: MacAddr, msg: DhcpMessage, sim: &mut Simulator, net: &mut Network) {
        let client = msg.chaddr;
        let server_addr = net.iface(iface).addr;
        if msg.server_identifier().is_some_and(|s| s != server_addr) {
            // 客户端选择了别的服务器
            self.dhcp_server.offers.retain(|_, r| r.client != client);
            return;
        }
        let requested = msg.requested_address().unwrap_or(msg.ciaddr);

        let reserved = self
            .dhcp_server
            .offers
            .get(&requested)
            .is_some_and(|r| r.client == client && r.expires > sim.now());
        let leased = self
            .dhcp_server
            .leases
            .get(&requested)
            .is_some_and(|l| l.client == client && l.expires > sim.now());
        let pool = self.dhcp_server.pool_for(requested);

        match pool.filter(|_| reserved || leased) {
            Some((_, pool)) => {
                self.dhcp_server.offers.remove(&requested);
                let lease_time = SimTime::from_secs(net.config().dhcp_lease_secs as u64);
                let expires = sim.now().saturating_add(lease_time);
                self.dhcp_server.leases.insert(requested, Lease { client, expires });
                let mut ack = self.dhcp_reply(DhcpMessageType::Ack, &msg, server_addr, pool, net);
                ack.yiaddr = requested;
                info!(%client, addr = %requested, "✅ ACK");
                self.broadcast_dhcp(iface, server_addr, (SERVER_PORT, CLIENT_PORT), &ack, sim, net);
            }
            None => {
                let nak = DhcpMessage::reply(DhcpMessageType::Nak, &msg, server_addr);
                info!(%client, addr = %requested, "❌ NAK");
                self.broadcast_dhcp(iface, server_addr, (SERVER_PORT, CLIENT_PORT), &nak, sim, net);
            }
        }
    }

    fn dhcp_reply(
        &self,
        kind: DhcpMessageType,
        request: &DhcpMessage,
        server: Ipv4Address,
        pool: DhcpPool,
        net: &Network,
    ) -> DhcpMessage {
        let mut reply = DhcpMessage::reply(kind, request, server)
            .with(DhcpOption::SubnetMask(pool.prefix.mask()))
            .with(DhcpOption::LeaseTime(net.config().dhcp_lease_secs));
        if !pool.gateway.is_unspecified() {
            reply = reply.with(DhcpOption::Router(pool.gateway));
        }
        reply
    }
}

//! 设备
//!
//! 主机、路由器、交换机共用一个 `Device` 记录，行为由 `Capabilities` 决定。
//! 设备自己的表（FIB/ARP/路由）与协议状态只由设备自己修改；需要访问接口表或
//! 拓扑时通过 `&mut Network` 进行（设备在处理期间已从 `Network` 中取出）。

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::arp_table::ArpTable;
use super::echo::EchoEngine;
use super::fib::ForwardingTable;
use super::interface::Layer;
use super::network::Network;
use super::ping::{PingSummary, PingTask};
use super::routing::{Connected, RoutingTable};
use crate::addr::{DeviceId, Ipv4Address, MacAddr, Prefix};
use crate::proto::{DhcpClient, DhcpServer};
use crate::sim::Simulator;
use crate::socket::{Endpoint, Resume, SocketId, SocketTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// 二层转发 / 三层转发
    pub forwarding: bool,
    pub loopback: bool,
    pub dhcp_client: bool,
    pub dhcp_server: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Host,
    Router,
    Switch,
}

impl DeviceKind {
    pub fn capabilities(self) -> Capabilities {
        match self {
            DeviceKind::Host => Capabilities {
                forwarding: false,
                loopback: true,
                dhcp_client: true,
                dhcp_server: false,
            },
            DeviceKind::Router => Capabilities {
                forwarding: true,
                loopback: true,
                dhcp_client: true,
                dhcp_server: true,
            },
            DeviceKind::Switch => Capabilities {
                forwarding: true,
                loopback: false,
                dhcp_client: false,
                dhcp_server: false,
            },
        }
    }

    /// 新增接口的默认层次
    pub fn default_layer(self) -> Layer {
        match self {
            DeviceKind::Switch => Layer::Bridging,
            DeviceKind::Host | DeviceKind::Router => Layer::Routing,
        }
    }
}

pub struct Device {
    pub(crate) id: DeviceId,
    pub(crate) name: String,
    pub(crate) kind: DeviceKind,
    pub(crate) caps: Capabilities,
    pub(crate) position: (f64, f64),
    /// 物理接口（不含回环）
    pub(crate) ifaces: Vec<MacAddr>,
    pub(crate) loopback: Option<MacAddr>,
    pub(crate) fib: ForwardingTable,
    pub(crate) arp: ArpTable,
    pub(crate) routes: RoutingTable,
    pub(crate) sockets: SocketTable,
    pub(crate) dhcp_clients: BTreeMap<MacAddr, DhcpClient>,
    pub(crate) dhcp_server: DhcpServer,
    pub(crate) echo: EchoEngine,
    pub(crate) pings: BTreeMap<u64, PingTask>,
    pub(crate) ping_results: BTreeMap<u64, PingSummary>,
    pub(crate) next_ping: u64,
}

impl Device {
    pub(crate) fn new(id: DeviceId, name: impl Into<String>, kind: DeviceKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            caps: kind.capabilities(),
            position: (0.0, 0.0),
            ifaces: Vec::new(),
            loopback: None,
            fib: ForwardingTable::default(),
            arp: ArpTable::default(),
            routes: RoutingTable::new(),
            sockets: SocketTable::new(id),
            dhcp_clients: BTreeMap::new(),
            dhcp_server: DhcpServer::default(),
            echo: EchoEngine::default(),
            pings: BTreeMap::new(),
            ping_results: BTreeMap::new(),
            next_ping: 0,
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    /// 本设备所有接口（含回环）的 MAC
    pub(crate) fn all_macs(&self) -> BTreeSet<MacAddr> {
        self.ifaces.iter().copied().chain(self.loopback).collect()
    }

    pub(crate) fn owns_mac(&self, mac: MacAddr) -> bool {
        self.loopback == Some(mac) || self.ifaces.contains(&mac)
    }

    /// 至少有一个三层物理接口
    pub(crate) fn has_routing_interfaces(&self, net: &Network) -> bool {
        self.ifaces.iter().any(|&m| net.iface(m).is_routing())
    }

    /// 参与路由查找的本地地址（已配置、已启用，含回环）
    pub(crate) fn connected(&self, net: &Network) -> Vec<Connected> {
        self.ifaces
            .iter()
            .chain(self.loopback.iter())
            .map(|&m| net.iface(m))
            .filter(|i| i.enabled && i.is_configured())
            .map(|i| Connected {
                addr: i.addr,
                prefix: i.prefix,
                loopback: i.loopback,
            })
            .collect()
    }

    /// 本设备已配置的全部地址（含 127.0.0.1）
    pub(crate) fn local_addrs(&self, net: &Network) -> Vec<Ipv4Address> {
        self.ifaces
            .iter()
            .chain(self.loopback.iter())
            .map(|&m| net.iface(m))
            .filter(|i| i.is_configured())
            .map(|i| i.addr)
            .collect()
    }

    /// 地址为 `addr` 的物理三层接口
    pub(crate) fn iface_with_addr(&self, net: &Network, addr: Ipv4Address) -> Option<MacAddr> {
        if addr.is_unspecified() {
            return None;
        }
        self.ifaces
            .iter()
            .copied()
            .find(|&m| net.iface(m).is_configured() && net.iface(m).addr == addr)
    }

    /// 绑定套接字。只能绑定本设备自己的链路地址、通配符或已分配的 IPv4 地址。
    pub(crate) fn bind_socket(&mut self, socket: SocketId, endpoint: Endpoint, port: u16, net: &Network) -> bool {
        let owned = match endpoint {
            Endpoint::AnyLink => true,
            Endpoint::Link(mac) => self.owns_mac(mac),
            Endpoint::Ip(addr) => !addr.is_unspecified() && self.local_addrs(net).contains(&addr),
        };
        if !owned {
            debug!(device = %self.id, ?endpoint, "❌ 地址不属于本设备，拒绝绑定");
            return false;
        }
        self.sockets.bind(socket, endpoint, port)
    }

    /// 修改本设备接口的地址；旧地址作为出口的路由随之删除
    pub(crate) fn set_address(&mut self, mac: MacAddr, addr: Ipv4Address, prefix: Prefix, net: &mut Network) {
        let old = net.set_iface_address(mac, addr, prefix);
        if old != addr && !old.is_unspecified() {
            let removed = self.routes.remove_local(old);
            trace!(%old, removed, "删除旧出口地址的路由");
        }
    }

    /// 套接字等待结束，恢复对应的协议任务
    pub(crate) fn resume(&mut self, resume: Resume, data: Option<Vec<u8>>, sim: &mut Simulator, net: &mut Network) {
        trace!(device = %self.id, ?resume, has_data = data.is_some(), "resume");
        match resume {
            Resume::DhcpClient { iface, session } => self.resume_dhcp_client(iface, session, data, sim, net),
            Resume::DhcpServer { iface } => self.resume_dhcp_server(iface, data, sim, net),
            Resume::Echo { echo } => self.resume_echo(echo, data, sim, net),
        }
    }

    /// 接口即将被删除：撤销所有引用它的本地状态
    pub(crate) fn detach_interface(&mut self, mac: MacAddr, sim: &mut Simulator, net: &mut Network) {
        let addr = net.iface(mac).addr;
        self.disable_dhcp_client(mac, sim);
        self.dhcp_clients.remove(&mac);
        self.dhcp_server_drop_interface(mac, sim);

        let closed = self.sockets.close_bound(
            |ep| match ep {
                Endpoint::Link(m) => m == mac,
                Endpoint::Ip(a) => !addr.is_unspecified() && a == addr,
                Endpoint::AnyLink => false,
            },
            sim,
        );
        let routes = if addr.is_unspecified() { 0 } else { self.routes.remove_local(addr) };
        let fib = self.fib.remove_egress(mac);
        let arp = self.arp.invalidate_local(mac);
        self.ifaces.retain(|&m| m != mac);
        if self.loopback == Some(mac) {
            self.loopback = None;
        }
        debug!(device = %self.id, iface = %mac, closed, routes, fib, arp, "接口已摘除");
    }

    /// 设备即将被删除：停止所有任务
    pub(crate) fn shutdown(&mut self, sim: &mut Simulator) {
        let ids: Vec<u64> = self.pings.keys().copied().collect();
        for id in ids {
            self.finish_ping(id);
        }
        self.dhcp_server.disable(&mut self.sockets, sim);
        self.echo.clear();
        self.sockets.close_all(sim);
    }
}

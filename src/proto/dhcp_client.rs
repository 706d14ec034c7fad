//! DHCP client
//!
//! 每个接口最多一个会话。会话使用绑定在接口链路地址上的 RAW 套接字
//! （接口此时还没有 IPv4 地址），循环执行：
//! - 没有有效 OFFER：发 DISCOVER（新 xid），最多等待一个轮询间隔
//! - 持有 OFFER：发 REQUEST，最多等待一个轮询间隔
//! - ACK：配置接口地址与默认路由，然后关闭自己
//! - NAK：丢弃 OFFER，重新 DISCOVER
//!
//! 关闭是幂等的。关闭时若会话正挂在 `receive` 上，要等这次接收以“无数据”返回
//! （draining）之后才允许新会话开始。

use tracing::{debug, info, trace, warn};

use crate::addr::{Ipv4Address, MacAddr, Prefix, Subnet};
use crate::net::{Device, Network};
use crate::sim::{SimTime, Simulator};
use crate::socket::{Endpoint, Resume, SocketId, SocketType};
use crate::trace::TraceEventKind;
use crate::wire::dhcp::{code, CLIENT_PORT, OP_REPLY, SERVER_PORT};
use crate::wire::{DhcpMessage, DhcpMessageType, DhcpOption, IpProtocol, Ipv4Packet, UdpDatagram};

#[derive(Debug, Default)]
pub(crate) struct DhcpClient {
    enabled: bool,
    session: Option<Session>,
    next_session: u64,
    /// 已取消、但接收尚未返回的会话
    draining: Option<u64>,
    restart_pending: bool,
}

#[derive(Debug)]
struct Session {
    id: u64,
    socket: SocketId,
    xid: u32,
    offer: Option<HeldOffer>,
    waiting: Waiting,
    deadline: SimTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Waiting {
    Offer,
    Ack,
}

#[derive(Debug, Clone, Copy)]
struct HeldOffer {
    addr: Ipv4Address,
    server: Ipv4Address,
    mask: Option<Ipv4Address>,
    router: Option<Ipv4Address>,
    expires: SimTime,
}

impl Device {
    pub(crate) fn dhcp_client_enabled(&self, iface: MacAddr) -> bool {
        self.dhcp_clients.get(&iface).is_some_and(|c| c.enabled)
    }

    /// 在接口上启用 DHCP client。设备不具备该能力或接口不是三层接口时返回 false。
    pub(crate) fn enable_dhcp_client(&mut self, iface: MacAddr, sim: &mut Simulator, net: &mut Network) -> bool {
        if !self.caps.dhcp_client {
            warn!(device = %self.id, "设备不支持 DHCP client");
            return false;
        }
        let i = net.iface(iface);
        if !i.is_routing() || i.loopback {
            warn!(%iface, "DHCP client 只能运行在三层物理接口上");
            return false;
        }

        let mut client = self.dhcp_clients.remove(&iface).unwrap_or_default();
        if !client.enabled {
            client.enabled = true;
            if client.draining.is_some() {
                client.restart_pending = true;
                debug!(%iface, "等待旧会话结束后再启动");
            } else {
                self.start_dhcp_session(iface, &mut client, sim, net);
            }
        }
        self.dhcp_clients.insert(iface, client);
        true
    }

    /// 关闭 DHCP client（幂等）
    pub(crate) fn disable_dhcp_client(&mut self, iface: MacAddr, sim: &mut Simulator) {
        let Some(client) = self.dhcp_clients.get_mut(&iface) else {
            return;
        };
        client.enabled = false;
        client.restart_pending = false;
        if let Some(session) = client.session.take() {
            if self.sockets.close(session.socket, sim) {
                client.draining = Some(session.id);
            }
            debug!(%iface, session = session.id, "DHCP client 已关闭");
        }
    }

    fn start_dhcp_session(&mut self, iface: MacAddr, client: &mut DhcpClient, sim: &mut Simulator, net: &mut Network) {
        let socket = self.sockets.open(SocketType::Raw);
        if !self.bind_socket(socket, Endpoint::Link(iface), 0, net) {
            self.sockets.close(socket, sim);
            warn!(%iface, "接口链路地址已被其他 RAW 套接字占用");
            client.enabled = false;
            return;
        }
        let id = client.next_session;
        client.next_session += 1;
        client.session = Some(Session {
            id,
            socket,
            xid: 0,
            offer: None,
            waiting: Waiting::Offer,
            deadline: sim.now(),
        });
        info!(%iface, session = id, "🛰️ DHCP client 启动");
        self.dhcp_step(iface, client, sim, net);
    }

    /// 根据是否持有有效 OFFER 发送 DISCOVER 或 REQUEST，然后等待
    fn dhcp_step(&mut self, iface: MacAddr, client: &mut DhcpClient, sim: &mut Simulator, net: &mut Network) {
        let Some(session) = client.session.as_mut() else {
            return;
        };
        let now = sim.now();
        if session.offer.is_some_and(|o| o.expires <= now) {
            session.offer = None;
        }

        let msg = match session.offer {
            None => {
                session.xid = net.next_u32();
                session.waiting = Waiting::Offer;
                debug!(%iface, xid = session.xid, "DISCOVER");
                DhcpMessage::client(DhcpMessageType::Discover, session.xid, iface).with(
                    DhcpOption::ParameterRequestList(vec![code::SUBNET_MASK, code::ROUTER, code::LEASE_TIME]),
                )
            }
            Some(offer) => {
                session.waiting = Waiting::Ack;
                debug!(%iface, xid = session.xid, addr = %offer.addr, "REQUEST");
                DhcpMessage::client(DhcpMessageType::Request, session.xid, iface)
                    .with(DhcpOption::RequestedAddress(offer.addr))
                    .with(DhcpOption::ServerIdentifier(offer.server))
            }
        };
        let poll = net.config().dhcp_poll_interval();
        session.deadline = now.saturating_add(poll);
        let (socket, id) = (session.socket, session.id);

        self.broadcast_dhcp(iface, Ipv4Address::UNSPECIFIED, (CLIENT_PORT, SERVER_PORT), &msg, sim, net);
        self.sockets
            .receive(socket, poll, Resume::DhcpClient { iface, session: id }, sim);
    }

    pub(crate) fn resume_dhcp_client(
        &mut self,
        iface: MacAddr,
        session: u64,
        data: Option<Vec<u8>>,
        sim: &mut Simulator,
        net: &mut Network,
    ) {
        let Some(mut client) = self.dhcp_clients.remove(&iface) else {
            return;
        };
        self.dhcp_client_resumed(iface, &mut client, session, data, sim, net);
        self.dhcp_clients.insert(iface, client);
    }

    fn dhcp_client_resumed(
        &mut self,
        iface: MacAddr,
        client: &mut DhcpClient,
        session: u64,
        data: Option<Vec<u8>>,
        sim: &mut Simulator,
        net: &mut Network,
    ) {
        if client.draining == Some(session) {
            client.draining = None;
            trace!(%iface, session, "旧会话结束");
            if client.restart_pending && client.enabled {
                client.restart_pending = false;
                self.start_dhcp_session(iface, client, sim, net);
            }
            return;
        }
        let Some(s) = client.session.as_ref().filter(|s| s.id == session) else {
            return;
        };
        let (socket, xid, waiting, deadline) = (s.socket, s.xid, s.waiting, s.deadline);

        let Some(bytes) = data else {
            trace!(%iface, ?waiting, "等待超时，重试");
            self.dhcp_step(iface, client, sim, net);
            return;
        };

        match Self::parse_dhcp_reply(&bytes, xid, iface) {
            Some(msg) => match (msg.message_type(), waiting) {
                (Some(DhcpMessageType::Offer), Waiting::Offer) => {
                    let offer = HeldOffer {
                        addr: msg.yiaddr,
                        server: msg.server_identifier().unwrap_or(msg.siaddr),
                        mask: msg.subnet_mask(),
                        router: msg.router(),
                        expires: sim.now().saturating_add(net.config().dhcp_offer_timeout()),
                    };
                    info!(%iface, addr = %offer.addr, server = %offer.server, "收到 OFFER");
                    if let Some(s) = client.session.as_mut() {
                        s.offer = Some(offer);
                    }
                    self.dhcp_step(iface, client, sim, net);
                    return;
                }
                (Some(DhcpMessageType::Ack), Waiting::Ack) => {
                    self.dhcp_bind(iface, client, &msg, sim, net);
                    return;
                }
                (Some(DhcpMessageType::Nak), Waiting::Ack) => {
                    info!(%iface, "收到 NAK，重新发现");
                    if let Some(s) = client.session.as_mut() {
                        s.offer = None;
                    }
                    self.dhcp_step(iface, client, sim, net);
                    return;
                }
                (kind, _) => trace!(?kind, ?waiting, "忽略 DHCP 报文"),
            },
            None => trace!("非本会话的数据"),
        }

        // 继续等到本轮截止
        let remaining = deadline.saturating_sub(sim.now());
        if remaining == SimTime::ZERO {
            self.dhcp_step(iface, client, sim, net);
        } else {
            self.sockets
                .receive(socket, remaining, Resume::DhcpClient { iface, session }, sim);
        }
    }

    /// RAW 套接字收到的是完整 IPv4 包
    fn parse_dhcp_reply(bytes: &[u8], xid: u32, iface: MacAddr) -> Option<DhcpMessage> {
        let ip = Ipv4Packet::parse(bytes).ok()?;
        if ip.protocol != IpProtocol::UDP {
            return None;
        }
        let udp = UdpDatagram::parse(&ip.payload, ip.src, ip.dst).ok()?;
        if udp.dst_port != CLIENT_PORT {
            return None;
        }
        let msg = DhcpMessage::parse(&udp.payload).ok()?;
        (msg.op == OP_REPLY && msg.xid == xid && msg.chaddr == iface).then_some(msg)
    }

    fn dhcp_bind(&mut self, iface: MacAddr, client: &mut DhcpClient, ack: &DhcpMessage, sim: &mut Simulator, net: &mut Network) {
        let held = client.session.as_ref().and_then(|s| s.offer);
        let mask = ack.subnet_mask().or(held.and_then(|o| o.mask));
        let prefix = mask.map_or(Prefix::HOST, Prefix::from_mask);
        let gateway = ack.router().or(held.and_then(|o| o.router));
        let addr = ack.yiaddr;

        self.set_address(iface, addr, prefix, net);
        if let Some(gw) = gateway {
            let distance = net.config().dhcp_route_distance;
            self.routes.set(Subnet::default_route(), distance, gw, addr);
        }
        info!(%iface, %addr, %prefix, ?gateway, "✅ DHCP 绑定完成");
        net.record(
            Some(self.id),
            sim.now(),
            TraceEventKind::DhcpBound {
                iface,
                addr,
                prefix: prefix.len(),
                gateway,
            },
        );

        client.enabled = false;
        client.restart_pending = false;
        if let Some(session) = client.session.take() {
            self.sockets.close(session.socket, sim);
        }
    }
}

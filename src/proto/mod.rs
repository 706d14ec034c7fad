//! 协议状态机
//!
//! DHCP client / server 的简化实现。两者都只在套接字 `receive` 处让出执行权。

mod dhcp_client;
mod dhcp_server;

pub(crate) use dhcp_client::DhcpClient;
pub(crate) use dhcp_server::DhcpServer;
pub use dhcp_server::{BindingState, DhcpBinding, DhcpPool};

use tracing::trace;

use crate::addr::{Ipv4Address, MacAddr};
use crate::net::{Device, Network};
use crate::sim::Simulator;
use crate::wire::{DhcpMessage, EtherType, IpProtocol, Ipv4Packet, UdpDatagram};

impl Device {
    /// DHCP 报文总是以链路层广播、255.255.255.255 发出
    pub(crate) fn broadcast_dhcp(
        &mut self,
        iface: MacAddr,
        src: Ipv4Address,
        ports: (u16, u16),
        msg: &DhcpMessage,
        sim: &mut Simulator,
        net: &mut Network,
    ) -> bool {
        let dst = Ipv4Address::BROADCAST;
        let udp = UdpDatagram::new(ports.0, ports.1, msg.encode());
        let ip = Ipv4Packet::new(src, dst, IpProtocol::UDP, net.config().default_ttl, udp.encode(src, dst));
        trace!(%iface, xid = msg.xid, kind = ?msg.message_type(), "发送 DHCP 报文");
        self.send_frame(iface, MacAddr::BROADCAST, EtherType::IPV4, ip.encode(), sim, net)
    }
}

//! DHCP 网段：一台运行 DHCP server 的路由器 + 交换机 + 若干未配置地址的主机

use crate::addr::{DeviceId, Ipv4Address, MacAddr, Prefix, Subnet};
use crate::net::{Layer, NetWorld};
use crate::proto::DhcpPool;

#[derive(Debug, Clone)]
pub struct DhcpLanOpts {
    pub clients: usize,
    pub subnet: Subnet,
    /// 路由器接口地址，同时作为下发的网关
    pub router_addr: Ipv4Address,
}

impl Default for DhcpLanOpts {
    fn default() -> Self {
        Self {
            clients: 2,
            subnet: Subnet::new(Ipv4Address::new(10, 0, 0, 0), Prefix::new(24)),
            router_addr: Ipv4Address::new(10, 0, 0, 1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DhcpLanTopology {
    pub router: DeviceId,
    pub router_iface: MacAddr,
    pub switch: DeviceId,
    pub clients: Vec<DeviceId>,
    pub client_ifaces: Vec<MacAddr>,
}

/// 构建 DHCP 网段。只负责搭拓扑和地址池；server/client 的启用由调用方完成。
pub fn build_dhcp_lan(world: &mut NetWorld, opts: &DhcpLanOpts) -> DhcpLanTopology {
    let net = &mut world.net;
    let router = net.add_router("r0");
    let switch = net.add_switch("s0");

    let router_iface = net.add_interface(router, Layer::Routing);
    let port = net.add_interface(switch, Layer::Bridging);
    net.connect(router_iface, port);
    net.configure_interface(router_iface, opts.router_addr, opts.subnet.prefix());
    net.add_dhcp_pool(
        router,
        opts.subnet,
        DhcpPool {
            prefix: opts.subnet.prefix(),
            gateway: opts.router_addr,
        },
    );

    let mut clients = Vec::with_capacity(opts.clients);
    let mut client_ifaces = Vec::with_capacity(opts.clients);
    for i in 0..opts.clients {
        let h = net.add_host(format!("h{i}"));
        let hi = net.add_interface(h, Layer::Routing);
        let port = net.add_interface(switch, Layer::Bridging);
        net.connect(hi, port);
        clients.push(h);
        client_ifaces.push(hi);
    }

    DhcpLanTopology {
        router,
        router_iface,
        switch,
        clients,
        client_ifaces,
    }
}

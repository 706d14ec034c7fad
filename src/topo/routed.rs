//! 两个网段经一台路由器互联

use crate::addr::{DeviceId, Ipv4Address, MacAddr, Prefix, Subnet};
use crate::net::{Layer, NetWorld, Network};

#[derive(Debug, Clone)]
pub struct RoutedTopology {
    pub h0: DeviceId,
    pub h1: DeviceId,
    pub r0: DeviceId,
    pub s0: DeviceId,
    pub s1: DeviceId,
    pub h0_iface: MacAddr,
    pub h1_iface: MacAddr,
    pub h0_addr: Ipv4Address,
    pub h1_addr: Ipv4Address,
    /// r0 在两个网段上的地址
    pub r0_addrs: (Ipv4Address, Ipv4Address),
}

/// 构建路由拓扑
///
/// 拓扑结构：h0 <-> s0 <-> r0 <-> s1 <-> h1
/// - 10.0.1.0/24：h0 = .10，r0 = .1
/// - 10.0.2.0/24：h1 = .10，r0 = .1
pub fn build_routed(world: &mut NetWorld) -> RoutedTopology {
    let net = &mut world.net;
    let p24 = Prefix::new(24);

    let h0 = net.add_host("h0");
    let h1 = net.add_host("h1");
    let r0 = net.add_router("r0");
    let s0 = net.add_switch("s0");
    let s1 = net.add_switch("s1");

    let lan = |net: &mut Network, host: DeviceId, switch: DeviceId, router: DeviceId| {
        let hi = net.add_interface(host, Layer::Routing);
        let ri = net.add_interface(router, Layer::Routing);
        let sp_h = net.add_interface(switch, Layer::Bridging);
        let sp_r = net.add_interface(switch, Layer::Bridging);
        net.connect(hi, sp_h);
        net.connect(ri, sp_r);
        (hi, ri)
    };
    let (h0_iface, r0_a) = lan(net, h0, s0, r0);
    let (h1_iface, r0_b) = lan(net, h1, s1, r0);

    let h0_addr = Ipv4Address::new(10, 0, 1, 10);
    let h1_addr = Ipv4Address::new(10, 0, 2, 10);
    let gw0 = Ipv4Address::new(10, 0, 1, 1);
    let gw1 = Ipv4Address::new(10, 0, 2, 1);

    net.configure_interface(h0_iface, h0_addr, p24);
    net.configure_interface(h1_iface, h1_addr, p24);
    net.configure_interface(r0_a, gw0, p24);
    net.configure_interface(r0_b, gw1, p24);
    net.set_route(h0, Subnet::default_route(), gw0, h0_addr, None);
    net.set_route(h1, Subnet::default_route(), gw1, h1_addr, None);

    RoutedTopology {
        h0,
        h1,
        r0,
        s0,
        s1,
        h0_iface,
        h1_iface,
        h0_addr,
        h1_addr,
        r0_addrs: (gw0, gw1),
    }
}

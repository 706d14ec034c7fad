//! 单个二层网段：一台交换机 + 若干主机

use crate::addr::{DeviceId, Ipv4Address, MacAddr, Prefix, Subnet};
use crate::net::{Layer, NetWorld};

/// LAN 拓扑配置选项
#[derive(Debug, Clone)]
pub struct LanOpts {
    pub hosts: usize,
    pub subnet: Subnet,
    /// 主机的默认网关（不要求真实存在）
    pub gateway: Option<Ipv4Address>,
}

impl Default for LanOpts {
    fn default() -> Self {
        Self {
            hosts: 2,
            subnet: Subnet::new(Ipv4Address::new(10, 0, 0, 0), Prefix::new(24)),
            gateway: Some(Ipv4Address::new(10, 0, 0, 1)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LanTopology {
    pub switch: DeviceId,
    pub hosts: Vec<DeviceId>,
    pub host_ifaces: Vec<MacAddr>,
    pub host_addrs: Vec<Ipv4Address>,
}

/// 构建 LAN 拓扑
///
/// 拓扑结构：h0, h1, ... <-> s0
/// 第 i 台主机的地址为网段内第 10*(i+1) 个地址（10.0.0.10、10.0.0.20 ...），
/// 主机数超出网段容量时 panic
pub fn build_lan(world: &mut NetWorld, opts: &LanOpts) -> LanTopology {
    let base = opts.subnet.network().to_u32();
    let last = base as u64 + 10 * opts.hosts as u64;
    assert!(
        last < opts.subnet.broadcast().to_u32() as u64,
        "{} hosts do not fit in {}",
        opts.hosts,
        opts.subnet
    );
    let net = &mut world.net;
    let switch = net.add_switch("s0");

    let mut topo = LanTopology {
        switch,
        hosts: Vec::with_capacity(opts.hosts),
        host_ifaces: Vec::with_capacity(opts.hosts),
        host_addrs: Vec::with_capacity(opts.hosts),
    };
    for i in 0..opts.hosts {
        let h = net.add_host(format!("h{i}"));
        let hi = net.add_interface(h, Layer::Routing);
        let port = net.add_interface(switch, Layer::Bridging);
        net.connect(hi, port);

        let addr = Ipv4Address::from_u32(base + 10 * (i as u32 + 1));
        net.configure_interface(hi, addr, opts.subnet.prefix());
        if let Some(gw) = opts.gateway {
            net.set_route(h, Subnet::default_route(), gw, addr, None);
        }
        topo.hosts.push(h);
        topo.host_ifaces.push(hi);
        topo.host_addrs.push(addr);
    }
    topo
}

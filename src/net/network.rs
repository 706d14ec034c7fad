//! 网络根对象
//!
//! `Network` 持有配置、随机数、设备表、接口表、拓扑与统计信息，并对外提供
//! 拓扑编辑、表查询、DHCP、ping 等操作。设备之间从不直接访问彼此的表：
//! 处理某个设备时先把它从 `devices` 中取出，再把 `&mut Network` 交给它。

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::{debug, info, trace, warn};

use super::arp_table::ArpEntryInfo;
use super::deliver_frame::DeliverFrame;
use super::device::{Device, DeviceKind};
use super::echo::{EchoCallback, EchoPurpose};
use super::fib::FibEntry;
use super::interface::{Interface, InterfaceInfo, Layer};
use super::ip::SendOutcome;
use super::ping::{PingObserver, PingSummary};
use super::routing::RouteEntry;
use super::stats::Stats;
use super::topology::Topology;
use crate::addr::{DeviceId, Ipv4Address, MacAddr, Prefix, Subnet};
use crate::proto::{DhcpBinding, DhcpPool};
use crate::sim::{SimConfig, SimTime, Simulator, SplitMix64};
use crate::socket::{Endpoint, Resume, SocketId, SocketType};
use crate::trace::{
    DropReason, TraceDeviceInfo, TraceEvent, TraceEventKind, TraceLinkInfo, TraceLogger,
};
use crate::wire::{EthernetFrame, Ipv4Packet};

/// 网络拓扑
pub struct Network {
    cfg: SimConfig,
    rng: SplitMix64,
    devices: BTreeMap<DeviceId, Option<Device>>,
    ifaces: BTreeMap<MacAddr, Interface>,
    topo: Topology,
    pub stats: Stats,
    pub trace: Option<TraceLogger>,
}

impl Default for Network {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl Network {
    pub fn new(cfg: SimConfig) -> Self {
        Self {
            rng: SplitMix64::new(cfg.seed),
            cfg,
            devices: BTreeMap::new(),
            ifaces: BTreeMap::new(),
            topo: Topology::default(),
            stats: Stats::default(),
            trace: None,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.cfg
    }

    pub(crate) fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    // ---------------------------------------------------------------
    // 设备
    // ---------------------------------------------------------------

    /// 添加设备；具备回环能力的设备自动获得 127.0.0.1/8 回环接口
    pub fn add_device(&mut self, kind: DeviceKind, name: impl Into<String>) -> DeviceId {
        let id = loop {
            let id = DeviceId::new(self.rng.in_range(DeviceId::MIN as u64, DeviceId::MAX as u64));
            if !self.devices.contains_key(&id) {
                break id;
            }
        };
        let mut dev = Device::new(id, name, kind);
        if dev.caps.loopback {
            let mac = self.new_mac();
            self.ifaces.insert(mac, Interface::loopback(mac, id));
            self.topo.register(mac, id);
            dev.loopback = Some(mac);
        }
        info!(device = %id, name = dev.name(), ?kind, "➕ 添加设备");
        self.devices.insert(id, Some(dev));
        id
    }

    /// 添加主机
    pub fn add_host(&mut self, name: impl Into<String>) -> DeviceId {
        self.add_device(DeviceKind::Host, name)
    }

    /// 添加路由器
    pub fn add_router(&mut self, name: impl Into<String>) -> DeviceId {
        self.add_device(DeviceKind::Router, name)
    }

    /// 添加交换机
    pub fn add_switch(&mut self, name: impl Into<String>) -> DeviceId {
        self.add_device(DeviceKind::Switch, name)
    }

    /// 删除设备：先摘除所有接口（断线、清表、关套接字），再停止设备上的任务
    pub fn delete_device(&mut self, id: DeviceId, sim: &mut Simulator) {
        assert!(self.devices.contains_key(&id), "unknown device {id}");
        let macs: Vec<MacAddr> = self.topo.members(id).collect();
        for mac in macs {
            self.remove_interface(mac, sim);
        }
        if let Some(Some(mut dev)) = self.devices.remove(&id) {
            dev.shutdown(sim);
        }
        info!(device = %id, "➖ 删除设备");
    }

    pub fn devices(&self) -> Vec<DeviceId> {
        self.devices.keys().copied().collect()
    }

    pub fn has_device(&self, id: DeviceId) -> bool {
        self.devices.contains_key(&id)
    }

    pub fn device_name(&self, id: DeviceId) -> &str {
        self.device(id).name()
    }

    pub fn device_kind(&self, id: DeviceId) -> DeviceKind {
        self.device(id).kind()
    }

    /// 仅用于展示的坐标
    pub fn set_position(&mut self, id: DeviceId, x: f64, y: f64) {
        self.device_mut(id).position = (x, y);
    }

    pub fn position(&self, id: DeviceId) -> (f64, f64) {
        self.device(id).position
    }

    // ---------------------------------------------------------------
    // 接口
    // ---------------------------------------------------------------

    /// 为设备添加一个物理接口
    pub fn add_interface(&mut self, device: DeviceId, layer: Layer) -> MacAddr {
        let mac = self.new_mac();
        self.device_mut(device).ifaces.push(mac);
        self.ifaces.insert(mac, Interface::new(mac, device, layer));
        self.topo.register(mac, device);
        debug!(%device, %mac, ?layer, "添加接口");
        mac
    }

    /// 按设备类型的默认层次添加接口
    pub fn add_default_interface(&mut self, device: DeviceId) -> MacAddr {
        let layer = self.device(device).kind().default_layer();
        self.add_interface(device, layer)
    }

    /// 删除物理接口。回环接口只能随设备一起删除。
    pub fn delete_interface(&mut self, mac: MacAddr, sim: &mut Simulator) {
        assert!(!self.iface(mac).loopback, "loopback interface {mac} cannot be deleted");
        self.remove_interface(mac, sim);
    }

    fn remove_interface(&mut self, mac: MacAddr, sim: &mut Simulator) {
        let device = self.iface(mac).device;
        self.disconnect(mac);
        if self.devices.get(&device).is_some_and(Option::is_some) {
            self.with_device(device, |dev, net| dev.detach_interface(mac, sim, net));
        }
        for slot in self.devices.values_mut() {
            if let Some(dev) = slot.as_mut() {
                dev.fib.remove_destination(mac);
                dev.arp.remove_remote(mac);
                dev.dhcp_server.forget_client(mac);
            }
        }
        self.topo.unregister(mac);
        self.ifaces.remove(&mac);
        debug!(%mac, "删除接口");
    }

    pub fn iface(&self, mac: MacAddr) -> &Interface {
        self.ifaces
            .get(&mac)
            .unwrap_or_else(|| panic!("unknown interface {mac}"))
    }

    fn iface_mut(&mut self, mac: MacAddr) -> &mut Interface {
        self.ifaces
            .get_mut(&mac)
            .unwrap_or_else(|| panic!("unknown interface {mac}"))
    }

    pub fn has_interface(&self, mac: MacAddr) -> bool {
        self.ifaces.contains_key(&mac)
    }

    /// 配置三层接口地址；改址时删除以旧地址为出口的路由
    pub fn configure_interface(&mut self, mac: MacAddr, addr: Ipv4Address, prefix: Prefix) {
        let (device, old) = {
            let i = self.iface(mac);
            assert!(i.is_routing() && !i.loopback, "interface {mac} is not a routing interface");
            (i.device, i.addr)
        };
        self.with_device(device, |dev, net| dev.set_address(mac, addr, prefix, net));
        if old != addr {
            debug!(%mac, %old, new = %addr, "接口改址");
        }
    }

    /// 由设备自己修改接口地址（DHCP client 也走这里）
    pub(crate) fn set_iface_address(&mut self, mac: MacAddr, addr: Ipv4Address, prefix: Prefix) -> Ipv4Address {
        let i = self.iface_mut(mac);
        let old = i.addr;
        i.addr = addr;
        i.prefix = prefix;
        old
    }

    /// 启用/禁用接口；禁用时两端失效所有引用该链路的表项
    pub fn set_interface_enabled(&mut self, mac: MacAddr, enabled: bool) {
        self.iface_mut(mac).enabled = enabled;
        if !enabled {
            let peer = self.topo.neighbor(mac);
            self.invalidate_link(mac);
            if let Some(peer) = peer {
                self.invalidate_link(peer);
            }
        }
        debug!(%mac, enabled, "接口状态变更");
    }

    pub fn set_vlan(&mut self, mac: MacAddr, vlan: u16) {
        self.iface_mut(mac).vlan = vlan;
    }

    /// 接口启用且（回环或对端存在且启用）
    pub fn is_active(&self, mac: MacAddr) -> bool {
        let Some(i) = self.ifaces.get(&mac) else {
            return false;
        };
        if !i.enabled {
            return false;
        }
        if i.loopback {
            return true;
        }
        self.topo
            .neighbor(mac)
            .and_then(|n| self.ifaces.get(&n))
            .is_some_and(|n| n.enabled)
    }

    pub fn interfaces(&self, device: DeviceId) -> Vec<InterfaceInfo> {
        let dev = self.device(device);
        dev.ifaces
            .iter()
            .chain(dev.loopback.iter())
            .map(|&m| self.interface_info(m))
            .collect()
    }

    pub fn bridging_interfaces(&self, device: DeviceId) -> Vec<InterfaceInfo> {
        self.interfaces(device)
            .into_iter()
            .filter(|i| i.layer == Layer::Bridging)
            .collect()
    }

    pub fn routing_interfaces(&self, device: DeviceId) -> Vec<InterfaceInfo> {
        self.interfaces(device)
            .into_iter()
            .filter(|i| i.layer == Layer::Routing)
            .collect()
    }

    pub fn interface_info(&self, mac: MacAddr) -> InterfaceInfo {
        let i = self.iface(mac);
        let routed = i.is_routing();
        InterfaceInfo {
            mac,
            layer: i.layer,
            enabled: i.enabled,
            active: self.is_active(mac),
            vlan: i.vlan,
            loopback: i.loopback,
            connected_to: self.topo.neighbor(mac),
            addr: routed.then_some(i.addr),
            prefix: routed.then_some(i.prefix),
        }
    }

    // ---------------------------------------------------------------
    // 连线
    // ---------------------------------------------------------------

    /// 连接两个接口（双向）。回环接口不能连线。
    pub fn connect(&mut self, a: MacAddr, b: MacAddr) -> bool {
        if self.iface(a).loopback || self.iface(b).loopback {
            return false;
        }
        let ok = self.topo.connect(a, b);
        if ok {
            info!(%a, %b, "🔗 连接");
        }
        ok
    }

    /// 断开接口上的连线；两端引用该链路的表项在返回前失效
    pub fn disconnect(&mut self, mac: MacAddr) -> bool {
        let Some(peer) = self.topo.disconnect(mac) else {
            return false;
        };
        self.invalidate_link(mac);
        self.invalidate_link(peer);
        info!(a = %mac, b = %peer, "✂️ 断开");
        true
    }

    pub fn neighbor(&self, mac: MacAddr) -> Option<MacAddr> {
        self.topo.neighbor(mac)
    }

    fn invalidate_link(&mut self, mac: MacAddr) {
        let Some(device) = self.ifaces.get(&mac).map(|i| i.device) else {
            return;
        };
        if let Some(Some(dev)) = self.devices.get_mut(&device) {
            let fib = dev.fib.remove_egress(mac);
            let arp = dev.arp.invalidate_local(mac);
            trace!(%mac, fib, arp, "链路表项失效");
        }
    }

    /// 广播域：从 `mac` 出发，经由活动连线与同设备同 VLAN 的二层接口可达的接口集合
    pub fn broadcast_domain(&self, mac: MacAddr) -> BTreeSet<MacAddr> {
        let mut seen = BTreeSet::new();
        let mut q = VecDeque::from([mac]);
        while let Some(m) = q.pop_front() {
            if !seen.insert(m) {
                continue;
            }
            let i = self.iface(m);
            if self.is_active(m) {
                if let Some(n) = self.topo.neighbor(m) {
                    q.push_back(n);
                }
            }
            if i.is_bridging() && i.enabled {
                for other in self.topo.members(i.device) {
                    let o = self.iface(other);
                    if o.is_bridging() && o.enabled && o.vlan == i.vlan {
                        q.push_back(other);
                    }
                }
            }
        }
        seen
    }

    // ---------------------------------------------------------------
    // 表
    // ---------------------------------------------------------------

    /// 添加静态路由；`local` 为出口接口地址。距离缺省为 `static_route_distance`。
    pub fn set_route(
        &mut self,
        device: DeviceId,
        destination: Subnet,
        next_hop: Ipv4Address,
        local: Ipv4Address,
        distance: Option<u8>,
    ) -> bool {
        let distance = distance.unwrap_or(self.cfg.static_route_distance);
        self.device_mut(device)
            .routes
            .set(destination, distance, next_hop, local)
    }

    pub fn delete_route(
        &mut self,
        device: DeviceId,
        destination: Subnet,
        next_hop: Ipv4Address,
        local: Ipv4Address,
        distance: Option<u8>,
    ) -> bool {
        let distance = distance.unwrap_or(self.cfg.static_route_distance);
        self.device_mut(device)
            .routes
            .delete(destination, distance, next_hop, local)
    }

    pub fn routes(&self, device: DeviceId) -> Vec<RouteEntry> {
        self.device(device).routes.entries()
    }

    pub fn arp_entries(&self, device: DeviceId) -> Vec<ArpEntryInfo> {
        self.device(device).arp.entries()
    }

    pub fn fib_entries(&self, device: DeviceId) -> Vec<FibEntry> {
        self.device(device).fib.entries()
    }

    // ---------------------------------------------------------------
    // DHCP
    // ---------------------------------------------------------------

    pub fn enable_dhcp_client(&mut self, mac: MacAddr, sim: &mut Simulator) -> bool {
        let device = self.iface(mac).device;
        self.with_device(device, |dev, net| dev.enable_dhcp_client(mac, sim, net))
    }

    pub fn disable_dhcp_client(&mut self, mac: MacAddr, sim: &mut Simulator) {
        let device = self.iface(mac).device;
        self.device_mut(device).disable_dhcp_client(mac, sim);
    }

    pub fn dhcp_client_enabled(&self, mac: MacAddr) -> bool {
        self.device(self.iface(mac).device).dhcp_client_enabled(mac)
    }

    pub fn enable_dhcp_server(&mut self, device: DeviceId, sim: &mut Simulator) -> bool {
        self.with_device(device, |dev, net| dev.enable_dhcp_server(sim, net))
    }

    pub fn disable_dhcp_server(&mut self, device: DeviceId, sim: &mut Simulator) {
        let dev = self.device_mut(device);
        dev.dhcp_server.disable(&mut dev.sockets, sim);
    }

    pub fn dhcp_server_enabled(&self, device: DeviceId) -> bool {
        self.device(device).dhcp_server.is_enabled()
    }

    pub fn add_dhcp_pool(&mut self, device: DeviceId, subnet: Subnet, pool: DhcpPool) -> bool {
        self.device_mut(device).dhcp_server.add_pool(subnet, pool)
    }

    pub fn remove_dhcp_pool(&mut self, device: DeviceId, subnet: Subnet) -> bool {
        self.device_mut(device).dhcp_server.remove_pool(subnet)
    }

    pub fn dhcp_pools(&self, device: DeviceId) -> Vec<(Subnet, DhcpPool)> {
        self.device(device).dhcp_server.pools()
    }

    pub fn dhcp_bindings(&self, device: DeviceId, now: SimTime) -> Vec<DhcpBinding> {
        self.device(device).dhcp_server.bindings(now)
    }

    // ---------------------------------------------------------------
    // 套接字
    // ---------------------------------------------------------------

    pub fn open_socket(&mut self, device: DeviceId, ty: SocketType) -> SocketId {
        self.device_mut(device).sockets.open(ty)
    }

    /// 地址不属于该设备、类型不匹配或已被占用时返回 false
    pub fn bind_socket(&mut self, device: DeviceId, socket: SocketId, endpoint: Endpoint, port: u16) -> bool {
        self.with_device(device, |dev, net| dev.bind_socket(socket, endpoint, port, net))
    }

    pub fn close_socket(&mut self, device: DeviceId, socket: SocketId, sim: &mut Simulator) -> bool {
        self.device_mut(device).sockets.close(socket, sim)
    }

    // ---------------------------------------------------------------
    // ICMP / IP
    // ---------------------------------------------------------------

    /// 周期性 ping；`count == None` 时直到 `stop_ping`
    pub fn ping(
        &mut self,
        device: DeviceId,
        dst: Ipv4Address,
        count: Option<u32>,
        observer: Option<PingObserver>,
        sim: &mut Simulator,
    ) -> u64 {
        self.device_mut(device).start_ping(dst, count, observer, sim)
    }

    /// 停止 ping 并直接返回汇总（不再保留给 `ping_summary`）
    pub fn stop_ping(&mut self, device: DeviceId, ping: u64) -> Option<PingSummary> {
        let dev = self.device_mut(device);
        let summary = dev.finish_ping(ping);
        dev.ping_results.remove(&ping);
        summary
    }

    /// 取走已结束的 ping 的汇总；每个 ping 只能取一次
    pub fn ping_summary(&mut self, device: DeviceId, ping: u64) -> Option<PingSummary> {
        self.device_mut(device).ping_results.remove(&ping)
    }

    /// 单次 echo，超时缺省为 `echo_timeout`
    pub fn icmp_echo(
        &mut self,
        device: DeviceId,
        dst: Ipv4Address,
        timeout: Option<SimTime>,
        on_done: EchoCallback,
        sim: &mut Simulator,
    ) {
        let timeout = timeout.unwrap_or(self.cfg.echo_timeout());
        self.with_device(device, |dev, net| {
            dev.icmp_echo(dst, timeout, EchoPurpose::External(on_done), sim, net)
        });
    }

    pub fn try_encapsulate_and_send(&mut self, device: DeviceId, pkt: Ipv4Packet, sim: &mut Simulator) -> SendOutcome {
        self.with_device(device, |dev, net| dev.try_encapsulate_and_send(pkt, sim, net))
    }

    // ---------------------------------------------------------------
    // 帧收发
    // ---------------------------------------------------------------

    /// 从接口 `egress` 发出一帧。回环接口在当前时刻交付给自己，其余经链路时延交付给对端。
    #[tracing::instrument(skip(self, frame, sim), fields(src = %frame.src, dst = %frame.dst))]
    pub(crate) fn transmit(&mut self, egress: MacAddr, frame: &EthernetFrame, sim: &mut Simulator) -> bool {
        let (device, loopback) = {
            let i = self.iface(egress);
            (i.device, i.loopback)
        };
        let to = if loopback {
            Some(egress)
        } else {
            self.topo.neighbor(egress).filter(|_| self.is_active(egress))
        };
        let Some(to) = to else {
            debug!("链路不可用，丢弃");
            self.drop_frame(device, egress, DropReason::LinkDown, sim);
            return false;
        };

        let bytes = frame.encode();
        self.stats.frames_sent += 1;
        self.record(
            Some(device),
            sim.now(),
            TraceEventKind::FrameTx {
                iface: egress,
                src: frame.src,
                dst: frame.dst,
                ethertype: frame.ethertype,
                bytes: bytes.len(),
            },
        );
        let at = if loopback {
            sim.now()
        } else {
            sim.now().saturating_add(self.cfg.link_latency())
        };
        trace!(%to, ?at, "调度帧到达事件");
        sim.schedule(at, DeliverFrame { to, frame: bytes });
        true
    }

    /// 帧到达接口 `to`
    #[tracing::instrument(skip(self, bytes, sim), fields(len = bytes.len()))]
    pub fn deliver(&mut self, to: MacAddr, bytes: Vec<u8>, sim: &mut Simulator) {
        let Some(i) = self.ifaces.get(&to) else {
            debug!("目的接口已不存在");
            return;
        };
        let device = i.device;
        if !i.enabled {
            self.drop_frame(device, to, DropReason::NoInterface, sim);
            return;
        }
        let frame = match EthernetFrame::parse(&bytes) {
            Ok(f) => f,
            Err(e) => {
                debug!(%e, "帧解码失败");
                self.drop_frame(device, to, DropReason::Malformed, sim);
                return;
            }
        };
        self.stats.frames_delivered += 1;
        self.record(
            Some(device),
            sim.now(),
            TraceEventKind::FrameRx {
                iface: to,
                src: frame.src,
                dst: frame.dst,
                ethertype: frame.ethertype,
            },
        );
        if !matches!(self.devices.get(&device), Some(Some(_))) {
            return;
        }
        self.with_device(device, |dev, net| dev.on_frame(to, frame, sim, net));
    }

    pub(crate) fn drop_frame(&mut self, device: DeviceId, iface: MacAddr, reason: DropReason, sim: &Simulator) {
        self.stats.frames_dropped += 1;
        self.record(Some(device), sim.now(), TraceEventKind::FrameDrop { iface, reason });
    }

    // ---------------------------------------------------------------
    // 事件回调
    // ---------------------------------------------------------------

    pub(crate) fn on_socket_event(&mut self, device: DeviceId, socket: SocketId, token: u64, timed_out: bool, sim: &mut Simulator) {
        if !matches!(self.devices.get(&device), Some(Some(_))) {
            return;
        }
        self.with_device(device, |dev, net| {
            if let Some((resume, data)) = dev.sockets.resolve(socket, token, timed_out) {
                dev.resume(resume, data, sim, net);
            }
        });
    }

    pub(crate) fn on_resume(&mut self, device: DeviceId, resume: Resume, sim: &mut Simulator) {
        if !matches!(self.devices.get(&device), Some(Some(_))) {
            return;
        }
        self.with_device(device, |dev, net| dev.resume(resume, None, sim, net));
    }

    pub(crate) fn on_echo_poll(&mut self, device: DeviceId, echo: u64, sim: &mut Simulator) {
        if !matches!(self.devices.get(&device), Some(Some(_))) {
            return;
        }
        self.with_device(device, |dev, net| dev.echo_poll(echo, sim, net));
    }

    pub(crate) fn on_ping_tick(&mut self, device: DeviceId, ping: u64, sim: &mut Simulator) {
        if !matches!(self.devices.get(&device), Some(Some(_))) {
            return;
        }
        self.with_device(device, |dev, net| dev.ping_tick(ping, sim, net));
    }

    // ---------------------------------------------------------------
    // trace
    // ---------------------------------------------------------------

    pub fn enable_trace(&mut self) {
        if self.trace.is_none() {
            self.trace = Some(TraceLogger::default());
        }
    }

    pub(crate) fn record(&mut self, device: Option<DeviceId>, t: SimTime, kind: TraceEventKind) {
        if let Some(log) = &mut self.trace {
            log.push(TraceEvent {
                t_ns: t.0,
                device: device.map(DeviceId::get),
                kind,
            });
        }
    }

    /// 记录拓扑元信息（通常在 t=0、开始仿真之前调用）
    pub fn emit_trace_meta(&mut self) {
        if self.trace.is_none() {
            return;
        }
        let devices = self
            .devices
            .iter()
            .filter_map(|(id, slot)| slot.as_ref().map(|d| (id, d)))
            .map(|(id, d)| TraceDeviceInfo {
                id: id.get(),
                name: d.name().to_string(),
                kind: d.kind(),
                ifaces: d.ifaces.clone(),
            })
            .collect();
        let latency_ns = self.cfg.link_latency().0;
        let links = self
            .topo
            .links()
            .map(|(a, b)| TraceLinkInfo { a, b, latency_ns })
            .collect();
        self.record(None, SimTime::ZERO, TraceEventKind::Meta { devices, links });
    }

    // ---------------------------------------------------------------
    // 内部
    // ---------------------------------------------------------------

    /// 生成一个未被占用的单播 MAC
    fn new_mac(&mut self) -> MacAddr {
        loop {
            let mut mac = MacAddr::from_u64(self.rng.next_u64());
            // 本地管理、单播
            mac.0[0] = (mac.0[0] | 0x02) & 0xfe;
            if !mac.is_broadcast() && !mac.is_loopback() && !self.ifaces.contains_key(&mac) {
                return mac;
            }
        }
    }

    fn device(&self, id: DeviceId) -> &Device {
        self.devices
            .get(&id)
            .and_then(Option::as_ref)
            .unwrap_or_else(|| panic!("unknown device {id}"))
    }

    fn device_mut(&mut self, id: DeviceId) -> &mut Device {
        self.devices
            .get_mut(&id)
            .and_then(Option::as_mut)
            .unwrap_or_else(|| panic!("unknown device {id}"))
    }

    /// 暂时把设备取出来，避免 &mut self 与 &mut device 的重叠借用。
    pub(crate) fn with_device<R>(&mut self, id: DeviceId, f: impl FnOnce(&mut Device, &mut Network) -> R) -> R {
        let mut dev = self
            .devices
            .get_mut(&id)
            .and_then(Option::take)
            .unwrap_or_else(|| panic!("device {id} missing or busy"));
        trace!(device = %id, name = dev.name(), "取出设备");
        let out = f(&mut dev, self);
        if let Some(slot) = self.devices.get_mut(&id) {
            *slot = Some(dev);
        }
        out
    }
}

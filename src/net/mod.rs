//! 网络模拟模块
//!
//! 此模块包含网络模拟的核心组件：接口、设备、拓扑、转发/ARP/路由表、
//! 设备处理引擎、IP 发送路径、ICMP echo 与 ping。

// 子模块声明
mod arp_table;
mod deliver_frame;
mod device;
mod echo;
mod engine;
mod fib;
mod interface;
mod ip;
mod net_world;
mod network;
mod ping;
mod routing;
mod stats;
mod topology;

// 重新导出公共接口
pub use arp_table::{ArpEntry, ArpEntryInfo, ArpTable};
pub use deliver_frame::DeliverFrame;
pub use device::{Capabilities, Device, DeviceKind};
pub use echo::{EchoCallback, EchoPoll, EchoResult};
pub(crate) use echo::EchoPurpose;
pub use fib::{FibEntry, ForwardingTable};
pub use interface::{Interface, InterfaceInfo, Layer};
pub use ip::SendOutcome;
pub use net_world::NetWorld;
pub use network::Network;
pub use ping::{PingEvent, PingObserver, PingSummary, PingTick};
pub use routing::{Connected, Route, RouteEntry, RouteHop, RouteKind, RoutingTable};
pub use stats::Stats;
pub use topology::Topology;

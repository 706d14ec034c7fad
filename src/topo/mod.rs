//! 常用拓扑构建

mod dhcp_lan;
mod lan;
mod routed;

pub use dhcp_lan::{build_dhcp_lan, DhcpLanOpts, DhcpLanTopology};
pub use lan::{build_lan, LanOpts, LanTopology};
pub use routed::{build_routed, RoutedTopology};

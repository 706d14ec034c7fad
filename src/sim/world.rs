//! 世界 trait
//!
//! 事件执行时通过它拿到仿真根对象（见 `net::NetWorld`）。

use super::simulator::Simulator;
use std::any::Any;

/// 仿真世界：持有全部设备、接口与拓扑状态，事件通过 downcast 访问。
pub trait World: Any {
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// 每个事件执行后回调一次。
    fn on_tick(&mut self, _sim: &mut Simulator) {}
}

//! 事件 trait
//!
//! 帧到达、套接字唤醒、超时、周期性 ping 等都实现为事件。

use super::simulator::Simulator;
use super::world::World;

/// 事件：可被调度执行。使用 `self: Box<Self>` 以便事件把自身携带的帧/状态 move 出来。
pub trait Event: Send + 'static {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World);
}

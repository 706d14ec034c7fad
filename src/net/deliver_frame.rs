//! 帧到达事件

use super::net_world::NetWorld;
use crate::addr::MacAddr;
use crate::sim::{Event, Simulator, World};
use tracing::{debug, trace};

/// 事件：把一帧（已编码，含 FCS）交给接口 `to`。
#[derive(Debug)]
pub struct DeliverFrame {
    pub to: MacAddr,
    pub frame: Vec<u8>,
}

impl Event for DeliverFrame {
    #[tracing::instrument(skip(self, sim, world), fields(to = %self.to, len = self.frame.len()))]
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let DeliverFrame { to, frame } = *self;

        debug!(now = %sim.now(), "📨 帧到达事件执行");

        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        w.net.deliver(to, frame, sim);

        trace!("DeliverFrame::execute 完成");
    }
}

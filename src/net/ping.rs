//! ping：按固定周期重复 echo，统计命中/丢失。

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::device::Device;
use super::echo::{EchoPurpose, EchoResult};
use super::net_world::NetWorld;
use super::network::Network;
use crate::addr::{DeviceId, Ipv4Address};
use crate::sim::{Event, SimTime, Simulator, World};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingSummary {
    pub dst: Ipv4Address,
    pub sent: u32,
    pub received: u32,
}

impl PingSummary {
    pub fn lost(&self) -> u32 {
        self.sent.saturating_sub(self.received)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PingEvent {
    /// 每次 echo 的结果（seq 从 1 开始）
    Echo { seq: u32, result: EchoResult },
    Finished(PingSummary),
}

pub type PingObserver = Box<dyn FnMut(&PingEvent) + Send>;

pub(crate) struct PingTask {
    dst: Ipv4Address,
    count: Option<u32>,
    sent: u32,
    received: u32,
    last_start: SimTime,
    observer: Option<PingObserver>,
}

/// 事件：ping 的下一次 echo
#[derive(Debug)]
pub struct PingTick {
    pub device: DeviceId,
    pub ping: u64,
}

impl Event for PingTick {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let PingTick { device, ping } = *self;
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        w.net.on_ping_tick(device, ping, sim);
    }
}

impl Device {
    /// `count == None` 表示一直 ping，直到 `stop_ping`
    pub(crate) fn start_ping(
        &mut self,
        dst: Ipv4Address,
        count: Option<u32>,
        observer: Option<PingObserver>,
        sim: &mut Simulator,
    ) -> u64 {
        let id = self.next_ping;
        self.next_ping += 1;
        self.pings.insert(
            id,
            PingTask {
                dst,
                count,
                sent: 0,
                received: 0,
                last_start: sim.now(),
                observer,
            },
        );
        info!(device = %self.id, %dst, ?count, ping = id, "📡 开始 ping");
        sim.schedule(sim.now(), PingTick { device: self.id, ping: id });
        id
    }

    pub(crate) fn ping_tick(&mut self, ping: u64, sim: &mut Simulator, net: &mut Network) {
        let Some(task) = self.pings.get_mut(&ping) else {
            return;
        };
        if task.count.is_some_and(|c| task.sent >= c) {
            self.finish_ping(ping);
            return;
        }
        task.sent += 1;
        task.last_start = sim.now();
        let (dst, seq) = (task.dst, task.sent);
        let timeout = net.config().echo_timeout();
        self.icmp_echo(dst, timeout, EchoPurpose::Ping { ping, seq }, sim, net);
    }

    pub(crate) fn on_ping_echo(&mut self, ping: u64, seq: u32, result: EchoResult, sim: &mut Simulator, interval: SimTime) {
        let Some(task) = self.pings.get_mut(&ping) else {
            return;
        };
        if result.is_reply() {
            task.received += 1;
        }
        debug!(ping, seq, ?result, "ping echo");
        if let Some(obs) = task.observer.as_mut() {
            obs(&PingEvent::Echo { seq, result });
        }

        if task.count.is_some_and(|c| task.sent >= c) {
            self.finish_ping(ping);
            return;
        }
        let at = task.last_start.saturating_add(interval).max(sim.now());
        sim.schedule(at, PingTick { device: self.id, ping });
    }

    /// 结束 ping，回调汇总并保存结果
    pub(crate) fn finish_ping(&mut self, ping: u64) -> Option<PingSummary> {
        let mut task = self.pings.remove(&ping)?;
        let summary = PingSummary {
            dst: task.dst,
            sent: task.sent,
            received: task.received,
        };
        info!(device = %self.id, ping, sent = summary.sent, received = summary.received, "ping 结束");
        if let Some(obs) = task.observer.as_mut() {
            obs(&PingEvent::Finished(summary));
        }
        self.ping_results.insert(ping, summary);
        Some(summary)
    }
}

//! 仿真器
//!
//! 定义事件驱动仿真器，维护当前时间与事件队列。所有协议任务（DHCP、ICMP echo、ping）
//! 都只在这里排队的超时/唤醒事件处让出执行权。

use super::event::Event;
use super::scheduled_event::ScheduledEvent;
use super::time::SimTime;
use super::world::World;
use std::collections::BinaryHeap;
use tracing::{debug, info, trace};

/// 事件驱动仿真器：维护当前时间与事件队列。
#[derive(Default)]
pub struct Simulator {
    now: SimTime,
    next_seq: u64,
    executed: u64,
    q: BinaryHeap<ScheduledEvent>,
}

impl Simulator {
    /// 获取当前仿真时间
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// 队列中尚未执行的事件数
    pub fn pending(&self) -> usize {
        self.q.len()
    }

    /// 已执行的事件总数
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// 调度事件在指定时间执行（早于当前时间的请求按当前时间处理）
    #[tracing::instrument(level = "trace", skip(self, ev), fields(event_type = std::any::type_name::<E>(), schedule_at = ?at))]
    pub fn schedule<E: Event>(&mut self, at: SimTime, ev: E) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.q.push(ScheduledEvent {
            at: at.max(self.now),
            seq,
            ev: Box::new(ev),
        });
        trace!(now = ?self.now, seq, queue_size = self.q.len(), "事件已加入队列");
    }

    /// 调度事件在 `delay` 之后执行
    pub fn schedule_in<E: Event>(&mut self, delay: SimTime, ev: E) {
        let at = self.now.saturating_add(delay);
        self.schedule(at, ev);
    }

    /// 运行直到事件队列为空或到达 `until`。
    pub fn run_until(&mut self, until: SimTime, world: &mut dyn World) {
        debug!(now = ?self.now, until = ?until, queue_size = self.q.len(), "run_until");
        while let Some(top) = self.q.peek() {
            if top.at > until {
                break;
            }
            let Some(item) = self.q.pop() else {
                break;
            };
            self.step(item, world);
        }
        self.now = self.now.max(until);
    }

    /// 运行所有事件直到队列为空。
    ///
    /// 启用了 DHCP server 或无限 ping 时队列永远不会清空，此时应使用 `run_until`。
    #[tracing::instrument(skip(self, world))]
    pub fn run(&mut self, world: &mut dyn World) {
        info!("▶️  开始运行仿真");
        let before = self.executed;
        while let Some(item) = self.q.pop() {
            self.step(item, world);
        }
        info!(
            total_events = self.executed - before,
            final_time = ?self.now,
            "✅ 仿真完成"
        );
    }

    fn step(&mut self, item: ScheduledEvent, world: &mut dyn World) {
        self.now = item.at;
        self.executed += 1;
        trace!(now = ?self.now, seq = item.seq, remaining_queue = self.q.len(), "执行事件");
        item.ev.execute(self, world);
        world.on_tick(self);
    }
}

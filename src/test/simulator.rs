use crate::sim::{Event, SimTime, Simulator, World};
use std::any::Any;

/// 记录 (执行时刻, 标签) 的最小世界
#[derive(Default)]
struct Recorder {
    seen: Vec<(SimTime, &'static str)>,
    ticks: usize,
}

impl World for Recorder {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn on_tick(&mut self, _sim: &mut Simulator) {
        self.ticks += 1;
    }
}

fn recorder(world: &mut dyn World) -> &mut Recorder {
    world
        .as_any_mut()
        .downcast_mut::<Recorder>()
        .expect("world must be Recorder")
}

struct Mark(&'static str);

impl Event for Mark {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        recorder(world).seen.push((sim.now(), self.0));
    }
}

/// 模拟“超时后重试”：执行时记录，并在 `every` 之后重新调度自己，共 `left` 次
struct Retry {
    every: SimTime,
    left: u32,
}

impl Event for Retry {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        recorder(world).seen.push((sim.now(), "retry"));
        if self.left > 1 {
            sim.schedule_in(
                self.every,
                Retry {
                    every: self.every,
                    left: self.left - 1,
                },
            );
        }
    }
}

/// 同一时刻连续发出两帧，应按调用顺序到达
struct SendPair;

impl Event for SendPair {
    fn execute(self: Box<Self>, sim: &mut Simulator, _world: &mut dyn World) {
        let at = sim.now().saturating_add(SimTime::from_micros(10));
        sim.schedule(at, Mark("first"));
        sim.schedule(at, Mark("second"));
    }
}

#[test]
fn same_instant_events_keep_program_order() {
    let mut sim = Simulator::default();
    sim.schedule(SimTime::from_micros(20), Mark("late"));
    sim.schedule(SimTime::ZERO, SendPair);
    sim.schedule(SimTime::from_micros(10), Mark("racing"));

    let mut world = Recorder::default();
    sim.run(&mut world);

    let labels: Vec<&str> = world.seen.iter().map(|(_, l)| *l).collect();
    assert_eq!(labels, ["racing", "first", "second", "late"]);
    assert_eq!(world.ticks, 5);
    assert_eq!(sim.executed(), 5);
    assert_eq!(sim.pending(), 0);
}

#[test]
fn schedule_in_is_relative_to_now() {
    let mut sim = Simulator::default();
    sim.schedule(
        SimTime::from_millis(1),
        Retry {
            every: SimTime::from_millis(2),
            left: 3,
        },
    );

    let mut world = Recorder::default();
    sim.run(&mut world);

    let times: Vec<SimTime> = world.seen.iter().map(|(t, _)| *t).collect();
    assert_eq!(
        times,
        [
            SimTime::from_millis(1),
            SimTime::from_millis(3),
            SimTime::from_millis(5)
        ]
    );
}

#[test]
fn events_in_the_past_run_at_current_time() {
    let mut sim = Simulator::default();
    let mut world = Recorder::default();
    sim.run_until(SimTime::from_millis(4), &mut world);

    sim.schedule(SimTime::from_millis(1), Mark("stale"));
    sim.run(&mut world);

    assert_eq!(world.seen, [(SimTime::from_millis(4), "stale")]);
    assert_eq!(sim.now(), SimTime::from_millis(4));
}

#[test]
fn run_until_leaves_later_events_queued() {
    let mut sim = Simulator::default();
    sim.schedule(
        SimTime::ZERO,
        Retry {
            every: SimTime::from_secs(1),
            left: u32::MAX,
        },
    );

    let mut world = Recorder::default();
    sim.run_until(SimTime::from_millis(3_500), &mut world);

    // 0s、1s、2s、3s 各一次，下一次仍在队列里
    assert_eq!(world.seen.len(), 4);
    assert_eq!(sim.pending(), 1);
    assert_eq!(sim.now(), SimTime::from_millis(3_500));

    sim.run_until(SimTime::from_secs(4), &mut world);
    assert_eq!(world.seen.last(), Some(&(SimTime::from_secs(4), "retry")));
    assert_eq!(world.ticks, 5);
}

#[test]
fn run_until_advances_time_on_an_empty_queue() {
    let mut sim = Simulator::default();
    let mut world = Recorder::default();

    sim.run_until(SimTime(7), &mut world);
    assert_eq!(sim.now(), SimTime(7));
    assert_eq!(world.ticks, 0);
    assert_eq!(sim.executed(), 0);
}

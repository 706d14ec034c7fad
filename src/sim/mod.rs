//! 仿真核心模块
//!
//! 单线程离散事件调度：所有“等待数据或超时”的协议逻辑都表示为按时间排序的事件，
//! 因此没有任何操作会无限期阻塞调度器。

// 子模块声明
mod config;
mod event;
mod rng;
mod scheduled_event;
mod simulator;
mod time;
mod world;

// 重新导出公共接口
pub use config::{ConfigError, SimConfig};
pub use event::Event;
pub use rng::SplitMix64;
pub use scheduled_event::ScheduledEvent;
pub use simulator::Simulator;
pub use time::SimTime;
pub use world::World;

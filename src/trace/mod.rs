//! 结构化事件记录
//!
//! 设计目标：
//! - **结构化**：用 JSON 事件而不是解析文本日志
//! - **可选**：只有调用 `Network::enable_trace` 后才记录
//! - **可回放**：事件按仿真时间顺序追加

mod types;

pub use types::{DropReason, TraceDeviceInfo, TraceEvent, TraceEventKind, TraceLinkInfo, TraceLogger};

//! 套接字层
//!
//! 协议状态机（DHCP client/server、ICMP echo）通过套接字接收异步到达的数据。
//! 每个设备持有一个 `SocketTable`；投递（`incoming`）只追加到队列尾部，读取方
//! （`receive`）按 FIFO 取出，因此“一写一读”不需要额外的锁。
//!
//! `receive` 不会阻塞：它登记一个等待者并调度一个超时事件，数据到达时再调度一个
//! 零延迟的唤醒事件。两者先到者生效，后到者因 token 不匹配被忽略。

mod events;

use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;
use tracing::{debug, trace};

use crate::addr::{DeviceId, Ipv4Address, MacAddr};
use crate::sim::{SimTime, Simulator};

pub use events::{ResumeTask, SocketReady, SocketTimeout};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SocketType {
    Raw,
    Dgram,
    Stream,
}

/// 绑定地址
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Endpoint {
    /// RAW：某个接口的链路地址
    Link(MacAddr),
    /// RAW：通配 `*`，接收本设备所有接口上的数据
    AnyLink,
    /// DGRAM / STREAM：本设备的 IPv4 地址
    Ip(Ipv4Address),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SocketId(usize);

/// 数据到达或超时后要唤醒的协议任务。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    DhcpClient { iface: MacAddr, session: u64 },
    DhcpServer { iface: MacAddr },
    Echo { echo: u64 },
}

#[derive(Debug)]
struct Waiter {
    token: u64,
    resume: Resume,
    /// 已经调度过唤醒事件
    woken: bool,
}

#[derive(Debug)]
struct Socket {
    ty: SocketType,
    binding: Option<(Endpoint, u16)>,
    queue: VecDeque<Vec<u8>>,
    waiter: Option<Waiter>,
}

/// 单个设备的套接字表
#[derive(Debug)]
pub struct SocketTable {
    owner: DeviceId,
    slots: Vec<Option<Socket>>,
    bound: BTreeMap<(SocketType, Endpoint, u16), SocketId>,
    next_token: u64,
}

impl SocketTable {
    pub fn new(owner: DeviceId) -> Self {
        Self {
            owner,
            slots: Vec::new(),
            bound: BTreeMap::new(),
            next_token: 0,
        }
    }

    /// 创建一个未绑定的套接字
    pub fn open(&mut self, ty: SocketType) -> SocketId {
        let sock = Socket {
            ty,
            binding: None,
            queue: VecDeque::new(),
            waiter: None,
        };
        if let Some(idx) = self.slots.iter().position(Option::is_none) {
            self.slots[idx] = Some(sock);
            return SocketId(idx);
        }
        self.slots.push(Some(sock));
        SocketId(self.slots.len() - 1)
    }

    /// 绑定地址。RAW 只接受链路地址或通配符，端口强制为 0；DGRAM/STREAM 需要
    /// IPv4 地址和非零端口。地址已被占用或套接字已绑定时返回 false。
    ///
    /// 这里不检查地址归属；设备通过 `Device::bind_socket` 调用。
    pub(crate) fn bind(&mut self, id: SocketId, endpoint: Endpoint, port: u16) -> bool {
        let Some(sock) = self.slots.get_mut(id.0).and_then(Option::as_mut) else {
            return false;
        };
        if sock.binding.is_some() {
            return false;
        }
        let port = match (sock.ty, endpoint) {
            (SocketType::Raw, Endpoint::Link(_) | Endpoint::AnyLink) => 0,
            (SocketType::Dgram | SocketType::Stream, Endpoint::Ip(_)) if port != 0 => port,
            _ => return false,
        };
        let key = (sock.ty, endpoint, port);
        if self.bound.contains_key(&key) {
            debug!(?key, "地址已被占用");
            return false;
        }
        sock.binding = Some((endpoint, port));
        self.bound.insert(key, id);
        true
    }

    pub fn is_open(&self, id: SocketId) -> bool {
        matches!(self.slots.get(id.0), Some(Some(_)))
    }

    /// 队列中尚未读取的数据条数
    pub fn queued(&self, id: SocketId) -> usize {
        self.slot(id).map_or(0, |s| s.queue.len())
    }

    /// 投递数据：精确匹配的套接字，以及（仅 RAW）通配监听者。返回收到数据的套接字数。
    pub fn incoming(
        &mut self,
        data: &[u8],
        ty: SocketType,
        endpoint: Endpoint,
        port: u16,
        sim: &mut Simulator,
    ) -> usize {
        let port = if ty == SocketType::Raw { 0 } else { port };
        let mut targets = Vec::with_capacity(2);
        if let Some(&id) = self.bound.get(&(ty, endpoint, port)) {
            targets.push(id);
        }
        if ty == SocketType::Raw && endpoint != Endpoint::AnyLink {
            if let Some(&id) = self.bound.get(&(ty, Endpoint::AnyLink, 0)) {
                targets.push(id);
            }
        }

        for &id in &targets {
            let owner = self.owner;
            let Some(sock) = self.slot_mut(id) else {
                continue;
            };
            sock.queue.push_back(data.to_vec());
            if let Some(w) = sock.waiter.as_mut().filter(|w| !w.woken) {
                w.woken = true;
                sim.schedule(
                    sim.now(),
                    SocketReady {
                        device: owner,
                        socket: id,
                        token: w.token,
                    },
                );
            }
        }
        trace!(?ty, ?endpoint, port, receivers = targets.len(), "incoming");
        targets.len()
    }

    /// 等待下一条数据，最多 `timeout`。结果通过 `resume` 异步送回。
    /// 套接字不存在或已有等待者时返回 false。
    pub fn receive(
        &mut self,
        id: SocketId,
        timeout: SimTime,
        resume: Resume,
        sim: &mut Simulator,
    ) -> bool {
        let token = self.next_token;
        let owner = self.owner;
        let Some(sock) = self.slot_mut(id) else {
            return false;
        };
        if sock.waiter.is_some() {
            return false;
        }
        let ready = !sock.queue.is_empty();
        sock.waiter = Some(Waiter {
            token,
            resume,
            woken: ready,
        });
        self.next_token += 1;

        if ready {
            sim.schedule(
                sim.now(),
                SocketReady {
                    device: owner,
                    socket: id,
                    token,
                },
            );
        }
        sim.schedule_in(
            timeout,
            SocketTimeout {
                device: owner,
                socket: id,
                token,
            },
        );
        true
    }

    /// 唤醒/超时事件到达：若 token 仍有效，取走等待者与最早的数据。
    pub(crate) fn resolve(
        &mut self,
        id: SocketId,
        token: u64,
        timed_out: bool,
    ) -> Option<(Resume, Option<Vec<u8>>)> {
        let sock = self.slot_mut(id)?;
        if sock.waiter.as_ref().map(|w| w.token) != Some(token) {
            return None;
        }
        let data = sock.queue.pop_front();
        if data.is_none() && !timed_out {
            // 唤醒后数据已被取走：继续等到超时
            if let Some(w) = sock.waiter.as_mut() {
                w.woken = false;
            }
            return None;
        }
        let waiter = sock.waiter.take()?;
        Some((waiter.resume, data))
    }

    /// 关闭：解绑并清空队列。若有任务正在等待，调度一次“无数据”唤醒。
    pub fn close(&mut self, id: SocketId, sim: &mut Simulator) -> bool {
        let Some(sock) = self.slots.get_mut(id.0).and_then(Option::take) else {
            return false;
        };
        if let Some((endpoint, port)) = sock.binding {
            self.bound.remove(&(sock.ty, endpoint, port));
        }
        match sock.waiter {
            Some(w) => {
                sim.schedule(
                    sim.now(),
                    ResumeTask {
                        device: self.owner,
                        resume: w.resume,
                    },
                );
                true
            }
            None => false,
        }
    }

    /// 关闭所有绑定在 `pred` 匹配地址上的套接字（接口删除时使用）
    pub(crate) fn close_bound(&mut self, pred: impl Fn(Endpoint) -> bool, sim: &mut Simulator) -> usize {
        let ids: Vec<SocketId> = self
            .bound
            .iter()
            .filter(|((_, ep, _), _)| pred(*ep))
            .map(|(_, &id)| id)
            .collect();
        for &id in &ids {
            self.close(id, sim);
        }
        ids.len()
    }

    pub(crate) fn close_all(&mut self, sim: &mut Simulator) {
        for idx in 0..self.slots.len() {
            self.close(SocketId(idx), sim);
        }
    }

    fn slot(&self, id: SocketId) -> Option<&Socket> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, id: SocketId) -> Option<&mut Socket> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }
}

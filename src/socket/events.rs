//! 套接字唤醒事件

use super::{Resume, SocketId};
use crate::addr::DeviceId;
use crate::net::NetWorld;
use crate::sim::{Event, Simulator, World};

/// 事件：有数据到达，唤醒等待者。
#[derive(Debug)]
pub struct SocketReady {
    pub device: DeviceId,
    pub socket: SocketId,
    pub token: u64,
}

/// 事件：接收超时。
#[derive(Debug)]
pub struct SocketTimeout {
    pub device: DeviceId,
    pub socket: SocketId,
    pub token: u64,
}

/// 事件：套接字已关闭，以“无数据”恢复等待中的任务。
#[derive(Debug)]
pub struct ResumeTask {
    pub device: DeviceId,
    pub resume: Resume,
}

fn net_world(world: &mut dyn World) -> &mut NetWorld {
    world
        .as_any_mut()
        .downcast_mut::<NetWorld>()
        .expect("world must be NetWorld")
}

impl Event for SocketReady {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let SocketReady {
            device,
            socket,
            token,
        } = *self;
        net_world(world).net.on_socket_event(device, socket, token, false, sim);
    }
}

impl Event for SocketTimeout {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let SocketTimeout {
            device,
            socket,
            token,
        } = *self;
        net_world(world).net.on_socket_event(device, socket, token, true, sim);
    }
}

impl Event for ResumeTask {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let ResumeTask { device, resume } = *self;
        net_world(world).net.on_resume(device, resume, sim);
    }
}

//! 物理拓扑：接口之间的点到点连线，以及设备到接口的归属关系。

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::addr::{DeviceId, MacAddr};

#[derive(Debug, Default)]
pub struct Topology {
    /// 双向登记：a -> b 与 b -> a
    links: BTreeMap<MacAddr, MacAddr>,
    members: BTreeMap<DeviceId, BTreeSet<MacAddr>>,
    owner: BTreeMap<MacAddr, DeviceId>,
}

impl Topology {
    pub fn register(&mut self, mac: MacAddr, device: DeviceId) {
        self.owner.insert(mac, device);
        self.members.entry(device).or_default().insert(mac);
    }

    /// 注销接口；若接口仍有连线则一并断开，返回原来的对端。
    pub fn unregister(&mut self, mac: MacAddr) -> Option<MacAddr> {
        let peer = self.disconnect(mac);
        if let Some(device) = self.owner.remove(&mac) {
            if let Some(set) = self.members.get_mut(&device) {
                set.remove(&mac);
                if set.is_empty() {
                    self.members.remove(&device);
                }
            }
        }
        peer
    }

    /// 连接两个接口。接口未知、同属一个设备或任一端已有连线时返回 false。
    pub fn connect(&mut self, a: MacAddr, b: MacAddr) -> bool {
        let (Some(da), Some(db)) = (self.owner.get(&a), self.owner.get(&b)) else {
            return false;
        };
        if da == db || self.links.contains_key(&a) || self.links.contains_key(&b) {
            debug!(%a, %b, "拒绝连线");
            return false;
        }
        self.links.insert(a, b);
        self.links.insert(b, a);
        true
    }

    /// 断开接口的连线，返回对端
    pub fn disconnect(&mut self, mac: MacAddr) -> Option<MacAddr> {
        let peer = self.links.remove(&mac)?;
        self.links.remove(&peer);
        Some(peer)
    }

    pub fn neighbor(&self, mac: MacAddr) -> Option<MacAddr> {
        self.links.get(&mac).copied()
    }

    pub fn device_of(&self, mac: MacAddr) -> Option<DeviceId> {
        self.owner.get(&mac).copied()
    }

    pub fn members(&self, device: DeviceId) -> impl Iterator<Item = MacAddr> + '_ {
        self.members.get(&device).into_iter().flatten().copied()
    }

    /// 每条连线只出现一次（a < b）
    pub fn links(&self) -> impl Iterator<Item = (MacAddr, MacAddr)> + '_ {
        self.links
            .iter()
            .filter(|(a, b)| a < b)
            .map(|(&a, &b)| (a, b))
    }
}

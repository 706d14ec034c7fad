//! 二层转发表（MAC 学习）

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::addr::MacAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FibEntry {
    pub destination: MacAddr,
    pub egress: MacAddr,
}

/// 目的 MAC -> 出接口
#[derive(Debug, Default, Clone)]
pub struct ForwardingTable {
    entries: BTreeMap<MacAddr, MacAddr>,
}

impl ForwardingTable {
    /// 学习 `dst` 位于 `egress` 之后。本设备自己的地址不学习。返回表项是否有变化。
    pub fn learn(&mut self, dst: MacAddr, egress: MacAddr, own: &BTreeSet<MacAddr>) -> bool {
        if own.contains(&dst) {
            return false;
        }
        self.entries.insert(dst, egress) != Some(egress)
    }

    pub fn get(&self, dst: MacAddr) -> Option<MacAddr> {
        self.entries.get(&dst).copied()
    }

    /// 删除所有经由 `egress` 的表项
    pub fn remove_egress(&mut self, egress: MacAddr) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| *e != egress);
        before - self.entries.len()
    }

    pub fn remove_destination(&mut self, dst: MacAddr) -> bool {
        self.entries.remove(&dst).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> Vec<FibEntry> {
        self.entries
            .iter()
            .map(|(&destination, &egress)| FibEntry {
                destination,
                egress,
            })
            .collect()
    }
}

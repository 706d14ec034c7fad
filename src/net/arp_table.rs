//! ARP 缓存
//!
//! 以 (协议类型, 协议地址) 为键，值为 (远端链路地址, 学到该表项的本地接口)。
//! 查询本机地址时返回回环哨兵对 (LOOPBACK, LOOPBACK)。

use std::collections::BTreeMap;

use serde::Serialize;

use crate::addr::{Ipv4Address, MacAddr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArpEntry {
    pub remote: MacAddr,
    pub local: MacAddr,
}

impl ArpEntry {
    pub const LOOPBACK: ArpEntry = ArpEntry {
        remote: MacAddr::LOOPBACK,
        local: MacAddr::LOOPBACK,
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArpEntryInfo {
    pub ptype: u16,
    pub addr: Ipv4Address,
    pub remote: MacAddr,
    pub local: MacAddr,
}

#[derive(Debug, Default, Clone)]
pub struct ArpTable {
    entries: BTreeMap<(u16, Ipv4Address), ArpEntry>,
}

impl ArpTable {
    /// `locals` 为本设备已配置的地址
    pub fn get(&self, ptype: u16, addr: Ipv4Address, locals: &[Ipv4Address]) -> Option<ArpEntry> {
        if locals.contains(&addr) {
            return Some(ArpEntry::LOOPBACK);
        }
        self.entries.get(&(ptype, addr)).copied()
    }

    pub fn contains(&self, ptype: u16, addr: Ipv4Address) -> bool {
        self.entries.contains_key(&(ptype, addr))
    }

    /// 仅当映射已存在时更新，返回是否更新
    pub fn merge(&mut self, ptype: u16, addr: Ipv4Address, remote: MacAddr, local: MacAddr) -> bool {
        match self.entries.get_mut(&(ptype, addr)) {
            Some(entry) => {
                *entry = ArpEntry { remote, local };
                true
            }
            None => false,
        }
    }

    pub fn record(&mut self, ptype: u16, addr: Ipv4Address, remote: MacAddr, local: MacAddr) {
        self.entries.insert((ptype, addr), ArpEntry { remote, local });
    }

    pub fn remove(&mut self, ptype: u16, addr: Ipv4Address) -> bool {
        self.entries.remove(&(ptype, addr)).is_some()
    }

    /// 删除经由本地接口 `local` 学到的表项
    pub fn invalidate_local(&mut self, local: MacAddr) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.local != local);
        before - self.entries.len()
    }

    /// 删除指向远端 `remote` 的表项
    pub fn remove_remote(&mut self, remote: MacAddr) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.remote != remote);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> Vec<ArpEntryInfo> {
        self.entries
            .iter()
            .map(|(&(ptype, addr), e)| ArpEntryInfo {
                ptype,
                addr,
                remote: e.remote,
                local: e.local,
            })
            .collect()
    }
}

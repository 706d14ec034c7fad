//! 三层路由表
//!
//! 路由按目的子网分桶，每个桶内再按管理距离分组；同一距离下可以有多条等价路由，
//! `get` 每次返回后把命中的列表轮转一位，实现简单的轮询负载分担。
//!
//! 查找顺序：
//! 1. 目的地址是本机某个接口地址 -> (dst, dst)，走回环
//! 2. 目的地址落在某个已配置接口的子网内 -> (dst, 接口地址)，直连
//! 3. 从 /32 到 /0 做最长前缀匹配，取最小管理距离

use std::collections::BTreeMap;

use serde::Serialize;

use crate::addr::{Ipv4Address, Prefix, Subnet};

/// 一条路由：下一跳 + 本地出口地址
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Route {
    pub next_hop: Ipv4Address,
    pub local: Ipv4Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    Local,
    Connected,
    Table,
}

/// `get`/`lookup` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteHop {
    pub next_hop: Ipv4Address,
    pub local: Ipv4Address,
    pub kind: RouteKind,
}

/// 参与查找的本地接口地址
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connected {
    pub addr: Ipv4Address,
    pub prefix: Prefix,
    pub loopback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteEntry {
    pub destination: Subnet,
    pub distance: u8,
    pub next_hop: Ipv4Address,
    pub local: Ipv4Address,
}

#[derive(Debug, Default, Clone)]
pub struct RoutingTable {
    /// subnet -> distance -> 等价路由
    routes: BTreeMap<Subnet, BTreeMap<u8, Vec<Route>>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 查找并轮转等价路由
    pub fn get(&mut self, dst: Ipv4Address, connected: &[Connected]) -> Option<RouteHop> {
        if let Some(hop) = Self::local_hop(dst, connected) {
            return Some(hop);
        }
        let bucket = self.best_bucket_mut(dst)?;
        let route = *bucket.first()?;
        bucket.rotate_left(1);
        Some(RouteHop {
            next_hop: route.next_hop,
            local: route.local,
            kind: RouteKind::Table,
        })
    }

    /// 与 `get` 相同，但不轮转（用于选源地址）
    pub fn lookup(&self, dst: Ipv4Address, connected: &[Connected]) -> Option<RouteHop> {
        if let Some(hop) = Self::local_hop(dst, connected) {
            return Some(hop);
        }
        (0..=32u8).rev().find_map(|len| {
            let subnet = Subnet::new(dst, Prefix::new(len));
            let (_, bucket) = self.routes.get(&subnet)?.iter().next()?;
            bucket.first().map(|r| RouteHop {
                next_hop: r.next_hop,
                local: r.local,
                kind: RouteKind::Table,
            })
        })
    }

    /// 添加路由；同一距离下 (next_hop, local) 重复时返回 false
    pub fn set(&mut self, destination: Subnet, distance: u8, next_hop: Ipv4Address, local: Ipv4Address) -> bool {
        let bucket = self
            .routes
            .entry(destination)
            .or_default()
            .entry(distance)
            .or_default();
        let route = Route { next_hop, local };
        if bucket.contains(&route) {
            return false;
        }
        bucket.push(route);
        true
    }

    /// 删除一条路由，并清理空的距离桶/前缀桶
    pub fn delete(&mut self, destination: Subnet, distance: u8, next_hop: Ipv4Address, local: Ipv4Address) -> bool {
        let Some(by_distance) = self.routes.get_mut(&destination) else {
            return false;
        };
        let Some(bucket) = by_distance.get_mut(&distance) else {
            return false;
        };
        let before = bucket.len();
        bucket.retain(|r| !(r.next_hop == next_hop && r.local == local));
        let removed = bucket.len() != before;
        if bucket.is_empty() {
            by_distance.remove(&distance);
        }
        if by_distance.is_empty() {
            self.routes.remove(&destination);
        }
        removed
    }

    /// 删除所有以 `local` 为出口地址的路由（接口改址或删除时）
    pub fn remove_local(&mut self, local: Ipv4Address) -> usize {
        let mut removed = 0;
        self.routes.retain(|_, by_distance| {
            by_distance.retain(|_, bucket| {
                let before = bucket.len();
                bucket.retain(|r| r.local != local);
                removed += before - bucket.len();
                !bucket.is_empty()
            });
            !by_distance.is_empty()
        });
        removed
    }

    pub fn entries(&self) -> Vec<RouteEntry> {
        let mut out = Vec::new();
        for (&destination, by_distance) in &self.routes {
            for (&distance, bucket) in by_distance {
                out.extend(bucket.iter().map(|r| RouteEntry {
                    destination,
                    distance,
                    next_hop: r.next_hop,
                    local: r.local,
                }));
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn local_hop(dst: Ipv4Address, connected: &[Connected]) -> Option<RouteHop> {
        if connected.iter().any(|c| c.addr == dst) {
            return Some(RouteHop {
                next_hop: dst,
                local: dst,
                kind: RouteKind::Local,
            });
        }
        connected
            .iter()
            .filter(|c| !c.loopback && !c.addr.is_unspecified())
            .filter(|c| Subnet::new(c.addr, c.prefix).contains(dst))
            .max_by_key(|c| c.prefix.len())
            .map(|c| RouteHop {
                next_hop: dst,
                local: c.addr,
                kind: RouteKind::Connected,
            })
    }

    /// 最长前缀 + 最小距离对应的等价路由列表
    fn best_bucket_mut(&mut self, dst: Ipv4Address) -> Option<&mut Vec<Route>> {
        let len = (0..=32u8)
            .rev()
            .find(|&len| self.routes.contains_key(&Subnet::new(dst, Prefix::new(len))))?;
        let by_distance = self.routes.get_mut(&Subnet::new(dst, Prefix::new(len)))?;
        by_distance.values_mut().next()
    }
}

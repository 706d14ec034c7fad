//! 地址类型：链路地址、IPv4 地址与前缀、设备标识
//!
//! 都是带全序的小型 `Copy` 值，可以直接作为 `BTreeMap` 的键并按值传递。

mod device_id;
mod ipv4;
mod mac;

pub use device_id::DeviceId;
pub use ipv4::{Ipv4Address, Prefix, Subnet};
pub use mac::MacAddr;

/// 文本地址解析失败
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddrParseError {
    #[error("invalid link address {0:?}")]
    Mac(String),
    #[error("invalid IPv4 address {0:?}")]
    Ipv4(String),
    #[error("invalid subnet {0:?} (expected a.b.c.d/len)")]
    Subnet(String),
}

/// 通过 `Display`/`FromStr` 的文本形式序列化/反序列化地址
macro_rules! serde_via_str {
    ($ty:ty) => {
        impl serde::Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.collect_str(self)
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                let raw = <String as serde::Deserialize>::deserialize(d)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

serde_via_str!(MacAddr);
serde_via_str!(Ipv4Address);
serde_via_str!(Subnet);

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use super::AddrParseError;

/// 4 字节网络地址
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ipv4Address(pub [u8; 4]);

impl Ipv4Address {
    pub const UNSPECIFIED: Self = Self([0; 4]);
    pub const BROADCAST: Self = Self([0xff; 4]);
    pub const LOOPBACK: Self = Self([127, 0, 0, 1]);

    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self([a, b, c, d])
    }

    pub fn from_u32(v: u32) -> Self {
        Self(v.to_be_bytes())
    }

    pub fn to_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    pub fn is_unspecified(self) -> bool {
        self == Self::UNSPECIFIED
    }

    pub fn is_broadcast(self) -> bool {
        self == Self::BROADCAST
    }

    /// 与前缀掩码按位与（网络地址）
    pub fn mask(self, prefix: Prefix) -> Self {
        Self::from_u32(self.to_u32() & prefix.mask_u32())
    }

    /// `self/prefix` 的定向广播地址
    pub fn broadcast_of(self, prefix: Prefix) -> Self {
        Self::from_u32(self.to_u32() | !prefix.mask_u32())
    }

    /// 下一个地址，在 255.255.255.255 处饱和
    pub fn inc(self) -> Self {
        Self::from_u32(self.to_u32().saturating_add(1))
    }
}

impl fmt::Display for Ipv4Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{a}.{b}.{c}.{d}")
    }
}

impl fmt::Debug for Ipv4Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Ipv4Address {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Ipv4Addr>()
            .map(Self::from)
            .map_err(|_| AddrParseError::Ipv4(s.to_string()))
    }
}

impl From<Ipv4Addr> for Ipv4Address {
    fn from(a: Ipv4Addr) -> Self {
        Self(a.octets())
    }
}

impl From<Ipv4Address> for Ipv4Addr {
    fn from(a: Ipv4Address) -> Self {
        Ipv4Addr::from(a.0)
    }
}

/// 前缀长度。只保留低 6 位；32 及以上都表示全 1 掩码。
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Prefix(u8);

impl Prefix {
    pub const HOST: Prefix = Prefix(32);
    pub const ANY: Prefix = Prefix(0);

    pub fn new(len: u8) -> Self {
        Self(len & 0x3f)
    }

    pub fn len(self) -> u8 {
        self.0
    }

    /// /0：掩码全零，匹配所有地址
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn mask_u32(self) -> u32 {
        match self.0 {
            0 => 0,
            n if n >= 32 => u32::MAX,
            n => u32::MAX << (32 - n),
        }
    }

    pub fn mask(self) -> Ipv4Address {
        Ipv4Address::from_u32(self.mask_u32())
    }

    /// 连续掩码对应的前缀长度；不连续的掩码按主机掩码（/32）处理
    pub fn from_mask(mask: Ipv4Address) -> Self {
        let m = mask.to_u32();
        let ones = m.leading_ones();
        if ones == 32 || m << ones == 0 {
            Self(ones as u8)
        } else {
            Self::HOST
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

impl fmt::Debug for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl serde::Serialize for Prefix {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for Prefix {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        <u8 as serde::Deserialize>::deserialize(d).map(Prefix::new)
    }
}

/// 网络地址 + 前缀，构造时把主机位清零
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Subnet {
    addr: Ipv4Address,
    prefix: Prefix,
}

impl Subnet {
    pub fn new(addr: Ipv4Address, prefix: Prefix) -> Self {
        Self {
            addr: addr.mask(prefix),
            prefix,
        }
    }

    /// 0.0.0.0/0
    pub fn default_route() -> Self {
        Self::new(Ipv4Address::UNSPECIFIED, Prefix::ANY)
    }

    pub fn network(self) -> Ipv4Address {
        self.addr
    }

    pub fn prefix(self) -> Prefix {
        self.prefix
    }

    pub fn contains(self, a: Ipv4Address) -> bool {
        a.mask(self.prefix) == self.addr
    }

    pub fn broadcast(self) -> Ipv4Address {
        self.addr.broadcast_of(self.prefix)
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.addr, self.prefix)
    }
}

impl fmt::Debug for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Subnet {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || AddrParseError::Subnet(s.to_string());
        let (addr, len) = s.split_once('/').ok_or_else(err)?;
        let addr: Ipv4Address = addr.parse().map_err(|_| err())?;
        let len: u8 = len.parse().map_err(|_| err())?;
        if len > 32 {
            return Err(err());
        }
        Ok(Self::new(addr, Prefix::new(len)))
    }
}

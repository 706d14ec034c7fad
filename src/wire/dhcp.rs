//! DHCP 报文（RFC 2131 / 2132），沿用 BOOTP 布局。

use super::bits::{divide, spread};
use super::{WireError, need};
use crate::addr::{Ipv4Address, MacAddr};

pub const SERVER_PORT: u16 = 67;
pub const CLIENT_PORT: u16 = 68;

pub const OP_REQUEST: u8 = 1;
pub const OP_REPLY: u8 = 2;

pub const MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];

const FIXED_WIDTHS: [u32; 11] = [8, 8, 8, 8, 32, 16, 16, 32, 32, 32, 32];
const FIXED_LEN: usize = 28;
const CHADDR_LEN: usize = 16;
const SNAME_LEN: usize = 64;
const FILE_LEN: usize = 128;
const COOKIE_AT: usize = FIXED_LEN + CHADDR_LEN + SNAME_LEN + FILE_LEN;
const OPTIONS_AT: usize = COOKIE_AT + 4;
/// BOOTP 报文最小长度
const MIN_LEN: usize = 300;

pub mod code {
    pub const PAD: u8 = 0;
    pub const SUBNET_MASK: u8 = 1;
    pub const ROUTER: u8 = 3;
    pub const REQUESTED_ADDRESS: u8 = 50;
    pub const LEASE_TIME: u8 = 51;
    pub const MESSAGE_TYPE: u8 = 53;
    pub const SERVER_IDENTIFIER: u8 = 54;
    pub const PARAMETER_REQUEST_LIST: u8 = 55;
    pub const END: u8 = 255;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpMessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
}

impl DhcpMessageType {
    fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => Self::Discover,
            2 => Self::Offer,
            3 => Self::Request,
            4 => Self::Decline,
            5 => Self::Ack,
            6 => Self::Nak,
            7 => Self::Release,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DhcpOption {
    SubnetMask(Ipv4Address),
    /// 只保留列表中的第一个路由器
    Router(Ipv4Address),
    LeaseTime(u32),
    MessageType(DhcpMessageType),
    ParameterRequestList(Vec<u8>),
    RequestedAddress(Ipv4Address),
    ServerIdentifier(Ipv4Address),
    Other(u8, Vec<u8>),
}

impl DhcpOption {
    fn encode_into(&self, out: &mut Vec<u8>) {
        let (c, value): (u8, Vec<u8>) = match self {
            Self::SubnetMask(a) => (code::SUBNET_MASK, a.0.to_vec()),
            Self::Router(a) => (code::ROUTER, a.0.to_vec()),
            Self::LeaseTime(t) => (code::LEASE_TIME, t.to_be_bytes().to_vec()),
            Self::MessageType(t) => (code::MESSAGE_TYPE, vec![*t as u8]),
            Self::ParameterRequestList(l) => (code::PARAMETER_REQUEST_LIST, l.clone()),
            Self::RequestedAddress(a) => (code::REQUESTED_ADDRESS, a.0.to_vec()),
            Self::ServerIdentifier(a) => (code::SERVER_IDENTIFIER, a.0.to_vec()),
            Self::Other(c, v) => (*c, v.clone()),
        };
        debug_assert!(value.len() <= u8::MAX as usize);
        out.push(c);
        out.push(value.len() as u8);
        out.extend_from_slice(&value);
    }

    fn decode(c: u8, value: &[u8]) -> Result<Self, WireError> {
        let addr = |v: &[u8]| -> Result<Ipv4Address, WireError> {
            match v {
                [a, b, c, d, ..] => Ok(Ipv4Address::new(*a, *b, *c, *d)),
                _ => Err(WireError::Malformed("dhcp address option")),
            }
        };
        Ok(match c {
            code::SUBNET_MASK => Self::SubnetMask(addr(value)?),
            code::ROUTER => Self::Router(addr(value)?),
            code::REQUESTED_ADDRESS => Self::RequestedAddress(addr(value)?),
            code::SERVER_IDENTIFIER => Self::ServerIdentifier(addr(value)?),
            code::LEASE_TIME => match value {
                [a, b, c, d] => Self::LeaseTime(u32::from_be_bytes([*a, *b, *c, *d])),
                _ => return Err(WireError::Malformed("dhcp lease time")),
            },
            code::MESSAGE_TYPE => {
                let t = value
                    .first()
                    .and_then(|&t| DhcpMessageType::from_u8(t))
                    .ok_or(WireError::Malformed("dhcp message type"))?;
                Self::MessageType(t)
            }
            code::PARAMETER_REQUEST_LIST => Self::ParameterRequestList(value.to_vec()),
            other => Self::Other(other, value.to_vec()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpMessage {
    pub op: u8,
    pub hops: u8,
    pub xid: u32,
    pub secs: u16,
    pub flags: u16,
    pub ciaddr: Ipv4Address,
    pub yiaddr: Ipv4Address,
    pub siaddr: Ipv4Address,
    pub giaddr: Ipv4Address,
    pub chaddr: MacAddr,
    pub options: Vec<DhcpOption>,
}

impl DhcpMessage {
    /// 客户端发出的报文，置广播标志
    pub fn client(kind: DhcpMessageType, xid: u32, chaddr: MacAddr) -> Self {
        Self {
            op: OP_REQUEST,
            hops: 0,
            xid,
            secs: 0,
            flags: 0x8000,
            ciaddr: Ipv4Address::UNSPECIFIED,
            yiaddr: Ipv4Address::UNSPECIFIED,
            siaddr: Ipv4Address::UNSPECIFIED,
            giaddr: Ipv4Address::UNSPECIFIED,
            chaddr,
            options: vec![DhcpOption::MessageType(kind)],
        }
    }

    /// 服务器对 `request` 的应答，沿用其 xid、标志与客户端硬件地址
    pub fn reply(kind: DhcpMessageType, request: &DhcpMessage, server: Ipv4Address) -> Self {
        Self {
            op: OP_REPLY,
            hops: 0,
            xid: request.xid,
            secs: 0,
            flags: request.flags,
            ciaddr: Ipv4Address::UNSPECIFIED,
            yiaddr: Ipv4Address::UNSPECIFIED,
            siaddr: server,
            giaddr: request.giaddr,
            chaddr: request.chaddr,
            options: vec![
                DhcpOption::MessageType(kind),
                DhcpOption::ServerIdentifier(server),
            ],
        }
    }

    pub fn with(mut self, opt: DhcpOption) -> Self {
        self.options.push(opt);
        self
    }

    pub fn message_type(&self) -> Option<DhcpMessageType> {
        self.options.iter().find_map(|o| match o {
            DhcpOption::MessageType(t) => Some(*t),
            _ => None,
        })
    }

    pub fn subnet_mask(&self) -> Option<Ipv4Address> {
        self.options.iter().find_map(|o| match o {
            DhcpOption::SubnetMask(a) => Some(*a),
            _ => None,
        })
    }

    pub fn router(&self) -> Option<Ipv4Address> {
        self.options.iter().find_map(|o| match o {
            DhcpOption::Router(a) => Some(*a),
            _ => None,
        })
    }

    pub fn lease_time(&self) -> Option<u32> {
        self.options.iter().find_map(|o| match o {
            DhcpOption::LeaseTime(t) => Some(*t),
            _ => None,
        })
    }

    pub fn requested_address(&self) -> Option<Ipv4Address> {
        self.options.iter().find_map(|o| match o {
            DhcpOption::RequestedAddress(a) => Some(*a),
            _ => None,
        })
    }

    pub fn server_identifier(&self) -> Option<Ipv4Address> {
        self.options.iter().find_map(|o| match o {
            DhcpOption::ServerIdentifier(a) => Some(*a),
            _ => None,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = spread(&[
            (self.op as u64, 8),
            (1, 8),
            (6, 8),
            (self.hops as u64, 8),
            (self.xid as u64, 32),
            (self.secs as u64, 16),
            (self.flags as u64, 16),
            (self.ciaddr.to_u32() as u64, 32),
            (self.yiaddr.to_u32() as u64, 32),
            (self.siaddr.to_u32() as u64, 32),
            (self.giaddr.to_u32() as u64, 32),
        ]);
        out.extend_from_slice(&self.chaddr.0);
        out.resize(COOKIE_AT, 0);
        out.extend_from_slice(&MAGIC_COOKIE);
        for opt in &self.options {
            opt.encode_into(&mut out);
        }
        out.push(code::END);
        if out.len() < MIN_LEN {
            out.resize(MIN_LEN, code::PAD);
        }
        out
    }

    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        need("dhcp", buf, OPTIONS_AT)?;
        let f = divide(&buf[..FIXED_LEN], &FIXED_WIDTHS);
        if f[1] != 1 || f[2] != 6 {
            return Err(WireError::Malformed("dhcp hardware type"));
        }
        if buf[COOKIE_AT..OPTIONS_AT] != MAGIC_COOKIE {
            return Err(WireError::BadMagicCookie);
        }
        let mut chaddr = [0u8; 6];
        chaddr.copy_from_slice(&buf[FIXED_LEN..FIXED_LEN + 6]);

        let mut options = Vec::new();
        let mut i = OPTIONS_AT;
        while i < buf.len() {
            match buf[i] {
                code::PAD => i += 1,
                code::END => break,
                c => {
                    let len = *buf.get(i + 1).ok_or(WireError::Malformed("dhcp option length"))? as usize;
                    let start = i + 2;
                    need("dhcp option", buf, start + len)?;
                    options.push(DhcpOption::decode(c, &buf[start..start + len])?);
                    i = start + len;
                }
            }
        }

        Ok(Self {
            op: f[0] as u8,
            hops: f[3] as u8,
            xid: f[4] as u32,
            secs: f[5] as u16,
            flags: f[6] as u16,
            ciaddr: Ipv4Address::from_u32(f[7] as u32),
            yiaddr: Ipv4Address::from_u32(f[8] as u32),
            siaddr: Ipv4Address::from_u32(f[9] as u32),
            giaddr: Ipv4Address::from_u32(f[10] as u32),
            chaddr: MacAddr(chaddr),
            options,
        })
    }
}

//! 以太网/IPv4 上的 ARP（RFC 826）：固定 28 字节，无选项。

use super::bits::{divide, spread};
use super::{WireError, need};
use crate::addr::{Ipv4Address, MacAddr};

pub const HTYPE_ETHERNET: u16 = 1;
pub const PTYPE_IPV4: u16 = 0x0800;

const WIDTHS: [u32; 9] = [16, 16, 8, 8, 16, 48, 32, 48, 32];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpOp {
    Request = 1,
    Reply = 2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpPacket {
    pub htype: u16,
    pub ptype: u16,
    pub op: ArpOp,
    pub sender_hw: MacAddr,
    pub sender_proto: Ipv4Address,
    pub target_hw: MacAddr,
    pub target_proto: Ipv4Address,
}

impl ArpPacket {
    pub const LEN: usize = 28;

    /// 询问 `target_proto` 的硬件地址；目标硬件地址填全零。
    pub fn request(sender_hw: MacAddr, sender_proto: Ipv4Address, target_proto: Ipv4Address) -> Self {
        Self {
            htype: HTYPE_ETHERNET,
            ptype: PTYPE_IPV4,
            op: ArpOp::Request,
            sender_hw,
            sender_proto,
            target_hw: MacAddr::LOOPBACK,
            target_proto,
        }
    }

    /// 对 `self` 的应答：发送方与目标互换，`hw` 作为应答方硬件地址。
    pub fn make_reply(&self, hw: MacAddr) -> Self {
        Self {
            htype: self.htype,
            ptype: self.ptype,
            op: ArpOp::Reply,
            sender_hw: hw,
            sender_proto: self.target_proto,
            target_hw: self.sender_hw,
            target_proto: self.sender_proto,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        spread(&[
            (self.htype as u64, 16),
            (self.ptype as u64, 16),
            (6, 8),
            (4, 8),
            (self.op as u64, 16),
            (self.sender_hw.to_u64(), 48),
            (self.sender_proto.to_u32() as u64, 32),
            (self.target_hw.to_u64(), 48),
            (self.target_proto.to_u32() as u64, 32),
        ])
    }

    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        need("arp", buf, Self::LEN)?;
        let f = divide(&buf[..Self::LEN], &WIDTHS);
        if f[2] != 6 || f[3] != 4 {
            return Err(WireError::Malformed("arp address lengths"));
        }
        let op = match f[4] {
            1 => ArpOp::Request,
            2 => ArpOp::Reply,
            other => {
                return Err(WireError::Unsupported {
                    what: "arp",
                    field: "opcode",
                    value: other,
                });
            }
        };
        Ok(Self {
            htype: f[0] as u16,
            ptype: f[1] as u16,
            op,
            sender_hw: MacAddr::from_u64(f[5]),
            sender_proto: Ipv4Address::from_u32(f[6] as u32),
            target_hw: MacAddr::from_u64(f[7]),
            target_proto: Ipv4Address::from_u32(f[8] as u32),
        })
    }
}

//! ICMP（RFC 792）：echo、目的不可达、超时

use super::bits::{divide, spread};
use super::checksum::internet_checksum;
use super::ipv4::Ipv4Packet;
use super::{WireError, need};
use crate::addr::Ipv4Address;

pub const ECHO_REPLY: u8 = 0;
pub const UNREACHABLE: u8 = 3;
pub const ECHO_REQUEST: u8 = 8;
pub const TIME_EXCEEDED: u8 = 11;

pub const CODE_NET_UNREACHABLE: u8 = 0;
pub const CODE_HOST_UNREACHABLE: u8 = 1;

/// 差错报文中引用原报文载荷的字节数
const QUOTED_PAYLOAD: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcmpPacket {
    pub icmp_type: u8,
    pub code: u8,
    /// 类型相关的首部字（echo 为标识符 + 序号）
    pub rest: [u8; 4],
    pub data: Vec<u8>,
}

impl IcmpPacket {
    pub const HEADER_LEN: usize = 8;
    pub const MIN_LEN: usize = 64;

    pub fn echo_request(identifier: u16, sequence: u16, data: Vec<u8>) -> Self {
        let [a, b] = identifier.to_be_bytes();
        let [c, d] = sequence.to_be_bytes();
        Self {
            icmp_type: ECHO_REQUEST,
            code: 0,
            rest: [a, b, c, d],
            data,
        }
    }

    /// 应答：原样带回请求的标识符、序号与数据
    pub fn echo_reply(request: &IcmpPacket) -> Self {
        Self {
            icmp_type: ECHO_REPLY,
            code: 0,
            rest: request.rest,
            data: request.data.clone(),
        }
    }

    /// 差错报文：引用原报文首部及其载荷的前 64 字节
    pub fn error(icmp_type: u8, code: u8, offending: &Ipv4Packet) -> Self {
        let mut data = offending.header_bytes();
        let quoted = offending.payload.len().min(QUOTED_PAYLOAD);
        data.extend_from_slice(&offending.payload[..quoted]);
        Self {
            icmp_type,
            code,
            rest: [0; 4],
            data,
        }
    }

    pub fn identifier(&self) -> u16 {
        u16::from_be_bytes([self.rest[0], self.rest[1]])
    }

    pub fn sequence(&self) -> u16 {
        u16::from_be_bytes([self.rest[2], self.rest[3]])
    }

    pub fn is_error(&self) -> bool {
        matches!(self.icmp_type, UNREACHABLE | TIME_EXCEEDED)
    }

    /// `self` 是否是 `request` 的应答：类型对应且首部字相同
    pub fn matches_request(&self, request: &IcmpPacket) -> bool {
        self.icmp_type == ECHO_REPLY && request.icmp_type == ECHO_REQUEST && self.rest == request.rest
    }

    /// 差错报文中引用的原报文：源、目的、协议与被引用的载荷。
    /// 引用通常比原报文总长度短，所以不走 [`Ipv4Packet::parse`]。
    pub fn quoted(&self) -> Option<(Ipv4Address, Ipv4Address, u8, &[u8])> {
        if !self.is_error() || self.data.len() < Ipv4Packet::MIN_HEADER_LEN {
            return None;
        }
        let header_len = (self.data[0] & 0x0f) as usize * 4;
        if self.data[0] >> 4 != 4 || header_len < Ipv4Packet::MIN_HEADER_LEN || self.data.len() < header_len {
            return None;
        }
        // 版本..标识/分片 | TTL | 协议 | 校验和 | 源 | 目的
        let f = divide(&self.data[..Ipv4Packet::MIN_HEADER_LEN], &[64, 8, 8, 16, 32, 32]);
        Some((
            Ipv4Address::from_u32(f[4] as u32),
            Ipv4Address::from_u32(f[5] as u32),
            f[2] as u8,
            &self.data[header_len..],
        ))
    }

    /// 补零到至少 64 字节并填好校验和
    pub fn encode(&self) -> Vec<u8> {
        let mut out = spread(&[
            (self.icmp_type as u64, 8),
            (self.code as u64, 8),
            (0, 16),
            (u32::from_be_bytes(self.rest) as u64, 32),
        ]);
        out.extend_from_slice(&self.data);
        if out.len() < Self::MIN_LEN {
            out.resize(Self::MIN_LEN, 0);
        }
        let csum = internet_checksum(&out);
        out[2..4].copy_from_slice(&csum.to_be_bytes());
        out
    }

    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        need("icmp", buf, Self::HEADER_LEN)?;
        if internet_checksum(buf) != 0 {
            return Err(WireError::BadChecksum("icmp"));
        }
        let f = divide(&buf[..Self::HEADER_LEN], &[8, 8, 16, 32]);
        Ok(Self {
            icmp_type: f[0] as u8,
            code: f[1] as u8,
            rest: (f[3] as u32).to_be_bytes(),
            data: buf[Self::HEADER_LEN..].to_vec(),
        })
    }
}

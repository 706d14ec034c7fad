//! IPv4 首部编解码。不分片：标识、标志与片偏移恒为零。

use super::bits::{divide, pad_to_32bit_words, spread};
use super::checksum::internet_checksum;
use super::{WireError, need};
use crate::addr::Ipv4Address;

pub struct IpProtocol;

impl IpProtocol {
    pub const ICMP: u8 = 1;
    pub const UDP: u8 = 17;
}

const WIDTHS: [u32; 13] = [4, 4, 6, 2, 16, 16, 3, 13, 8, 8, 16, 32, 32];
const MAX_OPTIONS: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Packet {
    pub dscp: u8,
    pub ecn: u8,
    pub ttl: u8,
    pub protocol: u8,
    pub src: Ipv4Address,
    pub dst: Ipv4Address,
    /// 原始选项字节，只做填充，不解释
    pub options: Vec<u8>,
    pub payload: Vec<u8>,
}

impl Ipv4Packet {
    pub const MIN_HEADER_LEN: usize = 20;

    pub fn new(src: Ipv4Address, dst: Ipv4Address, protocol: u8, ttl: u8, payload: Vec<u8>) -> Self {
        Self {
            dscp: 0,
            ecn: 0,
            ttl,
            protocol,
            src,
            dst,
            options: Vec::new(),
            payload,
        }
    }

    pub fn header_len(&self) -> usize {
        Self::MIN_HEADER_LEN + pad_to_32bit_words(&self.options, 0, MAX_OPTIONS).len()
    }

    /// 重新计算校验和后的首部
    pub fn header_bytes(&self) -> Vec<u8> {
        let options = pad_to_32bit_words(&self.options, 0, MAX_OPTIONS);
        let header_len = Self::MIN_HEADER_LEN + options.len();
        let total_len = header_len + self.payload.len();
        assert!(total_len <= u16::MAX as usize, "IPv4 packet too large: {total_len}");
        let mut header = spread(&[
            (4, 4),
            ((header_len / 4) as u64, 4),
            (self.dscp as u64, 6),
            (self.ecn as u64, 2),
            (total_len as u64, 16),
            (0, 16),
            (0, 3),
            (0, 13),
            (self.ttl as u64, 8),
            (self.protocol as u64, 8),
            (0, 16),
            (self.src.to_u32() as u64, 32),
            (self.dst.to_u32() as u64, 32),
        ]);
        header.extend_from_slice(&options);
        let csum = internet_checksum(&header);
        header[10..12].copy_from_slice(&csum.to_be_bytes());
        header
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.header_bytes();
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        need("ipv4", buf, Self::MIN_HEADER_LEN)?;
        let f = divide(&buf[..Self::MIN_HEADER_LEN], &WIDTHS);
        if f[0] != 4 {
            return Err(WireError::Unsupported {
                what: "ipv4",
                field: "version",
                value: f[0],
            });
        }
        let header_len = f[1] as usize * 4;
        if header_len < Self::MIN_HEADER_LEN {
            return Err(WireError::Malformed("ipv4 header length"));
        }
        need("ipv4", buf, header_len)?;
        let total_len = f[4] as usize;
        if total_len < header_len {
            return Err(WireError::Malformed("ipv4 total length"));
        }
        need("ipv4", buf, total_len)?;
        if !verify_checksum(&buf[..header_len]) {
            return Err(WireError::BadChecksum("ipv4"));
        }
        Ok(Self {
            dscp: f[2] as u8,
            ecn: f[3] as u8,
            ttl: f[8] as u8,
            protocol: f[9] as u8,
            src: Ipv4Address::from_u32(f[11] as u32),
            dst: Ipv4Address::from_u32(f[12] as u32),
            options: buf[Self::MIN_HEADER_LEN..header_len].to_vec(),
            payload: buf[header_len..total_len].to_vec(),
        })
    }

    /// 返回 TTL 减去 `by`（饱和）后的新报文，`self` 不变
    pub fn copy_and_decrement(&self, by: u8) -> Self {
        let mut next = self.clone();
        next.ttl = self.ttl.saturating_sub(by);
        next
    }
}

/// 对整个首部（含校验和字段）求校验和为零即有效
pub fn verify_checksum(header: &[u8]) -> bool {
    internet_checksum(header) == 0
}

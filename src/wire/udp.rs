//! UDP（RFC 768），校验和覆盖 IPv4 伪首部

use super::bits::{divide, spread};
use super::checksum::internet_checksum;
use super::ipv4::IpProtocol;
use super::{WireError, need};
use crate::addr::Ipv4Address;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpDatagram {
    pub src_port: u16,
    pub dst_port: u16,
    pub payload: Vec<u8>,
}

impl UdpDatagram {
    pub const HEADER_LEN: usize = 8;

    pub fn new(src_port: u16, dst_port: u16, payload: Vec<u8>) -> Self {
        Self {
            src_port,
            dst_port,
            payload,
        }
    }

    pub fn encode(&self, src: Ipv4Address, dst: Ipv4Address) -> Vec<u8> {
        let len = Self::HEADER_LEN + self.payload.len();
        assert!(len <= u16::MAX as usize, "UDP datagram too large: {len}");
        let mut out = spread(&[
            (self.src_port as u64, 16),
            (self.dst_port as u64, 16),
            (len as u64, 16),
            (0, 16),
        ]);
        out.extend_from_slice(&self.payload);
        let csum = match checksum(src, dst, &out) {
            // 算出 0 时发送全 1；0 表示没有校验和
            0 => 0xffff,
            c => c,
        };
        out[6..8].copy_from_slice(&csum.to_be_bytes());
        out
    }

    /// 解码；校验和字段非零时用 `src`/`dst` 组成的伪首部校验
    pub fn parse(buf: &[u8], src: Ipv4Address, dst: Ipv4Address) -> Result<Self, WireError> {
        need("udp", buf, Self::HEADER_LEN)?;
        let f = divide(&buf[..Self::HEADER_LEN], &[16, 16, 16, 16]);
        let len = f[2] as usize;
        if len < Self::HEADER_LEN {
            return Err(WireError::Malformed("udp length"));
        }
        need("udp", buf, len)?;
        if f[3] != 0 && checksum(src, dst, &buf[..len]) != 0 {
            return Err(WireError::BadChecksum("udp"));
        }
        Ok(Self {
            src_port: f[0] as u16,
            dst_port: f[1] as u16,
            payload: buf[Self::HEADER_LEN..len].to_vec(),
        })
    }
}

fn checksum(src: Ipv4Address, dst: Ipv4Address, segment: &[u8]) -> u16 {
    let mut buf = spread(&[
        (src.to_u32() as u64, 32),
        (dst.to_u32() as u64, 32),
        (0, 8),
        (IpProtocol::UDP as u64, 8),
        (segment.len() as u64, 16),
    ]);
    buf.extend_from_slice(segment);
    internet_checksum(&buf)
}

//! Ethernet II 帧，末尾带 FCS

use super::bits::{divide, spread};
use super::checksum::crc32;
use super::{WireError, need};
use crate::addr::MacAddr;

pub struct EtherType;

impl EtherType {
    pub const IPV4: u16 = 0x0800;
    pub const ARP: u16 = 0x0806;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetFrame {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub ethertype: u16,
    pub payload: Vec<u8>,
}

impl EthernetFrame {
    pub const HEADER_LEN: usize = 14;
    pub const FCS_LEN: usize = 4;

    pub fn new(dst: MacAddr, src: MacAddr, ethertype: u16, payload: Vec<u8>) -> Self {
        Self {
            dst,
            src,
            ethertype,
            payload,
        }
    }

    /// 帧头 + 载荷 + 对前面全部字节计算的 FCS
    pub fn encode(&self) -> Vec<u8> {
        let mut out = spread(&[
            (self.dst.to_u64(), 48),
            (self.src.to_u64(), 48),
            (self.ethertype as u64, 16),
        ]);
        out.extend_from_slice(&self.payload);
        let fcs = crc32(&out);
        out.extend_from_slice(&fcs.to_be_bytes());
        out
    }

    /// 解码帧。这里不校验 FCS（内存内投递不会出现比特错误），需要时用
    /// [`EthernetFrame::fcs_ok`]。
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        need("ethernet", buf, Self::HEADER_LEN + Self::FCS_LEN)?;
        let f = divide(&buf[..Self::HEADER_LEN], &[48, 48, 16]);
        Ok(Self {
            dst: MacAddr::from_u64(f[0]),
            src: MacAddr::from_u64(f[1]),
            ethertype: f[2] as u16,
            payload: buf[Self::HEADER_LEN..buf.len() - Self::FCS_LEN].to_vec(),
        })
    }

    pub fn fcs_ok(buf: &[u8]) -> bool {
        if buf.len() < Self::HEADER_LEN + Self::FCS_LEN {
            return false;
        }
        let (body, fcs) = buf.split_at(buf.len() - Self::FCS_LEN);
        crc32(body).to_be_bytes() == fcs
    }
}

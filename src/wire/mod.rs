//! 线上格式
//!
//! 每个报文都持有自己的字节（`Vec<u8>` 载荷），解码后可以直接 move 进事件和
//! 套接字队列。固定首部用 [`bits::spread`] 打包、[`bits::divide`] 拆包。

pub mod arp;
pub mod bits;
pub mod checksum;
pub mod dhcp;
pub mod ethernet;
pub mod icmp;
pub mod ipv4;
pub mod udp;

pub use arp::{ArpOp, ArpPacket};
pub use dhcp::{DhcpMessage, DhcpMessageType, DhcpOption};
pub use ethernet::{EtherType, EthernetFrame};
pub use icmp::IcmpPacket;
pub use ipv4::{IpProtocol, Ipv4Packet};
pub use udp::UdpDatagram;

/// 格式错误或不支持的数据。设备处理时任何一种都意味着丢弃。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("{what}: truncated ({got} bytes, need {need})")]
    Truncated {
        what: &'static str,
        need: usize,
        got: usize,
    },
    #[error("{0}: bad checksum")]
    BadChecksum(&'static str),
    #[error("{what}: unsupported {field} {value}")]
    Unsupported {
        what: &'static str,
        field: &'static str,
        value: u64,
    },
    #[error("{0}: malformed")]
    Malformed(&'static str),
    #[error("DHCP: bad magic cookie")]
    BadMagicCookie,
}

pub(crate) fn need(what: &'static str, buf: &[u8], need: usize) -> Result<(), WireError> {
    if buf.len() < need {
        return Err(WireError::Truncated {
            what,
            need,
            got: buf.len(),
        });
    }
    Ok(())
}

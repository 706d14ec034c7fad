use crate::addr::{Ipv4Address, MacAddr};
use crate::wire::checksum::{crc32, internet_checksum};
use crate::wire::dhcp::{self, DhcpMessage, DhcpMessageType, DhcpOption};
use crate::wire::icmp::{self, IcmpPacket};
use crate::wire::ipv4::verify_checksum;
use crate::wire::{ArpOp, ArpPacket, EtherType, EthernetFrame, IpProtocol, Ipv4Packet, UdpDatagram, WireError};

fn mac(last: u8) -> MacAddr {
    MacAddr([0x02, 0, 0, 0, 0, last])
}

fn ip(d: u8) -> Ipv4Address {
    Ipv4Address::new(10, 0, 0, d)
}

#[test]
fn crc32_check_value() {
    assert_eq!(crc32(b"123456789"), 0xcbf4_3926);
}

#[test]
fn internet_checksum_rfc1071_example() {
    let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
    assert_eq!(internet_checksum(&data), !0xddf2);
}

#[test]
fn internet_checksum_pads_odd_byte() {
    assert_eq!(internet_checksum(&[0xab]), internet_checksum(&[0xab, 0x00]));
}

#[test]
fn ethernet_frame_carries_fcs() {
    let frame = EthernetFrame::new(MacAddr::BROADCAST, mac(1), EtherType::ARP, vec![1, 2, 3]);
    let mut bytes = frame.encode();
    assert_eq!(bytes.len(), EthernetFrame::HEADER_LEN + 3 + EthernetFrame::FCS_LEN);
    assert!(EthernetFrame::fcs_ok(&bytes));
    assert_eq!(EthernetFrame::parse(&bytes).expect("frame"), frame);

    bytes[EthernetFrame::HEADER_LEN] ^= 0x01;
    assert!(!EthernetFrame::fcs_ok(&bytes));
}

#[test]
fn ethernet_rejects_runt() {
    assert!(matches!(
        EthernetFrame::parse(&[0u8; 17]),
        Err(WireError::Truncated { what: "ethernet", .. })
    ));
}

#[test]
fn arp_reply_swaps_sender_and_target() {
    let req = ArpPacket::request(mac(1), ip(10), ip(20));
    let bytes = req.encode();
    assert_eq!(bytes.len(), ArpPacket::LEN);
    let parsed = ArpPacket::parse(&bytes).expect("arp");
    assert_eq!(parsed.op, ArpOp::Request);
    assert_eq!(parsed.target_hw, MacAddr::LOOPBACK);

    let reply = parsed.make_reply(mac(2));
    assert_eq!(reply.op, ArpOp::Reply);
    assert_eq!(reply.sender_hw, mac(2));
    assert_eq!(reply.sender_proto, ip(20));
    assert_eq!(reply.target_hw, mac(1));
    assert_eq!(reply.target_proto, ip(10));
}

#[test]
fn arp_rejects_unknown_opcode() {
    let mut bytes = ArpPacket::request(mac(1), ip(10), ip(20)).encode();
    bytes[7] = 9;
    assert!(matches!(
        ArpPacket::parse(&bytes),
        Err(WireError::Unsupported { field: "opcode", value: 9, .. })
    ));
}

#[test]
fn ipv4_header_checksum_verifies() {
    let pkt = Ipv4Packet::new(ip(10), ip(20), IpProtocol::UDP, 64, vec![0xaa; 12]);
    let bytes = pkt.encode();
    assert!(verify_checksum(&bytes[..Ipv4Packet::MIN_HEADER_LEN]));
    assert_eq!(Ipv4Packet::parse(&bytes).expect("ipv4"), pkt);
}

#[test]
fn ipv4_single_bit_flip_fails_checksum() {
    let bytes = Ipv4Packet::new(ip(10), ip(20), IpProtocol::ICMP, 64, vec![]).encode();
    for bit in [0usize, 70, 100, 159] {
        let mut corrupt = bytes.clone();
        corrupt[bit / 8] ^= 0x80 >> (bit % 8);
        assert!(!verify_checksum(&corrupt[..Ipv4Packet::MIN_HEADER_LEN]), "bit {bit}");
    }
}

#[test]
fn ipv4_parse_rejects_bad_checksum_and_version() {
    let mut bytes = Ipv4Packet::new(ip(10), ip(20), IpProtocol::ICMP, 64, vec![1, 2]).encode();
    bytes[8] ^= 0xff;
    assert_eq!(Ipv4Packet::parse(&bytes), Err(WireError::BadChecksum("ipv4")));

    let mut v6 = Ipv4Packet::new(ip(10), ip(20), IpProtocol::ICMP, 64, vec![]).encode();
    v6[0] = 0x65;
    assert!(matches!(Ipv4Packet::parse(&v6), Err(WireError::Unsupported { field: "version", .. })));
}

#[test]
fn ipv4_options_are_padded_to_words() {
    let mut pkt = Ipv4Packet::new(ip(10), ip(20), IpProtocol::UDP, 64, vec![7; 4]);
    pkt.options = vec![1, 1, 1];
    assert_eq!(pkt.header_len(), 24);
    let parsed = Ipv4Packet::parse(&pkt.encode()).expect("ipv4");
    assert_eq!(parsed.options, vec![0, 1, 1, 1]);
    assert_eq!(parsed.payload, vec![7; 4]);
}

#[test]
fn ipv4_trailing_bytes_beyond_total_length_are_ignored() {
    let pkt = Ipv4Packet::new(ip(10), ip(20), IpProtocol::UDP, 64, vec![5; 3]);
    let mut bytes = pkt.encode();
    bytes.extend_from_slice(&[0; 30]);
    assert_eq!(Ipv4Packet::parse(&bytes).expect("ipv4").payload, vec![5; 3]);
}

#[test]
fn copy_and_decrement_leaves_original_untouched() {
    let pkt = Ipv4Packet::new(ip(10), ip(20), IpProtocol::ICMP, 1, vec![]);
    let next = pkt.copy_and_decrement(1);
    assert_eq!(pkt.ttl, 1);
    assert_eq!(next.ttl, 0);
    assert_eq!(next.copy_and_decrement(1).ttl, 0);
}

#[test]
fn icmp_echo_is_padded_and_matched() {
    let req = IcmpPacket::echo_request(0x1234, 7, b"hello".to_vec());
    let bytes = req.encode();
    assert_eq!(bytes.len(), IcmpPacket::MIN_LEN);
    assert_eq!(internet_checksum(&bytes), 0);

    let parsed = IcmpPacket::parse(&bytes).expect("icmp");
    assert_eq!(parsed.identifier(), 0x1234);
    assert_eq!(parsed.sequence(), 7);

    let reply = IcmpPacket::echo_reply(&parsed);
    assert!(reply.matches_request(&req));
    let other = IcmpPacket::echo_request(0x1234, 8, b"hello".to_vec());
    assert!(!IcmpPacket::echo_reply(&other).matches_request(&req));
}

#[test]
fn icmp_rejects_bad_checksum() {
    let mut bytes = IcmpPacket::echo_request(1, 1, vec![]).encode();
    bytes[10] ^= 1;
    assert_eq!(IcmpPacket::parse(&bytes), Err(WireError::BadChecksum("icmp")));
}

#[test]
fn icmp_error_quotes_offending_header_and_payload() {
    let payload: Vec<u8> = (0..100).collect();
    let offending = Ipv4Packet::new(ip(10), Ipv4Address::new(203, 0, 113, 5), IpProtocol::UDP, 3, payload);
    let err = IcmpPacket::error(icmp::UNREACHABLE, icmp::CODE_NET_UNREACHABLE, &offending);
    assert!(err.is_error());
    assert_eq!(err.data.len(), Ipv4Packet::MIN_HEADER_LEN + 64);

    let parsed = IcmpPacket::parse(&err.encode()).expect("icmp");
    let (src, dst, proto, quoted) = parsed.quoted().expect("quoted header");
    assert_eq!(src, ip(10));
    assert_eq!(dst, Ipv4Address::new(203, 0, 113, 5));
    assert_eq!(proto, IpProtocol::UDP);
    assert_eq!(&quoted[..4], &[0, 1, 2, 3]);
}

#[test]
fn icmp_error_quote_skips_header_options() {
    let mut offending = Ipv4Packet::new(ip(7), ip(8), IpProtocol::ICMP, 1, vec![0xaa, 0xbb, 0xcc]);
    offending.options = vec![1, 1, 1, 1, 1, 1, 1, 1];
    assert_eq!(offending.header_len(), 28);
    let err = IcmpPacket::error(icmp::TIME_EXCEEDED, 0, &offending);

    let parsed = IcmpPacket::parse(&err.encode()).expect("icmp");
    let (src, dst, proto, quoted) = parsed.quoted().expect("quoted header");
    assert_eq!((src, dst, proto), (ip(7), ip(8), IpProtocol::ICMP));
    // 报文被补零到 64 字节，引用部分以原载荷开头
    assert_eq!(&quoted[..3], &[0xaa, 0xbb, 0xcc]);
}

#[test]
fn echo_messages_have_no_quoted_packet() {
    assert!(IcmpPacket::echo_request(1, 1, vec![0; 40]).quoted().is_none());
}

#[test]
fn udp_checksum_covers_pseudo_header() {
    let d = UdpDatagram::new(68, 67, b"payload".to_vec());
    let bytes = d.encode(Ipv4Address::UNSPECIFIED, Ipv4Address::BROADCAST);
    assert_eq!(
        UdpDatagram::parse(&bytes, Ipv4Address::UNSPECIFIED, Ipv4Address::BROADCAST).expect("udp"),
        d
    );
    assert_eq!(
        UdpDatagram::parse(&bytes, ip(1), Ipv4Address::BROADCAST),
        Err(WireError::BadChecksum("udp"))
    );
}

#[test]
fn udp_zero_checksum_is_not_verified() {
    let mut bytes = UdpDatagram::new(1000, 2000, vec![9; 5]).encode(ip(1), ip(2));
    bytes[6] = 0;
    bytes[7] = 0;
    let d = UdpDatagram::parse(&bytes, ip(3), ip(4)).expect("udp");
    assert_eq!(d.payload, vec![9; 5]);
}

#[test]
fn dhcp_message_encodes_options_after_cookie() {
    let msg = DhcpMessage::client(DhcpMessageType::Discover, 0xdead_beef, mac(7))
        .with(DhcpOption::ParameterRequestList(vec![dhcp::code::SUBNET_MASK, dhcp::code::ROUTER]));
    let bytes = msg.encode();
    assert!(bytes.len() >= 300);
    assert_eq!(&bytes[236..240], &dhcp::MAGIC_COOKIE);

    let parsed = DhcpMessage::parse(&bytes).expect("dhcp");
    assert_eq!(parsed, msg);
    assert_eq!(parsed.message_type(), Some(DhcpMessageType::Discover));
    assert_eq!(parsed.flags, 0x8000);
}

#[test]
fn dhcp_reply_echoes_request_fields() {
    let req = DhcpMessage::client(DhcpMessageType::Request, 42, mac(7))
        .with(DhcpOption::RequestedAddress(ip(2)));
    let mut ack = DhcpMessage::reply(DhcpMessageType::Ack, &req, ip(1))
        .with(DhcpOption::SubnetMask(Ipv4Address::new(255, 255, 255, 0)))
        .with(DhcpOption::Router(ip(1)))
        .with(DhcpOption::LeaseTime(3600));
    ack.yiaddr = ip(2);

    let parsed = DhcpMessage::parse(&ack.encode()).expect("dhcp");
    assert_eq!(parsed.op, dhcp::OP_REPLY);
    assert_eq!(parsed.xid, 42);
    assert_eq!(parsed.chaddr, mac(7));
    assert_eq!(parsed.yiaddr, ip(2));
    assert_eq!(parsed.server_identifier(), Some(ip(1)));
    assert_eq!(parsed.subnet_mask(), Some(Ipv4Address::new(255, 255, 255, 0)));
    assert_eq!(parsed.router(), Some(ip(1)));
    assert_eq!(parsed.lease_time(), Some(3600));
    assert_eq!(req.requested_address(), Some(ip(2)));
}

#[test]
fn dhcp_skips_pad_and_keeps_unknown_options() {
    let mut bytes = DhcpMessage::client(DhcpMessageType::Discover, 1, mac(7)).encode();
    // 选项区：53 (3 字节) 之后写入 PAD、未知选项 12、END
    let at = 240 + 3;
    bytes[at..at + 7].copy_from_slice(&[dhcp::code::PAD, 12, 3, b'a', b'b', b'c', dhcp::code::END]);
    let parsed = DhcpMessage::parse(&bytes).expect("dhcp");
    assert_eq!(parsed.options.len(), 2);
    assert_eq!(parsed.options[1], DhcpOption::Other(12, b"abc".to_vec()));
}

#[test]
fn dhcp_rejects_bad_cookie_and_truncated_option() {
    let mut bytes = DhcpMessage::client(DhcpMessageType::Discover, 1, mac(7)).encode();
    bytes[236] = 0;
    assert_eq!(DhcpMessage::parse(&bytes), Err(WireError::BadMagicCookie));

    let mut bytes = DhcpMessage::client(DhcpMessageType::Discover, 1, mac(7)).encode();
    bytes[240 + 3] = dhcp::code::PAD;
    let last = bytes.len() - 2;
    bytes[last] = dhcp::code::ROUTER;
    bytes[last + 1] = 4;
    assert!(matches!(DhcpMessage::parse(&bytes), Err(WireError::Truncated { .. })));
}

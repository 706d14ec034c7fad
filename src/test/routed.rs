use std::sync::{Arc, Mutex};

use crate::net::{EchoResult, NetWorld, PingEvent, SendOutcome};
use crate::sim::{SimTime, Simulator};
use crate::topo::build_routed;
use crate::trace::TraceEventKind;
use crate::wire::icmp::{self, IcmpPacket};
use crate::wire::{EtherType, IpProtocol, Ipv4Packet};

fn run_ms(sim: &mut Simulator, world: &mut NetWorld, ms: u64) {
    let until = sim.now().saturating_add(SimTime::from_millis(ms));
    sim.run_until(until, world);
}

#[test]
fn first_routed_echo_fails_until_router_resolves_next_hop() {
    let mut world = NetWorld::default();
    let mut sim = Simulator::default();
    let t = build_routed(&mut world);

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let ping = world.net.ping(
        t.h0,
        t.h1_addr,
        Some(3),
        Some(Box::new(move |ev: &PingEvent| sink.lock().expect("events").push(ev.clone()))),
        &mut sim,
    );
    run_ms(&mut sim, &mut world, 5_000);

    let summary = world.net.ping_summary(t.h0, ping).expect("ping finished");
    assert_eq!((summary.sent, summary.received), (3, 2));
    assert_eq!(world.net.stats.icmp_errors, 1);

    let events = events.lock().expect("events");
    assert_eq!(
        events[0],
        PingEvent::Echo {
            seq: 1,
            result: EchoResult::Error {
                from: t.r0_addrs.0,
                icmp_type: icmp::UNREACHABLE,
                code: icmp::CODE_HOST_UNREACHABLE,
            },
        }
    );
    for ev in &events[1..3] {
        assert!(matches!(ev, PingEvent::Echo { result: EchoResult::Reply { from, .. }, .. } if *from == t.h1_addr));
    }
}

#[test]
fn router_records_both_sides_after_traffic() {
    let mut world = NetWorld::default();
    let mut sim = Simulator::default();
    let t = build_routed(&mut world);
    world.net.ping(t.h0, t.h1_addr, Some(2), None, &mut sim);
    run_ms(&mut sim, &mut world, 3_000);

    let arp = world.net.arp_entries(t.r0);
    assert!(arp.iter().any(|e| e.addr == t.h0_addr && e.remote == t.h0_iface));
    assert!(arp.iter().any(|e| e.addr == t.h1_addr && e.remote == t.h1_iface));
    let h1_arp = world.net.arp_entries(t.h1);
    assert!(h1_arp.iter().any(|e| e.addr == t.r0_addrs.1));
}

#[test]
fn ttl_one_at_router_yields_time_exceeded_without_forwarding() {
    let mut world = NetWorld::default();
    let mut sim = Simulator::default();
    let t = build_routed(&mut world);

    // 先让 h0 解析出网关
    world.net.ping(t.h0, t.r0_addrs.0, Some(1), None, &mut sim);
    run_ms(&mut sim, &mut world, 1_500);
    assert_eq!(world.net.stats.icmp_errors, 0);

    world.net.enable_trace();
    let echo = IcmpPacket::echo_request(1, 1, b"ttl".to_vec());
    let pkt = Ipv4Packet::new(t.h0_addr, t.h1_addr, IpProtocol::ICMP, 1, echo.encode());
    assert_eq!(world.net.try_encapsulate_and_send(t.h0, pkt, &mut sim), SendOutcome::Sent);
    run_ms(&mut sim, &mut world, 1_000);

    assert_eq!(world.net.stats.icmp_errors, 1);
    let log = world.net.trace.as_ref().expect("trace enabled");
    let exceeded = log.count(|k| {
        matches!(k, TraceEventKind::IcmpError { dst, icmp_type, code: 0 }
            if *dst == t.h0_addr && *icmp_type == icmp::TIME_EXCEEDED)
    });
    assert_eq!(exceeded, 1);
    let reached_h1 = log.count(|k| {
        matches!(k, TraceEventKind::FrameRx { iface, ethertype, .. }
            if *iface == t.h1_iface && *ethertype == EtherType::IPV4)
    });
    assert_eq!(reached_h1, 0);
    assert!(world.net.arp_entries(t.r0).iter().all(|e| e.addr != t.h1_addr));
    assert!(world.net.arp_entries(t.h1).is_empty());
}

#[test]
fn forwarded_packet_loses_one_ttl() {
    let mut world = NetWorld::default();
    let mut sim = Simulator::default();
    let t = build_routed(&mut world);
    world.net.ping(t.h0, t.h1_addr, Some(2), None, &mut sim);
    run_ms(&mut sim, &mut world, 3_000);

    world.net.enable_trace();
    let echo = IcmpPacket::echo_request(9, 9, vec![]);
    let pkt = Ipv4Packet::new(t.h0_addr, t.h1_addr, IpProtocol::ICMP, 2, echo.encode());
    assert_eq!(world.net.try_encapsulate_and_send(t.h0, pkt, &mut sim), SendOutcome::Sent);
    run_ms(&mut sim, &mut world, 100);

    // 路由器减一后仍为 1，照常交付给 h1
    let log = world.net.trace.as_ref().expect("trace enabled");
    let at_h1 = log.count(|k| {
        matches!(k, TraceEventKind::FrameRx { iface, ethertype, .. }
            if *iface == t.h1_iface && *ethertype == EtherType::IPV4)
    });
    assert_eq!(at_h1, 1);
    assert_eq!(world.net.stats.icmp_errors, 1, "only the first ping's host-unreachable");
}

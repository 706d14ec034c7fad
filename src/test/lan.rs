use std::sync::{Arc, Mutex};

use crate::addr::{DeviceId, Ipv4Address, MacAddr, Prefix, Subnet};
use crate::net::{EchoCallback, EchoResult, Layer, NetWorld, PingEvent, SendOutcome};
use crate::sim::{SimTime, Simulator};
use crate::topo::{build_lan, LanOpts};
use crate::trace::{DropReason, TraceEventKind};
use crate::wire::icmp::{self, IcmpPacket};
use crate::wire::{EtherType, EthernetFrame, IpProtocol, Ipv4Packet};

fn run_ms(sim: &mut Simulator, world: &mut NetWorld, ms: u64) {
    let until = sim.now().saturating_add(SimTime::from_millis(ms));
    sim.run_until(until, world);
}

fn echo_slot() -> (Arc<Mutex<Option<EchoResult>>>, EchoCallback) {
    let slot = Arc::new(Mutex::new(None));
    let out = Arc::clone(&slot);
    let cb: EchoCallback = Box::new(move |r: EchoResult| {
        *out.lock().expect("echo slot") = Some(r);
    });
    (slot, cb)
}

fn loopback_of(world: &NetWorld, dev: DeviceId) -> MacAddr {
    world
        .net
        .interfaces(dev)
        .into_iter()
        .find(|i| i.loopback)
        .map(|i| i.mac)
        .expect("loopback interface")
}

#[test]
fn ping_across_switch_resolves_arp_both_ways() {
    let mut world = NetWorld::default();
    let mut sim = Simulator::default();
    let lan = build_lan(&mut world, &LanOpts::default());
    let (h0, h1) = (lan.hosts[0], lan.hosts[1]);

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let ping = world.net.ping(
        h0,
        lan.host_addrs[1],
        Some(1),
        Some(Box::new(move |ev: &PingEvent| sink.lock().expect("events").push(ev.clone()))),
        &mut sim,
    );
    run_ms(&mut sim, &mut world, 3_000);

    let summary = world.net.ping_summary(h0, ping).expect("ping finished");
    assert_eq!((summary.sent, summary.received, summary.lost()), (1, 1, 0));
    assert_eq!(world.net.stats.icmp_errors, 0);

    let arp0 = world.net.arp_entries(h0);
    assert!(arp0.iter().any(|e| e.addr == lan.host_addrs[1] && e.remote == lan.host_ifaces[1]));
    let arp1 = world.net.arp_entries(h1);
    assert!(arp1.iter().any(|e| e.addr == lan.host_addrs[0] && e.remote == lan.host_ifaces[0]));

    let events = events.lock().expect("events");
    assert_eq!(events.len(), 2);
    match &events[0] {
        PingEvent::Echo { seq: 1, result: EchoResult::Reply { from, .. } } => assert_eq!(*from, lan.host_addrs[1]),
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(events[1], PingEvent::Finished(s) if s.received == 1));
}

#[test]
fn switch_learns_both_hosts() {
    let mut world = NetWorld::default();
    let mut sim = Simulator::default();
    let lan = build_lan(&mut world, &LanOpts::default());
    world.net.ping(lan.hosts[0], lan.host_addrs[1], Some(1), None, &mut sim);
    run_ms(&mut sim, &mut world, 2_000);

    let fib = world.net.fib_entries(lan.switch);
    let learned: Vec<MacAddr> = fib.iter().map(|e| e.destination).collect();
    assert!(learned.contains(&lan.host_ifaces[0]));
    assert!(learned.contains(&lan.host_ifaces[1]));
    assert!(fib.iter().all(|e| e.destination != e.egress));
}

#[test]
fn echo_to_own_address_uses_loopback() {
    let mut world = NetWorld::default();
    let mut sim = Simulator::default();
    let lan = build_lan(&mut world, &LanOpts::default());
    let h0 = lan.hosts[0];

    for dst in [lan.host_addrs[0], Ipv4Address::LOOPBACK] {
        let (slot, cb) = echo_slot();
        world.net.icmp_echo(h0, dst, None, cb, &mut sim);
        run_ms(&mut sim, &mut world, 100);
        match slot.lock().expect("slot").take() {
            Some(EchoResult::Reply { from, rtt }) => {
                assert_eq!(from, dst);
                assert_eq!(rtt, SimTime::ZERO);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(world.net.stats.arp_requests, 0);
}

#[test]
fn echo_to_absent_host_times_out_after_one_arp_request() {
    let mut world = NetWorld::default();
    let mut sim = Simulator::default();
    let lan = build_lan(&mut world, &LanOpts::default());

    let (slot, cb) = echo_slot();
    world
        .net
        .icmp_echo(lan.hosts[0], Ipv4Address::new(10, 0, 0, 99), None, cb, &mut sim);
    run_ms(&mut sim, &mut world, 999);
    assert!(slot.lock().expect("slot").is_none());
    run_ms(&mut sim, &mut world, 2);
    assert_eq!(*slot.lock().expect("slot"), Some(EchoResult::Timeout));
    assert_eq!(world.net.stats.arp_requests, 1);
    assert_eq!(world.net.stats.icmp_errors, 0);
}

#[test]
fn unreachable_destination_reports_to_own_source() {
    let mut world = NetWorld::default();
    let mut sim = Simulator::default();
    let lan = build_lan(
        &mut world,
        &LanOpts {
            hosts: 1,
            gateway: None,
            ..LanOpts::default()
        },
    );
    let h0 = lan.hosts[0];
    let me = lan.host_addrs[0];
    let lo = loopback_of(&world, h0);
    world.net.enable_trace();

    let (slot, cb) = echo_slot();
    world.net.icmp_echo(h0, Ipv4Address::new(203, 0, 113, 5), None, cb, &mut sim);
    run_ms(&mut sim, &mut world, 10);

    assert_eq!(
        *slot.lock().expect("slot"),
        Some(EchoResult::Failed { outcome: SendOutcome::NetUnreachable })
    );
    assert_eq!(world.net.stats.icmp_errors, 1);

    let log = world.net.trace.as_ref().expect("trace enabled");
    let errors: Vec<_> = log
        .events
        .iter()
        .filter_map(|e| match &e.kind {
            TraceEventKind::IcmpError { dst, icmp_type, code } => Some((*dst, *icmp_type, *code)),
            _ => None,
        })
        .collect();
    assert_eq!(errors, vec![(me, icmp::UNREACHABLE, icmp::CODE_NET_UNREACHABLE)]);
    let looped = log.count(|k| {
        matches!(k, TraceEventKind::FrameRx { iface, ethertype, .. } if *iface == lo && *ethertype == EtherType::IPV4)
    });
    assert_eq!(looped, 1);
}

#[test]
fn icmp_errors_are_not_answered_with_errors() {
    let mut world = NetWorld::default();
    let mut sim = Simulator::default();
    let lan = build_lan(
        &mut world,
        &LanOpts {
            hosts: 1,
            gateway: None,
            ..LanOpts::default()
        },
    );
    let me = lan.host_addrs[0];
    let quoted = Ipv4Packet::new(me, Ipv4Address::new(198, 51, 100, 1), IpProtocol::UDP, 64, vec![0; 8]);
    let err = IcmpPacket::error(icmp::UNREACHABLE, icmp::CODE_HOST_UNREACHABLE, &quoted);
    let pkt = Ipv4Packet::new(me, Ipv4Address::new(203, 0, 113, 5), IpProtocol::ICMP, 64, err.encode());

    let outcome = world.net.try_encapsulate_and_send(lan.hosts[0], pkt, &mut sim);
    assert_eq!(outcome, SendOutcome::NetUnreachable);
    assert_eq!(world.net.stats.icmp_errors, 0);
}

#[test]
fn zero_ttl_is_rejected_before_routing() {
    let mut world = NetWorld::default();
    let mut sim = Simulator::default();
    let lan = build_lan(&mut world, &LanOpts::default());
    let pkt = Ipv4Packet::new(lan.host_addrs[0], lan.host_addrs[1], IpProtocol::UDP, 0, vec![1, 2, 3]);
    let outcome = world.net.try_encapsulate_and_send(lan.hosts[0], pkt, &mut sim);
    assert_eq!(outcome, SendOutcome::TimeExceeded);
    assert_eq!(world.net.stats.icmp_errors, 1);
    assert_eq!(world.net.stats.arp_requests, 0);
}

#[test]
fn disabled_interface_blocks_the_link() {
    let mut world = NetWorld::default();
    let mut sim = Simulator::default();
    let lan = build_lan(&mut world, &LanOpts::default());
    world.net.set_interface_enabled(lan.host_ifaces[1], false);
    let port = world.net.neighbor(lan.host_ifaces[1]).expect("switch port");
    assert!(!world.net.is_active(port));

    let ping = world.net.ping(lan.hosts[0], lan.host_addrs[1], Some(1), None, &mut sim);
    run_ms(&mut sim, &mut world, 3_000);
    let summary = world.net.ping_summary(lan.hosts[0], ping).expect("ping finished");
    assert_eq!((summary.sent, summary.received), (1, 0));
}

#[test]
fn vlans_split_the_broadcast_domain() {
    let mut world = NetWorld::default();
    let mut sim = Simulator::default();
    let lan = build_lan(
        &mut world,
        &LanOpts {
            hosts: 3,
            ..LanOpts::default()
        },
    );
    let isolated_port = world.net.neighbor(lan.host_ifaces[2]).expect("port");
    world.net.set_vlan(isolated_port, 10);

    let domain = world.net.broadcast_domain(lan.host_ifaces[0]);
    assert!(domain.contains(&lan.host_ifaces[1]));
    assert!(!domain.contains(&lan.host_ifaces[2]));
    assert!(!domain.contains(&isolated_port));
    assert_eq!(domain.len(), 4);

    let ping = world.net.ping(lan.hosts[0], lan.host_addrs[2], Some(1), None, &mut sim);
    run_ms(&mut sim, &mut world, 2_000);
    assert_eq!(world.net.ping_summary(lan.hosts[0], ping).map(|s| s.received), Some(0));
}

#[test]
fn unbounded_ping_runs_until_stopped() {
    let mut world = NetWorld::default();
    let mut sim = Simulator::default();
    let lan = build_lan(&mut world, &LanOpts::default());
    let ping = world.net.ping(lan.hosts[0], lan.host_addrs[1], None, None, &mut sim);
    run_ms(&mut sim, &mut world, 3_500);
    assert!(world.net.ping_summary(lan.hosts[0], ping).is_none());

    let summary = world.net.stop_ping(lan.hosts[0], ping).expect("running ping");
    assert_eq!(summary.sent, 4);
    assert_eq!(summary.received, 4);
    assert!(world.net.ping_summary(lan.hosts[0], ping).is_none(), "already returned by stop");
}

#[test]
fn finished_ping_summary_is_taken_once() {
    let mut world = NetWorld::default();
    let mut sim = Simulator::default();
    let lan = build_lan(&mut world, &LanOpts::default());
    let ping = world.net.ping(lan.hosts[0], lan.host_addrs[1], Some(2), None, &mut sim);
    run_ms(&mut sim, &mut world, 3_000);

    let summary = world.net.ping_summary(lan.hosts[0], ping).expect("ping finished");
    assert_eq!((summary.sent, summary.received), (2, 2));
    assert!(world.net.ping_summary(lan.hosts[0], ping).is_none());
    assert!(world.net.stop_ping(lan.hosts[0], ping).is_none());
}

#[test]
fn readdressing_drops_routes_through_old_address() {
    let mut world = NetWorld::default();
    let lan = build_lan(&mut world, &LanOpts::default());
    let h0 = lan.hosts[0];
    assert_eq!(world.net.routes(h0).len(), 1);

    world
        .net
        .configure_interface(lan.host_ifaces[0], Ipv4Address::new(10, 0, 0, 11), Prefix::new(24));
    assert!(world.net.routes(h0).is_empty());
    let info = world.net.interface_info(lan.host_ifaces[0]);
    assert_eq!(info.addr, Some(Ipv4Address::new(10, 0, 0, 11)));
}

#[test]
fn static_route_distance_defaults_from_config() {
    let mut world = NetWorld::default();
    let lan = build_lan(&mut world, &LanOpts::default());
    let h0 = lan.hosts[0];
    let dest: Subnet = "192.168.0.0/16".parse().expect("subnet");
    let gw = Ipv4Address::new(10, 0, 0, 1);
    assert!(world.net.set_route(h0, dest, gw, lan.host_addrs[0], None));
    assert!(!world.net.set_route(h0, dest, gw, lan.host_addrs[0], Some(1)));
    assert!(world.net.delete_route(h0, dest, gw, lan.host_addrs[0], None));
    assert!(!world.net.delete_route(h0, dest, gw, lan.host_addrs[0], None));
}

#[test]
fn bridging_interfaces_are_listed_by_layer() {
    let mut world = NetWorld::default();
    let lan = build_lan(&mut world, &LanOpts::default());
    assert_eq!(world.net.bridging_interfaces(lan.switch).len(), 2);
    assert!(world.net.routing_interfaces(lan.switch).is_empty());
    let host = world.net.routing_interfaces(lan.hosts[0]);
    assert_eq!(host.len(), 2, "physical + loopback");
    assert!(host.iter().all(|i| i.layer == Layer::Routing));
}

#[test]
fn switch_filters_frame_back_to_its_ingress_port() {
    let mut world = NetWorld::default();
    let mut sim = Simulator::default();
    let lan = build_lan(&mut world, &LanOpts::default());
    world.net.ping(lan.hosts[0], lan.host_addrs[1], Some(1), None, &mut sim);
    run_ms(&mut sim, &mut world, 1_500);

    let h0 = lan.host_ifaces[0];
    let port = world.net.neighbor(h0).expect("h0 is cabled");
    world.net.enable_trace();
    let frame = EthernetFrame::new(h0, MacAddr([0x02, 0, 0, 0, 0, 0x77]), EtherType::IPV4, vec![0; 46]);
    world.net.deliver(port, frame.encode(), &mut sim);
    run_ms(&mut sim, &mut world, 10);

    let log = world.net.trace.as_ref().expect("trace enabled");
    assert_eq!(
        log.count(|k| matches!(k, TraceEventKind::FrameDrop { iface, reason: DropReason::SamePort } if *iface == port)),
        1
    );
    assert_eq!(log.count(|k| matches!(k, TraceEventKind::FrameTx { .. })), 0);
}

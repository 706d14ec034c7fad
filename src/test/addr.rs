use crate::addr::{AddrParseError, DeviceId, Ipv4Address, MacAddr, Prefix, Subnet};

#[test]
fn mac_parses_colon_and_dash_forms() {
    let a: MacAddr = "02:00:5e:10:00:01".parse().expect("mac");
    let b: MacAddr = "02-00-5E-10-00-01".parse().expect("mac");
    assert_eq!(a, b);
    assert_eq!(a.to_string(), "02:00:5e:10:00:01");
    assert_eq!(MacAddr::from_u64(a.to_u64()), a);
}

#[test]
fn mac_rejects_wrong_shapes() {
    for bad in ["", "02:00:5e:10:00", "02:00:5e:10:00:01:02", "2:00:5e:10:00:01", "zz:00:5e:10:00:01"] {
        assert_eq!(bad.parse::<MacAddr>(), Err(AddrParseError::Mac(bad.to_string())));
    }
}

#[test]
fn special_macs() {
    assert!(MacAddr::BROADCAST.is_broadcast());
    assert!(MacAddr::LOOPBACK.is_loopback());
    assert!(!MacAddr::BROADCAST.is_loopback());
}

#[test]
fn ipv4_inc_saturates_at_broadcast() {
    let a = Ipv4Address::new(10, 0, 0, 255);
    assert_eq!(a.inc(), Ipv4Address::new(10, 0, 1, 0));
    assert_eq!(Ipv4Address::BROADCAST.inc(), Ipv4Address::BROADCAST);
}

#[test]
fn ipv4_mask_and_directed_broadcast() {
    let a = Ipv4Address::new(192, 168, 7, 42);
    assert_eq!(a.mask(Prefix::new(24)), Ipv4Address::new(192, 168, 7, 0));
    assert_eq!(a.broadcast_of(Prefix::new(24)), Ipv4Address::new(192, 168, 7, 255));
    assert_eq!(a.mask(Prefix::ANY), Ipv4Address::UNSPECIFIED);
    assert_eq!(a.mask(Prefix::HOST), a);
}

#[test]
fn prefix_from_contiguous_mask() {
    assert_eq!(Prefix::from_mask(Ipv4Address::new(255, 255, 255, 0)), Prefix::new(24));
    assert_eq!(Prefix::from_mask(Ipv4Address::new(255, 255, 240, 0)), Prefix::new(20));
    assert_eq!(Prefix::from_mask(Ipv4Address::UNSPECIFIED), Prefix::ANY);
    assert_eq!(Prefix::from_mask(Ipv4Address::BROADCAST), Prefix::HOST);
    assert!(Prefix::ANY.is_empty());
    assert!(!Prefix::new(24).is_empty());
}

#[test]
fn prefix_from_non_contiguous_mask_is_host() {
    assert_eq!(Prefix::from_mask(Ipv4Address::new(255, 0, 255, 0)), Prefix::HOST);
    assert_eq!(Prefix::from_mask(Ipv4Address::new(0, 0, 0, 255)), Prefix::HOST);
}

#[test]
fn prefix_mask_round_trips_through_address() {
    for len in 0..=32u8 {
        let p = Prefix::new(len);
        assert_eq!(Prefix::from_mask(p.mask()), p);
    }
}

#[test]
fn subnet_normalises_host_bits() {
    let s: Subnet = "10.1.2.3/16".parse().expect("subnet");
    assert_eq!(s.network(), Ipv4Address::new(10, 1, 0, 0));
    assert_eq!(s.to_string(), "10.1.0.0/16");
    assert!(s.contains(Ipv4Address::new(10, 1, 255, 1)));
    assert!(!s.contains(Ipv4Address::new(10, 2, 0, 1)));
    assert_eq!(s.broadcast(), Ipv4Address::new(10, 1, 255, 255));
    assert!(Subnet::default_route().contains(Ipv4Address::new(203, 0, 113, 5)));
}

#[test]
fn subnet_rejects_bad_input() {
    assert!("10.0.0.0".parse::<Subnet>().is_err());
    assert!("10.0.0.0/33".parse::<Subnet>().is_err());
    assert!("10.0.0/8".parse::<Subnet>().is_err());
}

#[test]
fn device_id_clamps_into_range() {
    assert_eq!(DeviceId::new(0).get(), DeviceId::MIN);
    assert_eq!(DeviceId::new(u64::MAX).get(), DeviceId::MAX);
    assert_eq!(DeviceId::new(42).get(), 42);
    assert!(DeviceId::new(3) < DeviceId::new(10));
}

#[test]
fn addresses_serialize_as_strings() {
    let a = Ipv4Address::new(10, 0, 0, 1);
    assert_eq!(serde_json::to_string(&a).expect("json"), "\"10.0.0.1\"");
    let back: Ipv4Address = serde_json::from_str("\"10.0.0.1\"").expect("json");
    assert_eq!(back, a);
    let s: Subnet = serde_json::from_str("\"172.16.0.0/12\"").expect("json");
    assert_eq!(s.prefix(), Prefix::new(12));
}

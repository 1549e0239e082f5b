use lan_sweep::error::ConfigurationError;
use lan_sweep::netdetect::{enumerate_targets, ipv4_to_default_cidr};
use lan_sweep::types::TargetMode;
use std::net::Ipv4Addr;

#[test]
fn default_cidr_is_24() {
    let cidr = ipv4_to_default_cidr(Ipv4Addr::new(192, 168, 42, 99));
    assert_eq!(cidr.to_string(), "192.168.42.0/24");
}

#[test]
fn cidr_30_excludes_network_and_broadcast() {
    assert_eq!(
        enumerate_targets(&TargetMode::Cidr("10.0.0.0/30".into())).unwrap(),
        vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)]
    );
}

#[test]
fn cidr_24_has_254_hosts() {
    let hosts = enumerate_targets(&TargetMode::Cidr("192.168.1.0/24".into())).unwrap();
    assert_eq!(hosts.len(), 254);
    assert_eq!(hosts.first(), Some(&Ipv4Addr::new(192, 168, 1, 1)));
    assert_eq!(hosts.last(), Some(&Ipv4Addr::new(192, 168, 1, 254)));
}

#[test]
fn reversed_range_is_swapped_and_inclusive() {
    let hosts = enumerate_targets(&TargetMode::Range(
        "192.168.1.20".into(),
        "192.168.1.10".into(),
    ))
    .unwrap();
    assert_eq!(hosts.len(), 11);
    assert_eq!(hosts[0], Ipv4Addr::new(192, 168, 1, 10));
    assert_eq!(hosts[10], Ipv4Addr::new(192, 168, 1, 20));
    assert!(hosts.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn enumeration_is_deterministic() {
    let mode = TargetMode::Cidr("10.20.0.0/22".into());
    assert_eq!(enumerate_targets(&mode).unwrap(), enumerate_targets(&mode).unwrap());
}

#[test]
fn malformed_cidr_is_configuration_error() {
    let err = enumerate_targets(&TargetMode::Cidr("192.168.1.0/33".into())).unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidCidr { .. }));
    let err = enumerate_targets(&TargetMode::Cidr("not-a-network".into())).unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidCidr { .. }));
}

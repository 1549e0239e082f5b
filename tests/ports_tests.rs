use lan_sweep::error::ConfigurationError;
use lan_sweep::ports::{parse_ports_str, resolve_ports};
use lan_sweep::types::PortSpec;

#[test]
fn custom_list_with_range() {
    let ports = resolve_ports(&PortSpec::CustomList("80,443,1000-1002".into())).expect("parse ok");
    assert_eq!(ports, vec![80, 443, 1000, 1001, 1002]);
}

#[test]
fn out_of_range_port_rejected() {
    let err = resolve_ports(&PortSpec::CustomList("70000".into())).unwrap_err();
    assert!(matches!(err, ConfigurationError::PortOutOfRange { ref token } if token == "70000"));
}

#[test]
fn zero_port_rejected() {
    assert!(parse_ports_str("0").is_err());
}

#[test]
fn range_up_to_limit() {
    let ports = resolve_ports(&PortSpec::RangeUpTo(1024)).unwrap();
    assert_eq!(ports.first(), Some(&1));
    assert_eq!(ports.last(), Some(&1024));
    assert_eq!(ports.len(), 1024);
    assert!(resolve_ports(&PortSpec::RangeUpTo(70000)).is_err());
}

#[test]
fn empty_custom_list_is_empty_set() {
    assert!(resolve_ports(&PortSpec::CustomList(" , ".into())).unwrap().is_empty());
}

use lan_sweep::export::{csv_string, write_csv_file, HostFilter, CSV_HEADER};
use lan_sweep::session::ResultTable;
use lan_sweep::types::{HostResult, ScanEvent};
use std::net::Ipv4Addr;

fn table() -> ResultTable {
    let mut t = ResultTable::new();
    let a = Ipv4Addr::new(192, 168, 0, 10);
    let b = Ipv4Addr::new(192, 168, 0, 2);
    t.apply(&ScanEvent::HostDiscovered { ip: a, alive: true });
    t.apply(&ScanEvent::PortsUpdated {
        ip: a,
        open_ports: vec![443, 22],
    });
    t.apply(&ScanEvent::HostnameUpdated {
        ip: a,
        hostname: "nas.lan".into(),
    });
    t.apply(&ScanEvent::HostDiscovered { ip: b, alive: false });
    t
}

#[test]
fn rows_are_in_address_order_with_sorted_ports() {
    let out = csv_string(table().hosts(), HostFilter::All).unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines[0], CSV_HEADER.join(","));
    assert_eq!(lines[1], "192.168.0.2,No,,");
    assert_eq!(lines[2], "192.168.0.10,Yes,\"22,443\",nas.lan");
    assert_eq!(lines.len(), 3);
}

#[test]
fn open_ports_filter_drops_quiet_hosts() {
    let out = csv_string(table().hosts(), HostFilter::WithOpenPorts).unwrap();
    assert_eq!(out.lines().count(), 2);
    assert!(out.contains("nas.lan"));
}

#[test]
fn file_export_round_trips_through_csv_reader() {
    let path = std::env::temp_dir().join(format!("lan-sweep-export-{}.csv", std::process::id()));
    let hosts: Vec<HostResult> = table().into_hosts();
    write_csv_file(&path, &hosts, HostFilter::Alive).unwrap();

    let mut rdr = csv::Reader::from_path(&path).unwrap();
    let rows: Vec<csv::StringRecord> = rdr.records().map(Result::unwrap).collect();
    std::fs::remove_file(&path).ok();

    assert_eq!(rows.len(), 1);
    assert_eq!(&rows[0][0], "192.168.0.10");
    assert_eq!(&rows[0][2], "22,443");
}

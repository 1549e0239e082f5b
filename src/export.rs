use anyhow::{Context, Result};
use clap::ValueEnum;
use csv::Writer;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::types::{HostResult, ScanReport};

pub const CSV_HEADER: [&str; 4] = ["IP", "Alive", "Open Ports", "Hostname"];

/// Which hosts a table or export shows.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum HostFilter {
    #[default]
    All,
    Alive,
    WithOpenPorts,
}

impl HostFilter {
    pub fn matches(self, host: &HostResult) -> bool {
        match self {
            Self::All => true,
            Self::Alive => host.alive,
            Self::WithOpenPorts => !host.open_ports.is_empty(),
        }
    }
}

/// Write one CSV row per host passing `filter`.
pub fn write_csv<'a, W: Write>(
    writer: W,
    hosts: impl IntoIterator<Item = &'a HostResult>,
    filter: HostFilter,
) -> Result<()> {
    let mut wtr = Writer::from_writer(writer);
    wtr.write_record(CSV_HEADER)?;
    for host in hosts.into_iter().filter(|h| filter.matches(h)) {
        wtr.write_record([
            host.ip.to_string().as_str(),
            if host.alive { "Yes" } else { "No" },
            host.ports_joined().as_str(),
            host.hostname.as_str(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn csv_string<'a>(
    hosts: impl IntoIterator<Item = &'a HostResult>,
    filter: HostFilter,
) -> Result<String> {
    let mut buf = Vec::new();
    write_csv(&mut buf, hosts, filter)?;
    String::from_utf8(buf).context("csv output was not utf-8")
}

pub fn write_csv_file(path: &Path, hosts: &[HostResult], filter: HostFilter) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_csv(BufWriter::new(file), hosts, filter)
}

pub fn write_report_json(path: &Path, report: &ScanReport) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut w = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut w, report)?;
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn filters() {
        let mut h = HostResult::new(Ipv4Addr::new(10, 0, 0, 1));
        assert!(HostFilter::All.matches(&h));
        assert!(!HostFilter::Alive.matches(&h));
        h.alive = true;
        assert!(HostFilter::Alive.matches(&h));
        assert!(!HostFilter::WithOpenPorts.matches(&h));
        h.open_ports.insert(22);
        assert!(HostFilter::WithOpenPorts.matches(&h));
    }
}

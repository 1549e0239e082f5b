use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Which hosts a scan covers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum TargetMode {
    /// The /24 around the outward-facing local IPv4 address.
    LocalSubnet,
    /// A network in CIDR notation, e.g. `192.168.1.0/24`.
    Cidr(String),
    /// An inclusive start/end IPv4 range; endpoints are swapped if reversed.
    Range(String, String),
}

/// Which TCP ports a scan covers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum PortSpec {
    CommonPorts,
    /// Every port from 1 to `n` inclusive.
    RangeUpTo(u32),
    /// Comma separated ports and `a-b` ranges.
    CustomList(String),
}

/// How host reachability is decided during discovery.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStrategy {
    /// Use the platform ping binary when it works, else fall back to TCP connects.
    #[default]
    Auto,
    Ping,
    Connect,
}

/// Immutable description of one scan. Built once per session and shared
/// read-only with every worker.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfiguration {
    pub mode: TargetMode,
    pub port_spec: PortSpec,
    pub ping_first: bool,
    pub resolve_dns: bool,
    pub host_concurrency: usize,
    pub port_concurrency: usize,
    pub tcp_timeout: Duration,
    pub ping_timeout: Duration,
    pub probe: ProbeStrategy,
    /// Port-scan hosts whose reachability probe failed.
    pub scan_unresponsive: bool,
    /// How long finished scans wait for outstanding hostname lookups.
    pub resolve_grace: Duration,
}

/// Everything known about one host in a session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HostResult {
    pub ip: Ipv4Addr,
    pub alive: bool,
    pub open_ports: BTreeSet<u16>,
    pub hostname: String,
}

impl HostResult {
    pub fn new(ip: Ipv4Addr) -> Self {
        Self {
            ip,
            alive: false,
            open_ports: BTreeSet::new(),
            hostname: String::new(),
        }
    }

    /// Open ports rendered as a comma-joined ascending list.
    pub fn ports_joined(&self) -> String {
        self.open_ports
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Discovering,
    PortScanning,
}

/// Progress counters for the current phase.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanProgress {
    pub phase: ScanPhase,
    pub done: u64,
    pub total: u64,
}

impl ScanProgress {
    pub fn start(phase: ScanPhase, total: u64) -> Self {
        Self {
            phase,
            done: 0,
            total,
        }
    }
}

/// Session lifecycle.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    #[default]
    Idle,
    Discovering,
    PortScanning,
    Resolving,
    Completed,
    Stopped,
    Failed,
}

impl ScanState {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Failed)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "reason", content = "message")]
pub enum FinishReason {
    Completed,
    Stopped,
    Error(String),
}

impl FinishReason {
    pub fn state(&self) -> ScanState {
        match self {
            Self::Completed => ScanState::Completed,
            Self::Stopped => ScanState::Stopped,
            Self::Error(_) => ScanState::Failed,
        }
    }
}

/// Events delivered to a result sink, in the order the session applied them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ScanEvent {
    HostDiscovered { ip: Ipv4Addr, alive: bool },
    PortsUpdated { ip: Ipv4Addr, open_ports: Vec<u16> },
    HostnameUpdated { ip: Ipv4Addr, hostname: String },
    ProgressUpdated(ScanProgress),
    ScanFinished { reason: FinishReason },
}

/// Point-in-time view of a running session.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: ScanState,
    pub progress: Option<ScanProgress>,
}

/// Final state of a finished session.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ScanReport {
    pub reason: FinishReason,
    pub started_at: String,
    pub finished_at: String,
    pub progress: Option<ScanProgress>,
    pub hosts: Vec<HostResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_join_ascending() {
        let mut h = HostResult::new(Ipv4Addr::new(10, 0, 0, 1));
        h.open_ports.extend([443, 22, 80]);
        assert_eq!(h.ports_joined(), "22,80,443");
    }

    #[test]
    fn finish_reason_maps_to_terminal_state() {
        assert_eq!(FinishReason::Completed.state(), ScanState::Completed);
        assert_eq!(FinishReason::Stopped.state(), ScanState::Stopped);
        assert!(FinishReason::Error("boom".into()).state().is_finished());
        assert!(!ScanState::Resolving.is_finished());
    }

    #[test]
    fn events_serialize_tagged() {
        let ev = ScanEvent::HostDiscovered {
            ip: Ipv4Addr::new(192, 168, 1, 7),
            alive: true,
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert_eq!(json, r#"{"type":"host_discovered","ip":"192.168.1.7","alive":true}"#);
    }
}

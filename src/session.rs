//! Session state and the single consumer that owns it.
//!
//! Workers never touch host results. They send [`SessionUpdate`]s over one
//! channel; [`deliver`] applies them one at a time and forwards the resulting
//! [`ScanEvent`]s to the sink, so the sink sees a serialized history.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::export::HostFilter;
use crate::sink::ResultSink;
use crate::types::{
    FinishReason, HostResult, ScanEvent, ScanPhase, ScanProgress, ScanState, SessionStatus,
};

/// Messages from workers and the phase driver to the delivery consumer.
#[derive(Debug, Clone)]
pub(crate) enum SessionUpdate {
    PhaseStarted { phase: ScanPhase, total: u64 },
    HostProbed { ip: Ipv4Addr, alive: bool },
    PortFound { ip: Ipv4Addr, port: u16 },
    HostnameResolved { ip: Ipv4Addr, hostname: String },
    ProgressAdvanced,
    Resolving,
    Finished(FinishReason),
}

/// Host results keyed by address, iterated in ascending address order.
///
/// Keeps `alive == probe succeeded || has open ports` true after every update.
#[derive(Debug, Clone, Default)]
pub struct ResultTable {
    hosts: BTreeMap<Ipv4Addr, HostResult>,
}

/// Effect of recording an open port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortChange {
    pub inserted: bool,
    /// The host was not alive before this port.
    pub became_alive: bool,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn get(&self, ip: Ipv4Addr) -> Option<&HostResult> {
        self.hosts.get(&ip)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &HostResult> {
        self.hosts.values()
    }

    /// Hosts passing `filter`, ascending by address.
    pub fn rows(&self, filter: HostFilter) -> Vec<HostResult> {
        self.hosts().filter(|h| filter.matches(h)).cloned().collect()
    }

    pub fn clear(&mut self) {
        self.hosts.clear();
    }

    fn entry(&mut self, ip: Ipv4Addr) -> &mut HostResult {
        self.hosts.entry(ip).or_insert_with(|| HostResult::new(ip))
    }

    /// Record a reachability verdict; returns the effective `alive` flag.
    pub fn record_probe(&mut self, ip: Ipv4Addr, probe_alive: bool) -> bool {
        let host = self.entry(ip);
        host.alive = probe_alive || !host.open_ports.is_empty();
        host.alive
    }

    pub fn add_port(&mut self, ip: Ipv4Addr, port: u16) -> PortChange {
        let host = self.entry(ip);
        let inserted = host.open_ports.insert(port);
        let became_alive = !host.alive;
        host.alive = true;
        PortChange {
            inserted,
            became_alive,
        }
    }

    /// Returns false when the name is empty or unchanged.
    pub fn set_hostname(&mut self, ip: Ipv4Addr, hostname: &str) -> bool {
        let host = self.entry(ip);
        if hostname.is_empty() || host.hostname == hostname {
            return false;
        }
        host.hostname = hostname.to_string();
        true
    }

    /// Fold a delivered event into the table. Lets sinks rebuild the same
    /// view the session holds.
    pub fn apply(&mut self, event: &ScanEvent) {
        match event {
            ScanEvent::HostDiscovered { ip, alive } => {
                self.record_probe(*ip, *alive);
            }
            ScanEvent::PortsUpdated { ip, open_ports } => {
                for &port in open_ports {
                    self.add_port(*ip, port);
                }
            }
            ScanEvent::HostnameUpdated { ip, hostname } => {
                self.set_hostname(*ip, hostname);
            }
            ScanEvent::ProgressUpdated(_) | ScanEvent::ScanFinished { .. } => {}
        }
    }

    pub fn into_hosts(self) -> Vec<HostResult> {
        self.hosts.into_values().collect()
    }
}

/// What the consumer hands back once the session is frozen.
#[derive(Debug)]
pub(crate) struct Delivered {
    pub reason: FinishReason,
    pub table: ResultTable,
    pub progress: Option<ScanProgress>,
}

struct Session<S> {
    table: ResultTable,
    progress: Option<ScanProgress>,
    state: ScanState,
    sink: S,
    status: watch::Sender<SessionStatus>,
}

impl<S: ResultSink> Session<S> {
    async fn emit(&mut self, event: ScanEvent) {
        self.sink.on_event(&event).await;
    }

    fn publish(&self) {
        self.status.send_replace(SessionStatus {
            state: self.state,
            progress: self.progress,
        });
    }

    /// Apply one update. Returns the finish reason once the session freezes.
    async fn apply(&mut self, update: SessionUpdate) -> Option<FinishReason> {
        match update {
            SessionUpdate::PhaseStarted { phase, total } => {
                let progress = ScanProgress::start(phase, total);
                self.state = match phase {
                    ScanPhase::Discovering => ScanState::Discovering,
                    ScanPhase::PortScanning => ScanState::PortScanning,
                };
                self.progress = Some(progress);
                self.publish();
                self.emit(ScanEvent::ProgressUpdated(progress)).await;
            }
            SessionUpdate::HostProbed { ip, alive } => {
                let alive = self.table.record_probe(ip, alive);
                self.emit(ScanEvent::HostDiscovered { ip, alive }).await;
            }
            SessionUpdate::PortFound { ip, port } => {
                let change = self.table.add_port(ip, port);
                if !change.inserted {
                    return None;
                }
                if change.became_alive {
                    self.emit(ScanEvent::HostDiscovered { ip, alive: true }).await;
                }
                let open_ports = self
                    .table
                    .get(ip)
                    .map(|h| h.open_ports.iter().copied().collect())
                    .unwrap_or_default();
                self.emit(ScanEvent::PortsUpdated { ip, open_ports }).await;
            }
            SessionUpdate::HostnameResolved { ip, hostname } => {
                if self.table.set_hostname(ip, &hostname) {
                    self.emit(ScanEvent::HostnameUpdated { ip, hostname }).await;
                }
            }
            SessionUpdate::ProgressAdvanced => {
                let Some(progress) = self.progress.as_mut() else {
                    return None;
                };
                if progress.done < progress.total {
                    progress.done += 1;
                    let snapshot = *progress;
                    self.publish();
                    self.emit(ScanEvent::ProgressUpdated(snapshot)).await;
                }
            }
            SessionUpdate::Resolving => {
                self.state = ScanState::Resolving;
                self.publish();
            }
            SessionUpdate::Finished(reason) => {
                self.state = reason.state();
                self.publish();
                self.emit(ScanEvent::ScanFinished {
                    reason: reason.clone(),
                })
                .await;
                return Some(reason);
            }
        }
        None
    }
}

/// Drain the update channel until the session finishes.
///
/// Nothing is applied or emitted after `Finished`; the sink is dropped when
/// this returns, and late updates from stragglers are discarded with the
/// receiver.
pub(crate) async fn deliver<S: ResultSink>(
    mut updates: mpsc::Receiver<SessionUpdate>,
    sink: S,
    status: watch::Sender<SessionStatus>,
) -> Delivered {
    let mut session = Session {
        table: ResultTable::new(),
        progress: None,
        state: ScanState::Idle,
        sink,
        status,
    };

    let reason = loop {
        match updates.recv().await {
            Some(update) => {
                if let Some(reason) = session.apply(update).await {
                    break reason;
                }
            }
            None => {
                let reason =
                    FinishReason::Error("update channel closed before the scan finished".into());
                session.state = reason.state();
                session.publish();
                session
                    .emit(ScanEvent::ScanFinished {
                        reason: reason.clone(),
                    })
                    .await;
                break reason;
            }
        }
    };
    debug!(hosts = session.table.len(), "session frozen");

    Delivered {
        reason,
        table: session.table,
        progress: session.progress,
    }
}

//! Scan orchestration.
//!
//! [`ScanEngine::start`] validates the configuration, then runs the phases
//! (discover, port scan, resolve) on background tasks:
//!
//! - a driver task dispatches work through per-phase bounded pools,
//! - workers report through one update channel,
//! - one delivery task applies updates to the session and feeds the sink.
//!
//! Stopping is cooperative: [`ScanHandle::stop`] sets a shared flag that is
//! checked before each new unit of work; units already in flight finish and
//! their results are kept.

use anyhow::{anyhow, Result};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ::time::{format_description::well_known, OffsetDateTime};

use crate::error::ConfigurationError;
use crate::netdetect;
use crate::pool;
use crate::ports;
use crate::probe::{self, Prober};
use crate::resolve::{HostnameResolver, SystemResolver};
use crate::scanner::{HostScan, PortProber, TcpConnectScanner};
use crate::session::{self, SessionUpdate};
use crate::sink::ResultSink;
use crate::types::{
    FinishReason, ScanConfiguration, ScanPhase, ScanReport, ScanState, SessionStatus,
};

/// Capacity of the worker → delivery channel.
const UPDATE_BUFFER: usize = 1024;

/// Builder for one scan session.
pub struct ScanEngine {
    config: ScanConfiguration,
    prober: Option<Arc<dyn Prober>>,
    port_prober: Arc<dyn PortProber>,
    resolver: Arc<dyn HostnameResolver>,
}

impl ScanEngine {
    pub fn new(config: ScanConfiguration) -> Self {
        Self {
            config,
            prober: None,
            port_prober: Arc::new(TcpConnectScanner),
            resolver: Arc::new(SystemResolver),
        }
    }

    /// Use this reachability strategy instead of selecting one from the config.
    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = Some(prober);
        self
    }

    pub fn with_port_prober(mut self, port_prober: Arc<dyn PortProber>) -> Self {
        self.port_prober = port_prober;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn HostnameResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Validate the configuration and start scanning in the background.
    ///
    /// Targets and ports are expanded here; if either is invalid no session
    /// is created and nothing is sent to `sink`.
    pub async fn start<S: ResultSink>(self, sink: S) -> Result<ScanHandle, ConfigurationError> {
        let hosts = netdetect::enumerate_targets(&self.config.mode)?;
        let ports = ports::resolve_ports(&self.config.port_spec)?;

        let prober = match (self.prober, self.config.ping_first) {
            (Some(p), _) => Some(p),
            (None, true) => Some(probe::select_prober(self.config.probe).await),
            (None, false) => None,
        };

        info!(
            hosts = hosts.len(),
            ports = ports.len(),
            ping_first = self.config.ping_first,
            resolve_dns = self.config.resolve_dns,
            "scan starting"
        );

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(UPDATE_BUFFER);
        let (status_tx, status_rx) = watch::channel(SessionStatus {
            state: ScanState::Idle,
            progress: None,
        });
        let started_at = now_rfc3339();

        let consumer = tokio::spawn(session::deliver(rx, sink, status_tx));
        let ctx = Arc::new(PhaseContext {
            config: self.config,
            prober,
            port_prober: self.port_prober,
            resolver: self.resolver,
            cancel: cancel.clone(),
            updates: tx.clone(),
        });
        let driver = tokio::spawn(run_phases(ctx, hosts, ports));

        let task = tokio::spawn(async move {
            let reason = match driver.await {
                Ok(Ok(reason)) => reason,
                Ok(Err(e)) => FinishReason::Error(format!("{e:#}")),
                Err(e) => FinishReason::Error(format!("scan driver aborted: {e}")),
            };
            match &reason {
                FinishReason::Error(msg) => warn!(error = %msg, "scan failed"),
                other => info!(reason = ?other, "scan finished"),
            }
            let _ = tx.send(SessionUpdate::Finished(reason.clone())).await;
            drop(tx);

            let delivered = consumer.await;
            let finished_at = now_rfc3339();
            match delivered {
                Ok(delivered) => ScanReport {
                    reason: delivered.reason,
                    started_at,
                    finished_at,
                    progress: delivered.progress,
                    hosts: delivered.table.into_hosts(),
                },
                Err(e) => ScanReport {
                    reason: FinishReason::Error(format!("result delivery aborted: {e}")),
                    started_at,
                    finished_at,
                    progress: None,
                    hosts: Vec::new(),
                },
            }
        });

        Ok(ScanHandle {
            cancel,
            status: status_rx,
            task,
        })
    }
}

/// Control and observation handle for a running scan.
#[derive(Debug)]
pub struct ScanHandle {
    cancel: CancellationToken,
    status: watch::Receiver<SessionStatus>,
    task: JoinHandle<ScanReport>,
}

impl ScanHandle {
    /// Request a cooperative stop. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Latest state and progress published by the session.
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Receiver that changes whenever state or progress does.
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// True once the session has frozen in a terminal state.
    pub fn is_finished(&self) -> bool {
        self.status.borrow().state.is_finished()
    }

    /// Wait for the session to freeze and return its final report.
    pub async fn wait(self) -> Result<ScanReport> {
        self.task
            .await
            .map_err(|e| anyhow!("scan supervisor failed: {e}"))
    }
}

/// Read-only state shared by the driver and every worker of a session.
struct PhaseContext {
    config: ScanConfiguration,
    prober: Option<Arc<dyn Prober>>,
    port_prober: Arc<dyn PortProber>,
    resolver: Arc<dyn HostnameResolver>,
    cancel: CancellationToken,
    updates: mpsc::Sender<SessionUpdate>,
}

impl PhaseContext {
    async fn send(&self, update: SessionUpdate) -> Result<()> {
        self.updates
            .send(update)
            .await
            .map_err(|_| anyhow!("result delivery stopped unexpectedly"))
    }
}

async fn run_phases(
    ctx: Arc<PhaseContext>,
    hosts: Vec<Ipv4Addr>,
    ports: Vec<u16>,
) -> Result<FinishReason> {
    ctx.send(SessionUpdate::PhaseStarted {
        phase: ScanPhase::Discovering,
        total: hosts.len() as u64,
    })
    .await?;
    let responsive = discover(&ctx, &hosts).await?;
    info!(
        responsive = responsive.len(),
        total = hosts.len(),
        "discovery finished"
    );

    if ctx.cancel.is_cancelled() {
        return Ok(FinishReason::Stopped);
    }
    if ports.is_empty() {
        info!("empty port set, skipping port scan");
        return Ok(FinishReason::Completed);
    }

    let targets = if ctx.config.ping_first && !ctx.config.scan_unresponsive {
        responsive
    } else {
        hosts
    };
    ctx.send(SessionUpdate::PhaseStarted {
        phase: ScanPhase::PortScanning,
        total: targets.len() as u64 * ports.len() as u64,
    })
    .await?;

    let ports: Arc<[u16]> = ports.into();
    let scan = HostScan {
        prober: &ctx.port_prober,
        concurrency: ctx.config.port_concurrency,
        timeout: ctx.config.tcp_timeout,
        cancel: &ctx.cancel,
        updates: &ctx.updates,
    };
    let mut lookups = JoinSet::new();

    for &host in &targets {
        if ctx.cancel.is_cancelled() {
            break;
        }
        let open = scan.run(host, &ports).await?;
        debug!(%host, open = open.len(), "host scanned");

        if ctx.config.resolve_dns {
            let resolver = ctx.resolver.clone();
            let updates = ctx.updates.clone();
            lookups.spawn(async move {
                if let Some(hostname) = resolver.resolve(host).await {
                    let _ = updates
                        .send(SessionUpdate::HostnameResolved { ip: host, hostname })
                        .await;
                }
            });
        }
    }

    if ctx.cancel.is_cancelled() {
        lookups.abort_all();
        return Ok(FinishReason::Stopped);
    }

    if !lookups.is_empty() {
        ctx.send(SessionUpdate::Resolving).await?;
        let drain = async { while lookups.join_next().await.is_some() {} };
        let stopped = tokio::select! {
            _ = time::timeout(ctx.config.resolve_grace, drain) => false,
            _ = ctx.cancel.cancelled() => true,
        };
        if !lookups.is_empty() {
            debug!(pending = lookups.len(), "abandoning outstanding hostname lookups");
        }
        lookups.abort_all();
        if stopped {
            return Ok(FinishReason::Stopped);
        }
    }

    Ok(FinishReason::Completed)
}

/// Discovery phase. Returns responsive hosts in ascending order.
async fn discover(ctx: &PhaseContext, hosts: &[Ipv4Addr]) -> Result<Vec<Ipv4Addr>> {
    let Some(prober) = ctx.prober.clone().filter(|_| ctx.config.ping_first) else {
        for &ip in hosts {
            ctx.send(SessionUpdate::HostProbed { ip, alive: true }).await?;
            ctx.send(SessionUpdate::ProgressAdvanced).await?;
        }
        return Ok(hosts.to_vec());
    };

    let timeout = ctx.config.ping_timeout;
    let outcome = pool::run_bounded(
        hosts.iter().copied(),
        ctx.config.host_concurrency,
        &ctx.cancel,
        |ip| {
            let prober = prober.clone();
            let updates = ctx.updates.clone();
            async move {
                let alive = prober.probe(ip, timeout).await;
                debug!(%ip, alive, "probed");
                let _ = updates.send(SessionUpdate::HostProbed { ip, alive }).await;
                let _ = updates.send(SessionUpdate::ProgressAdvanced).await;
                (ip, alive)
            }
        },
    )
    .await?;

    for ip in outcome.panicked {
        warn!(%ip, "probe failed internally; host marked unreachable");
        ctx.send(SessionUpdate::HostProbed { ip, alive: false }).await?;
        ctx.send(SessionUpdate::ProgressAdvanced).await?;
    }

    let mut up: Vec<Ipv4Addr> = outcome
        .completed
        .into_iter()
        .filter_map(|(ip, alive)| alive.then_some(ip))
        .collect();
    up.sort_unstable();
    Ok(up)
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

use anyhow::Result;
use async_trait::async_trait;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::pool;
use crate::session::SessionUpdate;

/// Decides whether one TCP port is open. Any failure means "not open".
#[async_trait]
pub trait PortProber: Send + Sync {
    async fn scan_port(&self, host: Ipv4Addr, port: u16, timeout: Duration) -> bool;
}

/// Full TCP connect: open iff the handshake completes within the timeout.
/// Refused, reset and timed-out connects are not distinguished.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnectScanner;

#[async_trait]
impl PortProber for TcpConnectScanner {
    async fn scan_port(&self, host: Ipv4Addr, port: u16, timeout: Duration) -> bool {
        let addr = SocketAddr::from((host, port));
        matches!(
            time::timeout(timeout, TcpStream::connect(addr)).await,
            Ok(Ok(_))
        )
    }
}

/// Scans the ports of one host at a time through a bounded pool.
///
/// Running hosts sequentially keeps the number of open sockets at
/// `concurrency` rather than `hosts * concurrency`.
pub(crate) struct HostScan<'a> {
    pub prober: &'a Arc<dyn PortProber>,
    pub concurrency: usize,
    pub timeout: Duration,
    pub cancel: &'a CancellationToken,
    pub updates: &'a mpsc::Sender<SessionUpdate>,
}

impl HostScan<'_> {
    /// Scan `ports` on `host`, reporting each open port as soon as it is found.
    /// Returns the open ports, ascending.
    pub async fn run(&self, host: Ipv4Addr, ports: &Arc<[u16]>) -> Result<Vec<u16>> {
        let outcome = pool::run_bounded(
            ports.iter().copied(),
            self.concurrency,
            self.cancel,
            |port| {
                let prober = self.prober.clone();
                let updates = self.updates.clone();
                let timeout = self.timeout;
                async move {
                    let open = prober.scan_port(host, port, timeout).await;
                    if open {
                        debug!(%host, port, "open port");
                        let _ = updates.send(SessionUpdate::PortFound { ip: host, port }).await;
                    }
                    let _ = updates.send(SessionUpdate::ProgressAdvanced).await;
                    (port, open)
                }
            },
        )
        .await?;

        for port in outcome.panicked {
            warn!(%host, port, "port check failed internally; treated as closed");
            self.updates.send(SessionUpdate::ProgressAdvanced).await?;
        }

        let mut open: Vec<u16> = outcome
            .completed
            .into_iter()
            .filter_map(|(port, open)| open.then_some(port))
            .collect();
        open.sort_unstable();
        Ok(open)
    }
}

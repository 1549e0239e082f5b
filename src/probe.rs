//! Host reachability strategies.
//!
//! A [`Prober`] answers "is this host up?" within a bounded time and never
//! fails: every error is reported as `false`.

use async_trait::async_trait;
use std::net::{Ipv4Addr, SocketAddr};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::task::JoinSet;
use tokio::time;
use tracing::{debug, info};

use crate::types::ProbeStrategy;

/// Ports that are usually open on anything worth finding.
pub const DEFAULT_CONNECT_PROBE_PORTS: &[u16] = &[80, 443];

/// Extra time granted to the ping process on top of its own deadline.
const PING_SLACK: Duration = Duration::from_millis(500);

#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, host: Ipv4Addr, timeout: Duration) -> bool;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Sends a single echo request through the platform `ping` binary.
#[derive(Debug, Clone, Default)]
pub struct PingProber;

impl PingProber {
    fn command(host: Ipv4Addr, timeout: Duration) -> Command {
        let mut cmd = Command::new("ping");
        let host = host.to_string();
        if cfg!(windows) {
            let ms = timeout.as_millis().max(1).to_string();
            cmd.args(["-n", "1", "-w", ms.as_str(), host.as_str()]);
        } else if cfg!(target_os = "macos") {
            let ms = timeout.as_millis().max(1).to_string();
            cmd.args(["-c", "1", "-W", ms.as_str(), host.as_str()]);
        } else {
            // iputils takes whole seconds
            let secs = timeout.as_secs_f64().ceil().max(1.0) as u64;
            let secs = secs.to_string();
            cmd.args(["-n", "-c", "1", "-W", secs.as_str(), host.as_str()]);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Prober for PingProber {
    async fn probe(&self, host: Ipv4Addr, timeout: Duration) -> bool {
        let mut cmd = Self::command(host, timeout);
        match time::timeout(timeout + PING_SLACK, cmd.status()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                debug!(%host, error = %e, "ping could not run");
                false
            }
            Err(_) => false,
        }
    }

    fn name(&self) -> &'static str {
        "ping"
    }
}

/// Treats a host as up if a TCP connection to any of a few ports succeeds.
#[derive(Debug, Clone)]
pub struct ConnectProber {
    ports: Vec<u16>,
}

impl ConnectProber {
    pub fn new(ports: Vec<u16>) -> Self {
        Self { ports }
    }
}

impl Default for ConnectProber {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_PROBE_PORTS.to_vec())
    }
}

#[async_trait]
impl Prober for ConnectProber {
    async fn probe(&self, host: Ipv4Addr, timeout: Duration) -> bool {
        let mut set = JoinSet::new();
        for &port in &self.ports {
            let addr = SocketAddr::from((host, port));
            set.spawn(async move {
                matches!(
                    time::timeout(timeout, TcpStream::connect(addr)).await,
                    Ok(Ok(_))
                )
            });
        }
        while let Some(res) = set.join_next().await {
            if matches!(res, Ok(true)) {
                set.abort_all();
                return true;
            }
        }
        false
    }

    fn name(&self) -> &'static str {
        "tcp-connect"
    }
}

/// Pick the reachability strategy for a session.
///
/// `Auto` pings the loopback address once; if that works the platform ping
/// is usable, otherwise the connect heuristic is used.
pub async fn select_prober(strategy: ProbeStrategy) -> Arc<dyn Prober> {
    let prober: Arc<dyn Prober> = match strategy {
        ProbeStrategy::Ping => Arc::new(PingProber),
        ProbeStrategy::Connect => Arc::new(ConnectProber::default()),
        ProbeStrategy::Auto => {
            if PingProber
                .probe(Ipv4Addr::LOCALHOST, Duration::from_secs(1))
                .await
            {
                Arc::new(PingProber)
            } else {
                Arc::new(ConnectProber::default())
            }
        }
    };
    info!(strategy = prober.name(), "reachability strategy selected");
    prober
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connect_probe_finds_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let prober = ConnectProber::new(vec![port]);
        assert!(prober.probe(Ipv4Addr::LOCALHOST, Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn connect_probe_refused_is_false() {
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };
        let prober = ConnectProber::new(vec![port]);
        assert!(!prober.probe(Ipv4Addr::LOCALHOST, Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn explicit_strategies_are_honoured() {
        assert_eq!(select_prober(ProbeStrategy::Connect).await.name(), "tcp-connect");
        assert_eq!(select_prober(ProbeStrategy::Ping).await.name(), "ping");
    }
}

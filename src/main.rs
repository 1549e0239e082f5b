use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lan_sweep::config::{
    ModeOption, PortsOption, ScanOptions, DEFAULT_HOST_CONCURRENCY, DEFAULT_PING_TIMEOUT_SECS,
    DEFAULT_PORT_CONCURRENCY, DEFAULT_RESOLVE_GRACE_SECS, DEFAULT_TCP_TIMEOUT_SECS,
};
use lan_sweep::engine::ScanEngine;
use lan_sweep::export::{self, HostFilter};
use lan_sweep::server;
use lan_sweep::types::{FinishReason, ProbeStrategy, ScanEvent, ScanPhase, ScanReport};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProbeArg {
    Auto,
    Ping,
    Connect,
}

impl From<ProbeArg> for ProbeStrategy {
    fn from(p: ProbeArg) -> Self {
        match p {
            ProbeArg::Auto => ProbeStrategy::Auto,
            ProbeArg::Ping => ProbeStrategy::Ping,
            ProbeArg::Connect => ProbeStrategy::Connect,
        }
    }
}

/// lan-sweep: find live hosts and open TCP ports on a local network.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "lan-sweep",
    version,
    about = "Find live hosts and open TCP ports on a local network.",
    long_about = None
)]
struct Cli {
    /// CIDR to scan (e.g. 192.168.1.0/24). Defaults to the local /24.
    #[arg(long, conflicts_with = "range")]
    cidr: Option<String>,

    /// Inclusive address range, START-END (e.g. 192.168.1.10-192.168.1.50).
    #[arg(long)]
    range: Option<String>,

    /// `common`, `up-to:N` for ports 1..=N, or a list like `22`, `22,80,8000-8100`.
    /// A leading `@` reads the list from a file.
    #[arg(long, default_value = "common")]
    ports: String,

    /// Mark every host alive without probing.
    #[arg(long = "no-ping", default_value_t = false)]
    no_ping: bool,

    /// Port-scan hosts that did not answer the reachability probe.
    #[arg(long = "scan-unresponsive", default_value_t = false)]
    scan_unresponsive: bool,

    /// Resolve hostnames of scanned hosts.
    #[arg(long, default_value_t = false)]
    resolve: bool,

    #[arg(long, value_enum, default_value_t = ProbeArg::Auto)]
    probe: ProbeArg,

    /// Concurrent reachability probes.
    #[arg(long = "host-concurrency", default_value_t = DEFAULT_HOST_CONCURRENCY)]
    host_concurrency: usize,

    /// Concurrent TCP connects per host.
    #[arg(long = "port-concurrency", default_value_t = DEFAULT_PORT_CONCURRENCY)]
    port_concurrency: usize,

    /// TCP connect timeout in seconds.
    #[arg(long = "tcp-timeout", default_value_t = DEFAULT_TCP_TIMEOUT_SECS)]
    tcp_timeout: f64,

    /// Reachability probe timeout in seconds.
    #[arg(long = "ping-timeout", default_value_t = DEFAULT_PING_TIMEOUT_SECS)]
    ping_timeout: f64,

    /// Seconds to wait for outstanding hostname lookups once scanning ends.
    #[arg(long = "resolve-grace", default_value_t = DEFAULT_RESOLVE_GRACE_SECS)]
    resolve_grace: f64,

    /// Which hosts to print and export.
    #[arg(long, value_enum, default_value_t = HostFilter::Alive)]
    filter: HostFilter,

    /// Write the full report as pretty JSON to this path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write filtered rows as CSV to this path.
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Start the embedded HTTP API and UI server instead of scanning.
    #[arg(long = "serve-ui", default_value_t = false)]
    serve_ui: bool,

    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,
}

impl Cli {
    fn scan_options(&self) -> Result<ScanOptions> {
        let mut opts = ScanOptions {
            ping_first: !self.no_ping,
            resolve_dns: self.resolve,
            host_concurrency: self.host_concurrency,
            port_concurrency: self.port_concurrency,
            tcp_timeout: self.tcp_timeout,
            ping_timeout: self.ping_timeout,
            probe: self.probe.into(),
            scan_unresponsive: self.scan_unresponsive,
            resolve_grace: self.resolve_grace,
            ..ScanOptions::default()
        };

        if let Some(cidr) = &self.cidr {
            opts.mode = ModeOption::Cidr;
            opts.cidr = cidr.clone();
        } else if let Some(range) = &self.range {
            let (start, end) = range
                .split_once('-')
                .context("--range expects START-END")?;
            opts.mode = ModeOption::Range;
            opts.start_ip = start.trim().to_string();
            opts.end_ip = end.trim().to_string();
        }

        let ports = self.ports.trim();
        if ports.eq_ignore_ascii_case("common") {
            opts.ports = PortsOption::Common;
        } else if let Some(max) = ports.strip_prefix("up-to:") {
            opts.ports = PortsOption::Range;
            opts.port_max = max
                .trim()
                .parse()
                .with_context(|| format!("--ports up-to:N expects a number, got `{max}`"))?;
        } else {
            opts.ports = PortsOption::Custom;
            opts.custom_ports = ports.to_string();
        }
        Ok(opts)
    }
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    if cli.serve_ui {
        info!("press Ctrl+C to stop the server");
        tokio::select! {
            res = server::spawn_server(&cli.bind) => res?,
            _ = tokio::signal::ctrl_c() => {}
        }
        return Ok(());
    }

    let config = cli.scan_options()?.into_configuration()?;
    let (tx, mut rx) = mpsc::unbounded_channel::<ScanEvent>();
    let handle = ScanEngine::new(config).start(tx).await?;

    // Ctrl-C stops the scan; partial results are still reported.
    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("stop requested, finishing in-flight work");
            cancel.cancel();
        }
    });

    let mut last_pct = None;
    while let Some(event) = rx.recv().await {
        match event {
            ScanEvent::ProgressUpdated(p) => {
                let pct = if p.total == 0 { 100 } else { p.done * 100 / p.total };
                let step = (p.phase, pct / 10);
                if last_pct != Some(step) {
                    last_pct = Some(step);
                    let phase = match p.phase {
                        ScanPhase::Discovering => "discovering",
                        ScanPhase::PortScanning => "port scanning",
                    };
                    info!("{phase}: {}/{} ({pct}%)", p.done, p.total);
                }
            }
            ScanEvent::HostDiscovered { ip, alive: true } => info!("host up: {ip}"),
            ScanEvent::PortsUpdated { ip, open_ports } => {
                info!("{ip}: open {open_ports:?}")
            }
            ScanEvent::HostnameUpdated { ip, hostname } => info!("{ip}: {hostname}"),
            _ => {}
        }
    }

    let report = handle.wait().await?;
    print_results_table(&report, cli.filter);

    if let Some(path) = cli.output.as_deref() {
        export::write_report_json(path, &report)?;
        println!("Wrote JSON report to {}", path.display());
    }
    if let Some(path) = cli.csv.as_deref() {
        export::write_csv_file(path, &report.hosts, cli.filter)?;
        println!("Wrote CSV to {}", path.display());
    }

    if let FinishReason::Error(msg) = &report.reason {
        anyhow::bail!("scan failed: {msg}");
    }
    Ok(())
}

fn print_results_table(report: &ScanReport, filter: HostFilter) {
    let rows: Vec<_> = report.hosts.iter().filter(|h| filter.matches(h)).collect();

    let mut ip_w = "ip".len();
    let mut ports_w = "open_ports".len();
    for h in &rows {
        ip_w = ip_w.max(h.ip.to_string().len());
        ports_w = ports_w.max(h.ports_joined().len().min(60));
    }
    let alive_w = "alive".len();

    let outcome = match &report.reason {
        FinishReason::Completed => "completed",
        FinishReason::Stopped => "stopped",
        FinishReason::Error(_) => "failed",
    };
    println!(
        "\nScan {outcome}: {} hosts seen, {} alive, {} shown",
        report.hosts.len(),
        report.hosts.iter().filter(|h| h.alive).count(),
        rows.len()
    );
    println!(
        "{:<ip_w$}  {:<alive_w$}  {:<ports_w$}  hostname",
        "ip", "alive", "open_ports",
    );
    println!(
        "{:-<ip_w$}  {:-<alive_w$}  {:-<ports_w$}  {:-<8}",
        "", "", "", "",
    );
    for h in rows {
        let mut ports = h.ports_joined();
        if ports.len() > 60 {
            ports.truncate(57);
            ports.push_str("...");
        }
        println!(
            "{:<ip_w$}  {:<alive_w$}  {:<ports_w$}  {}",
            h.ip.to_string(),
            if h.alive { "yes" } else { "no" },
            ports,
            h.hostname,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ScanOptions {
        let argv = std::iter::once("lan-sweep").chain(args.iter().copied());
        Cli::try_parse_from(argv).unwrap().scan_options().unwrap()
    }

    #[test]
    fn bare_number_is_a_single_port() {
        let opts = parse(&["--ports", "22"]);
        assert_eq!(opts.ports, PortsOption::Custom);
        assert_eq!(opts.custom_ports, "22");
    }

    #[test]
    fn up_to_bound_is_explicit() {
        let opts = parse(&["--ports", "up-to:1024"]);
        assert_eq!(opts.ports, PortsOption::Range);
        assert_eq!(opts.port_max, 1024);

        let cli = Cli::try_parse_from(["lan-sweep", "--ports", "up-to:lots"]).unwrap();
        assert!(cli.scan_options().is_err());
    }

    #[test]
    fn range_flag_splits_endpoints() {
        let opts = parse(&["--range", "10.0.0.20 - 10.0.0.10"]);
        assert_eq!(opts.mode, ModeOption::Range);
        assert_eq!((opts.start_ip.as_str(), opts.end_ip.as_str()), ("10.0.0.20", "10.0.0.10"));
    }
}

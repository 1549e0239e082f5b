//! User-facing scan options and their validation into a [`ScanConfiguration`].
//!
//! The CLI builds [`ScanOptions`] from flags; the HTTP API deserializes it
//! straight from the request body, so every field has a serde default.

use crate::error::ConfigurationError;
use crate::ports;
use crate::types::{PortSpec, ProbeStrategy, ScanConfiguration, TargetMode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_HOST_CONCURRENCY: usize = 128;
pub const DEFAULT_PORT_CONCURRENCY: usize = 100;
pub const DEFAULT_TCP_TIMEOUT_SECS: f64 = 0.4;
pub const DEFAULT_PING_TIMEOUT_SECS: f64 = 1.0;
pub const DEFAULT_RESOLVE_GRACE_SECS: f64 = 2.0;
/// Hard ceiling for either worker pool.
pub const MAX_CONCURRENCY: usize = 5_000;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModeOption {
    #[default]
    Local,
    Cidr,
    Range,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PortsOption {
    #[default]
    Common,
    Range,
    Custom,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ScanOptions {
    pub mode: ModeOption,
    pub cidr: String,
    pub start_ip: String,
    pub end_ip: String,
    pub ports: PortsOption,
    /// Upper bound for `ports = range`.
    pub port_max: u32,
    /// Port list for `ports = custom`. A leading `@` names a ports file.
    pub custom_ports: String,
    pub ping_first: bool,
    pub resolve_dns: bool,
    pub host_concurrency: usize,
    pub port_concurrency: usize,
    /// Seconds.
    pub tcp_timeout: f64,
    /// Seconds.
    pub ping_timeout: f64,
    pub probe: ProbeStrategy,
    pub scan_unresponsive: bool,
    /// Seconds.
    pub resolve_grace: f64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            mode: ModeOption::Local,
            cidr: String::new(),
            start_ip: String::new(),
            end_ip: String::new(),
            ports: PortsOption::Common,
            port_max: 1024,
            custom_ports: String::new(),
            ping_first: true,
            resolve_dns: false,
            host_concurrency: DEFAULT_HOST_CONCURRENCY,
            port_concurrency: DEFAULT_PORT_CONCURRENCY,
            tcp_timeout: DEFAULT_TCP_TIMEOUT_SECS,
            ping_timeout: DEFAULT_PING_TIMEOUT_SECS,
            probe: ProbeStrategy::Auto,
            scan_unresponsive: false,
            resolve_grace: DEFAULT_RESOLVE_GRACE_SECS,
        }
    }
}

impl ScanOptions {
    /// Check scalar options and build the immutable configuration.
    ///
    /// Targets and ports are only parsed here as far as needed to pick a
    /// variant; full expansion happens when a scan starts.
    pub fn into_configuration(self) -> Result<ScanConfiguration, ConfigurationError> {
        let mode = match self.mode {
            ModeOption::Local => TargetMode::LocalSubnet,
            ModeOption::Cidr => TargetMode::Cidr(self.cidr),
            ModeOption::Range => TargetMode::Range(self.start_ip, self.end_ip),
        };
        let port_spec = match self.ports {
            PortsOption::Common => PortSpec::CommonPorts,
            PortsOption::Range => PortSpec::RangeUpTo(self.port_max),
            PortsOption::Custom => match self.custom_ports.trim().strip_prefix('@') {
                Some(path) => PortSpec::CustomList(ports::load_ports_from_path(path)?),
                None => PortSpec::CustomList(self.custom_ports),
            },
        };

        Ok(ScanConfiguration {
            mode,
            port_spec,
            ping_first: self.ping_first,
            resolve_dns: self.resolve_dns,
            host_concurrency: concurrency("host_concurrency", self.host_concurrency)?,
            port_concurrency: concurrency("port_concurrency", self.port_concurrency)?,
            tcp_timeout: seconds("tcp_timeout", self.tcp_timeout)?,
            ping_timeout: seconds("ping_timeout", self.ping_timeout)?,
            probe: self.probe,
            scan_unresponsive: self.scan_unresponsive,
            resolve_grace: seconds("resolve_grace", self.resolve_grace)?,
        })
    }
}

impl Default for ScanConfiguration {
    fn default() -> Self {
        ScanOptions::default()
            .into_configuration()
            .expect("default options are valid")
    }
}

fn concurrency(field: &'static str, value: usize) -> Result<usize, ConfigurationError> {
    if value == 0 {
        return Err(ConfigurationError::InvalidConcurrency { field });
    }
    Ok(value.min(MAX_CONCURRENCY))
}

fn seconds(field: &'static str, value: f64) -> Result<Duration, ConfigurationError> {
    if value <= 0.0 {
        return Err(ConfigurationError::InvalidTimeout { field, value });
    }
    // rejects NaN, infinity and anything too large for a Duration
    Duration::try_from_secs_f64(value)
        .map_err(|_| ConfigurationError::InvalidTimeout { field, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let cfg = ScanConfiguration::default();
        assert_eq!(cfg.mode, TargetMode::LocalSubnet);
        assert_eq!(cfg.port_spec, PortSpec::CommonPorts);
        assert!(cfg.ping_first);
        assert_eq!(cfg.tcp_timeout, Duration::from_millis(400));
        assert_eq!(cfg.ping_timeout, Duration::from_secs(1));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let opts: ScanOptions = serde_json::from_str(
            r#"{"mode":"cidr","cidr":"10.0.0.0/24","ports":"custom","custom_ports":"22,80"}"#,
        )
        .unwrap();
        let cfg = opts.into_configuration().unwrap();
        assert_eq!(cfg.mode, TargetMode::Cidr("10.0.0.0/24".into()));
        assert_eq!(cfg.port_spec, PortSpec::CustomList("22,80".into()));
        assert_eq!(cfg.host_concurrency, DEFAULT_HOST_CONCURRENCY);
    }

    #[test]
    fn zero_concurrency_rejected() {
        let opts = ScanOptions {
            port_concurrency: 0,
            ..ScanOptions::default()
        };
        assert_eq!(
            opts.into_configuration().unwrap_err(),
            ConfigurationError::InvalidConcurrency {
                field: "port_concurrency"
            }
        );
    }

    #[test]
    fn concurrency_is_clamped() {
        let cfg = ScanOptions {
            host_concurrency: 100_000,
            ..ScanOptions::default()
        }
        .into_configuration()
        .unwrap();
        assert_eq!(cfg.host_concurrency, MAX_CONCURRENCY);
    }

    #[test]
    fn negative_timeout_rejected() {
        let opts = ScanOptions {
            tcp_timeout: -1.0,
            ..ScanOptions::default()
        };
        assert!(matches!(
            opts.into_configuration(),
            Err(ConfigurationError::InvalidTimeout { field: "tcp_timeout", .. })
        ));
    }

    #[test]
    fn huge_timeout_rejected() {
        let opts: ScanOptions = serde_json::from_str(r#"{"tcp_timeout":1e30}"#).unwrap();
        assert!(matches!(
            opts.into_configuration(),
            Err(ConfigurationError::InvalidTimeout { field: "tcp_timeout", .. })
        ));
        let opts = ScanOptions {
            resolve_grace: f64::INFINITY,
            ..ScanOptions::default()
        };
        assert!(matches!(
            opts.into_configuration(),
            Err(ConfigurationError::InvalidTimeout { field: "resolve_grace", .. })
        ));
    }

    #[test]
    fn missing_ports_file() {
        let opts = ScanOptions {
            ports: PortsOption::Custom,
            custom_ports: "@/definitely/not/here.txt".into(),
            ..ScanOptions::default()
        };
        assert!(matches!(
            opts.into_configuration(),
            Err(ConfigurationError::PortsFile { .. })
        ));
    }
}

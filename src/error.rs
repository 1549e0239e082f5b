use thiserror::Error;

/// Rejection of a scan configuration. Raised before a session exists, so a
/// scan that fails validation never starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("invalid CIDR `{input}`: {reason}")]
    InvalidCidr { input: String, reason: String },

    #[error("invalid IPv4 address `{input}`")]
    InvalidAddress { input: String },

    #[error("invalid port token `{token}`")]
    InvalidPortToken { token: String },

    #[error("port out of range in `{token}` (allowed 1-65535)")]
    PortOutOfRange { token: String },

    #[error("port range limit {limit} out of range (allowed 1-65535)")]
    InvalidPortLimit { limit: u32 },

    #[error("could not determine the local network: {reason}")]
    LocalNetworkUnavailable { reason: String },

    #[error("{field} must be at least 1")]
    InvalidConcurrency { field: &'static str },

    #[error("{field} must be a positive number of seconds, got {value}")]
    InvalidTimeout { field: &'static str, value: f64 },

    #[error("target `{input}` contains no scannable hosts")]
    EmptyTargets { input: String },

    #[error("target `{input}` expands to {count} hosts (limit {max})")]
    TooManyTargets { input: String, count: u64, max: u64 },

    #[error("failed to read ports file `{path}`: {reason}")]
    PortsFile { path: String, reason: String },
}

use crate::error::ConfigurationError;
use crate::types::PortSpec;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Resolve a port specification into an ascending, deduplicated port list.
pub fn resolve_ports(spec: &PortSpec) -> Result<Vec<u16>, ConfigurationError> {
    match spec {
        PortSpec::CommonPorts => Ok(default_ports()),
        PortSpec::RangeUpTo(n) => range_up_to(*n),
        PortSpec::CustomList(text) => parse_ports_str(text),
    }
}

/// Ports `1..=limit`.
pub fn range_up_to(limit: u32) -> Result<Vec<u16>, ConfigurationError> {
    if limit == 0 || limit > u32::from(u16::MAX) {
        return Err(ConfigurationError::InvalidPortLimit { limit });
    }
    Ok((1..=limit as u16).collect())
}

/// Parse a custom port list into a sorted, deduplicated set of TCP ports (1..=65535).
///
/// Supported tokens, separated by commas or newlines:
/// - single port number: `80`
/// - inclusive range: `8000-8010` (reversed bounds are swapped)
/// - comments: everything after `#` on a line is ignored
///
/// Any bad token fails the whole list and is named in the error.
pub fn parse_ports_str(s: &str) -> Result<Vec<u16>, ConfigurationError> {
    let mut out = BTreeSet::new();

    for raw_line in s.lines() {
        let line = raw_line.split('#').next().unwrap_or("");
        for token in line.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if let Some((a, b)) = token.split_once('-') {
                let start = parse_port_str(a.trim(), token)?;
                let end = parse_port_str(b.trim(), token)?;
                let (lo, hi) = if start > end { (end, start) } else { (start, end) };
                out.extend(lo..=hi);
            } else {
                out.insert(parse_port_str(token, token)?);
            }
        }
    }

    Ok(out.into_iter().collect())
}

/// Load a ports file (same syntax as [`parse_ports_str`]).
pub fn load_ports_from_path(path: impl AsRef<Path>) -> Result<String, ConfigurationError> {
    fs::read_to_string(path.as_ref()).map_err(|e| ConfigurationError::PortsFile {
        path: path.as_ref().display().to_string(),
        reason: e.to_string(),
    })
}

/// A conservative default list of commonly used TCP ports, ascending.
pub fn default_ports() -> Vec<u16> {
    const DEFAULT: &[u16] = &[
        21, 22, 23, 25, 53, 80, 110, 111, 135, 139, 143, 161, 389, 443, 445, 465, 514, 548, 554,
        587, 631, 993, 995, 1433, 1521, 1723, 1883, 2049, 2375, 3000, 3128, 3306, 3389, 5000, 5060,
        5432, 5900, 5985, 6379, 8000, 8008, 8080, 8081, 8443, 8888, 9000, 9100, 9200, 11211,
        27017,
    ];
    DEFAULT.to_vec()
}

fn parse_port_str(s: &str, token: &str) -> Result<u16, ConfigurationError> {
    let val: u32 = s.parse().map_err(|_| ConfigurationError::InvalidPortToken {
        token: token.to_string(),
    })?;
    if val == 0 || val > u32::from(u16::MAX) {
        return Err(ConfigurationError::PortOutOfRange {
            token: token.to_string(),
        });
    }
    Ok(val as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_ports_sorted() {
        let ports = parse_ports_str("80, 22,443").unwrap();
        assert_eq!(ports, vec![22, 80, 443]);
    }

    #[test]
    fn parse_ranges_and_dedup() {
        let ports = parse_ports_str("8000-8002,80,8001").unwrap();
        assert_eq!(ports, vec![80, 8000, 8001, 8002]);
    }

    #[test]
    fn reversed_range_is_swapped() {
        assert_eq!(parse_ports_str("25-22").unwrap(), vec![22, 23, 24, 25]);
    }

    #[test]
    fn parse_with_comments_and_newlines() {
        let input = r#"
            # common web ports
            80  # http
            443 # https
            8000-8002, 9000   # dev servers
        "#;
        let ports = parse_ports_str(input).unwrap();
        assert_eq!(ports, vec![80, 443, 8000, 8001, 8002, 9000]);
    }

    #[test]
    fn invalid_values_name_the_token() {
        let err = parse_ports_str("80,abc,443").unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::InvalidPortToken {
                token: "abc".into()
            }
        );
        let err = parse_ports_str("1-70000").unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::PortOutOfRange {
                token: "1-70000".into()
            }
        );
    }

    #[test]
    fn range_limit_bounds() {
        assert_eq!(range_up_to(3).unwrap(), vec![1, 2, 3]);
        assert_eq!(range_up_to(65535).unwrap().len(), 65535);
        assert!(range_up_to(0).is_err());
        assert!(range_up_to(65536).is_err());
    }

    #[test]
    fn default_is_sorted_and_unique() {
        let d = default_ports();
        assert!(d.contains(&80) && d.contains(&443));
        assert!(d.windows(2).all(|w| w[0] < w[1]));
    }
}

use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr};
use tracing::debug;

/// Reverse hostname lookup. Failures are reported as `None` and never retried.
#[async_trait]
pub trait HostnameResolver: Send + Sync {
    async fn resolve(&self, ip: Ipv4Addr) -> Option<String>;
}

/// Uses the operating system resolver (`getnameinfo`) on the blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl HostnameResolver for SystemResolver {
    async fn resolve(&self, ip: Ipv4Addr) -> Option<String> {
        let looked_up =
            tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&IpAddr::V4(ip))).await;
        match looked_up {
            Ok(Ok(name)) => clean_hostname(ip, &name),
            Ok(Err(e)) => {
                debug!(%ip, error = %e, "reverse lookup failed");
                None
            }
            Err(_) => None,
        }
    }
}

/// Drop numeric answers and the trailing root dot.
fn clean_hostname(ip: Ipv4Addr, name: &str) -> Option<String> {
    let name = name.trim().trim_end_matches('.');
    if name.is_empty() || name.parse::<Ipv4Addr>().is_ok_and(|n| n == ip) {
        return None;
    }
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_answer_is_not_a_name() {
        let ip = Ipv4Addr::new(192, 168, 1, 5);
        assert_eq!(clean_hostname(ip, "192.168.1.5"), None);
        assert_eq!(clean_hostname(ip, ""), None);
    }

    #[test]
    fn trailing_dot_trimmed() {
        let ip = Ipv4Addr::new(192, 168, 1, 5);
        assert_eq!(clean_hostname(ip, "printer.lan."), Some("printer.lan".into()));
    }
}

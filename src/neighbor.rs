//! Best-effort MAC lookup through the host's neighbor table.

use std::net::Ipv4Addr;
use std::process::{Command, Stdio};

use log::debug;

/// Resolves a device IP to its MAC address.
///
/// Lookups never fail; "not found" and "could not ask" are both `None`.
/// Any `Fn(Ipv4Addr) -> Option<String>` closure is a lookup, which keeps
/// tests free of the host's neighbor table.
pub trait NeighborLookup {
    fn lookup(&self, ip: Ipv4Addr) -> Option<String>;
}

impl<F> NeighborLookup for F
where
    F: Fn(Ipv4Addr) -> Option<String>,
{
    fn lookup(&self, ip: Ipv4Addr) -> Option<String> {
        self(ip)
    }
}

/// Lookup that never resolves anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

impl NeighborLookup for NoLookup {
    fn lookup(&self, _ip: Ipv4Addr) -> Option<String> {
        None
    }
}

/// Lookup backed by `ip neigh show <ip>`.
///
/// Entries are often missing across routed VLANs.
#[derive(Debug, Clone, Copy, Default)]
pub struct IpNeighbor;

impl NeighborLookup for IpNeighbor {
    fn lookup(&self, ip: Ipv4Addr) -> Option<String> {
        let output = Command::new("ip")
            .args(["neigh", "show", &ip.to_string()])
            .stderr(Stdio::null())
            .output();

        match output {
            Ok(out) if out.status.success() => parse_lladdr(&String::from_utf8_lossy(&out.stdout)),
            Ok(out) => {
                debug!("ip neigh show {ip} exited with {}", out.status);
                None
            }
            Err(e) => {
                debug!("ip neigh show {ip} failed: {e}");
                None
            }
        }
    }
}

/// Pull the lowercased token after `lladdr` out of `ip neigh` output.
fn parse_lladdr(output: &str) -> Option<String> {
    let mut tokens = output.split_whitespace();
    tokens.find(|t| *t == "lladdr")?;
    tokens.next().map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lladdr() {
        assert_eq!(
            parse_lladdr("192.168.1.50 dev eth0 lladdr D4:AD:FC:12:34:56 REACHABLE\n"),
            Some("d4:ad:fc:12:34:56".to_string())
        );
        assert_eq!(parse_lladdr("192.168.1.50 dev eth0 FAILED"), None);
        assert_eq!(parse_lladdr("192.168.1.50 dev eth0 lladdr"), None);
        assert_eq!(parse_lladdr(""), None);
    }

    #[test]
    fn test_closures_are_lookups() {
        let fixed = |ip: Ipv4Addr| (ip == Ipv4Addr::new(10, 0, 0, 1)).then(|| "aa:bb".to_string());
        assert_eq!(fixed.lookup(Ipv4Addr::new(10, 0, 0, 1)).as_deref(), Some("aa:bb"));
        assert_eq!(fixed.lookup(Ipv4Addr::new(10, 0, 0, 2)), None);
        assert_eq!(NoLookup.lookup(Ipv4Addr::new(10, 0, 0, 1)), None);
    }
}

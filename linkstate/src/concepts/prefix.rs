use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::framework::NetAddress;

/// A destination network: address plus prefix length.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(bound = "")]
pub struct Prefix<A: NetAddress> {
    pub addr: A,
    pub len: u8,
}

impl<A: NetAddress> Prefix<A> {
    /// Builds a prefix, clearing host bits past `len`
    pub fn new(addr: A, len: u8) -> Self {
        let len = len.min(A::max_prefix_len());
        Self {
            addr: addr.masked(len),
            len,
        }
    }

    /// Full length prefix for a single address
    pub fn host(addr: A) -> Self {
        Self {
            addr,
            len: A::max_prefix_len(),
        }
    }

    /// Parses an HNA (network, netmask) pair, rejecting non-contiguous masks
    pub fn from_netmask(addr: A, netmask: A) -> Option<Self> {
        netmask
            .netmask_to_prefix_len()
            .map(|len| Self::new(addr, len))
    }

    pub fn netmask(&self) -> A {
        A::netmask(self.len)
    }

    pub fn is_host(&self) -> bool {
        self.len == A::max_prefix_len()
    }
}

impl<A: NetAddress> Display for Prefix<A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn netmask_conversion() {
        let p = Prefix::from_netmask(
            Ipv4Addr::new(10, 1, 2, 3),
            Ipv4Addr::new(255, 255, 0, 0),
        )
        .unwrap();
        assert_eq!(p.len, 16);
        assert_eq!(p.addr, Ipv4Addr::new(10, 1, 0, 0));
        assert_eq!(p.netmask(), Ipv4Addr::new(255, 255, 0, 0));
        assert_eq!(p.to_string(), "10.1.0.0/16");

        assert!(Prefix::from_netmask(Ipv4Addr::new(10, 0, 0, 0), Ipv4Addr::new(255, 0, 255, 0)).is_none());
        assert_eq!(
            Prefix::from_netmask(Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED).map(|p| p.len),
            Some(0)
        );
    }

    #[test]
    fn v6_host_prefix() {
        let addr: Ipv6Addr = "fd00::1".parse().unwrap();
        let host = Prefix::host(addr);
        assert!(host.is_host());
        assert_eq!(host.len, 128);
        assert_eq!(Prefix::new(addr, 64).addr, "fd00::".parse::<Ipv6Addr>().unwrap());
    }
}

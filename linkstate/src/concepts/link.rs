use std::time::Duration;

use educe::Educe;
use serde::{Deserialize, Serialize};

use crate::concepts::packet::LinkType;
use crate::framework::RoutingSystem;
use crate::metric::LinkLq;
use crate::timer::TimerId;

/// A link is identified by the local interface and the neighbour interface address it hears
#[derive(Serialize, Deserialize, Educe)]
#[educe(
    Clone(bound()),
    Debug(bound()),
    PartialEq(bound()),
    Eq,
    PartialOrd,
    Ord(bound()),
    Hash(bound())
)]
#[serde(bound = "")]
pub struct LinkKey<T: RoutingSystem + ?Sized> {
    pub interface: T::InterfaceId,
    pub remote: T::Address,
}

#[derive(Serialize, Deserialize, Educe)]
#[educe(Clone(bound()), Debug(bound()))]
#[serde(bound = "")]
pub struct Link<T: RoutingSystem + ?Sized> {
    /// address of our interface the link is on
    pub local: T::Address,
    /// main address of the neighbour owning the remote interface
    pub neighbour: T::Address,
    pub lq: LinkLq,
    /// current cost, broken until both directions are measured
    pub cost: u32,
    /// hello interval announced by the neighbour
    pub hello_interval: Duration,
    /// the neighbour declared us MPR on this link
    pub mpr_selector: bool,
    pub link_timer: Option<TimerId>,
    pub sym_timer: Option<TimerId>,
    pub loss_timer: Option<TimerId>,
}

impl<T: RoutingSystem + ?Sized> Link<T> {
    pub fn is_symmetric(&self) -> bool {
        self.sym_timer.is_some()
    }

    pub fn link_type(&self) -> LinkType {
        if self.is_symmetric() {
            LinkType::Sym
        } else {
            LinkType::Asym
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::net::Ipv4Addr;

    struct Sys;
    impl RoutingSystem for Sys {
        type Address = Ipv4Addr;
        type InterfaceId = u8;
    }

    fn key(interface: u8, last: u8) -> LinkKey<Sys> {
        LinkKey {
            interface,
            remote: Ipv4Addr::new(10, 0, 0, last),
        }
    }

    #[test]
    fn keys_order_by_interface_then_remote() {
        let keys: BTreeSet<_> = [key(1, 1), key(0, 9), key(0, 2), key(0, 2)].into_iter().collect();
        let ordered: Vec<_> = keys.iter().map(|k| (k.interface, k.remote.octets()[3])).collect();
        assert_eq!(ordered, vec![(0, 2), (0, 9), (1, 1)]);
        assert_eq!(key(0, 2).clone(), key(0, 2));
    }
}

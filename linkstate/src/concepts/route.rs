use std::collections::BTreeMap;

use educe::Educe;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::concepts::prefix::Prefix;
use crate::framework::RoutingSystem;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct RouteMetric {
    pub cost: u32,
    pub hops: u8,
}

#[derive(Serialize, Deserialize, Educe)]
#[educe(Clone(bound()), Debug(bound()), PartialEq(bound()), Eq)]
#[serde(bound = "")]
pub struct NextHop<T: RoutingSystem + ?Sized> {
    /// interface address of the neighbour to send to
    pub gateway: T::Address,
    pub interface: T::InterfaceId,
}

/// One candidate path towards a prefix, contributed by the vertex advertising it
#[derive(Serialize, Deserialize, Educe)]
#[educe(Clone(bound()), Debug(bound()))]
#[serde(bound = "")]
pub struct RoutePath<T: RoutingSystem + ?Sized> {
    pub originator: T::Address,
    pub metric: RouteMetric,
    pub next_hop: NextHop<T>,
    /// routing tree version of the last refresh
    pub version: u64,
}

#[serde_as]
#[derive(Serialize, Deserialize, Educe)]
#[educe(Clone(bound()), Debug(bound()))]
#[serde(bound = "")]
pub struct RouteEntry<T: RoutingSystem + ?Sized> {
    pub prefix: Prefix<T::Address>,
    #[serde_as(as = "Vec<(_, _)>")]
    pub paths: BTreeMap<T::Address, RoutePath<T>>,
    /// originator of the best path
    pub best: Option<T::Address>,
    /// what the kernel currently has for this prefix
    pub installed: Option<(NextHop<T>, RouteMetric)>,
}

impl<T: RoutingSystem + ?Sized> RouteEntry<T> {
    pub fn best_path(&self) -> Option<&RoutePath<T>> {
        self.best.as_ref().and_then(|originator| self.paths.get(originator))
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteOp {
    Add,
    Change,
    Delete,
}

/// One operation for the kernel route collaborator
#[derive(Serialize, Deserialize, Educe)]
#[educe(Clone(bound()), Debug(bound()), PartialEq(bound()), Eq)]
#[serde(bound = "")]
pub struct KernelOp<T: RoutingSystem + ?Sized> {
    pub op: RouteOp,
    pub prefix: Prefix<T::Address>,
    pub next_hop: NextHop<T>,
    /// metric handed to the kernel, hop count or flat depending on the FIB metric mode
    pub metric: u32,
}

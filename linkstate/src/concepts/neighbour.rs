use std::collections::BTreeSet;

use educe::Educe;
use serde::{Deserialize, Serialize};

use crate::concepts::link::LinkKey;
use crate::framework::RoutingSystem;

pub const WILL_NEVER: u8 = 0;
pub const WILL_DEFAULT: u8 = 3;
pub const WILL_HIGH: u8 = 6;
pub const WILL_ALWAYS: u8 = 7;

#[derive(Serialize, Deserialize, Educe)]
#[educe(Clone(bound()), Debug(bound()))]
#[serde(bound = "")]
pub struct Neighbour<T: RoutingSystem + ?Sized> {
    /// main address of the neighbour
    pub addr: T::Address,
    /// at least one link to the neighbour is symmetric
    pub is_sym: bool,
    /// we selected the neighbour as MPR
    pub is_mpr: bool,
    /// number of links on which the neighbour selected us as MPR
    pub mprs_count: u32,
    pub willingness: u8,
    /// cheapest symmetric link, used as next hop towards the neighbour
    pub best_link: Option<LinkKey<T>>,
    /// symmetric neighbours advertised in the neighbour's last HELLO
    pub two_hop: BTreeSet<T::Address>,
}

impl<T: RoutingSystem + ?Sized> Neighbour<T> {
    pub fn new(addr: T::Address) -> Self {
        Self {
            addr,
            is_sym: false,
            is_mpr: false,
            mprs_count: 0,
            willingness: WILL_DEFAULT,
            best_link: None,
            two_hop: BTreeSet::new(),
        }
    }
}

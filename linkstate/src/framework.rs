use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use educe::Educe;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::concepts::prefix::Prefix;
use crate::cursor::{Cursor, CursorMut, WireResult};

pub trait RoutingSystem: 'static {
    /// Address of routers and their interfaces on the mesh, MUST be unique per interface
    type Address: NetAddress;
    /// Identifier of a local interface, opaque to the routing core
    type InterfaceId: RootKey + RootData + Ord + Debug;
    fn config() -> ProtocolParams {
        Default::default()
    }
}

pub trait RootData: Clone + Serialize + DeserializeOwned + Sized {}
pub trait RootKey: Eq + PartialEq + Hash {}
impl<T: Eq + PartialEq + Hash> RootKey for T {}
impl<T: Clone + Serialize + DeserializeOwned + Sized> RootData for T {}

/// An IP address family as it appears on the wire.
pub trait NetAddress: Copy + Ord + RootKey + RootData + Debug + Display + 'static {
    /// Number of bytes an address occupies in a message
    const WIDTH: usize;
    /// IP and UDP header bytes in front of every datagram of this family
    const IP_UDP_OVERHEAD: usize;

    fn read(cursor: &mut Cursor<'_>) -> WireResult<Self>;
    fn write(&self, cursor: &mut CursorMut<'_>) -> WireResult<()>;

    /// Basic sanity check of an originator address (no wildcard, multicast or loopback)
    fn is_valid_originator(&self) -> bool;

    /// The address with every bit past `prefix_len` cleared
    fn masked(&self, prefix_len: u8) -> Self;
    /// The netmask with `prefix_len` leading ones
    fn netmask(prefix_len: u8) -> Self;
    /// Prefix length of a contiguous netmask, `None` if the mask has holes
    fn netmask_to_prefix_len(&self) -> Option<u8>;

    fn max_prefix_len() -> u8 {
        (Self::WIDTH * 8) as u8
    }
}

impl NetAddress for Ipv4Addr {
    const WIDTH: usize = 4;
    const IP_UDP_OVERHEAD: usize = 20 + 8;

    fn read(cursor: &mut Cursor<'_>) -> WireResult<Self> {
        Ok(Ipv4Addr::from(cursor.read_u32()?))
    }

    fn write(&self, cursor: &mut CursorMut<'_>) -> WireResult<()> {
        cursor.write_bytes(&self.octets())
    }

    fn is_valid_originator(&self) -> bool {
        !(self.is_unspecified() || self.is_multicast() || self.is_broadcast() || self.is_loopback())
    }

    fn masked(&self, prefix_len: u8) -> Self {
        Ipv4Addr::from(u32::from(*self) & u32::from(Self::netmask(prefix_len)))
    }

    fn netmask(prefix_len: u8) -> Self {
        let bits = u32::from(prefix_len.min(32));
        // shifting a u32 by 32 is undefined, so the empty mask is special-cased
        Ipv4Addr::from(if bits == 0 { 0 } else { u32::MAX << (32 - bits) })
    }

    fn netmask_to_prefix_len(&self) -> Option<u8> {
        let mask = u32::from(*self);
        let len = mask.leading_ones();
        (mask.checked_shl(len).unwrap_or(0) == 0).then_some(len as u8)
    }
}

impl NetAddress for Ipv6Addr {
    const WIDTH: usize = 16;
    const IP_UDP_OVERHEAD: usize = 40 + 8;

    fn read(cursor: &mut Cursor<'_>) -> WireResult<Self> {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(cursor.read_bytes(16)?);
        Ok(Ipv6Addr::from(octets))
    }

    fn write(&self, cursor: &mut CursorMut<'_>) -> WireResult<()> {
        cursor.write_bytes(&self.octets())
    }

    fn is_valid_originator(&self) -> bool {
        !(self.is_unspecified() || self.is_multicast() || self.is_loopback())
    }

    fn masked(&self, prefix_len: u8) -> Self {
        Ipv6Addr::from(u128::from(*self) & u128::from(Self::netmask(prefix_len)))
    }

    fn netmask(prefix_len: u8) -> Self {
        let bits = u32::from(prefix_len.min(128));
        Ipv6Addr::from(if bits == 0 { 0 } else { u128::MAX << (128 - bits) })
    }

    fn netmask_to_prefix_len(&self) -> Option<u8> {
        let mask = u128::from(*self);
        let len = mask.leading_ones();
        (mask.checked_shl(len).unwrap_or(0) == 0).then_some(len as u8)
    }
}

/// Selects the link-quality metric engine, fixed for the lifetime of a router.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LqAlgorithm {
    /// Freifunk packet-window ETX
    #[default]
    EtxFf,
    /// Exponentially aged floating point ETX
    EtxFloat,
    /// Every link costs one hop
    HopCount,
}

/// Metric handed to the kernel for installed routes.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FibMetric {
    /// Every route is installed with metric 2, hop count changes are not pushed
    Flat,
    /// The hop count of the best path
    #[default]
    Correct,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InterfaceMode {
    /// Wireless broadcast medium, forwarded messages go back out of the receiving interface
    #[default]
    Mesh,
    /// Wired segment, never forward out of the interface a message arrived on
    Ether,
}

/// Protocol Parameters
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ProtocolParams {
    pub lq_algorithm: LqAlgorithm,
    /// Period of the link-quality timer (ETX-FF window slot length)
    pub lq_period: Duration,
    /// ETX-float aging factor
    pub lq_aging: f32,
    /// LQ values (0..=255 scale) below this make a link unusable
    pub min_useful_lq: u8,
    pub willingness: u8,
    pub tc_interval: Duration,
    pub tc_validity: Duration,
    pub mid_interval: Duration,
    pub mid_validity: Duration,
    pub hna_interval: Duration,
    pub hna_validity: Duration,
    pub spf_backoff: Duration,
    pub spf_backoff_jitter: u8,
    /// Grace period before edges of a superseded TC are removed
    pub edge_gc_time: Duration,
    pub edge_gc_jitter: u8,
    pub dup_hold_time: Duration,
    /// Upper bound for holding generated or forwarded messages before the buffer is sent
    pub max_forward_delay: Duration,
    pub fib_metric: FibMetric,
    /// Seeds the timer jitter, `None` draws a seed from the environment
    pub jitter_seed: Option<u64>,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            lq_algorithm: LqAlgorithm::EtxFf,
            lq_period: Duration::from_secs(1),
            lq_aging: 0.05,
            min_useful_lq: 1,
            willingness: crate::concepts::neighbour::WILL_DEFAULT,
            tc_interval: Duration::from_secs(5),
            tc_validity: Duration::from_secs(15),
            mid_interval: Duration::from_secs(5),
            mid_validity: Duration::from_secs(15),
            hna_interval: Duration::from_secs(5),
            hna_validity: Duration::from_secs(15),
            spf_backoff: Duration::from_secs(1),
            spf_backoff_jitter: 5,
            edge_gc_time: Duration::from_secs(2),
            edge_gc_jitter: 5,
            dup_hold_time: Duration::from_secs(30),
            max_forward_delay: Duration::from_millis(100),
            fib_metric: FibMetric::Correct,
            jitter_seed: None,
        }
    }
}

/// Configuration of one local interface.
#[derive(Serialize, Deserialize, Educe)]
#[educe(Clone(bound()), Debug(bound()))]
#[serde(bound = "")]
pub struct InterfaceConfig<T: RoutingSystem + ?Sized> {
    pub id: T::InterfaceId,
    pub address: T::Address,
    #[serde(default)]
    pub mode: InterfaceMode,
    #[serde(default = "default_mtu")]
    pub mtu: usize,
    #[serde(default = "default_hello_interval")]
    pub hello_interval: Duration,
    #[serde(default = "default_hello_validity")]
    pub hello_validity: Duration,
    /// Multiplier applied to the link quality of every link on this interface, 1.0 is neutral
    #[serde(default = "default_lq_multiplier")]
    pub lq_multiplier: f32,
}

impl<T: RoutingSystem + ?Sized> InterfaceConfig<T> {
    pub fn new(id: T::InterfaceId, address: T::Address) -> Self {
        Self {
            id,
            address,
            mode: InterfaceMode::default(),
            mtu: default_mtu(),
            hello_interval: default_hello_interval(),
            hello_validity: default_hello_validity(),
            lq_multiplier: default_lq_multiplier(),
        }
    }
}

fn default_mtu() -> usize {
    1500
}

fn default_hello_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_hello_validity() -> Duration {
    Duration::from_secs(20)
}

fn default_lq_multiplier() -> f32 {
    1.0
}

/// Networks this router announces through HNA messages.
pub type HnaSet<T> = Vec<Prefix<<T as RoutingSystem>::Address>>;

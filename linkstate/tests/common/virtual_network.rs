use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Once;
use std::time::Duration;

use linkstate::concepts::prefix::Prefix;
use linkstate::concepts::route::RouteEntry;
use linkstate::framework::{InterfaceConfig, ProtocolParams, RoutingSystem};
use linkstate::router::Router;
use simplelog::{Config, LevelFilter, TestLogger};

pub struct VirtualNet;

impl RoutingSystem for VirtualNet {
    type Address = Ipv4Addr;
    type InterfaceId = u32;
}

/// Simulation step, also the granularity of every timer in the network
pub const STEP: u64 = 100;

static LOGGER: Once = Once::new();

pub fn init_logging() {
    LOGGER.call_once(|| {
        let _ = TestLogger::init(LevelFilter::Debug, Config::default());
    });
}

/// Address of the first interface, also the router id
pub fn addr(node: u8) -> Ipv4Addr {
    iface_addr(node, 0)
}

/// Interface `n` of a node lives in 10.n.0.0/16
pub fn iface_addr(node: u8, interface: u32) -> Ipv4Addr {
    Ipv4Addr::new(10, interface as u8, 0, node)
}

/// A node and one of its interfaces
pub type Port = (u8, u32);

#[derive(Default)]
struct Wire {
    up: bool,
    /// drop every n-th datagram, 0 never drops
    drop_every: u32,
    sent: u32,
}

/// Routers connected by directed wires between their interfaces. Every router starts with
/// interface 0, more can be added with [`VirtualNetwork::add_interface`].
pub struct VirtualNetwork {
    pub routers: BTreeMap<u8, Router<VirtualNet>>,
    wires: BTreeMap<(Port, Port), Wire>,
    pub now: u64,
}

impl VirtualNetwork {
    pub fn create(nodes: &[u8], links: &[(u8, u8)], params: ProtocolParams) -> VirtualNetwork {
        init_logging();
        let routers = nodes
            .iter()
            .map(|node| {
                let mut router = Router::with_config(ProtocolParams {
                    jitter_seed: Some(*node as u64),
                    ..params.clone()
                });
                router
                    .add_interface(0, InterfaceConfig::new(0, addr(*node)))
                    .unwrap();
                (*node, router)
            })
            .collect();
        let mut network = VirtualNetwork {
            routers,
            wires: BTreeMap::new(),
            now: 0,
        };
        for (a, b) in links {
            network.set_link(*a, *b, true);
        }
        network
    }

    pub fn set_link(&mut self, a: u8, b: u8, up: bool) {
        self.connect((a, 0), (b, 0), up);
    }

    pub fn connect(&mut self, a: Port, b: Port, up: bool) {
        for key in [(a, b), (b, a)] {
            self.wires.entry(key).or_default().up = up;
        }
    }

    pub fn set_loss(&mut self, a: u8, b: u8, drop_every: u32) {
        for key in [((a, 0), (b, 0)), ((b, 0), (a, 0))] {
            self.wires.entry(key).or_default().drop_every = drop_every;
        }
    }

    pub fn add_interface(&mut self, node: u8, config: InterfaceConfig<VirtualNet>) {
        let now = self.now;
        self.get_node(node).add_interface(now, config).unwrap();
    }

    pub fn get_node(&mut self, node: u8) -> &mut Router<VirtualNet> {
        self.routers
            .get_mut(&node)
            .unwrap_or_else(|| panic!("No node {node} found"))
    }

    pub fn step(&mut self) {
        self.now += STEP;
        let now = self.now;
        let mut in_flight = Vec::new();
        for (node, router) in &mut self.routers {
            router.tick(now);
            for packet in router.outbound_packets.drain(..) {
                in_flight.push(((*node, packet.interface), packet.data));
            }
        }
        for (from, data) in in_flight {
            let receivers: Vec<Port> = self
                .wires
                .iter_mut()
                .filter(|((a, _), wire)| *a == from && wire.up)
                .filter_map(|((_, b), wire)| {
                    wire.sent += 1;
                    let dropped = wire.drop_every != 0 && wire.sent % wire.drop_every == 0;
                    (!dropped).then_some(*b)
                })
                .collect();
            for (node, interface) in receivers {
                if let Some(router) = self.routers.get_mut(&node) {
                    router.handle_datagram(now, &interface, iface_addr(from.0, from.1), &data);
                }
            }
        }
    }

    pub fn run_for(&mut self, duration: Duration) {
        for _ in 0..duration.as_millis() as u64 / STEP {
            self.step();
        }
    }

    pub fn route(&self, cur: u8, dest: u8) -> Option<&RouteEntry<VirtualNet>> {
        self.route_to(cur, addr(dest))
    }

    pub fn route_to(&self, cur: u8, dest: Ipv4Addr) -> Option<&RouteEntry<VirtualNet>> {
        let router = self
            .routers
            .get(&cur)
            .unwrap_or_else(|| panic!("No node {cur} found"));
        router.routes.get(&Prefix::host(dest))
    }

    pub fn get_next_hop(&self, cur: u8, dest: u8) -> u8 {
        let entry = self
            .route(cur, dest)
            .unwrap_or_else(|| panic!("No route found to {dest} at {cur}"));
        let path = entry.best_path().expect("route without a best path");
        path.next_hop.gateway.octets()[3]
    }

    pub fn get_hops_to(&self, cur: u8, dest: u8) -> u8 {
        let entry = self
            .route(cur, dest)
            .unwrap_or_else(|| panic!("No route found to {dest} at {cur}"));
        entry.best_path().expect("route without a best path").metric.hops
    }

    pub fn get_cost_to(&self, cur: u8, dest: u8) -> u32 {
        let entry = self
            .route(cur, dest)
            .unwrap_or_else(|| panic!("No route found to {dest} at {cur}"));
        entry.best_path().expect("route without a best path").metric.cost
    }

    pub fn freeze(&self, node: u8) -> String {
        serde_json::to_string(&self.routers[&node].snapshot()).unwrap()
    }
}

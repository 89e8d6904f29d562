use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use anyhow::{bail, Context};
use linkstate::concepts::prefix::Prefix;
use linkstate::framework::{InterfaceConfig, ProtocolParams, RoutingSystem};
use linkstate::metric::format_cost;
use linkstate::router::{Router, RouterSnapshot};
use log::{debug, info};
use serde::Deserialize;
use simplelog::*;

const STEP: u64 = 100;

pub struct SimSystem;

impl RoutingSystem for SimSystem {
    type Address = Ipv4Addr;
    type InterfaceId = u8;
}

#[derive(Deserialize)]
struct LinkSpec {
    a: u8,
    b: u8,
    /// drop every n-th datagram in both directions
    #[serde(default)]
    drop_every: u32,
}

#[derive(Deserialize)]
struct Announcement {
    node: u8,
    prefix: Prefix<Ipv4Addr>,
}

#[derive(Deserialize)]
struct Graph {
    nodes: Vec<u8>,
    links: Vec<LinkSpec>,
    #[serde(default)]
    announce: Vec<Announcement>,
    duration_secs: u64,
    #[serde(default)]
    params: ProtocolParams,
}

struct Wire {
    drop_every: u32,
    sent: u32,
}

struct Simulation {
    routers: BTreeMap<u8, Router<SimSystem>>,
    wires: BTreeMap<(u8, u8), Wire>,
    now: u64,
}

fn node_addr(node: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, node)
}

impl Simulation {
    fn new(graph: &Graph) -> anyhow::Result<Self> {
        let mut routers = BTreeMap::new();
        for node in &graph.nodes {
            let mut router = Router::with_config(ProtocolParams {
                jitter_seed: Some(*node as u64),
                ..graph.params.clone()
            });
            router.add_interface(0, InterfaceConfig::new(0, node_addr(*node)))?;
            routers.insert(*node, router);
        }
        let mut wires = BTreeMap::new();
        for link in &graph.links {
            for end in [link.a, link.b] {
                if !routers.contains_key(&end) {
                    bail!("link {}-{} refers to unknown node {end}", link.a, link.b);
                }
            }
            for key in [(link.a, link.b), (link.b, link.a)] {
                wires.insert(
                    key,
                    Wire {
                        drop_every: link.drop_every,
                        sent: 0,
                    },
                );
            }
        }
        for announcement in &graph.announce {
            routers
                .get_mut(&announcement.node)
                .with_context(|| format!("cannot announce from unknown node {}", announcement.node))?
                .announce_prefix(announcement.prefix);
        }
        Ok(Self {
            routers,
            wires,
            now: 0,
        })
    }

    fn step(&mut self) {
        self.now += STEP;
        let mut in_flight = Vec::new();
        for (node, router) in &mut self.routers {
            router.tick(self.now);
            in_flight.extend(router.outbound_packets.drain(..).map(|p| (*node, p.data)));
            for op in router.kernel_ops.drain(..) {
                debug!("[{node}] {:?} {} via {}", op.op, op.prefix, op.next_hop.gateway);
            }
        }
        for (from, data) in in_flight {
            for ((a, b), wire) in self.wires.iter_mut() {
                if *a != from {
                    continue;
                }
                wire.sent += 1;
                if wire.drop_every != 0 && wire.sent % wire.drop_every == 0 {
                    continue;
                }
                if let Some(router) = self.routers.get_mut(b) {
                    router.handle_datagram(self.now, &0, node_addr(from), &data);
                }
            }
        }
    }
}

fn print_table(node: u8, snapshot: &RouterSnapshot<SimSystem>) {
    println!("Node {node} (router id {:?})", snapshot.router_id);
    for neighbour in &snapshot.neighbours {
        println!(
            "  neighbour {} sym={} mpr={} selects us={}",
            neighbour.addr,
            neighbour.is_sym,
            neighbour.is_mpr,
            neighbour.mprs_count > 0
        );
    }
    for route in &snapshot.routes {
        if let Some(best) = route.best_path() {
            println!(
                "  {:<18} via {:<10} cost {:>8} hops {}",
                route.prefix.to_string(),
                best.next_hop.gateway,
                format_cost(best.metric.cost),
                best.metric.hops
            );
        }
    }
}

fn main() -> anyhow::Result<()> {
    CombinedLogger::init(vec![TermLogger::new(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )])?;

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./graph.json"));
    let graph: Graph = serde_json::from_slice(
        &std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?,
    )
    .context("parsing graph")?;

    let mut sim = Simulation::new(&graph)?;
    info!(
        "simulating {} nodes for {}s",
        graph.nodes.len(),
        graph.duration_secs
    );
    for _ in 0..graph.duration_secs * 1000 / STEP {
        sim.step();
    }

    for (node, router) in &sim.routers {
        print_table(*node, &router.snapshot());
    }
    Ok(())
}

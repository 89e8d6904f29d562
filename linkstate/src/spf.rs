//! Dijkstra over the link-state database.

use std::collections::BTreeSet;

use log::{debug, trace};

use crate::concepts::route::NextHop;
use crate::framework::RoutingSystem;
use crate::lsdb::{Topology, VertexId};
use crate::metric::{format_cost, LINK_COST_BROKEN, ROUTE_COST_BROKEN};
use crate::util::sum_cost;

/// Computes shortest paths from the local vertex.
///
/// `seeds` maps every symmetric one-hop neighbour to the best link towards it. The next hop of
/// any other vertex is inherited from the neighbour its path leaves through. Returns the settled
/// vertices in increasing cost order, empty when there is no local vertex.
pub fn run_spf<T: RoutingSystem + ?Sized>(
    topology: &mut Topology<T>,
    seeds: &[(T::Address, NextHop<T>)],
) -> Vec<VertexId> {
    for (_, vertex) in topology.vertices_mut() {
        vertex.path_cost = ROUTE_COST_BROKEN;
        vertex.hops = 0;
        vertex.next_hop = None;
    }

    let Some(local) = topology.local() else {
        debug!("no local vertex, nothing to compute");
        return Vec::new();
    };

    for (neighbour, next_hop) in seeds {
        let Some(id) = topology.vertex_id(neighbour) else {
            continue;
        };
        if let Some(vertex) = topology.vertex_mut(id) {
            vertex.next_hop = Some(next_hop.clone());
        }
    }

    let mut candidates: BTreeSet<(u32, VertexId)> = BTreeSet::new();
    let mut settled: Vec<VertexId> = Vec::new();
    let mut in_result: BTreeSet<VertexId> = BTreeSet::new();

    if let Some(vertex) = topology.vertex_mut(local) {
        vertex.path_cost = 0;
    }
    candidates.insert((0, local));

    while let Some((cost, id)) = candidates.pop_first() {
        let Some(vertex) = topology.vertex(id) else {
            continue;
        };
        let hops = vertex.hops;
        let next_hop = vertex.next_hop.clone();
        let edges: Vec<_> = vertex.edges.values().copied().collect();
        trace!(
            "settling {} cost {} hops {}",
            vertex.addr,
            format_cost(cost),
            hops
        );

        for edge in edges {
            // our own links are known first hand, a neighbour's claim about them is not used
            if id == local && topology.edge(edge).map_or(true, |e| e.is_virtual) {
                continue;
            }
            let edge_cost = topology.effective_cost(edge);
            if edge_cost >= LINK_COST_BROKEN {
                continue;
            }
            let Some(target) = topology.edge_target(edge) else {
                continue;
            };
            let new_cost = sum_cost(cost, edge_cost);
            let Some(dest) = topology.vertex_mut(target) else {
                continue;
            };
            if new_cost >= dest.path_cost {
                continue;
            }

            candidates.remove(&(dest.path_cost, target));
            if in_result.remove(&target) {
                settled.retain(|v| *v != target);
            }
            dest.path_cost = new_cost;
            dest.hops = hops.saturating_add(1);
            if next_hop.is_some() {
                dest.next_hop = next_hop.clone();
            }
            trace!("  candidate {} cost {}", dest.addr, format_cost(new_cost));
            candidates.insert((new_cost, target));
        }

        settled.push(id);
        in_result.insert(id);
    }

    for id in &settled {
        if let Some(vertex) = topology.vertex(*id) {
            if *id != local && vertex.next_hop.is_none() {
                debug!("{} is reachable but has no next hop", vertex.addr);
            }
        }
    }
    settled
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    struct Sys;
    impl RoutingSystem for Sys {
        type Address = Ipv4Addr;
        type InterfaceId = u8;
    }

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    fn via(last: u8) -> NextHop<Sys> {
        NextHop {
            gateway: addr(last),
            interface: 0,
        }
    }

    /// Adds both directions of a link as real edges
    fn link(topo: &mut Topology<Sys>, a: u8, b: u8, cost: u32) {
        for (from, to) in [(a, b), (b, a)] {
            let owner = topo.lookup_or_create_vertex(addr(from));
            topo.vertex_mut(owner).unwrap().is_virtual = false;
            let edge = topo.add_edge(owner, addr(to), 0).unwrap();
            topo.edge_mut(edge).unwrap().cost = cost;
        }
    }

    fn state(topo: &Topology<Sys>, last: u8) -> (u32, u8, Option<NextHop<Sys>>) {
        let v = topo.vertex_by_addr(&addr(last)).unwrap();
        (v.path_cost, v.hops, v.next_hop.clone())
    }

    fn square() -> Topology<Sys> {
        let mut topo = Topology::new();
        topo.set_local(Some(addr(1)));
        link(&mut topo, 1, 2, 10);
        link(&mut topo, 2, 3, 10);
        link(&mut topo, 1, 3, 30);
        link(&mut topo, 3, 4, LINK_COST_BROKEN);
        topo
    }

    #[test]
    fn shorter_two_hop_path_wins() {
        let mut topo = square();
        let result = run_spf(&mut topo, &[(addr(2), via(2)), (addr(3), via(3))]);

        assert_eq!(state(&topo, 3), (20, 2, Some(via(2))));
        assert_eq!(state(&topo, 2), (10, 1, Some(via(2))));
        // broken edges are never relaxed
        assert_eq!(state(&topo, 4).0, ROUTE_COST_BROKEN);
        assert_eq!(result.len(), 3);
        assert_eq!(result[0], topo.local().unwrap());
    }

    #[test]
    fn repeated_runs_are_identical() {
        let mut topo = square();
        let seeds = [(addr(2), via(2)), (addr(3), via(3))];
        let first = run_spf(&mut topo, &seeds);
        let before: Vec<_> = (1..=4).map(|v| state(&topo, v)).collect();
        let second = run_spf(&mut topo, &seeds);
        let after: Vec<_> = (1..=4).map(|v| state(&topo, v)).collect();
        assert_eq!(first, second);
        assert_eq!(before, after);
    }

    #[test]
    fn virtual_edges_mirror_their_inverse() {
        let mut topo = Topology::<Sys>::new();
        topo.set_local(Some(addr(1)));
        topo.set_local_edge(addr(2), 10, Default::default());
        // only 3 advertised the 2-3 link, 2 never sent a TC
        let c = topo.lookup_or_create_vertex(addr(3));
        let edge = topo.add_edge(c, addr(2), 0).unwrap();
        topo.edge_mut(edge).unwrap().cost = 15;

        run_spf(&mut topo, &[(addr(2), via(2))]);
        assert_eq!(state(&topo, 3), (25, 2, Some(via(2))));
    }

    #[test]
    fn lost_neighbour_claims_are_not_relaxed() {
        let mut topo = Topology::<Sys>::new();
        topo.set_local(Some(addr(1)));
        topo.set_local_edge(addr(2), 10, Default::default());
        let b = topo.lookup_or_create_vertex(addr(2));
        let edge = topo.add_edge(b, addr(1), 0).unwrap();
        topo.edge_mut(edge).unwrap().cost = 10;

        // our side of the link is gone, 2 still advertises it
        assert!(topo.remove_local_edge(&addr(2)));
        let local = topo.local().unwrap();
        let ours = topo.edge_between(local, &addr(2)).unwrap();
        assert!(topo.edge(ours).unwrap().is_virtual);

        let result = run_spf(&mut topo, &[]);
        assert_eq!(result, vec![local]);
        assert_eq!(state(&topo, 2).0, ROUTE_COST_BROKEN);
    }

    #[test]
    fn no_local_vertex_means_no_paths() {
        let mut topo = square();
        topo.set_local(None);
        assert!(run_spf(&mut topo, &[]).is_empty());
    }
}

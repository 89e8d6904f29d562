//! The link-state database: routers as vertices, advertised links as directed edges.
//!
//! Every edge owns a cross reference to its inverse edge, stored at the destination vertex.
//! When only one side has advertised the link the inverse is *virtual*: it exists so SPF can
//! walk from either end, and takes its cost from the real edge it mirrors.

use std::collections::{BTreeMap, BTreeSet};

use educe::Educe;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::collections::{Arena, Index};
use crate::concepts::prefix::Prefix;
use crate::concepts::route::NextHop;
use crate::framework::RoutingSystem;
use crate::metric::{LqTuple, LINK_COST_BROKEN, ROUTE_COST_BROKEN};
use crate::timer::TimerId;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexId(Index);

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(Index);

/// Where a prefix attached to a vertex was learned from. A vertex's own main address is
/// always routed and is not stored as a prefix.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PrefixOrigin {
    /// interface alias announced in a MID message
    Mid,
    /// network announced in an HNA message
    Hna,
    /// neighbour interface address sensed through a HELLO
    Link,
}

#[derive(Serialize, Deserialize, Educe)]
#[educe(Debug(bound()))]
#[serde(bound = "")]
pub struct Vertex<T: RoutingSystem + ?Sized> {
    pub addr: T::Address,
    /// no TC of this router is currently valid, it only exists as the end of other edges
    pub is_virtual: bool,
    /// outgoing edges by destination address
    pub edges: BTreeMap<T::Address, EdgeId>,
    pub prefixes: BTreeSet<(Prefix<T::Address>, PrefixOrigin)>,
    pub ansn: u16,
    pub tc_seqno: Option<u16>,
    pub mid_seqno: Option<u16>,
    pub hna_seqno: Option<u16>,
    pub validity_timer: Option<TimerId>,
    pub edge_gc_timer: Option<TimerId>,
    pub mid_timer: Option<TimerId>,
    pub hna_timer: Option<TimerId>,
    // SPF working state
    pub path_cost: u32,
    pub hops: u8,
    pub next_hop: Option<NextHop<T>>,
}

impl<T: RoutingSystem + ?Sized> Vertex<T> {
    fn new(addr: T::Address) -> Self {
        Self {
            addr,
            is_virtual: true,
            edges: BTreeMap::new(),
            prefixes: BTreeSet::new(),
            ansn: 0,
            tc_seqno: None,
            mid_seqno: None,
            hna_seqno: None,
            validity_timer: None,
            edge_gc_timer: None,
            mid_timer: None,
            hna_timer: None,
            path_cost: ROUTE_COST_BROKEN,
            hops: 0,
            next_hop: None,
        }
    }

    fn timers(&mut self) -> impl Iterator<Item = TimerId> {
        [
            self.validity_timer.take(),
            self.edge_gc_timer.take(),
            self.mid_timer.take(),
            self.hna_timer.take(),
        ]
        .into_iter()
        .flatten()
    }
}

#[derive(Serialize, Deserialize, Educe)]
#[educe(Debug(bound()))]
#[serde(bound = "")]
pub struct Edge<T: RoutingSystem + ?Sized> {
    pub owner: VertexId,
    pub dest: T::Address,
    pub inverse: Option<EdgeId>,
    pub tuple: LqTuple,
    pub cost: u32,
    /// ANSN of the advertisement that last confirmed the edge
    pub ansn: u16,
    pub is_virtual: bool,
}

pub struct Topology<T: RoutingSystem + ?Sized> {
    vertices: Arena<Vertex<T>>,
    edges: Arena<Edge<T>>,
    by_addr: BTreeMap<T::Address, VertexId>,
    local: Option<VertexId>,
    /// interface alias -> main address
    aliases: BTreeMap<T::Address, T::Address>,
    orphaned_timers: Vec<TimerId>,
}

impl<T: RoutingSystem + ?Sized> Default for Topology<T> {
    fn default() -> Self {
        Self {
            vertices: Arena::new(),
            edges: Arena::new(),
            by_addr: BTreeMap::new(),
            local: None,
            aliases: BTreeMap::new(),
            orphaned_timers: Vec::new(),
        }
    }
}

impl<T: RoutingSystem + ?Sized> Topology<T> {
    pub fn new() -> Self {
        Self::default()
    }

    // region Lookup

    pub fn local(&self) -> Option<VertexId> {
        self.local
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex<T>> {
        self.vertices.get(id.0)
    }

    pub fn vertex_mut(&mut self, id: VertexId) -> Option<&mut Vertex<T>> {
        self.vertices.get_mut(id.0)
    }

    pub fn vertex_id(&self, addr: &T::Address) -> Option<VertexId> {
        self.by_addr.get(addr).copied()
    }

    pub fn vertex_by_addr(&self, addr: &T::Address) -> Option<&Vertex<T>> {
        self.vertex_id(addr).and_then(|id| self.vertex(id))
    }

    pub fn vertices(&self) -> impl Iterator<Item = (VertexId, &Vertex<T>)> {
        self.vertices.iter().map(|(index, v)| (VertexId(index), v))
    }

    pub(crate) fn vertices_mut(&mut self) -> impl Iterator<Item = (VertexId, &mut Vertex<T>)> {
        self.vertices.iter_mut().map(|(index, v)| (VertexId(index), v))
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge<T>> {
        self.edges.get(id.0)
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> Option<&mut Edge<T>> {
        self.edges.get_mut(id.0)
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &Edge<T>)> {
        self.edges.iter().map(|(index, e)| (EdgeId(index), e))
    }

    pub fn edge_between(&self, owner: VertexId, dest: &T::Address) -> Option<EdgeId> {
        self.vertex(owner)?.edges.get(dest).copied()
    }

    /// The vertex an edge points to, i.e. the owner of its inverse
    pub fn edge_target(&self, id: EdgeId) -> Option<VertexId> {
        let inverse = self.edge(id)?.inverse?;
        Some(self.edge(inverse)?.owner)
    }

    /// Cost SPF uses for an edge: a virtual edge mirrors its real inverse
    pub fn effective_cost(&self, id: EdgeId) -> u32 {
        let Some(edge) = self.edge(id) else {
            return LINK_COST_BROKEN;
        };
        if edge.is_virtual {
            edge.inverse
                .and_then(|inverse| self.edge(inverse))
                .map_or(LINK_COST_BROKEN, |inverse| inverse.cost)
        } else {
            edge.cost
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Resolves an interface alias to the main address of its router
    pub fn main_address(&self, addr: &T::Address) -> T::Address {
        self.aliases.get(addr).copied().unwrap_or(*addr)
    }

    /// Timers of removed vertices, the owner of the scheduler must stop them
    pub fn take_orphaned_timers(&mut self) -> Vec<TimerId> {
        std::mem::take(&mut self.orphaned_timers)
    }

    // endregion

    // region Vertices

    pub fn lookup_or_create_vertex(&mut self, addr: T::Address) -> VertexId {
        if let Some(id) = self.vertex_id(&addr) {
            return id;
        }
        let id = VertexId(self.vertices.insert(Vertex::new(addr)));
        self.by_addr.insert(addr, id);
        trace!("created vertex {addr}");
        id
    }

    /// Moves the local identity, the old local vertex loses its edges
    pub fn set_local(&mut self, addr: Option<T::Address>) {
        if let Some(old) = self.local.take() {
            let edges: Vec<EdgeId> = self
                .vertex(old)
                .map(|v| v.edges.values().copied().collect())
                .unwrap_or_default();
            for edge in edges {
                self.delete_edge(edge);
            }
            if let Some(vertex) = self.vertex_mut(old) {
                vertex.is_virtual = true;
            }
            self.cleanup_vertex(old);
        }
        if let Some(addr) = addr {
            let id = self.lookup_or_create_vertex(addr);
            if let Some(vertex) = self.vertex_mut(id) {
                vertex.is_virtual = false;
            }
            self.local = Some(id);
        }
    }

    /// Removes a vertex nothing refers to anymore, returns whether it was removed
    pub fn cleanup_vertex(&mut self, id: VertexId) -> bool {
        let removable = match self.vertex(id) {
            Some(v) => {
                v.is_virtual
                    && Some(id) != self.local
                    && v.edges.is_empty()
                    && v.prefixes.is_empty()
                    && v.mid_timer.is_none()
                    && v.hna_timer.is_none()
            }
            None => false,
        };
        if !removable {
            return false;
        }
        if let Some(mut vertex) = self.vertices.remove(id.0) {
            debug!("removing vertex {}", vertex.addr);
            self.by_addr.remove(&vertex.addr);
            self.orphaned_timers.extend(vertex.timers());
        }
        true
    }

    /// The TC of a router expired: it keeps only what others say about it
    pub fn expire_vertex(&mut self, id: VertexId) {
        let Some(vertex) = self.vertex_mut(id) else {
            return;
        };
        vertex.is_virtual = true;
        vertex.tc_seqno = None;
        let timers: Vec<TimerId> = [vertex.validity_timer.take(), vertex.edge_gc_timer.take()]
            .into_iter()
            .flatten()
            .collect();
        let edges: Vec<EdgeId> = vertex.edges.values().copied().collect();
        self.orphaned_timers.extend(timers);
        for edge in edges {
            self.delete_edge(edge);
        }
        self.cleanup_vertex(id);
    }

    /// Replaces the prefixes of one origin, returns whether anything changed
    pub fn set_prefixes(
        &mut self,
        id: VertexId,
        origin: PrefixOrigin,
        prefixes: impl IntoIterator<Item = Prefix<T::Address>>,
    ) -> bool {
        let Some(vertex) = self.vertex_mut(id) else {
            return false;
        };
        let new: BTreeSet<_> = prefixes.into_iter().map(|p| (p, origin)).collect();
        let old: BTreeSet<_> = vertex
            .prefixes
            .iter()
            .filter(|(_, o)| *o == origin)
            .copied()
            .collect();
        if old == new {
            return false;
        }
        vertex.prefixes.retain(|(_, o)| *o != origin);
        vertex.prefixes.extend(new);
        true
    }

    pub fn add_prefix(&mut self, id: VertexId, prefix: Prefix<T::Address>, origin: PrefixOrigin) -> bool {
        self.vertex_mut(id)
            .map_or(false, |v| v.prefixes.insert((prefix, origin)))
    }

    pub fn remove_prefix(&mut self, addr: &T::Address, prefix: Prefix<T::Address>, origin: PrefixOrigin) -> bool {
        let Some(id) = self.vertex_id(addr) else {
            return false;
        };
        let removed = self
            .vertex_mut(id)
            .map_or(false, |v| v.prefixes.remove(&(prefix, origin)));
        self.cleanup_vertex(id);
        removed
    }

    /// Replaces the MID aliases of `main`
    pub fn set_aliases(&mut self, main: T::Address, aliases: &[T::Address]) {
        self.aliases.retain(|_, m| *m != main);
        for alias in aliases {
            if *alias != main {
                self.aliases.insert(*alias, main);
            }
        }
    }

    // endregion

    // region Edges

    /// Creates or refreshes the real edge `owner -> dest`, creating the destination vertex and a
    /// virtual inverse edge when needed. Self loops are refused.
    pub fn add_edge(&mut self, owner: VertexId, dest: T::Address, ansn: u16) -> Option<EdgeId> {
        let owner_addr = self.vertex(owner)?.addr;
        if owner_addr == dest {
            return None;
        }
        if let Some(id) = self.edge_between(owner, &dest) {
            let edge = self.edge_mut(id)?;
            edge.is_virtual = false;
            edge.ansn = ansn;
            return Some(id);
        }

        let target = self.lookup_or_create_vertex(dest);
        let id = EdgeId(self.edges.insert(Edge {
            owner,
            dest,
            inverse: None,
            tuple: LqTuple::default(),
            cost: LINK_COST_BROKEN,
            ansn,
            is_virtual: false,
        }));
        self.vertex_mut(owner)?.edges.insert(dest, id);

        let inverse = match self.edge_between(target, &owner_addr) {
            Some(inverse) => inverse,
            None => {
                let inverse = EdgeId(self.edges.insert(Edge {
                    owner: target,
                    dest: owner_addr,
                    inverse: None,
                    tuple: LqTuple::default(),
                    cost: LINK_COST_BROKEN,
                    ansn,
                    is_virtual: true,
                }));
                self.vertex_mut(target)?.edges.insert(owner_addr, inverse);
                inverse
            }
        };
        self.edge_mut(id)?.inverse = Some(inverse);
        self.edge_mut(inverse)?.inverse = Some(id);
        trace!("added edge {owner_addr} -> {dest}");
        Some(id)
    }

    /// Deletes a real edge. With a virtual inverse both disappear, with a real inverse the
    /// edge only turns virtual. Vertices left without purpose are removed.
    pub fn delete_edge(&mut self, id: EdgeId) {
        let Some(edge) = self.edge(id) else {
            return;
        };
        if edge.is_virtual {
            return;
        }
        let (owner, dest, inverse) = (edge.owner, edge.dest, edge.inverse);
        let inverse_is_real = inverse
            .and_then(|inverse| self.edge(inverse))
            .map_or(false, |inverse| !inverse.is_virtual);

        if inverse_is_real {
            if let Some(edge) = self.edge_mut(id) {
                edge.is_virtual = true;
                edge.tuple = LqTuple::default();
                edge.cost = LINK_COST_BROKEN;
            }
            return;
        }

        self.edges.remove(id.0);
        if let Some(vertex) = self.vertex_mut(owner) {
            vertex.edges.remove(&dest);
        }
        let mut target = None;
        if let Some(inverse) = inverse.and_then(|inverse| self.edges.remove(inverse.0)) {
            if let Some(vertex) = self.vertex_mut(inverse.owner) {
                vertex.edges.remove(&inverse.dest);
            }
            target = Some(inverse.owner);
        }
        self.cleanup_vertex(owner);
        if let Some(target) = target {
            self.cleanup_vertex(target);
        }
    }

    /// Deletes the edges of `id` that were not confirmed by its current ANSN
    pub fn gc_edges(&mut self, id: VertexId) -> usize {
        let Some(vertex) = self.vertex(id) else {
            return 0;
        };
        let ansn = vertex.ansn;
        let stale: Vec<EdgeId> = vertex
            .edges
            .values()
            .copied()
            .filter(|edge| {
                self.edge(*edge)
                    .map_or(false, |e| !e.is_virtual && e.ansn != ansn)
            })
            .collect();
        for edge in &stale {
            self.delete_edge(*edge);
        }
        stale.len()
    }

    /// Creates or updates the edge from the local vertex to a symmetric neighbour,
    /// returns whether its cost changed
    pub fn set_local_edge(&mut self, neighbour: T::Address, cost: u32, tuple: LqTuple) -> bool {
        let Some(local) = self.local else {
            return false;
        };
        let ansn = self.vertex(local).map_or(0, |v| v.ansn);
        let Some(id) = self.add_edge(local, neighbour, ansn) else {
            return false;
        };
        let Some(edge) = self.edge_mut(id) else {
            return false;
        };
        edge.tuple = tuple;
        let changed = edge.cost != cost;
        edge.cost = cost;
        changed
    }

    pub fn remove_local_edge(&mut self, neighbour: &T::Address) -> bool {
        let Some(id) = self.local.and_then(|local| self.edge_between(local, neighbour)) else {
            return false;
        };
        self.delete_edge(id);
        true
    }

    // endregion
}

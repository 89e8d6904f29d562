//! Topology control: TC input into the link-state database and TC generation.

use std::collections::BTreeSet;

use log::{debug, info, trace, warn};

use crate::concepts::packet::{MessageBody, MessageHeader, TcMessage};
use crate::framework::RoutingSystem;
use crate::router::{Router, TimerEvent};
use crate::util::{increment, millis, seqno_less_than};

impl<T: RoutingSystem> Router<T> {
    pub(crate) fn process_tc(
        &mut self,
        interface: &T::InterfaceId,
        from: T::Address,
        header: &MessageHeader<T::Address>,
        tc: &TcMessage<T::Address>,
    ) {
        if !self.from_symmetric_link(interface, from, header.msg_type) {
            return;
        }
        let originator = header.originator;
        let id = self.topology.lookup_or_create_vertex(originator);
        let now = self.now;
        let Some(vertex) = self.topology.vertex_mut(id) else {
            return;
        };

        if let Some(seqno) = vertex.tc_seqno {
            if seqno_less_than(header.seqno, seqno) {
                trace!("old TC from {originator}: seqno {} < {seqno}", header.seqno);
                return;
            }
            if seqno_less_than(tc.ansn, vertex.ansn) {
                trace!("old TC from {originator}: ansn {} < {}", tc.ansn, vertex.ansn);
                return;
            }
        }
        let ansn_changed = vertex.tc_seqno.is_some() && vertex.ansn != tc.ansn;
        if vertex.tc_seqno.is_none() {
            debug!("new TC originator {originator}");
        }
        vertex.tc_seqno = Some(header.seqno);
        vertex.ansn = tc.ansn;
        vertex.is_virtual = false;
        self.timers.set(
            now,
            &mut vertex.validity_timer,
            millis(header.validity()),
            0,
            false,
            TimerEvent::VertexExpiry(originator),
        );
        if ansn_changed {
            self.timers.set(
                now,
                &mut vertex.edge_gc_timer,
                millis(self.params.edge_gc_time),
                self.params.edge_gc_jitter,
                false,
                TimerEvent::EdgeGc(originator),
            );
        }

        for (addr, tuple) in &tc.neighbours {
            let Some(edge) = self.topology.add_edge(id, *addr, tc.ansn) else {
                continue;
            };
            let cost = self.metric.tuple_cost(tuple);
            if let Some(edge) = self.topology.edge_mut(edge) {
                if edge.cost != cost || edge.tuple != *tuple {
                    edge.tuple = *tuple;
                    edge.cost = cost;
                    self.changes.topology = true;
                }
            }
        }
    }

    /// The TC of a router was not refreshed in time
    pub(crate) fn tc_expired(&mut self, originator: &T::Address) {
        let Some(id) = self.topology.vertex_id(originator) else {
            return;
        };
        if let Some(vertex) = self.topology.vertex_mut(id) {
            vertex.validity_timer = None;
        }
        info!("topology information of {originator} expired");
        self.topology.expire_vertex(id);
        self.changes.topology = true;
    }

    pub(crate) fn edge_gc(&mut self, originator: &T::Address) {
        let Some(id) = self.topology.vertex_id(originator) else {
            return;
        };
        if let Some(vertex) = self.topology.vertex_mut(id) {
            vertex.edge_gc_timer = None;
        }
        let removed = self.topology.gc_edges(id);
        if removed > 0 {
            debug!("removed {removed} superseded edges of {originator}");
            self.changes.topology = true;
        }
    }

    pub(crate) fn generate_tc(&mut self) {
        if self.router_id().is_none() {
            return;
        }
        let neighbours: Vec<_> = self
            .neighbours
            .values()
            .filter(|n| n.is_sym)
            .filter_map(|n| {
                let link = self.links.get(n.best_link.as_ref()?)?;
                Some((n.addr, self.metric.local_tuple(&link.lq)))
            })
            .collect();

        let current: BTreeSet<T::Address> = neighbours.iter().map(|(addr, _)| *addr).collect();
        let set_changed = current != self.advertised;
        if set_changed {
            increment(&mut self.ansn);
            if let Some(vertex) = self.topology.local().and_then(|id| self.topology.vertex_mut(id)) {
                vertex.ansn = self.ansn;
            }
            debug!("advertised neighbour set changed, ansn {}", self.ansn);
            self.advertised = current;
        }

        if neighbours.is_empty() {
            if set_changed {
                self.tc_empty_until = Some(self.now + millis(self.params.tc_validity));
            }
            match self.tc_empty_until {
                Some(until) if self.now < until => {}
                _ => return,
            }
        } else {
            self.tc_empty_until = None;
        }

        let tc = TcMessage {
            ansn: self.ansn,
            neighbours,
        };
        // sized for the narrowest interface able to carry a TC, narrower ones drop it
        let max_len = self
            .interfaces
            .values()
            .map(|i| i.buffer.capacity())
            .filter(|capacity| *capacity >= TcMessage::<T::Address>::min_len())
            .min()
            .unwrap_or(0);
        let advertised = tc.neighbours.len();
        let parts = tc.split(max_len);
        if parts.is_empty() {
            warn!("interface buffers of {max_len} bytes are too small for a TC");
            return;
        }
        if parts.len() > 1 {
            debug!("splitting TC of {advertised} neighbours into {} messages", parts.len());
        }
        let targets = self.all_interfaces();
        for part in parts {
            self.originate(MessageBody::Tc(part), self.params.tc_validity, 255, targets.clone());
        }
    }
}

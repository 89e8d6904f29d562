use log::debug;

use crate::concepts::packet::{MessageBody, MessageHeader};
use crate::concepts::prefix::Prefix;
use crate::framework::RoutingSystem;
use crate::lsdb::PrefixOrigin;
use crate::router::{Router, TimerEvent};
use crate::util::{millis, seqno_less_than};

impl<T: RoutingSystem> Router<T> {
    pub(crate) fn process_mid(
        &mut self,
        interface: &T::InterfaceId,
        from: T::Address,
        header: &MessageHeader<T::Address>,
        aliases: &[T::Address],
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
        if let Some(seqno) = vertex.mid_seqno {
            if seqno_less_than(header.seqno, seqno) {
                return;
            }
        }
        vertex.mid_seqno = Some(header.seqno);
        self.timers.set(
            now,
            &mut vertex.mid_timer,
            millis(header.validity()),
            0,
            false,
            TimerEvent::MidExpiry(originator),
        );

        let aliases: Vec<T::Address> = aliases.iter().copied().filter(|a| *a != originator).collect();
        self.topology.set_aliases(originator, &aliases);
        if self
            .topology
            .set_prefixes(id, PrefixOrigin::Mid, aliases.iter().map(|a| Prefix::host(*a)))
        {
            debug!("{} has {} interface aliases", originator, aliases.len());
            self.changes.topology = true;
        }
    }

    pub(crate) fn mid_expired(&mut self, originator: &T::Address) {
        let Some(id) = self.topology.vertex_id(originator) else {
            return;
        };
        if let Some(vertex) = self.topology.vertex_mut(id) {
            vertex.mid_timer = None;
            vertex.mid_seqno = None;
        }
        debug!("interface aliases of {originator} expired");
        self.topology.set_aliases(*originator, &[]);
        self.topology.set_prefixes(id, PrefixOrigin::Mid, []);
        self.topology.cleanup_vertex(id);
        self.changes.topology = true;
    }

    /// Announces our other interface addresses when there is more than one
    pub(crate) fn generate_mid(&mut self) {
        let Some(router_id) = self.router_id() else {
            return;
        };
        if self.interfaces.len() < 2 {
            return;
        }
        let aliases: Vec<T::Address> = self
            .interfaces
            .values()
            .map(|i| i.address())
            .filter(|addr| *addr != router_id)
            .collect();
        let targets = self.all_interfaces();
        self.originate(MessageBody::Mid(aliases), self.params.mid_validity, 255, targets);
    }
}

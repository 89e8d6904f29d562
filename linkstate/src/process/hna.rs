use log::debug;

use crate::concepts::packet::{MessageBody, MessageHeader};
use crate::concepts::prefix::Prefix;
use crate::framework::RoutingSystem;
use crate::lsdb::PrefixOrigin;
use crate::router::{Router, TimerEvent};
use crate::util::{millis, seqno_less_than};

impl<T: RoutingSystem> Router<T> {
    pub(crate) fn process_hna(
        &mut self,
        interface: &T::InterfaceId,
        from: T::Address,
        header: &MessageHeader<T::Address>,
        networks: &[Prefix<T::Address>],
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
        if let Some(seqno) = vertex.hna_seqno {
            if seqno_less_than(header.seqno, seqno) {
                return;
            }
        }
        vertex.hna_seqno = Some(header.seqno);
        self.timers.set(
            now,
            &mut vertex.hna_timer,
            millis(header.validity()),
            0,
            false,
            TimerEvent::HnaExpiry(originator),
        );

        if self
            .topology
            .set_prefixes(id, PrefixOrigin::Hna, networks.iter().copied())
        {
            debug!("{} announces {} networks", originator, networks.len());
            self.changes.topology = true;
        }
    }

    pub(crate) fn hna_expired(&mut self, originator: &T::Address) {
        let Some(id) = self.topology.vertex_id(originator) else {
            return;
        };
        if let Some(vertex) = self.topology.vertex_mut(id) {
            vertex.hna_timer = None;
            vertex.hna_seqno = None;
        }
        debug!("networks announced by {originator} expired");
        self.topology.set_prefixes(id, PrefixOrigin::Hna, []);
        self.topology.cleanup_vertex(id);
        self.changes.topology = true;
    }

    pub(crate) fn generate_hna(&mut self) {
        if self.hna.is_empty() {
            return;
        }
        let networks = self.hna.clone();
        let targets = self.all_interfaces();
        self.originate(MessageBody::Hna(networks), self.params.hna_validity, 255, targets);
    }
}

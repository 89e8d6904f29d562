//! Built-in message processing and generation, one module per message type.

use log::debug;

use crate::concepts::link::LinkKey;
use crate::concepts::packet::{MessageBody, MessageHeader};
use crate::framework::RoutingSystem;
use crate::router::Router;

mod hello;
mod hna;
mod mid;
mod tc;

impl<T: RoutingSystem> Router<T> {
    pub(crate) fn process_builtin(
        &mut self,
        interface: &T::InterfaceId,
        from: T::Address,
        header: &MessageHeader<T::Address>,
        body: &MessageBody<T::Address>,
    ) {
        match body {
            MessageBody::Hello(hello) => self.process_hello(interface, from, header, hello),
            MessageBody::Tc(tc) => self.process_tc(interface, from, header, tc),
            MessageBody::Mid(aliases) => self.process_mid(interface, from, header, aliases),
            MessageBody::Hna(networks) => self.process_hna(interface, from, header, networks),
        }
    }

    /// Topology information is only accepted over symmetric links
    fn from_symmetric_link(&self, interface: &T::InterfaceId, from: T::Address, msg_type: u8) -> bool {
        let key = LinkKey {
            interface: interface.clone(),
            remote: from,
        };
        let symmetric = self.links.get(&key).map_or(false, |l| l.is_symmetric());
        if !symmetric {
            debug!("ignoring message type {msg_type} received from non-symmetric {from}");
        }
        symmetric
    }

    /// Every interface, the targets of flooded messages
    fn all_interfaces(&self) -> Vec<T::InterfaceId> {
        self.interfaces.keys().cloned().collect()
    }
}

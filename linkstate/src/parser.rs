//! Datagram validation, message dispatch and MPR flooding.

use log::{debug, warn};

use crate::concepts::link::LinkKey;
use crate::concepts::packet::{MessageBody, MessageHeader, PacketHeader, PACKET_HEADER_SIZE};
use crate::cursor::{Cursor, CursorMut};
use crate::duplicate::DupKind;
use crate::feedback::{MessageReject, PacketDrop, WireError};
use crate::framework::{InterfaceMode, NetAddress, RoutingSystem};
use crate::router::{InboundMessage, Router};

impl<T: RoutingSystem> Router<T> {
    /// Entry point of the socket collaborator: a datagram from `from` arrived on `interface`
    pub fn handle_datagram(&mut self, now: u64, interface: &T::InterfaceId, from: T::Address, data: &[u8]) {
        self.now = now;
        if !self.interfaces.contains_key(interface) {
            warn!("datagram from {from} on unknown interface {:?}", interface);
            return;
        }
        if let Err(drop) = self.parse_packet(interface, from, data) {
            warn!("{drop}");
        }
        self.stop_orphaned_timers();
        self.process_changes();
    }

    fn parse_packet(&mut self, interface: &T::InterfaceId, from: T::Address, data: &[u8]) -> Result<(), PacketDrop<T>> {
        let wire = |source: WireError| PacketDrop::Wire { from, source };
        if data.len() < PACKET_HEADER_SIZE {
            return Err(PacketDrop::TooShort {
                from,
                len: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);
        let packet = PacketHeader::read(&mut cursor).map_err(wire)?;
        if packet.size as usize != data.len() {
            return Err(PacketDrop::BadSize {
                from,
                len: data.len(),
                declared: packet.size,
            });
        }

        let key = LinkKey {
            interface: interface.clone(),
            remote: from,
        };
        if let Some(link) = self.links.get_mut(&key) {
            self.metric.packet_received(&mut link.lq, packet.seqno);
        }

        while !cursor.is_eof() {
            let start = cursor.offset();
            let mut peek = cursor.clone();
            let msg_type = peek.read_u8().map_err(wire)?;
            peek.skip(1).map_err(wire)?;
            let size = peek.read_u16().map_err(wire)?;
            if size == 0 {
                return Err(PacketDrop::ZeroLengthMessage { from, msg_type });
            }
            if size as usize > cursor.remaining() {
                return Err(PacketDrop::MessageTruncated {
                    from,
                    msg_type,
                    size,
                    remaining: cursor.remaining(),
                });
            }
            cursor.skip(size as usize).map_err(wire)?;

            let raw = &data[start..start + size as usize];
            let header = MessageHeader::read(&mut Cursor::new(raw)).map_err(wire)?;
            if let Err(reject) = self.handle_message(interface, from, &header, raw) {
                debug!("skipping message type {msg_type} from {from}: {reject}");
            }
        }
        Ok(())
    }

    fn handle_message(
        &mut self,
        interface: &T::InterfaceId,
        from: T::Address,
        header: &MessageHeader<T::Address>,
        raw: &[u8],
    ) -> Result<(), MessageReject<T>> {
        let originator = header.originator;
        if self.is_local_address(&originator) {
            return Err(MessageReject::SelfOriginated);
        }
        if !originator.is_valid_originator() {
            return Err(MessageReject::InvalidOriginator(originator));
        }
        if header.ttl == 0 || header.ttl as u16 + header.hop_count as u16 > 255 {
            return Err(MessageReject::BadTtl {
                originator,
                ttl: header.ttl,
                hop_count: header.hop_count,
            });
        }

        let status = self
            .duplicates
            .check(DupKind::Processing, originator, header.seqno, self.now);
        if !status.is_duplicate() {
            let mut cursor = Cursor::new(&raw[MessageHeader::<T::Address>::len()..]);
            let body = match MessageBody::read(header.msg_type, &mut cursor, self.metric.as_ref()) {
                Ok(body) => body,
                Err(err) => {
                    warn!("malformed message type {} from {}: {err}", header.msg_type, from);
                    return Ok(());
                }
            };
            if let Some(body) = &body {
                self.process_builtin(interface, from, header, body);
            }
            self.dispatch(&InboundMessage {
                interface,
                from,
                header,
                body: body.as_ref(),
                raw,
                status,
            });
        }

        self.forward(interface, from, header, raw);
        if status.is_duplicate() {
            return Err(MessageReject::Duplicate {
                originator,
                seqno: header.seqno,
            });
        }
        Ok(())
    }

    /// Floods a message further if the sending neighbour selected us as MPR.
    /// Returns whether the message was queued anywhere.
    fn forward(
        &mut self,
        interface: &T::InterfaceId,
        from: T::Address,
        header: &MessageHeader<T::Address>,
        raw: &[u8],
    ) -> bool {
        let key = LinkKey {
            interface: interface.clone(),
            remote: from,
        };
        let sender = match self.links.get(&key) {
            Some(link) => link.neighbour,
            None => self.topology.main_address(&from),
        };
        let Some(neighbour) = self.neighbours.get(&sender) else {
            return false;
        };
        if !neighbour.is_sym || neighbour.mprs_count == 0 {
            return false;
        }
        if self
            .duplicates
            .check(DupKind::Forwarding, header.originator, header.seqno, self.now)
            .is_duplicate()
        {
            return false;
        }

        let rewritten = MessageHeader {
            ttl: header.ttl - 1,
            hop_count: header.hop_count.saturating_add(1),
            ..*header
        };
        if rewritten.ttl == 0 {
            return false;
        }
        let mut message = raw.to_vec();
        if let Err(err) = rewritten.write(&mut CursorMut::new(&mut message)) {
            warn!("could not rewrite header of message from {}: {err}", header.originator);
            return false;
        }

        let targets: Vec<T::InterfaceId> = self
            .interfaces
            .iter()
            .filter(|(id, iface)| iface.config.mode == InterfaceMode::Mesh || *id != interface)
            .map(|(id, _)| id.clone())
            .collect();
        let mut queued = false;
        for target in targets {
            match self.queue_message(&target, &message) {
                Ok(()) => queued = true,
                Err(err) => warn!("not forwarding message from {} on {:?}: {err}", header.originator, target),
            }
        }
        queued
    }
}

use educe::Educe;
use serde::{Deserialize, Serialize};

use crate::concepts::packet::PACKET_HEADER_SIZE;
use crate::framework::{InterfaceConfig, NetAddress, RoutingSystem};
use crate::timer::TimerId;

/// Largest message batch a datagram's 16 bit size field can frame
const MAX_BUFFER: usize = u16::MAX as usize - PACKET_HEADER_SIZE;

/// Messages waiting to be framed into the next datagram of an interface.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OutboundBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl OutboundBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a message, fails without side effects when it does not fit
    pub fn push(&mut self, message: &[u8]) -> bool {
        if self.data.len() + message.len() > self.capacity {
            return false;
        }
        self.data.extend_from_slice(message);
        true
    }

    pub fn has_pending(&self) -> bool {
        !self.data.is_empty()
    }

    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[derive(Serialize, Deserialize, Educe)]
#[educe(Clone(bound()), Debug(bound()))]
#[serde(bound = "")]
pub struct Interface<T: RoutingSystem + ?Sized> {
    pub config: InterfaceConfig<T>,
    /// sequence number of the next datagram sent on this interface
    pub packet_seqno: u16,
    pub buffer: OutboundBuffer,
    pub hello_timer: Option<TimerId>,
    pub buffer_timer: Option<TimerId>,
}

impl<T: RoutingSystem + ?Sized> Interface<T> {
    pub fn new(config: InterfaceConfig<T>) -> Self {
        let capacity = config
            .mtu
            .saturating_sub(T::Address::IP_UDP_OVERHEAD + PACKET_HEADER_SIZE)
            .min(MAX_BUFFER);
        Self {
            config,
            packet_seqno: 0,
            buffer: OutboundBuffer::new(capacity),
            hello_timer: None,
            buffer_timer: None,
        }
    }

    pub fn address(&self) -> T::Address {
        self.config.address
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_rejects_overflow_whole() {
        let mut buffer = OutboundBuffer::new(10);
        assert!(buffer.push(&[1; 6]));
        assert!(!buffer.push(&[2; 6]));
        assert!(buffer.push(&[3; 4]));
        assert_eq!(buffer.take().len(), 10);
        assert!(!buffer.has_pending());
    }

    struct Jumbo;
    impl RoutingSystem for Jumbo {
        type Address = std::net::Ipv6Addr;
        type InterfaceId = u8;
    }

    #[test]
    fn capacity_fits_the_size_field() {
        let mut config = InterfaceConfig::<Jumbo>::new(0, std::net::Ipv6Addr::LOCALHOST);
        config.mtu = 9000;
        assert_eq!(Interface::new(config.clone()).buffer.capacity(), 9000 - 48 - 4);

        config.mtu = 100_000;
        let interface = Interface::new(config);
        assert_eq!(interface.buffer.capacity() + PACKET_HEADER_SIZE, u16::MAX as usize);
    }
}

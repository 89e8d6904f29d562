use educe::Educe;
use thiserror::Error;

use crate::framework::RoutingSystem;

/// Failures of the bounds-checked cursors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("buffer underrun at offset {offset}: need {needed} bytes, {remaining} left")]
    Underrun {
        offset: usize,
        needed: usize,
        remaining: usize,
    },
    #[error("buffer overrun at offset {offset}: need {needed} bytes, {remaining} left")]
    Overrun {
        offset: usize,
        needed: usize,
        remaining: usize,
    },
    #[error("{len} bytes do not fit a 16 bit size field")]
    TooLong { len: usize },
}

/// Malformed datagrams. The rest of the datagram is abandoned and a warning is logged,
/// these never escape [`crate::router::Router::handle_datagram`].
#[derive(Error, Educe)]
#[educe(Debug(bound()))]
pub enum PacketDrop<T: RoutingSystem + ?Sized> {
    #[error("packet from {from} too small ({len} bytes)")]
    TooShort { from: T::Address, len: usize },
    #[error("packet from {from} ({len} bytes) has bad size field: {declared} bytes")]
    BadSize {
        from: T::Address,
        len: usize,
        declared: u16,
    },
    #[error("packet from {from} is too short ({remaining} bytes left) for message type {msg_type} ({size} bytes)")]
    MessageTruncated {
        from: T::Address,
        msg_type: u8,
        size: u16,
        remaining: usize,
    },
    #[error("zero length message from {from} (type {msg_type}), ignoring the rest of the packet")]
    ZeroLengthMessage { from: T::Address, msg_type: u8 },
    #[error("malformed packet from {from}: {source}")]
    Wire {
        from: T::Address,
        #[source]
        source: WireError,
    },
}

/// Per-message protocol rejects, skipped silently (the next embedded message is still processed).
#[derive(Error, Educe)]
#[educe(Debug(bound()))]
pub enum MessageReject<T: RoutingSystem + ?Sized> {
    #[error("message originated by ourselves")]
    SelfOriginated,
    #[error("invalid originator address {0}")]
    InvalidOriginator(T::Address),
    #[error("malformed ttl={ttl} hopcount={hop_count} from {originator}")]
    BadTtl {
        originator: T::Address,
        ttl: u8,
        hop_count: u8,
    },
    #[error("duplicate message from {originator} (seqno {seqno})")]
    Duplicate { originator: T::Address, seqno: u16 },
}

/// Errors returned by the management API of the router.
#[derive(Error, Educe)]
#[educe(Debug(bound()))]
pub enum RouterError<T: RoutingSystem + ?Sized> {
    #[error("interface {0:?} is already configured")]
    DuplicateInterface(T::InterfaceId),
    #[error("interface {0:?} is not configured")]
    UnknownInterface(T::InterfaceId),
    #[error("message of {size} bytes does not fit into an interface buffer of {capacity} bytes")]
    MessageTooLarge { size: usize, capacity: usize },
}

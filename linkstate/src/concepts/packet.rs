use std::time::Duration;

use educe::Educe;
use serde::{Deserialize, Serialize};

use crate::concepts::prefix::Prefix;
use crate::cursor::{Cursor, CursorMut, WireResult};
use crate::feedback::WireError;
use crate::framework::{NetAddress, RoutingSystem};
use crate::metric::{LinkMetric, LqTuple, LQ_TUPLE_SIZE};
use crate::util::decode_vtime;

pub const MSG_MID: u8 = 3;
pub const MSG_HNA: u8 = 4;
pub const MSG_LQ_HELLO: u8 = 201;
pub const MSG_LQ_TC: u8 = 202;

/// size(2) + packet sequence number(2)
pub const PACKET_HEADER_SIZE: usize = 4;
const HELLO_BLOCK_HEADER_SIZE: usize = 4;
const TC_HEADER_SIZE: usize = 4;

/// A fully framed datagram waiting to be sent by the socket collaborator
#[derive(Serialize, Deserialize, Educe)]
#[educe(Clone(bound()), Debug(bound()))]
#[serde(bound = "")]
pub struct OutboundPacket<T: RoutingSystem + ?Sized> {
    /// send via this interface
    pub interface: T::InterfaceId,
    pub data: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketHeader {
    pub size: u16,
    pub seqno: u16,
}

impl PacketHeader {
    pub fn read(cursor: &mut Cursor<'_>) -> WireResult<Self> {
        Ok(Self {
            size: cursor.read_u16()?,
            seqno: cursor.read_u16()?,
        })
    }
}

/// Frames a batch of encoded messages into a datagram
pub fn encode_packet(seqno: u16, messages: &[u8]) -> WireResult<Vec<u8>> {
    let size = size_field(PACKET_HEADER_SIZE + messages.len())?;
    let mut data = vec![0u8; PACKET_HEADER_SIZE + messages.len()];
    let mut cursor = CursorMut::new(&mut data);
    cursor.write_u16(size)?;
    cursor.write_u16(seqno)?;
    cursor.write_bytes(messages)?;
    Ok(data)
}

fn size_field(len: usize) -> WireResult<u16> {
    u16::try_from(len).map_err(|_| WireError::TooLong { len })
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(bound = "")]
pub struct MessageHeader<A: NetAddress> {
    pub msg_type: u8,
    /// validity time in the mantissa/exponent encoding
    pub vtime: u8,
    /// size of the whole message including this header
    pub size: u16,
    pub originator: A,
    pub ttl: u8,
    pub hop_count: u8,
    pub seqno: u16,
}

impl<A: NetAddress> MessageHeader<A> {
    pub fn len() -> usize {
        8 + A::WIDTH
    }

    pub fn validity(&self) -> Duration {
        decode_vtime(self.vtime)
    }

    pub fn read(cursor: &mut Cursor<'_>) -> WireResult<Self> {
        Ok(Self {
            msg_type: cursor.read_u8()?,
            vtime: cursor.read_u8()?,
            size: cursor.read_u16()?,
            originator: A::read(cursor)?,
            ttl: cursor.read_u8()?,
            hop_count: cursor.read_u8()?,
            seqno: cursor.read_u16()?,
        })
    }

    pub fn write(&self, cursor: &mut CursorMut<'_>) -> WireResult<()> {
        cursor.write_u8(self.msg_type)?;
        cursor.write_u8(self.vtime)?;
        cursor.write_u16(self.size)?;
        self.originator.write(cursor)?;
        cursor.write_u8(self.ttl)?;
        cursor.write_u8(self.hop_count)?;
        cursor.write_u16(self.seqno)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LinkType {
    Unspec = 0,
    Asym = 1,
    Sym = 2,
    Lost = 3,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum NeighbourType {
    Not = 0,
    Sym = 1,
    Mpr = 2,
}

/// Link code byte of a HELLO link block: neighbour type << 2 | link type
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct LinkCode {
    pub link: LinkType,
    pub neighbour: NeighbourType,
}

impl LinkCode {
    pub fn new(link: LinkType, neighbour: NeighbourType) -> Self {
        Self { link, neighbour }
    }

    pub fn to_byte(self) -> u8 {
        (self.neighbour as u8) << 2 | self.link as u8
    }

    /// `None` for undefined neighbour types
    pub fn from_byte(value: u8) -> Option<Self> {
        let link = match value & 0x03 {
            0 => LinkType::Unspec,
            1 => LinkType::Asym,
            2 => LinkType::Sym,
            _ => LinkType::Lost,
        };
        let neighbour = match (value >> 2) & 0x03 {
            0 => NeighbourType::Not,
            1 => NeighbourType::Sym,
            2 => NeighbourType::Mpr,
            _ => return None,
        };
        Some(Self { link, neighbour })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HelloGroup<A: NetAddress> {
    pub code: LinkCode,
    pub neighbours: Vec<(A, LqTuple)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HelloMessage<A: NetAddress> {
    /// hello emission interval in the vtime encoding
    pub htime: u8,
    pub willingness: u8,
    pub groups: Vec<HelloGroup<A>>,
}

impl<A: NetAddress> HelloMessage<A> {
    pub fn hello_interval(&self) -> Duration {
        decode_vtime(self.htime)
    }

    /// Looks up how the sender lists one of our interface addresses
    pub fn find(&self, addr: &A) -> Option<(LinkCode, LqTuple)> {
        self.groups.iter().find_map(|group| {
            group
                .neighbours
                .iter()
                .find(|(neighbour, _)| neighbour == addr)
                .map(|(_, tuple)| (group.code, *tuple))
        })
    }

    fn read(cursor: &mut Cursor<'_>, metric: &dyn LinkMetric) -> WireResult<Self> {
        cursor.skip(2)?;
        let htime = cursor.read_u8()?;
        let willingness = cursor.read_u8()?;
        let mut groups = Vec::new();
        while cursor.remaining() >= HELLO_BLOCK_HEADER_SIZE {
            let code = cursor.read_u8()?;
            cursor.skip(1)?;
            let size = cursor.read_u16()? as usize;
            let mut block = cursor.sub_cursor(size.saturating_sub(HELLO_BLOCK_HEADER_SIZE))?;
            let Some(code) = LinkCode::from_byte(code) else {
                continue;
            };
            let mut neighbours = Vec::new();
            while block.remaining() >= A::WIDTH + LQ_TUPLE_SIZE {
                let addr = A::read(&mut block)?;
                neighbours.push((addr, metric.deserialize(&mut block)?));
            }
            groups.push(HelloGroup { code, neighbours });
        }
        Ok(Self {
            htime,
            willingness,
            groups,
        })
    }

    fn write(&self, cursor: &mut CursorMut<'_>, metric: &dyn LinkMetric) -> WireResult<()> {
        cursor.write_u16(0)?;
        cursor.write_u8(self.htime)?;
        cursor.write_u8(self.willingness)?;
        for group in &self.groups {
            cursor.write_u8(group.code.to_byte())?;
            cursor.write_u8(0)?;
            cursor.write_u16(
                (HELLO_BLOCK_HEADER_SIZE + group.neighbours.len() * (A::WIDTH + LQ_TUPLE_SIZE)) as u16,
            )?;
            for (addr, tuple) in &group.neighbours {
                addr.write(cursor)?;
                metric.serialize(tuple, cursor)?;
            }
        }
        Ok(())
    }

    fn encoded_len(&self) -> usize {
        4 + self
            .groups
            .iter()
            .map(|g| HELLO_BLOCK_HEADER_SIZE + g.neighbours.len() * (A::WIDTH + LQ_TUPLE_SIZE))
            .sum::<usize>()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TcMessage<A: NetAddress> {
    pub ansn: u16,
    pub neighbours: Vec<(A, LqTuple)>,
}

impl<A: NetAddress> TcMessage<A> {
    /// Size of a TC advertising a single neighbour
    pub fn min_len() -> usize {
        MessageHeader::<A>::len() + TC_HEADER_SIZE + A::WIDTH + LQ_TUPLE_SIZE
    }

    /// Splits the advertisement into messages of at most `max_len` bytes, header included.
    /// Every part carries the same ANSN. Returns nothing if not even one neighbour fits.
    pub fn split(self, max_len: usize) -> Vec<TcMessage<A>> {
        let per_message = max_len.saturating_sub(MessageHeader::<A>::len() + TC_HEADER_SIZE)
            / (A::WIDTH + LQ_TUPLE_SIZE);
        if self.neighbours.is_empty() {
            return if MessageHeader::<A>::len() + TC_HEADER_SIZE <= max_len {
                vec![self]
            } else {
                Vec::new()
            };
        }
        if per_message == 0 {
            return Vec::new();
        }
        self.neighbours
            .chunks(per_message)
            .map(|chunk| TcMessage {
                ansn: self.ansn,
                neighbours: chunk.to_vec(),
            })
            .collect()
    }

    fn read(cursor: &mut Cursor<'_>, metric: &dyn LinkMetric) -> WireResult<Self> {
        let ansn = cursor.read_u16()?;
        // lower and upper border, only used for fragmented TCs
        cursor.skip(2)?;
        let mut neighbours = Vec::new();
        while cursor.remaining() >= A::WIDTH + LQ_TUPLE_SIZE {
            let addr = A::read(cursor)?;
            neighbours.push((addr, metric.deserialize(cursor)?));
        }
        Ok(Self { ansn, neighbours })
    }

    fn write(&self, cursor: &mut CursorMut<'_>, metric: &dyn LinkMetric) -> WireResult<()> {
        cursor.write_u16(self.ansn)?;
        cursor.write_u16(0)?;
        for (addr, tuple) in &self.neighbours {
            addr.write(cursor)?;
            metric.serialize(tuple, cursor)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum MessageBody<A: NetAddress> {
    Hello(HelloMessage<A>),
    Tc(TcMessage<A>),
    Mid(Vec<A>),
    Hna(Vec<Prefix<A>>),
}

impl<A: NetAddress> MessageBody<A> {
    pub fn msg_type(&self) -> u8 {
        match self {
            MessageBody::Hello(_) => MSG_LQ_HELLO,
            MessageBody::Tc(_) => MSG_LQ_TC,
            MessageBody::Mid(_) => MSG_MID,
            MessageBody::Hna(_) => MSG_HNA,
        }
    }

    /// Decodes the body of a built-in message type, `None` for other types
    pub fn read(msg_type: u8, cursor: &mut Cursor<'_>, metric: &dyn LinkMetric) -> WireResult<Option<Self>> {
        Ok(Some(match msg_type {
            MSG_LQ_HELLO => MessageBody::Hello(HelloMessage::read(cursor, metric)?),
            MSG_LQ_TC => MessageBody::Tc(TcMessage::read(cursor, metric)?),
            MSG_MID => {
                let mut aliases = Vec::new();
                while cursor.remaining() >= A::WIDTH {
                    aliases.push(A::read(cursor)?);
                }
                MessageBody::Mid(aliases)
            }
            MSG_HNA => {
                let mut networks = Vec::new();
                while cursor.remaining() >= 2 * A::WIDTH {
                    let addr = A::read(cursor)?;
                    let netmask = A::read(cursor)?;
                    if let Some(prefix) = Prefix::from_netmask(addr, netmask) {
                        networks.push(prefix);
                    }
                }
                MessageBody::Hna(networks)
            }
            _ => return Ok(None),
        }))
    }

    fn write(&self, cursor: &mut CursorMut<'_>, metric: &dyn LinkMetric) -> WireResult<()> {
        match self {
            MessageBody::Hello(hello) => hello.write(cursor, metric),
            MessageBody::Tc(tc) => tc.write(cursor, metric),
            MessageBody::Mid(aliases) => aliases.iter().try_for_each(|a| a.write(cursor)),
            MessageBody::Hna(networks) => networks.iter().try_for_each(|p| {
                p.addr.write(cursor)?;
                p.netmask().write(cursor)
            }),
        }
    }

    fn encoded_len(&self) -> usize {
        match self {
            MessageBody::Hello(hello) => hello.encoded_len(),
            MessageBody::Tc(tc) => TC_HEADER_SIZE + tc.neighbours.len() * (A::WIDTH + LQ_TUPLE_SIZE),
            MessageBody::Mid(aliases) => aliases.len() * A::WIDTH,
            MessageBody::Hna(networks) => networks.len() * 2 * A::WIDTH,
        }
    }

    /// Encodes header and body, the header's type and size fields are filled in here
    pub fn encode(&self, header: &MessageHeader<A>, metric: &dyn LinkMetric) -> WireResult<Vec<u8>> {
        let len = MessageHeader::<A>::len() + self.encoded_len();
        let mut data = vec![0u8; len];
        let mut cursor = CursorMut::new(&mut data);
        MessageHeader {
            msg_type: self.msg_type(),
            size: size_field(len)?,
            ..*header
        }
        .write(&mut cursor)?;
        self.write(&mut cursor, metric)?;
        Ok(data)
    }
}

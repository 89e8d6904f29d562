use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cursor::{Cursor, CursorMut, WireResult};
use crate::framework::{LqAlgorithm, ProtocolParams};

pub mod etx_ff;
pub mod etx_float;
pub mod hopcount;

pub use etx_ff::{EtxFf, PacketWindow, LQ_FF_QUICKSTART_INIT, LQ_FF_WINDOW};
pub use etx_float::{EtxFloat, LQ_QUICKSTART_STEPS};
pub use hopcount::HopCount;

/// Edges and links at or above this cost are unusable
pub const LINK_COST_BROKEN: u32 = 1 << 22;
/// Path cost of an unreachable vertex
pub const ROUTE_COST_BROKEN: u32 = u32::MAX;
/// Highest link quality on the 8-bit wire scale
pub const MAX_LQ: u8 = 255;
/// Wire size of an LQ tuple: lq, nlq and two reserved bytes
pub const LQ_TUPLE_SIZE: usize = 4;

/// The two one-directional link qualities as carried in HELLO and TC messages.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LqTuple {
    /// quality of the link as measured by the sender
    pub lq: u8,
    /// quality of the reverse direction, echoed back from the neighbour
    pub nlq: u8,
}

impl LqTuple {
    pub fn new(lq: u8, nlq: u8) -> Self {
        Self { lq, nlq }
    }

    pub fn read(cursor: &mut Cursor<'_>) -> WireResult<Self> {
        let lq = cursor.read_u8()?;
        let nlq = cursor.read_u8()?;
        cursor.skip(2)?;
        Ok(Self { lq, nlq })
    }

    pub fn write(&self, cursor: &mut CursorMut<'_>) -> WireResult<()> {
        cursor.write_u8(self.lq)?;
        cursor.write_u8(self.nlq)?;
        cursor.write_u16(0)
    }
}

/// Engine specific sample state of one link.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum LqSamples {
    Window(PacketWindow),
    Aging {
        /// locally measured quality, 0.0..=1.0
        lq: f32,
        /// hellos seen so far, capped at the quickstart length
        hellos: u8,
    },
    Constant,
}

/// Link quality state kept on every link.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LinkLq {
    /// our measured quality and the neighbour's echo of it
    pub tuple: LqTuple,
    pub samples: LqSamples,
}

/// A pluggable link-quality engine. Exactly one engine is chosen per router.
pub trait LinkMetric {
    fn name(&self) -> &'static str;

    /// Fresh state for a newly sensed link
    fn new_link(&self) -> LinkLq;

    /// Outer packet sequence number seen on the link
    fn packet_received(&self, _lq: &mut LinkLq, _seqno: u16) {}

    /// A HELLO arrived on the link (`lost == false`) or the loss timer expired
    fn hello_received(&self, _lq: &mut LinkLq, _lost: bool) {}

    /// The periodic LQ timer fired, `multiplier` is the interface's 16.16 fixed point
    /// loss multiplier. Returns whether the link quality changed.
    fn period_elapsed(&self, _lq: &mut LinkLq, _hello_interval: Duration, _multiplier: u32) -> bool {
        false
    }

    fn link_cost(&self, lq: &LinkLq) -> u32 {
        self.tuple_cost(&lq.tuple)
    }

    /// Cost of a topology edge as advertised by its owner
    fn tuple_cost(&self, tuple: &LqTuple) -> u32;

    /// Stores the tuple the neighbour advertised for us, `None` when it does not list us
    fn memorize_foreign(&self, lq: &mut LinkLq, foreign: Option<LqTuple>) {
        lq.tuple.nlq = foreign.map(|t| t.lq).unwrap_or(0);
    }

    /// The tuple we put on the wire for this link
    fn local_tuple(&self, lq: &LinkLq) -> LqTuple {
        lq.tuple
    }

    fn serialize(&self, tuple: &LqTuple, cursor: &mut CursorMut<'_>) -> WireResult<()> {
        tuple.write(cursor)
    }

    fn deserialize(&self, cursor: &mut Cursor<'_>) -> WireResult<LqTuple> {
        LqTuple::read(cursor)
    }

    /// Resets a link to the state of a freshly sensed one
    fn clear(&self, lq: &mut LinkLq) {
        *lq = self.new_link();
    }
}

/// Instantiates the engine selected in the protocol parameters
pub fn from_params(params: &ProtocolParams) -> Box<dyn LinkMetric> {
    match params.lq_algorithm {
        LqAlgorithm::EtxFf => Box::new(EtxFf::new(params.min_useful_lq)),
        LqAlgorithm::EtxFloat => Box::new(EtxFloat::new(params.lq_aging, params.min_useful_lq)),
        LqAlgorithm::HopCount => Box::new(HopCount),
    }
}

/// Renders a cost in the 16.16 fixed point scale as `int.frac` with three decimals
///
/// # Examples
///
/// ```
/// use linkstate::metric::{format_cost, LINK_COST_BROKEN};
/// assert_eq!(format_cost(65536), "1.000");
/// assert_eq!(format_cost(98304), "1.500");
/// assert_eq!(format_cost(LINK_COST_BROKEN), "INFINITE");
/// ```
pub fn format_cost(cost: u32) -> String {
    if cost >= LINK_COST_BROKEN {
        return "INFINITE".to_string();
    }
    let fraction = ((cost & 0xFFFF) as u64 * 1000) >> 16;
    format!("{}.{:03}", cost >> 16, fraction)
}

/// ETX style cost shared by the integer engines: 65536 * 255/lq * 255/nlq
pub(crate) fn etx_cost(lq: u8, nlq: u8, min_useful_lq: u8) -> u32 {
    if lq < min_useful_lq.max(1) || nlq < min_useful_lq.max(1) {
        return LINK_COST_BROKEN;
    }
    let cost = 65536u64 * MAX_LQ as u64 / lq as u64 * MAX_LQ as u64 / nlq as u64;
    (cost.min(LINK_COST_BROKEN as u64) as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuple_wire_layout() {
        let mut buffer = [0xEEu8; 4];
        let mut cursor = CursorMut::new(&mut buffer);
        LqTuple::new(200, 180).write(&mut cursor).unwrap();
        assert_eq!(buffer, [200, 180, 0, 0]);

        // reserved bytes are ignored on input
        let received = [200, 180, 0xAB, 0xCD];
        let tuple = LqTuple::read(&mut Cursor::new(&received)).unwrap();
        assert_eq!(tuple, LqTuple::new(200, 180));
    }

    #[test]
    fn etx_cost_bounds() {
        assert_eq!(etx_cost(255, 255, 1), 65536);
        assert_eq!(etx_cost(0, 255, 1), LINK_COST_BROKEN);
        assert_eq!(etx_cost(255, 0, 1), LINK_COST_BROKEN);
        assert_eq!(etx_cost(20, 255, 25), LINK_COST_BROKEN);
        assert_eq!(etx_cost(1, 1, 1), LINK_COST_BROKEN);
        assert_eq!(etx_cost(128, 128, 1), 65536 * 255 / 128 * 255 / 128);
        for lq in 1..=255u8 {
            for nlq in [1u8, 7, 128, 255] {
                assert_ne!(etx_cost(lq, nlq, 1), 0);
            }
        }
    }
}

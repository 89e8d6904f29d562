//! Freifunk ETX: link quality from a sliding window of packet sequence numbers.
//!
//! Every received packet adds one to the `received` counter of the active slot and the
//! sequence number gap to its `total`. Once per LQ period the window is summed into an
//! 8-bit quality and the pointer moves on. New links start with a narrow window that
//! widens by one slot per period (quickstart) so the first estimates react quickly.

use std::time::Duration;

use log::{trace, warn};
use serde::{Deserialize, Serialize};

use crate::metric::{etx_cost, LinkLq, LinkMetric, LqSamples, LqTuple, MAX_LQ};

pub const LQ_FF_WINDOW: usize = 32;
pub const LQ_FF_QUICKSTART_INIT: u8 = 4;
/// Sequence number jumps above this are treated as a restart of the sender
const MAX_SEQNO_GAP: u32 = 256;
/// Expected packets preset into every slot of a cleared window
const CLEARED_SLOT_TOTAL: u16 = 3;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PacketWindow {
    pub received: [u16; LQ_FF_WINDOW],
    pub total: [u16; LQ_FF_WINDOW],
    pub active: usize,
    pub window_size: u8,
    pub last_seqno: Option<u16>,
    /// LQ periods since the last packet arrived
    pub missed_periods: u32,
}

impl Default for PacketWindow {
    fn default() -> Self {
        Self {
            received: [0; LQ_FF_WINDOW],
            total: [CLEARED_SLOT_TOTAL; LQ_FF_WINDOW],
            active: 0,
            window_size: LQ_FF_QUICKSTART_INIT,
            last_seqno: None,
            missed_periods: 0,
        }
    }
}

impl PacketWindow {
    /// Counts a received packet, returns the number of packets it accounts for
    pub fn record(&mut self, seqno: u16) -> Option<u32> {
        let gap = match self.last_seqno {
            Some(last) if last == seqno => return None,
            Some(last) if last > seqno => seqno as u32 + 65536 - last as u32,
            Some(last) => (seqno - last) as u32,
            None => 1,
        };
        let gap = if gap > MAX_SEQNO_GAP { 1 } else { gap };
        self.received[self.active] = self.received[self.active].saturating_add(1);
        self.total[self.active] = self.total[self.active].saturating_add(gap as u16);
        self.last_seqno = Some(seqno);
        self.missed_periods = 0;
        Some(gap)
    }

    /// Sums the `window_size` most recent slots after widening the window
    fn sum(&mut self) -> (u32, u32) {
        if (self.window_size as usize) < LQ_FF_WINDOW {
            self.window_size += 1;
        }
        (0..self.window_size as usize)
            .map(|age| (self.active + LQ_FF_WINDOW - age) % LQ_FF_WINDOW)
            .fold((0, 0), |(received, total), slot| {
                (
                    received + self.received[slot] as u32,
                    total + self.total[slot] as u32,
                )
            })
    }

    /// Closes the active slot and computes the new quality
    pub fn advance(&mut self, hello_interval: Duration, multiplier: u32) -> u8 {
        let (received, mut total) = self.sum();
        let lq = if total == 0 {
            0
        } else {
            let hello_secs = hello_interval.as_millis().div_ceil(1000).max(1) as u32;
            let missed = self.missed_periods / hello_secs;
            total = total.saturating_add(missed.saturating_mul(missed));
            let ratio = multiplier as u64 * received as u64 / total as u64;
            ((ratio * MAX_LQ as u64) >> 16).min(MAX_LQ as u64) as u8
        };
        self.active = (self.active + 1) % LQ_FF_WINDOW;
        self.received[self.active] = 0;
        self.total[self.active] = 0;
        self.missed_periods = self.missed_periods.saturating_add(1);
        lq
    }
}

pub struct EtxFf {
    min_useful_lq: u8,
}

impl EtxFf {
    pub fn new(min_useful_lq: u8) -> Self {
        Self { min_useful_lq }
    }
}

impl LinkMetric for EtxFf {
    fn name(&self) -> &'static str {
        "etx_ff"
    }

    fn new_link(&self) -> LinkLq {
        LinkLq {
            tuple: LqTuple::default(),
            samples: LqSamples::Window(PacketWindow::default()),
        }
    }

    fn packet_received(&self, lq: &mut LinkLq, seqno: u16) {
        if let LqSamples::Window(window) = &mut lq.samples {
            match window.record(seqno) {
                Some(gap) => trace!("packet seqno {seqno:#06x}, gap {gap}"),
                None => warn!("got packet with same sequence number {seqno:#06x}"),
            }
        }
    }

    fn period_elapsed(&self, lq: &mut LinkLq, hello_interval: Duration, multiplier: u32) -> bool {
        let LqSamples::Window(window) = &mut lq.samples else {
            return false;
        };
        let value = window.advance(hello_interval, multiplier);
        let changed = value != lq.tuple.lq;
        lq.tuple.lq = value;
        changed
    }

    fn tuple_cost(&self, tuple: &LqTuple) -> u32 {
        etx_cost(tuple.lq, tuple.nlq, self.min_useful_lq)
    }
}

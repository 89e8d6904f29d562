//! Per originator duplicate detection over message sequence numbers.

use std::collections::BTreeMap;

use log::debug;

use crate::framework::RoutingSystem;
use crate::util::seqno_diff;

/// Width of the history bitmap behind the highest sequence number
const HISTORY_BITS: i32 = 32;
/// Consecutive too old sequence numbers accepted as an originator restart
const MAX_TOO_LOW: u32 = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DupStatus {
    New,
    Duplicate,
    /// the originator restarted its sequence numbers, the window was reset
    Reset,
}

impl DupStatus {
    pub fn is_duplicate(self) -> bool {
        self == DupStatus::Duplicate
    }
}

/// Processing and forwarding keep separate windows: a message processed on one interface may
/// still need to be forwarded when it arrives on another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DupKind {
    Processing,
    Forwarding,
}

#[derive(Clone, Debug)]
struct DupEntry {
    highest: u16,
    history: u32,
    too_low: u32,
    last_seen: u64,
}

pub struct DuplicateSet<T: RoutingSystem + ?Sized> {
    entries: BTreeMap<(DupKind, T::Address), DupEntry>,
}

impl<T: RoutingSystem + ?Sized> Default for DuplicateSet<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T: RoutingSystem + ?Sized> DuplicateSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `seqno` from `originator` and classifies it
    pub fn check(&mut self, kind: DupKind, originator: T::Address, seqno: u16, now: u64) -> DupStatus {
        let Some(entry) = self.entries.get_mut(&(kind, originator)) else {
            self.entries.insert(
                (kind, originator),
                DupEntry {
                    highest: seqno,
                    history: 1,
                    too_low: 0,
                    last_seen: now,
                },
            );
            return DupStatus::New;
        };
        entry.last_seen = now;

        let diff = seqno_diff(seqno, entry.highest);
        if diff <= -HISTORY_BITS {
            entry.too_low += 1;
            if entry.too_low > MAX_TOO_LOW {
                debug!("{originator} restarted its sequence numbers at {seqno}");
                entry.highest = seqno;
                entry.history = 1;
                entry.too_low = 0;
                return DupStatus::Reset;
            }
            return DupStatus::Duplicate;
        }
        entry.too_low = 0;

        if diff <= 0 {
            let bit = 1u32 << (-diff);
            if entry.history & bit != 0 {
                return DupStatus::Duplicate;
            }
            entry.history |= bit;
            return DupStatus::New;
        }

        entry.history = if diff < HISTORY_BITS {
            entry.history << diff
        } else {
            0
        };
        entry.history |= 1;
        entry.highest = seqno;
        DupStatus::New
    }

    /// Forgets originators not heard from within `hold` milliseconds
    pub fn expire(&mut self, now: u64, hold: u64) {
        self.entries
            .retain(|_, entry| entry.last_seen.saturating_add(hold) > now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

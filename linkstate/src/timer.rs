//! Delayed and periodic events in virtual time.
//!
//! The scheduler holds plain event values ordered by absolute fire time. The router pops
//! everything that is due in [`Scheduler::pop_due`] and dispatches on the event itself,
//! so no callback ever holds a reference into router state.

use std::collections::{BTreeMap, BTreeSet};

use crate::util::jittered;

pub type TimerId = u64;

struct TimerEntry<E> {
    fire_at: u64,
    /// relative period, only for periodic timers
    period: Option<u64>,
    jitter_pct: u8,
    event: E,
}

pub struct Scheduler<E> {
    queue: BTreeSet<(u64, TimerId)>,
    timers: BTreeMap<TimerId, TimerEntry<E>>,
    next_id: TimerId,
    rng: fastrand::Rng,
}

impl<E: Clone> Scheduler<E> {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            queue: BTreeSet::new(),
            timers: BTreeMap::new(),
            next_id: 1,
            rng: seed.map(fastrand::Rng::with_seed)
                .unwrap_or_else(fastrand::Rng::new),
        }
    }

    /// Starts a timer firing `relative` ms after `now`, shortened by up to `jitter_pct` percent
    pub fn start(&mut self, now: u64, relative: u64, jitter_pct: u8, periodic: bool, event: E) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        let fire_at = now + jittered(&mut self.rng, relative, jitter_pct);
        self.queue.insert((fire_at, id));
        self.timers.insert(
            id,
            TimerEntry {
                fire_at,
                period: periodic.then_some(relative),
                jitter_pct,
                event,
            },
        );
        id
    }

    pub fn stop(&mut self, id: TimerId) {
        if let Some(entry) = self.timers.remove(&id) {
            self.queue.remove(&(entry.fire_at, id));
        }
    }

    /// Reschedules a running timer, a periodic timer also takes over the new period
    pub fn change(&mut self, now: u64, id: TimerId, relative: u64, jitter_pct: u8) {
        let Some(entry) = self.timers.get_mut(&id) else {
            return;
        };
        self.queue.remove(&(entry.fire_at, id));
        entry.fire_at = now + jittered(&mut self.rng, relative, jitter_pct);
        entry.jitter_pct = jitter_pct;
        if entry.period.is_some() {
            entry.period = Some(relative);
        }
        self.queue.insert((entry.fire_at, id));
    }

    /// Stops the timer in `slot` when `relative` is zero, otherwise changes it when running or
    /// starts a new one
    pub fn set(
        &mut self,
        now: u64,
        slot: &mut Option<TimerId>,
        relative: u64,
        jitter_pct: u8,
        periodic: bool,
        event: E,
    ) {
        if relative == 0 {
            if let Some(id) = slot.take() {
                self.stop(id);
            }
            return;
        }
        match *slot {
            Some(id) if self.is_running(id) => self.change(now, id, relative, jitter_pct),
            _ => *slot = Some(self.start(now, relative, jitter_pct, periodic, event)),
        }
    }

    pub fn is_running(&self, id: TimerId) -> bool {
        self.timers.contains_key(&id)
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.queue.first().map(|(fire_at, _)| *fire_at)
    }

    /// Removes the earliest timer due at `now`. Periodic timers are rescheduled one period
    /// after `now` before their event is handed out.
    pub fn pop_due(&mut self, now: u64) -> Option<(TimerId, E)> {
        let &(fire_at, id) = self.queue.first()?;
        if fire_at > now {
            return None;
        }
        self.queue.remove(&(fire_at, id));
        let period = self.timers.get(&id)?.period;
        match period {
            Some(period) => {
                let next = now + jittered(&mut self.rng, period, self.timers.get(&id)?.jitter_pct);
                let entry = self.timers.get_mut(&id)?;
                entry.fire_at = next;
                self.queue.insert((next, id));
                Some((id, entry.event.clone()))
            }
            None => self.timers.remove(&id).map(|entry| (id, entry.event)),
        }
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

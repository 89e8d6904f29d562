//! Link sensing: HELLO input and generation, link timers and the periodic LQ update.

use std::collections::BTreeSet;

use log::{debug, info};

use crate::concepts::link::{Link, LinkKey};
use crate::concepts::neighbour::Neighbour;
use crate::concepts::packet::{
    HelloGroup, HelloMessage, LinkCode, LinkType, MessageBody, MessageHeader, NeighbourType,
};
use crate::concepts::prefix::Prefix;
use crate::framework::RoutingSystem;
use crate::lsdb::PrefixOrigin;
use crate::metric::LINK_COST_BROKEN;
use crate::router::{Router, TimerEvent};
use crate::util::{encode_vtime, millis};

/// Converts an interface LQ multiplier to 16.16 fixed point
fn fixed_multiplier(multiplier: f32) -> u32 {
    (multiplier.max(0.0) * 65536.0) as u32
}

impl<T: RoutingSystem> Router<T> {
    pub(crate) fn process_hello(
        &mut self,
        interface: &T::InterfaceId,
        from: T::Address,
        header: &MessageHeader<T::Address>,
        hello: &HelloMessage<T::Address>,
    ) {
        let Some(local_addr) = self.interfaces.get(interface).map(|i| i.address()) else {
            return;
        };
        let originator = header.originator;
        let key = LinkKey {
            interface: interface.clone(),
            remote: from,
        };

        if !self.links.contains_key(&key) {
            info!("new link to {} ({}) on {:?}", originator, from, interface);
            self.links.insert(
                key.clone(),
                Link {
                    local: local_addr,
                    neighbour: originator,
                    lq: self.metric.new_link(),
                    cost: LINK_COST_BROKEN,
                    hello_interval: hello.hello_interval(),
                    mpr_selector: false,
                    link_timer: None,
                    sym_timer: None,
                    loss_timer: None,
                },
            );
            if from != originator {
                let vertex = self.topology.lookup_or_create_vertex(originator);
                self.topology
                    .add_prefix(vertex, Prefix::host(from), PrefixOrigin::Link);
            }
            self.neighbours
                .entry(originator)
                .or_insert_with(|| Neighbour::new(originator));
            self.changes.neighbourhood = true;
        } else if self.links.get(&key).is_some_and(|l| l.neighbour != originator) {
            self.rehome_link(&key, originator);
        }

        let now = self.now;
        let validity = millis(header.validity());
        let Some(link) = self.links.get_mut(&key) else {
            return;
        };
        self.timers.set(
            now,
            &mut link.link_timer,
            validity,
            0,
            false,
            TimerEvent::LinkExpiry(key.clone()),
        );

        let was_symmetric = link.is_symmetric();
        match hello.find(&local_addr) {
            Some((code, tuple)) => {
                match code.link {
                    LinkType::Lost => {
                        // the neighbour gave up on the link, measure it again from scratch
                        if let Some(timer) = link.sym_timer.take() {
                            self.timers.stop(timer);
                            self.metric.clear(&mut link.lq);
                        }
                    }
                    LinkType::Sym | LinkType::Asym => self.timers.set(
                        now,
                        &mut link.sym_timer,
                        validity,
                        0,
                        false,
                        TimerEvent::LinkSym(key.clone()),
                    ),
                    LinkType::Unspec => {}
                }
                self.metric.memorize_foreign(&mut link.lq, Some(tuple));
                link.mpr_selector = code.neighbour == NeighbourType::Mpr;
            }
            None => {
                self.metric.memorize_foreign(&mut link.lq, None);
                link.mpr_selector = false;
            }
        }

        link.hello_interval = hello.hello_interval();
        self.timers.set(
            now,
            &mut link.loss_timer,
            millis(link.hello_interval) * 3 / 2,
            0,
            true,
            TimerEvent::LinkLoss(key.clone()),
        );
        self.metric.hello_received(&mut link.lq, false);
        link.cost = self.metric.link_cost(&link.lq);
        let is_symmetric = link.is_symmetric();
        if was_symmetric != is_symmetric {
            debug!("link {} on {:?} is now {:?}", from, interface, link.link_type());
            self.changes.neighbourhood = true;
        }

        if let Some(neighbour) = self.neighbours.get_mut(&originator) {
            neighbour.willingness = hello.willingness;
            if is_symmetric {
                let two_hop: BTreeSet<T::Address> = hello
                    .groups
                    .iter()
                    .filter(|g| {
                        g.code.link != LinkType::Lost
                            && matches!(g.code.neighbour, NeighbourType::Sym | NeighbourType::Mpr)
                    })
                    .flat_map(|g| g.neighbours.iter().map(|(addr, _)| self.topology.main_address(addr)))
                    .collect();
                if neighbour.two_hop != two_hop {
                    neighbour.two_hop = two_hop;
                    self.changes.neighbourhood = true;
                }
            }
        }
        self.update_mpr_selector_count(&originator);
        self.neighbour_cost_may_have_changed(&originator);
    }

    fn update_mpr_selector_count(&mut self, neighbour: &T::Address) {
        let count = self
            .links
            .values()
            .filter(|l| l.neighbour == *neighbour && l.mpr_selector)
            .count() as u32;
        if let Some(n) = self.neighbours.get_mut(neighbour) {
            if n.mprs_count != count {
                debug!("{} selects us as MPR on {} links", neighbour, count);
                n.mprs_count = count;
            }
        }
    }

    /// Re-evaluates the best link to a neighbour and the cost of our edge towards it.
    /// Flags a topology change when the edge cost or the first hop moves.
    pub fn neighbour_cost_may_have_changed(&mut self, neighbour: &T::Address) {
        let best = self
            .links
            .iter()
            .filter(|(_, l)| l.neighbour == *neighbour && l.is_symmetric())
            .min_by_key(|(key, l)| (l.cost, (*key).clone()))
            .map(|(key, l)| (key.clone(), l.cost, self.metric.local_tuple(&l.lq)));

        let Some(n) = self.neighbours.get_mut(neighbour) else {
            return;
        };
        let is_sym = best.is_some();
        if n.is_sym != is_sym {
            info!("neighbour {} is {}symmetric", neighbour, if is_sym { "" } else { "no longer " });
            n.is_sym = is_sym;
            self.changes.neighbourhood = true;
        }
        let best_link = best.as_ref().map(|(key, _, _)| key.clone());
        if n.best_link != best_link {
            n.best_link = best_link;
            self.changes.topology = true;
        }

        match best {
            Some((_, cost, tuple)) => {
                if self.topology.set_local_edge(*neighbour, cost, tuple) {
                    self.changes.topology = true;
                }
            }
            None => {
                if self.topology.remove_local_edge(neighbour) {
                    self.changes.topology = true;
                }
            }
        }
    }

    pub(crate) fn delete_link(&mut self, key: &LinkKey<T>) {
        let Some(link) = self.links.remove(key) else {
            return;
        };
        for timer in [link.link_timer, link.sym_timer, link.loss_timer].into_iter().flatten() {
            self.timers.stop(timer);
        }
        if key.remote != link.neighbour {
            self.topology
                .remove_prefix(&link.neighbour, Prefix::host(key.remote), PrefixOrigin::Link);
        }

        self.neighbour_lost_link(&link.neighbour);
    }

    /// The neighbour behind a link announces a new main address, after a router id change
    fn rehome_link(&mut self, key: &LinkKey<T>, originator: T::Address) {
        let Some(link) = self.links.get_mut(key) else {
            return;
        };
        let old = std::mem::replace(&mut link.neighbour, originator);
        info!("link {} on {:?} moved from neighbour {} to {}", key.remote, key.interface, old, originator);

        if key.remote != old {
            self.topology
                .remove_prefix(&old, Prefix::host(key.remote), PrefixOrigin::Link);
        }
        if key.remote != originator {
            let vertex = self.topology.lookup_or_create_vertex(originator);
            self.topology
                .add_prefix(vertex, Prefix::host(key.remote), PrefixOrigin::Link);
        }
        self.neighbours
            .entry(originator)
            .or_insert_with(|| Neighbour::new(originator));
        self.neighbour_lost_link(&old);
    }

    /// Updates a neighbour after one of its links went away, dropping it with the last one
    fn neighbour_lost_link(&mut self, neighbour: &T::Address) {
        if self.links.values().any(|l| l.neighbour == *neighbour) {
            self.update_mpr_selector_count(neighbour);
            self.neighbour_cost_may_have_changed(neighbour);
        } else {
            info!("lost neighbour {}", neighbour);
            self.neighbours.remove(neighbour);
            if self.topology.remove_local_edge(neighbour) {
                self.changes.topology = true;
            }
        }
        self.changes.neighbourhood = true;
    }

    pub(crate) fn link_sym_expired(&mut self, key: &LinkKey<T>) {
        let Some(link) = self.links.get_mut(key) else {
            return;
        };
        link.sym_timer = None;
        let neighbour = link.neighbour;
        debug!("link {} on {:?} is no longer symmetric", key.remote, key.interface);
        self.changes.neighbourhood = true;
        self.neighbour_cost_may_have_changed(&neighbour);
    }

    /// No HELLO arrived within 1.5 hello intervals
    pub(crate) fn link_hello_lost(&mut self, key: &LinkKey<T>) {
        let Some(link) = self.links.get_mut(key) else {
            return;
        };
        self.metric.hello_received(&mut link.lq, true);
        let cost = self.metric.link_cost(&link.lq);
        if cost != link.cost {
            link.cost = cost;
            let neighbour = link.neighbour;
            self.neighbour_cost_may_have_changed(&neighbour);
        }
    }

    pub(crate) fn lq_period_elapsed(&mut self) {
        let mut changed = Vec::new();
        for (key, link) in self.links.iter_mut() {
            let multiplier = self
                .interfaces
                .get(&key.interface)
                .map_or(65536, |i| fixed_multiplier(i.config.lq_multiplier));
            if !self
                .metric
                .period_elapsed(&mut link.lq, link.hello_interval, multiplier)
            {
                continue;
            }
            let cost = self.metric.link_cost(&link.lq);
            if cost != link.cost {
                link.cost = cost;
                changed.push(link.neighbour);
            }
        }
        changed.dedup();
        for neighbour in changed {
            self.neighbour_cost_may_have_changed(&neighbour);
        }
    }

    pub(crate) fn generate_hello(&mut self, interface: &T::InterfaceId) {
        let Some(iface) = self.interfaces.get(interface) else {
            return;
        };
        let htime = encode_vtime(iface.config.hello_interval);
        let validity = iface.config.hello_validity;

        let mut groups: Vec<HelloGroup<T::Address>> = Vec::new();
        for (key, link) in self.links.iter().filter(|(key, _)| key.interface == *interface) {
            let neighbour = match self.neighbours.get(&link.neighbour) {
                Some(n) if n.is_mpr => NeighbourType::Mpr,
                Some(n) if n.is_sym => NeighbourType::Sym,
                _ => NeighbourType::Not,
            };
            let code = LinkCode::new(link.link_type(), neighbour);
            let entry = (key.remote, self.metric.local_tuple(&link.lq));
            match groups.iter_mut().find(|g| g.code == code) {
                Some(group) => group.neighbours.push(entry),
                None => groups.push(HelloGroup {
                    code,
                    neighbours: vec![entry],
                }),
            }
        }
        groups.sort_by_key(|g| g.code);

        let hello = HelloMessage {
            htime,
            willingness: self.params.willingness,
            groups,
        };
        self.originate(MessageBody::Hello(hello), validity, 1, vec![interface.clone()]);
    }
}
